//! Built-in `System` commands.
//!
//! Anything addressed to `System` (or `System.<qualifier>`) lands here. Every
//! answer goes back to the requester as `System><sender> @<verb> <text>`.

use tracing::{info, warn};

use crate::connection::{CloseMode, ConnectionId};
use crate::messaging::outbox::Outbox;
use crate::messaging::prefetch::Prefetched;
use crate::messaging::router::{load_aliases, Router};
use crate::security::PermissionFilter;
use crate::messaging::types::{EVENT_MARKER, REPLY_MARKER, SYSTEM_NODE};

/// Verbs listed by `help`.
pub const HELP_TEXT: &str = "flgon flgoff loadaliases listaliases loadpermission \
loadreconnectablepermission listnodes getversion gettime hello disconnect";

const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// A parsed `System` command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SystemCommand<'a> {
    /// `_<event>`: broadcast to subscribers of the sender
    Event(&'a str),
    Disconnect(Option<&'a str>),
    FlagOn(Option<&'a str>),
    FlagOff(Option<&'a str>),
    LoadReconnectablePermission,
    LoadPermission,
    LoadAliases,
    ListAliases,
    ListNodes,
    GetVersion,
    GetTime,
    Hello,
    Help,
    /// `@...`: a reply addressed to `System`; nothing to do
    Reply,
    Unknown(&'a str),
}

impl<'a> SystemCommand<'a> {
    pub fn parse(command: &'a str) -> Self {
        if command.starts_with(EVENT_MARKER) {
            return SystemCommand::Event(command);
        }
        if command.starts_with(REPLY_MARKER) {
            return SystemCommand::Reply;
        }

        let (verb, argument) = match command.split_once(char::is_whitespace) {
            Some((verb, rest)) => (verb, Some(rest.trim()).filter(|arg| !arg.is_empty())),
            None => (command, None),
        };
        // Only the verbs that take an argument tolerate trailing text.
        match (verb, argument) {
            ("disconnect", argument) => SystemCommand::Disconnect(argument.filter(|a| starts_with_token(a))),
            ("flgon", argument) => SystemCommand::FlagOn(argument.filter(|a| starts_with_token(a))),
            ("flgoff", argument) => SystemCommand::FlagOff(argument.filter(|a| starts_with_token(a))),
            ("loadreconnectablepermission", None) => SystemCommand::LoadReconnectablePermission,
            ("loadpermission", None) => SystemCommand::LoadPermission,
            ("loadaliases", None) => SystemCommand::LoadAliases,
            ("listaliases", None) => SystemCommand::ListAliases,
            ("listnodes", None) => SystemCommand::ListNodes,
            ("getversion", None) => SystemCommand::GetVersion,
            ("gettime", None) => SystemCommand::GetTime,
            ("hello", None) => SystemCommand::Hello,
            ("help", None) => SystemCommand::Help,
            _ => SystemCommand::Unknown(command),
        }
    }
}

fn starts_with_token(argument: &str) -> bool {
    argument
        .chars()
        .next()
        .is_some_and(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'))
}

/// Current local time as `YYYY-MM-DD HH:MM:SS`.
pub fn current_time() -> String {
    chrono::Local::now().format(TIME_FORMAT).to_string()
}

impl Router {
    /// Runs a `System` command on behalf of `sender`, replying on `connection`.
    ///
    /// The reload verbs take their lists from `prefetched` when it holds
    /// them and read the library otherwise.
    pub(super) fn execute_command(
        &mut self,
        connection: ConnectionId,
        sender: &str,
        command: &str,
        prefetched: Option<Prefetched>,
        out: &mut Outbox,
    ) {
        let reply = |router: &Router, out: &mut Outbox, verb: &str, text: &str| {
            router.enqueue(out, connection, format!("{SYSTEM_NODE}>{sender} @{verb} {text}"));
        };

        match SystemCommand::parse(command) {
            SystemCommand::Event(event) => self.notify_subscribers(sender, event, out),
            SystemCommand::Disconnect(None) => {
                reply(self, out, "disconnect", "Er: Parameter is not enough.")
            }
            SystemCommand::Disconnect(Some(name)) => {
                let node = self.aliases.resolve_alias(name).to_string();
                match self.directory.lookup(&node) {
                    Some(target) => {
                        reply(self, out, "disconnect", &format!("{node}."));
                        info!("⛔ {} forced {} off", sender, node);
                        self.disconnect(target, out);
                        out.close(target, CloseMode::Abort);
                    }
                    None => reply(self, out, "disconnect", &format!("Er: Node {node} is down.")),
                }
            }
            SystemCommand::FlagOn(None) => reply(self, out, "flgon", "Er: Parameter is not enough."),
            SystemCommand::FlagOn(Some(pattern)) => match self.subscriptions.add(sender, pattern) {
                Ok(()) => reply(self, out, "flgon", &format!("Node {pattern} has been registered.")),
                Err(e) => reply(self, out, "flgon", &format!("Er: {e}")),
            },
            SystemCommand::FlagOff(None) => reply(self, out, "flgoff", "Er: Parameter is not enough."),
            SystemCommand::FlagOff(Some(pattern)) => match self.subscriptions.remove(sender, pattern) {
                Ok(()) => reply(self, out, "flgoff", &format!("Node {pattern} has been removed.")),
                Err(e) => reply(self, out, "flgoff", &format!("Er: {e}")),
            },
            SystemCommand::LoadReconnectablePermission => {
                let verb = "loadreconnectablepermission";
                let lists = prefetched
                    .and_then(Prefetched::into_reconnect_lists)
                    .unwrap_or_else(|| PermissionFilter::load_reconnect_lists(self.resources.as_ref()));
                match lists {
                    Ok(lists) => {
                        self.filter.set_reconnect_lists(lists);
                        reply(self, out, verb, "Reconnectable permission list has been loaded.");
                    }
                    Err(e) => {
                        warn!("⚠️ {} failed: {}", verb, e);
                        reply(self, out, verb, &format!("Er: {e}"));
                    }
                }
            }
            SystemCommand::LoadPermission => {
                let verb = "loadpermission";
                let lists = prefetched
                    .and_then(Prefetched::into_command_lists)
                    .unwrap_or_else(|| PermissionFilter::load_command_lists(self.resources.as_ref()));
                match lists {
                    Ok(lists) => {
                        self.filter.set_command_lists(lists);
                        reply(self, out, verb, "Command permission list has been loaded.");
                    }
                    Err(e) => {
                        warn!("⚠️ {} failed: {}", verb, e);
                        reply(self, out, verb, &format!("Er: {e}"));
                    }
                }
            }
            SystemCommand::LoadAliases => {
                let aliases = prefetched
                    .and_then(Prefetched::into_aliases)
                    .unwrap_or_else(|| load_aliases(self.resources.as_ref()));
                match aliases {
                    Ok(aliases) => {
                        info!("📚 Reloaded {} alias pair(s)", aliases.len());
                        self.aliases = aliases;
                        reply(self, out, "loadaliases", "Aliases has been loaded.");
                    }
                    Err(e) => {
                        warn!("⚠️ loadaliases failed: {}", e);
                        reply(self, out, "loadaliases", &format!("Er: {e}"));
                    }
                }
            }
            SystemCommand::ListAliases => {
                let listing = self
                    .aliases
                    .pairs()
                    .iter()
                    .map(|(alias, real)| format!("{alias},{real}"))
                    .collect::<Vec<_>>()
                    .join(" ");
                reply(self, out, "listaliases", &listing);
            }
            SystemCommand::ListNodes => {
                let listing = self.directory.node_names().join(" ");
                reply(self, out, "listnodes", &listing);
            }
            SystemCommand::GetVersion => reply(
                self,
                out,
                "getversion",
                &format!("Version: {}", env!("CARGO_PKG_VERSION")),
            ),
            SystemCommand::GetTime => reply(self, out, "gettime", &current_time()),
            SystemCommand::Hello => reply(self, out, "hello", "Nice to meet you."),
            SystemCommand::Help => reply(self, out, "help", HELP_TEXT),
            SystemCommand::Reply => {}
            SystemCommand::Unknown(command) => reply(
                self,
                out,
                command,
                "Er: Command is not found or parameter is not enough.",
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_verbs() {
        assert_eq!(SystemCommand::parse("_Moved 10"), SystemCommand::Event("_Moved 10"));
        assert_eq!(SystemCommand::parse("@hello ok"), SystemCommand::Reply);
        assert_eq!(SystemCommand::parse("disconnect Bob"), SystemCommand::Disconnect(Some("Bob")));
        assert_eq!(SystemCommand::parse("disconnect"), SystemCommand::Disconnect(None));
        assert_eq!(SystemCommand::parse("flgon  "), SystemCommand::FlagOn(None));
        assert_eq!(SystemCommand::parse("flgon (x"), SystemCommand::FlagOn(None));
        assert_eq!(SystemCommand::parse("flgoff Node.*"), SystemCommand::FlagOff(Some("Node.*")));
        assert_eq!(SystemCommand::parse("gettime"), SystemCommand::GetTime);
        assert_eq!(SystemCommand::parse("gettime now"), SystemCommand::Unknown("gettime now"));
        assert_eq!(SystemCommand::parse("Hello"), SystemCommand::Unknown("Hello"));
    }

    #[test]
    fn test_time_format() {
        let time = current_time();
        assert_eq!(time.len(), 19);
        assert!(chrono::NaiveDateTime::parse_from_str(&time, TIME_FORMAT).is_ok());
    }
}
