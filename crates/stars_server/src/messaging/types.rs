//! Wire line grammar and reserved names.
//!
//! ```text
//! line        := [sender ">"] destination [WS payload]
//! sender      := token
//! destination := token            ; may carry a ".qualifier"
//! token       := [A-Za-z0-9_.-]+
//! ```

/// Destination that addresses the built-in command processor.
pub const SYSTEM_NODE: &str = "System";

/// Node name that, while registered, receives a copy of all routed traffic.
pub const DEBUGGER_NODE: &str = "Debugger";

/// Payload prefix of replies; never filtered and never answered.
pub const REPLY_MARKER: char = '@';

/// Payload prefix of events; failures are not reported back.
pub const EVENT_MARKER: char = '_';

fn is_token_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-')
}

/// Whether `name` is a valid node name (`[A-Za-z0-9_.-]+`).
pub fn is_valid_node_name(name: &str) -> bool {
    !name.is_empty() && name.chars().all(is_token_char)
}

/// The part of a (possibly qualified) name before its first `.`.
pub fn base_name(name: &str) -> &str {
    name.split_once('.').map_or(name, |(base, _)| base)
}

/// Lines starting with `exit` or `quit`, in any case, end the session.
pub fn is_exit_line(line: &str) -> bool {
    line.get(..4)
        .is_some_and(|head| head.eq_ignore_ascii_case("exit") || head.eq_ignore_ascii_case("quit"))
}

fn split_token(text: &str) -> (&str, &str) {
    let end = text.find(|c: char| !is_token_char(c)).unwrap_or(text.len());
    text.split_at(end)
}

/// A received line split into its routing header and payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutedLine<'a> {
    /// Explicit `<sender>>` prefix, if the line carried one
    pub sender: Option<&'a str>,
    /// Destination token; `None` when the line does not start with one
    pub destination: Option<&'a str>,
    /// Everything after the destination and the whitespace following it
    pub payload: &'a str,
}

impl<'a> RoutedLine<'a> {
    pub fn parse(line: &'a str) -> Self {
        let (token, rest) = split_token(line);
        let (sender, body) = match rest.strip_prefix('>') {
            Some(body) if !token.is_empty() => (Some(token), body),
            _ => (None, line),
        };

        let (destination, rest) = split_token(body);
        if destination.is_empty() {
            return Self {
                sender,
                destination: None,
                payload: body,
            };
        }
        Self {
            sender,
            destination: Some(destination),
            payload: rest.trim_start(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_line() {
        let line = RoutedLine::parse("Alice>Bob.motor move 10");
        assert_eq!(line.sender, Some("Alice"));
        assert_eq!(line.destination, Some("Bob.motor"));
        assert_eq!(line.payload, "move 10");
    }

    #[test]
    fn test_parse_without_sender() {
        let line = RoutedLine::parse("Bob   hello  world ");
        assert_eq!(line.sender, None);
        assert_eq!(line.destination, Some("Bob"));
        assert_eq!(line.payload, "hello  world ");

        let line = RoutedLine::parse("System");
        assert_eq!(line.destination, Some("System"));
        assert_eq!(line.payload, "");
    }

    #[test]
    fn test_parse_missing_destination() {
        let line = RoutedLine::parse("Alice> hello");
        assert_eq!(line.sender, Some("Alice"));
        assert_eq!(line.destination, None);

        let line = RoutedLine::parse(">Bob hi");
        assert_eq!(line.sender, None);
        assert_eq!(line.destination, None);
    }

    #[test]
    fn test_names() {
        assert!(is_valid_node_name("Node_1.sub-a"));
        assert!(!is_valid_node_name(""));
        assert!(!is_valid_node_name("Node 1"));
        assert_eq!(base_name("NodeA.sensor1.x"), "NodeA");
        assert_eq!(base_name("NodeA"), "NodeA");
    }

    #[test]
    fn test_exit_lines() {
        assert!(is_exit_line("exit"));
        assert!(is_exit_line("QUIT now"));
        assert!(!is_exit_line("Bob exit"));
        assert!(!is_exit_line("ex"));
    }
}
