//! Compiled pattern lists.
//!
//! Pattern files are compiled once when they are loaded; matching a line
//! never touches the regex compiler.

use regex::Regex;

/// How the lines of a pattern resource are interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatternSyntax {
    /// Host/IP globs: `.` is literal, `*` is one or more of any character,
    /// anchored at both ends.
    Glob,
    /// Regular expressions searched anywhere in the candidate; authors add their
    /// own `^`/`$` for field-structured matching.
    Search,
    /// Regular expressions that must match the whole candidate.
    Full,
}

/// An ordered list of compiled patterns, evaluated top to bottom.
#[derive(Debug, Clone, Default)]
pub struct PatternList {
    patterns: Vec<(String, Regex)>,
}

impl PatternList {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn compile<S: AsRef<str>>(lines: &[S], syntax: PatternSyntax) -> Result<Self, regex::Error> {
        let patterns = lines
            .iter()
            .map(|line| {
                let line = line.as_ref();
                let source = match syntax {
                    PatternSyntax::Glob => glob_to_regex(line),
                    PatternSyntax::Search => line.to_string(),
                    PatternSyntax::Full => format!("^(?:{line})$"),
                };
                Regex::new(&source).map(|regex| (line.to_string(), regex))
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { patterns })
    }

    /// The first pattern (as written in the resource) that matches `text`.
    pub fn first_match(&self, text: &str) -> Option<&str> {
        self.patterns
            .iter()
            .find(|(_, regex)| regex.is_match(text))
            .map(|(line, _)| line.as_str())
    }

    pub fn matches(&self, text: &str) -> bool {
        self.first_match(text).is_some()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }
}

fn glob_to_regex(pattern: &str) -> String {
    let mut source = String::with_capacity(pattern.len() + 8);
    source.push('^');
    for c in pattern.chars() {
        match c {
            '.' => source.push_str(r"\."),
            '*' => source.push_str(".+"),
            other => source.push(other),
        }
    }
    source.push('$');
    source
}
