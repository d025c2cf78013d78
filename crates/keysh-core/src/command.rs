//! Command line resolution.
//!
//! Turns the command line a client sent (possibly nothing) into an argument
//! vector. Splitting is on runs of whitespace only; quotes and escapes are
//! passed through as literal characters.

use std::fmt;

/// Non-empty argument vector for a command to launch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedCommand(Vec<String>);

impl ResolvedCommand {
    /// Program name (first token).
    pub fn program(&self) -> &str {
        &self.0[0]
    }

    /// Arguments after the program name.
    pub fn args(&self) -> &[String] {
        &self.0[1..]
    }

    pub fn argv(&self) -> &[String] {
        &self.0
    }

    pub fn into_argv(self) -> Vec<String> {
        self.0
    }
}

impl fmt::Display for ResolvedCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}]", self.0.join(" "))
    }
}

/// Resolve a raw command line against the configured default.
///
/// An empty or whitespace-only line yields `[default]`. The result always
/// holds at least one token.
pub fn resolve(raw: &str, default: &str) -> ResolvedCommand {
    let argv: Vec<String> = raw.split_whitespace().map(str::to_owned).collect();
    if argv.is_empty() {
        ResolvedCommand(vec![default.to_owned()])
    } else {
        ResolvedCommand(argv)
    }
}
