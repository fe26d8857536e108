//! Remote command value types and output parsers.
//!
//! A [`Command`] is what the harness hands to a node's execution channel: the
//! command line itself plus optional environment overrides. The channel
//! returns output as-is; consumers that want more than raw text interpret it
//! with one of the parser helpers, as a trimmed string or a structured JSON
//! document.

use serde::de::DeserializeOwned;

/// A command to run on a remote node, with optional environment overrides.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    program: String,
    env: Vec<(String, String)>,
}

impl Command {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            env: Vec::new(),
        }
    }

    /// Adds an environment override, e.g. for switching a remote operation
    /// into non-blocking mode.
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn env_vars(&self) -> &[(String, String)] {
        &self.env
    }
}

impl std::fmt::Display for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.program)
    }
}

/// Interprets output as a single trimmed string.
pub fn parse_trimmed(output: &str) -> String {
    output.trim().to_string()
}

/// Interprets output as a JSON document. The caller attributes a parse
/// failure to the node the output came from.
pub fn parse_json<T: DeserializeOwned>(output: &str) -> serde_json::Result<T> {
    serde_json::from_str(output)
}
