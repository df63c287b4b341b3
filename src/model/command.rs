//! Command words, commands and the connectors between them.

use std::fmt;

/// How a command word was quoted in the original instruction body.
///
/// Quoting is preserved so reconstruction and regex matching can tell a
/// literal token apart from a quoted string containing spaces or connectors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Quoting {
    Unquoted,
    SingleQuoted,
    DoubleQuoted,
    /// An element of an exec-form array, e.g. `["apt-get", "update"]`.
    ExecArrayArg,
}

/// One word of a shell command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandWord {
    pub text: String,
    pub quoting: Quoting,
}

impl CommandWord {
    pub fn new(text: impl Into<String>, quoting: Quoting) -> Self {
        Self {
            text: text.into(),
            quoting,
        }
    }

    pub fn unquoted(text: impl Into<String>) -> Self {
        Self::new(text, Quoting::Unquoted)
    }
}

/// An ordered sequence of words; word 0 is the executable name.
pub type Command = Vec<CommandWord>;

/// Separator between two commands on one instruction line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Connector {
    And,
    Or,
    Seq,
}

impl Connector {
    pub fn as_str(&self) -> &'static str {
        match self {
            Connector::And => "&&",
            Connector::Or => "||",
            Connector::Seq => ";",
        }
    }
}

impl fmt::Display for Connector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Serializes words back to a single command string.
///
/// This is the only place words are re-quoted; every consumer that needs a
/// textual command goes through here so quoting stays consistent.
pub fn join_words(words: &[CommandWord]) -> String {
    let mut parts: Vec<String> = Vec::with_capacity(words.len());
    for word in words {
        match word.quoting {
            Quoting::Unquoted | Quoting::ExecArrayArg => {
                if !word.text.trim().is_empty() {
                    parts.push(word.text.clone());
                }
            }
            Quoting::SingleQuoted => parts.push(format!("'{}'", word.text)),
            Quoting::DoubleQuoted => parts.push(format!("\"{}\"", word.text)),
        }
    }
    parts.join(" ")
}
