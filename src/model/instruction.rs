//! Parsed Dockerfile instructions and the variable bindings visible to them.

use std::collections::BTreeMap;

/// The recognized instruction verbs.
///
/// Only a small subset drives the simulation; everything else is carried as
/// [`InstructionKind::Other`] and passed through unmodified.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstructionKind {
    From,
    Run,
    User,
    Workdir,
    Env,
    Arg,
    Comment,
    Other(String),
}

impl InstructionKind {
    pub fn from_verb(verb: &str) -> Self {
        match verb.to_uppercase().as_str() {
            "FROM" => InstructionKind::From,
            "RUN" => InstructionKind::Run,
            "USER" => InstructionKind::User,
            "WORKDIR" => InstructionKind::Workdir,
            "ENV" => InstructionKind::Env,
            "ARG" => InstructionKind::Arg,
            other => InstructionKind::Other(other.to_string()),
        }
    }

    /// Canonical upper-case verb, used when an instruction is rebuilt.
    pub fn verb(&self) -> &str {
        match self {
            InstructionKind::From => "FROM",
            InstructionKind::Run => "RUN",
            InstructionKind::User => "USER",
            InstructionKind::Workdir => "WORKDIR",
            InstructionKind::Env => "ENV",
            InstructionKind::Arg => "ARG",
            InstructionKind::Comment => "#",
            InstructionKind::Other(verb) => verb,
        }
    }
}

/// One instruction of a Dockerfile.
#[derive(Debug, Clone)]
pub struct Instruction {
    pub kind: InstructionKind,
    /// First source line of the instruction, 0-based.
    pub start_line: usize,
    /// Last source line, inclusive. `None` marks an instruction synthesized
    /// by a prior optimization run rather than read from the file.
    pub end_line: Option<usize>,
    /// Original text including the verb and any line breaks.
    pub raw: String,
    /// Verb-stripped body with line continuations collapsed to one line.
    pub value: String,
}

/// Variable bindings (ARG defaults and ENV values) visible at one line.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Context {
    bindings: BTreeMap<String, String>,
}

impl Context {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.bindings.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.bindings.get(key).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    /// Substitutes `${KEY}` and `$KEY` occurrences for every binding whose
    /// key appears in `s`. Each binding is applied once per input span;
    /// substituted values are not re-expanded.
    pub fn substitute(&self, s: &str) -> String {
        let matching: Vec<(&String, &String, String, String)> = self
            .bindings
            .iter()
            .map(|(key, value)| (key, value, format!("${{{}}}", key), format!("${}", key)))
            .filter(|(_, _, braced, bare)| s.contains(braced.as_str()) || s.contains(bare.as_str()))
            .collect();
        let mut out = s.to_string();
        for (_, value, braced, bare) in matching {
            out = out.replace(&braced, value);
            out = out.replace(&bare, value);
        }
        out
    }
}
