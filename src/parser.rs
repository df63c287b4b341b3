//! Dockerfile structural parsing.
//!
//! Splits raw text into an ordered instruction list with 0-based start/end
//! line numbers and, in parallel, the ARG/ENV bindings visible at each
//! instruction. Line continuations are collapsed into the instruction's
//! `value`; the original text (including line breaks) is kept in `raw` so
//! untouched instructions can be re-emitted byte for byte.

use crate::model::{Context, Instruction, InstructionKind};

/// A parsed Dockerfile: instructions plus a parallel list of contexts.
#[derive(Debug, Default)]
pub struct Dockerfile {
    pub instructions: Vec<Instruction>,
    pub contexts: Vec<Context>,
}

impl Dockerfile {
    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }
}

/// Parses Dockerfile text. Parsing never fails; unrecognized verbs become
/// [`InstructionKind::Other`] instructions that pass through unmodified.
pub fn parse(text: &str) -> Dockerfile {
    let lines: Vec<&str> = text.split_inclusive('\n').collect();
    let mut dockerfile = Dockerfile::default();
    let mut env = Context::new();

    let mut i = 0;
    while i < lines.len() {
        let line = lines[i];
        let trimmed = line.trim();
        if trimmed.is_empty() {
            i += 1;
            continue;
        }

        if let Some(comment) = trimmed.strip_prefix('#') {
            dockerfile.instructions.push(Instruction {
                kind: InstructionKind::Comment,
                start_line: i,
                end_line: Some(i),
                raw: line.to_string(),
                value: comment.trim().to_string(),
            });
            dockerfile.contexts.push(env.clone());
            i += 1;
            continue;
        }

        let start = i;
        let mut raw = String::new();
        let mut logical = String::new();
        let mut first = true;
        while i < lines.len() {
            let physical = lines[i];
            let content = physical.trim_end_matches('\n').trim_end_matches('\r');
            // comment lines inside a continuation are dropped from the value
            // but still belong to the instruction's source span
            if !first && content.trim_start().starts_with('#') {
                raw.push_str(physical);
                i += 1;
                continue;
            }
            raw.push_str(physical);
            i += 1;
            let content = content.trim_end();
            if let Some(stripped) = content.strip_suffix('\\') {
                if !logical.is_empty() {
                    logical.push(' ');
                }
                logical.push_str(stripped.trim());
                first = false;
            } else {
                if !logical.is_empty() {
                    logical.push(' ');
                }
                logical.push_str(content.trim());
                break;
            }
        }
        let end = i - 1;

        let (verb, value) = split_verb(&logical);
        let kind = InstructionKind::from_verb(verb);
        match kind {
            InstructionKind::Env => record_env(&mut env, &value),
            InstructionKind::Arg => record_arg(&mut env, &value),
            _ => {}
        }
        dockerfile.instructions.push(Instruction {
            kind,
            start_line: start,
            end_line: Some(end),
            raw,
            value,
        });
        dockerfile.contexts.push(env.clone());
    }

    dockerfile
}

/// Splits an instruction's collapsed text into verb and body.
fn split_verb(logical: &str) -> (&str, String) {
    let trimmed = logical.trim();
    match trimmed.find(char::is_whitespace) {
        Some(pos) => (&trimmed[..pos], trimmed[pos..].trim_start().to_string()),
        None => (trimmed, String::new()),
    }
}

/// Whitespace-splits honoring quotes; quote characters are removed and a
/// backslash escapes the following character.
fn split_env_tokens(s: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut in_single = false;
    let mut in_double = false;
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        match c {
            '\'' if !in_double => in_single = !in_single,
            '"' if !in_single => in_double = !in_double,
            '\\' if !in_single => {
                if let Some(next) = chars.next() {
                    current.push(next);
                }
            }
            c if c.is_whitespace() && !in_single && !in_double => {
                if !current.is_empty() {
                    tokens.push(std::mem::take(&mut current));
                }
            }
            c => current.push(c),
        }
    }
    if !current.is_empty() {
        tokens.push(current);
    }
    tokens
}

/// Records the bindings of an ENV instruction: either `k=v k2=v2` pairs or
/// the legacy `ENV key value...` form.
fn record_env(env: &mut Context, value: &str) {
    let tokens = split_env_tokens(value);
    let Some(head) = tokens.first() else { return };
    if head.contains('=') {
        for token in &tokens {
            if let Some((key, val)) = token.split_once('=') {
                if !key.is_empty() {
                    env.set(key, val);
                }
            }
        }
    } else {
        let rest = value.trim_start()[head.len()..].trim();
        env.set(head.clone(), rest);
    }
}

/// Records an ARG default. `ARG name` without a default binds nothing;
/// build-time argument overrides are not modeled.
fn record_arg(env: &mut Context, value: &str) {
    for token in split_env_tokens(value) {
        if let Some((key, val)) = token.split_once('=') {
            if !key.is_empty() {
                env.set(key, val);
            }
        }
    }
}
