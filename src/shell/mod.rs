//! Shell-syntax tokenizer for RUN instruction bodies.
//!
//! A RUN body is a compound command line: commands joined by `&&`, `;` and
//! `||`, with single/double quoting, subshell parentheses, exec-form arrays
//! and `sh -c`/`bash -c` indirection. The tokenizer splits a body into
//! [`Command`]s and [`Connector`]s without executing anything; quoting is
//! preserved on every word so commands can be serialized back to text.
//!
//! Two variants exist: [`tokenize`] produces word-level commands with
//! variable substitution applied (what the analysis passes consume), while
//! [`split_command_strings`] cuts the raw body into command substrings with
//! original spacing intact (what the reconstructor edits).

use crate::error::OptimizeError;
use crate::model::{Command, CommandWord, Connector, Context, Quoting};

/// Guard against pathological `sh -c "sh -c ..."` nesting.
const MAX_SHELL_NESTING: usize = 16;

/// Executables whose `-c` argument is itself a shell command line.
const SHELL_EXECUTABLES: &[&str] = &["sh", "bash", "/bin/sh", "/bin/bash"];

/// A contiguous piece of a body: text outside quotes, or the contents of one
/// quoted span.
enum Span {
    Outside(String),
    Single(String),
    Double(String),
}

fn find_single_close(chars: &[char], from: usize) -> Option<usize> {
    (from..chars.len()).find(|&j| chars[j] == '\'')
}

fn find_double_close(chars: &[char], from: usize) -> Option<usize> {
    (from..chars.len()).find(|&j| chars[j] == '"' && chars[j - 1] != '\\')
}

/// Cuts a body into quoted and unquoted spans. An unescaped `'` or `"`
/// opens a span running to its matching close quote; `\"` inside double
/// quotes stays literal. An unterminated quote is a tokenize error.
fn scan_spans(body: &str) -> Result<Vec<Span>, OptimizeError> {
    let chars: Vec<char> = body.chars().collect();
    let mut spans = Vec::new();
    let mut outside = String::new();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        let escaped = i > 0 && chars[i - 1] == '\\';
        if (c == '\'' || c == '"') && !escaped {
            let close = if c == '\'' {
                find_single_close(&chars, i + 1)
            } else {
                find_double_close(&chars, i + 1)
            };
            let close = close.ok_or_else(|| OptimizeError::UnterminatedQuote(body.to_string()))?;
            if !outside.is_empty() {
                spans.push(Span::Outside(std::mem::take(&mut outside)));
            }
            let inner: String = chars[i + 1..close].iter().collect();
            spans.push(if c == '\'' {
                Span::Single(inner)
            } else {
                Span::Double(inner)
            });
            i = close + 1;
        } else {
            outside.push(c);
            i += 1;
        }
    }
    if !outside.is_empty() {
        spans.push(Span::Outside(outside));
    }
    Ok(spans)
}

/// Byte offsets of the connector tokens in an unquoted span, left to right,
/// non-overlapping.
fn find_connectors(s: &str) -> Vec<(usize, Connector)> {
    let bytes = s.as_bytes();
    let mut out = Vec::new();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'&' && i + 1 < bytes.len() && bytes[i + 1] == b'&' {
            out.push((i, Connector::And));
            i += 2;
        } else if bytes[i] == b'|' && i + 1 < bytes.len() && bytes[i + 1] == b'|' {
            out.push((i, Connector::Or));
            i += 2;
        } else if bytes[i] == b';' {
            out.push((i, Connector::Seq));
            i += 1;
        } else {
            i += 1;
        }
    }
    out
}

fn strip_parens(s: &str) -> String {
    s.replace(['(', ')'], "")
}

fn push_unquoted_words(words: &mut Command, text: &str) {
    for w in text.split_whitespace() {
        words.push(CommandWord::unquoted(w));
    }
}

/// True when the body is written in exec form, e.g. `["apt-get", "update"]`.
pub fn is_exec_form(body: &str) -> bool {
    let t = body.trim();
    t.starts_with('[') && t.ends_with(']')
}

fn parse_exec_form(body: &str) -> Result<Command, OptimizeError> {
    let args: Vec<String> = serde_json::from_str(body.trim())
        .map_err(|_| OptimizeError::MalformedExecForm(body.trim().to_string()))?;
    Ok(args
        .into_iter()
        .map(|a| CommandWord::new(a, Quoting::ExecArrayArg))
        .collect())
}

fn tokenize_shell_form(
    body: &str,
    context: &Context,
) -> Result<(Vec<Command>, Vec<Connector>), OptimizeError> {
    let spans = scan_spans(body)?;
    let mut commands: Vec<Command> = Vec::new();
    let mut connectors: Vec<Connector> = Vec::new();
    let mut words: Command = Vec::new();
    for span in spans {
        match span {
            Span::Single(s) => words.push(CommandWord::new(s, Quoting::SingleQuoted)),
            Span::Double(s) => {
                words.push(CommandWord::new(context.substitute(&s), Quoting::DoubleQuoted))
            }
            Span::Outside(s) => {
                // Grouping parentheses carry evaluation order, which the
                // analysis does not model; only the commands matter.
                let s = context.substitute(&strip_parens(&s));
                let mut start = 0;
                for (pos, connector) in find_connectors(&s) {
                    push_unquoted_words(&mut words, &s[start..pos]);
                    commands.push(std::mem::take(&mut words));
                    connectors.push(connector);
                    start = pos + connector.as_str().len();
                }
                push_unquoted_words(&mut words, &s[start..]);
            }
        }
    }
    commands.push(words);
    Ok((commands, connectors))
}

/// The `-c` payload of an `sh`/`bash` command, if the command has one.
fn shell_c_payload(command: &Command) -> Option<String> {
    let first = command.first()?;
    if !SHELL_EXECUTABLES.contains(&first.text.to_lowercase().as_str()) {
        return None;
    }
    for i in 1..command.len().saturating_sub(1) {
        if command[i].text == "-c" {
            return Some(command[i + 1].text.clone());
        }
    }
    None
}

/// Rewrites every `sh -c "..."` command into the commands of its payload.
/// The original wrapper command disappears from the stream.
fn expand_shell_c(
    commands: Vec<Command>,
    connectors: Vec<Connector>,
    context: &Context,
    depth: usize,
) -> Result<(Vec<Command>, Vec<Connector>), OptimizeError> {
    let mut out_commands: Vec<Command> = Vec::new();
    let mut out_connectors: Vec<Connector> = Vec::new();
    for (index, command) in commands.into_iter().enumerate() {
        let after = connectors.get(index).copied();
        match shell_c_payload(&command) {
            None => {
                out_commands.push(command);
                if let Some(connector) = after {
                    out_connectors.push(connector);
                }
            }
            Some(payload) => {
                let (sub_commands, sub_connectors) =
                    tokenize_at_depth(&payload, context, depth + 1)?;
                out_commands.extend(sub_commands);
                out_connectors.extend(sub_connectors);
                if let Some(connector) = after {
                    out_connectors.push(connector);
                }
            }
        }
    }
    Ok((out_commands, out_connectors))
}

fn tokenize_at_depth(
    body: &str,
    context: &Context,
    depth: usize,
) -> Result<(Vec<Command>, Vec<Connector>), OptimizeError> {
    if depth > MAX_SHELL_NESTING {
        return Err(OptimizeError::ShellNestingTooDeep);
    }
    let (commands, connectors) = if is_exec_form(body) {
        (vec![parse_exec_form(body)?], Vec::new())
    } else {
        tokenize_shell_form(body, context)?
    };
    expand_shell_c(commands, connectors, context, depth)
}

/// Tokenizes a RUN body into commands and the connectors between them.
///
/// Variable bindings from `context` are substituted in unquoted text and
/// inside double quotes; single-quoted spans stay literal. The returned
/// lists satisfy `connectors.len() == commands.len() - 1`.
pub fn tokenize(
    body: &str,
    context: &Context,
) -> Result<(Vec<Command>, Vec<Connector>), OptimizeError> {
    tokenize_at_depth(body, context, 0)
}

/// Cuts a body into command substrings and connectors, preserving the
/// original spacing and quoting. No substitution, no parenthesis stripping.
pub fn split_command_strings(body: &str) -> Result<(Vec<String>, Vec<Connector>), OptimizeError> {
    let spans = scan_spans(body)?;
    let mut commands: Vec<String> = Vec::new();
    let mut connectors: Vec<Connector> = Vec::new();
    let mut current = String::new();
    for span in spans {
        match span {
            Span::Single(s) => {
                current.push('\'');
                current.push_str(&s);
                current.push('\'');
            }
            Span::Double(s) => {
                current.push('"');
                current.push_str(&s);
                current.push('"');
            }
            Span::Outside(s) => {
                let mut start = 0;
                for (pos, connector) in find_connectors(&s) {
                    current.push_str(&s[start..pos]);
                    commands.push(std::mem::take(&mut current));
                    connectors.push(connector);
                    start = pos + connector.as_str().len();
                }
                current.push_str(&s[start..]);
            }
        }
    }
    commands.push(current);
    Ok((commands, connectors))
}

/// Re-joins command substrings with their connectors.
pub fn connect_commands(commands: &[String], connectors: &[Connector]) -> String {
    let mut out = match commands.first() {
        Some(first) => first.clone(),
        None => return String::new(),
    };
    for (i, connector) in connectors.iter().enumerate() {
        if let Some(next) = commands.get(i + 1) {
            out.push_str(&format!(" {} {}", connector, next));
        }
    }
    out
}

/// Tokenizes a single command substring into words, without substitution.
pub fn words_of(command_str: &str) -> Result<Vec<CommandWord>, OptimizeError> {
    let spans = scan_spans(command_str)?;
    let mut words = Vec::new();
    for span in spans {
        match span {
            Span::Single(s) => words.push(CommandWord::new(s, Quoting::SingleQuoted)),
            Span::Double(s) => words.push(CommandWord::new(s, Quoting::DoubleQuoted)),
            Span::Outside(s) => push_unquoted_words(&mut words, &s),
        }
    }
    Ok(words)
}

/// Splits a RUN body into its leading `--option` tokens and the command
/// text proper, e.g. `--mount=type=cache,target=/x apt update` becomes
/// `("--mount=type=cache,target=/x", "apt update")`.
pub fn separate_run_options(body: &str) -> (String, String) {
    let trimmed = body.trim_start();
    let mut rest = trimmed;
    let mut options_end = 0;
    loop {
        let remaining = &trimmed[options_end..];
        let skipped = remaining.len() - remaining.trim_start().len();
        let candidate = remaining.trim_start();
        if !candidate.starts_with("--") {
            break;
        }
        let token_len = candidate
            .find(char::is_whitespace)
            .unwrap_or(candidate.len());
        options_end += skipped + token_len;
        rest = &trimmed[options_end..];
    }
    (
        trimmed[..options_end].trim().to_string(),
        rest.trim_start().trim_end().to_string(),
    )
}
