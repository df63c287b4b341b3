//! Whole-file edits: the `syntax=` frontend directive.
//!
//! Cache mounts need BuildKit's Dockerfile frontend 1.3 or newer. The
//! global optimizer inspects the leading comment block of the first stage
//! and adds or upgrades the directive; a file pinned to a non-official
//! frontend cannot be optimized at all.

use crate::error::OptimizeError;
use crate::model::{InstructionKind, OptimizeStats};
use crate::pipeline::splitter::Stage;
use regex::Regex;
use tracing::debug;

const SYNTAX_DIRECTIVE: &str = "# syntax=docker/dockerfile:1.3\n";
const OFFICIAL_PREFIXES: &[&str] = &["docker/dockerfile:", "docker.io/docker/dockerfile:"];

/// Extracts the value of a `syntax=...` directive from a comment's text.
fn syntax_value(comment: &str) -> Option<String> {
    let re = Regex::new(r"(?i)^\s*syntax\s*=\s*(.*?)\s*$").expect("valid regex");
    re.captures(comment)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
}

/// The declared frontend version, if the directive names the official
/// frontend; `Err` for a foreign frontend.
fn official_version(syntax: &str) -> Result<String, OptimizeError> {
    let lower = syntax.to_lowercase();
    for prefix in OFFICIAL_PREFIXES {
        if let Some(version) = lower.strip_prefix(prefix) {
            return Ok(version.to_string());
        }
    }
    Err(OptimizeError::UnsupportedFrontend(syntax.to_string()))
}

/// Leading run of comment instructions of the first stage.
fn leading_comments(stages: &[Stage]) -> impl Iterator<Item = &crate::model::Instruction> {
    stages
        .first()
        .map(|s| s.instructions.as_slice())
        .unwrap_or(&[])
        .iter()
        .take_while(|i| i.kind == InstructionKind::Comment)
}

/// Fails when the file declares a non-official frontend; such files are
/// rejected before any simulation work.
pub fn check_frontend(stages: &[Stage]) -> Result<(), OptimizeError> {
    for comment in leading_comments(stages) {
        if let Some(syntax) = syntax_value(&comment.value) {
            official_version(&syntax)?;
            return Ok(());
        }
    }
    Ok(())
}

/// False when the file declares a non-official frontend.
pub fn optimizable(stages: &[Stage]) -> bool {
    check_frontend(stages).is_ok()
}

/// Ensures the output declares a frontend with cache-mount support.
///
/// Adds `# syntax=docker/dockerfile:1.3` when no directive exists, rewrites
/// an official directive older than 1.3 in place, and leaves newer or
/// unparsable-but-official versions untouched.
pub fn optimize(
    stages: &[Stage],
    stage_lines: &mut [Vec<String>],
    stats: &mut OptimizeStats,
) -> Result<(), OptimizeError> {
    let mut need_add = true;
    let mut need_update = false;

    for comment in leading_comments(stages) {
        if let Some(syntax) = syntax_value(&comment.value) {
            need_add = false;
            let version = official_version(&syntax)?;
            let parts: Vec<&str> = version.split('.').collect();
            if parts.len() >= 2 && parts[0] != "0" {
                if let Ok(minor) = parts[1].parse::<u32>() {
                    need_update = minor < 3;
                }
            }
            break;
        }
    }

    let Some(first_stage_lines) = stage_lines.first_mut() else {
        return Ok(());
    };
    if need_add {
        debug!("adding syntax directive");
        first_stage_lines.insert(0, SYNTAX_DIRECTIVE.to_string());
        stats.syntax_change();
    } else if need_update {
        for line in first_stage_lines.iter_mut() {
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            let Some(comment) = trimmed.strip_prefix('#') else {
                break;
            };
            if syntax_value(comment.trim()).is_some() {
                debug!(old = %trimmed, "upgrading syntax directive");
                *line = SYNTAX_DIRECTIVE.to_string();
                stats.syntax_change();
                break;
            }
        }
    }
    Ok(())
}
