//! Error taxonomy for a single Dockerfile's optimization.
//!
//! Any of these aborts the current file only: the engine falls back to
//! copying the original file verbatim and records the path as failed.
//! Run-fatal configuration errors live in [`crate::rules::RulesError`].

use thiserror::Error;

#[derive(Debug, Error)]
pub enum OptimizeError {
    /// A quoted span in a RUN body never closes.
    #[error("unterminated quote in command: \"{0}\"")]
    UnterminatedQuote(String),

    /// An exec-form body is not a valid array of string literals.
    #[error("malformed exec-form array: \"{0}\"")]
    MalformedExecForm(String),

    /// `sh -c` payloads nested past the recursion limit.
    #[error("shell -c nesting exceeds depth limit")]
    ShellNestingTooDeep,

    /// The file declares a frontend other than the official one, so cache
    /// mounts cannot be assumed to parse.
    #[error("unsupported non-official frontend: \"{0}\"")]
    UnsupportedFrontend(String),

    /// An existing cache mount option has no `target=` field.
    #[error("cache mount option without a target= field: \"{0}\"")]
    MountMissingTarget(String),
}
