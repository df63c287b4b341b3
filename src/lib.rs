//! cachepack - Dockerfile optimizer for package-manager download caches
//!
//! This library rewrites Dockerfiles to add persistent BuildKit cache
//! mounts and remove cache-defeating commands, without changing the
//! recipe's observable build behavior.
//!
//! # Core Concepts
//!
//! - **Stage simulation**: each build stage is walked by a small
//!   interpreter that tracks working directory and user identity well
//!   enough to resolve where package-manager caches live
//! - **Rule table**: package managers are recognized through configurable
//!   regular expressions describing their install commands, cache
//!   locations and cache-disabling idioms
//! - **Strategies**: analysis emits structured, position-addressed edit
//!   operations that a reconstruction pass applies while preserving the
//!   original file's layout wherever it is untouched
//!
//! # Example Usage
//!
//! ```no_run
//! use cachepack::{Engine, EngineConfig, Ruleset};
//! use std::path::PathBuf;
//!
//! # fn main() -> anyhow::Result<()> {
//! let rules = Ruleset::builtin()?;
//! let config = EngineConfig {
//!     input: PathBuf::from("Dockerfile"),
//!     ..EngineConfig::default()
//! };
//! let mut engine = Engine::new(config, rules);
//! engine.run()?;
//! # Ok(())
//! # }
//! ```
//!
//! # Project Structure
//!
//! - [`parser`]: Dockerfile structural parsing
//! - [`shell`]: shell-syntax tokenizer for RUN bodies
//! - [`rules`]: the package-manager rule table
//! - [`pipeline`]: stage splitting, simulation and reconstruction
//! - [`engine`]: per-file driver, directory batching, failure fallback

pub mod cli;
pub mod engine;
pub mod error;
pub mod model;
pub mod parser;
pub mod pipeline;
pub mod rules;
pub mod shell;

// Re-export key types for convenient access
pub use engine::{Engine, EngineConfig};
pub use error::OptimizeError;
pub use model::{CommandRemoval, OptimizationStrategy, OptimizeStats};
pub use rules::{PmRule, Ruleset, RulesError};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
