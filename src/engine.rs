//! The optimization engine: drives the pipeline over files and directories.
//!
//! Each file is an independent unit of work. When any pipeline error is
//! raised mid-file, the original file is copied verbatim to the output path
//! and the input is recorded in the failures list; partial output is never
//! written.

use crate::model::OptimizeStats;
use crate::parser;
use crate::pipeline::{global_optimizer, simulator, split_stages, stage_optimizer::StageOptimizer};
use crate::rules::Ruleset;
use anyhow::{Context as _, Result};
use std::fs;
use std::io::Write as _;
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};

/// Engine settings, assembled from the command line.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Dockerfile or directory to optimize.
    pub input: PathBuf,
    /// Output file or directory; defaults to the input path plus `suffix`.
    pub output: Option<PathBuf>,
    /// Suffix for side-by-side output when no output path is given.
    pub suffix: String,
    /// Log per-file and total statistics.
    pub show_stats: bool,
    /// Where the list of failed inputs is written.
    pub fail_file: PathBuf,
    /// Replace removed commands with `true` instead of deleting them.
    pub remove_with_true: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            input: PathBuf::new(),
            output: None,
            suffix: ".optimized".to_string(),
            show_stats: false,
            fail_file: PathBuf::from("./cachepack-failures.txt"),
            remove_with_true: true,
        }
    }
}

/// What happened to one file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Optimized,
    Unchanged,
}

pub struct Engine {
    config: EngineConfig,
    rules: Ruleset,
    stats: OptimizeStats,
    failures: Vec<PathBuf>,
}

impl Engine {
    pub fn new(config: EngineConfig, rules: Ruleset) -> Self {
        Self {
            config,
            rules,
            stats: OptimizeStats::new(),
            failures: Vec::new(),
        }
    }

    /// Processes the configured input and writes the failures list. Errors
    /// returned from here are run-fatal (bad output directory, unwritable
    /// failures file); per-file errors are downgraded to fallback copies.
    pub fn run(&mut self) -> Result<()> {
        let input = self.config.input.clone();
        if input.is_dir() {
            if let Some(output) = &self.config.output {
                if output.exists() && !output.is_dir() {
                    anyhow::bail!("input is a directory but output is not");
                }
                fs::create_dir_all(output)
                    .with_context(|| format!("failed to create {}", output.display()))?;
            }
            self.run_directory(&input)?;
            if self.config.show_stats {
                info!("{}", self.stats.total_report());
            }
        } else {
            let output = match &self.config.output {
                Some(path) => path.clone(),
                None => suffixed(&input, &self.config.suffix),
            };
            self.run_one_file(&input, &output);
        }
        self.write_failures()?;
        Ok(())
    }

    fn run_directory(&mut self, root: &Path) -> Result<()> {
        let mut files = Vec::new();
        collect_files(root, &mut files)?;
        files.sort();
        for file in files {
            let output = match &self.config.output {
                Some(out_dir) => {
                    let relative = file.strip_prefix(root).expect("file under root");
                    out_dir.join(relative)
                }
                None => suffixed(&file, &self.config.suffix),
            };
            self.run_one_file(&file, &output);
        }
        Ok(())
    }

    /// Optimizes one file; never propagates per-file errors.
    fn run_one_file(&mut self, input: &Path, output: &Path) {
        self.stats.clear_file();
        match self.optimize_file(input, output) {
            Ok(Outcome::Optimized) => {
                info!(
                    "optimized {} -> {}",
                    input.display(),
                    output.display()
                );
            }
            Ok(Outcome::Unchanged) => {
                info!("{} has nothing to optimize", input.display());
            }
            Err(err) => {
                warn!("failed to optimize {}: {:#}", input.display(), err);
                self.stats.discard_file();
                if let Err(copy_err) = copy_verbatim(input, output) {
                    error!(
                        "failed to copy {} to {}: {:#}",
                        input.display(),
                        output.display(),
                        copy_err
                    );
                }
                self.failures.push(input.to_path_buf());
            }
        }
        if self.config.show_stats {
            info!("{}", self.stats.file_report());
        }
    }

    fn optimize_file(&mut self, input: &Path, output: &Path) -> Result<Outcome> {
        let text = fs::read_to_string(input)
            .with_context(|| format!("failed to read {}", input.display()))?;

        let dockerfile = parser::parse(&text);
        if dockerfile.is_empty() {
            copy_verbatim(input, output)?;
            return Ok(Outcome::Unchanged);
        }

        let stages = split_stages(&dockerfile);
        global_optimizer::check_frontend(&stages)?;

        let mut stage_lines: Vec<Vec<String>> = Vec::with_capacity(stages.len());
        let mut total_strategies = 0;
        for stage in &stages {
            let strategies = simulator::simulate(stage, &self.rules)?;
            total_strategies += strategies.len();
            let optimizer = StageOptimizer::new(stage, self.config.remove_with_true);
            stage_lines.push(optimizer.optimize(&strategies, &mut self.stats)?);
        }

        if total_strategies == 0 {
            copy_verbatim(input, output)?;
            return Ok(Outcome::Unchanged);
        }

        global_optimizer::optimize(&stages, &mut stage_lines, &mut self.stats)?;

        let rendered: String = stage_lines.into_iter().flatten().collect();
        write_output(output, rendered.as_bytes())?;
        Ok(Outcome::Optimized)
    }

    fn write_failures(&self) -> Result<()> {
        let mut file = fs::File::create(&self.config.fail_file).with_context(|| {
            format!(
                "failed to create failures file {}",
                self.config.fail_file.display()
            )
        })?;
        for path in &self.failures {
            writeln!(file, "{}", path.display())?;
        }
        Ok(())
    }

    pub fn stats(&self) -> &OptimizeStats {
        &self.stats
    }

    pub fn failures(&self) -> &[PathBuf] {
        &self.failures
    }
}

fn suffixed(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(suffix);
    PathBuf::from(name)
}

fn collect_files(dir: &Path, files: &mut Vec<PathBuf>) -> Result<()> {
    for entry in
        fs::read_dir(dir).with_context(|| format!("failed to read {}", dir.display()))?
    {
        let entry = entry?;
        let path = entry.path();
        if path.is_dir() {
            collect_files(&path, files)?;
        } else {
            files.push(path);
        }
    }
    Ok(())
}

fn copy_verbatim(input: &Path, output: &Path) -> Result<()> {
    let bytes =
        fs::read(input).with_context(|| format!("failed to read {}", input.display()))?;
    write_output(output, &bytes)
}

fn write_output(output: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = output.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
    }
    fs::write(output, bytes).with_context(|| format!("failed to write {}", output.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_suffixed_appends_to_file_name() {
        assert_eq!(
            suffixed(Path::new("/tmp/Dockerfile"), ".optimized"),
            PathBuf::from("/tmp/Dockerfile.optimized")
        );
    }

    #[test]
    fn test_default_config() {
        let config = EngineConfig::default();
        assert_eq!(config.suffix, ".optimized");
        assert!(config.remove_with_true);
        assert!(!config.show_stats);
    }
}
