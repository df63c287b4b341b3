//! Package-manager rule table.
//!
//! Rules describe how to recognize a package manager's download/install
//! commands, where its cache lives, and which commands or options defeat
//! caching. A built-in table is compiled into the binary; `--rules` swaps
//! in a user-provided YAML file of the same shape.
//!
//! Patterns are compiled once at load time and are implicitly anchored at
//! the start of the command string.

use crate::model::GlobalStatus;
use regex::Regex;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Built-in rule table.
const BUILTIN_RULES: &str = include_str!("../resources/rules.yaml");

/// Errors while loading the rule table. These are fatal for the whole run,
/// not just one file, since the table is shared.
#[derive(Debug, Error)]
pub enum RulesError {
    #[error("failed to read rules file {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse rules file: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("commands-regex-run is not set for \"{0}\"")]
    MissingRunPatterns(String),

    #[error("default-cache-dirs is not set for \"{0}\"")]
    MissingCacheDirs(String),

    #[error("invalid pattern \"{pattern}\" for \"{name}\": {source}")]
    InvalidPattern {
        name: String,
        pattern: String,
        source: regex::Error,
    },
}

#[derive(Debug, Deserialize)]
struct RulesFile {
    #[serde(rename = "anti-cache-commands-regex", default)]
    anti_cache_commands_regex: Vec<String>,
    #[serde(rename = "packageManagers", default)]
    package_managers: BTreeMap<String, PmRuleFile>,
}

#[derive(Debug, Deserialize)]
struct PmRuleFile {
    #[serde(default)]
    executables: Vec<String>,
    #[serde(rename = "commands-regex-run", default)]
    commands_regex_run: Vec<String>,
    #[serde(rename = "default-cache-dirs", default)]
    default_cache_dirs: Vec<String>,
    #[serde(rename = "commands-regex-modify-cache-dir", default)]
    commands_regex_modify_cache_dir: Vec<String>,
    #[serde(rename = "additional-pre-commands", default)]
    additional_pre_commands: Vec<String>,
    #[serde(rename = "anti-cache-options", default)]
    anti_cache_options: Vec<String>,
}

/// One package manager's compiled rules.
#[derive(Debug)]
pub struct PmRule {
    pub name: String,
    pub executables: Vec<String>,
    pub run_patterns: Vec<Regex>,
    pub default_cache_dirs: Vec<String>,
    pub cache_dir_override_patterns: Vec<Regex>,
    pub pre_commands: Vec<String>,
    pub anti_cache_options: Vec<String>,
}

impl PmRule {
    /// Default cache directories with `~` expanded against the current
    /// simulated user.
    pub fn resolved_default_dirs(&self, status: &GlobalStatus) -> Vec<String> {
        self.default_cache_dirs
            .iter()
            .map(|dir| status.expand_home(dir))
            .collect()
    }
}

/// The immutable rule table shared by the whole run.
#[derive(Debug)]
pub struct Ruleset {
    rules: Vec<PmRule>,
    anti_cache_patterns: Vec<Regex>,
}

impl Ruleset {
    /// Loads the compiled-in default table.
    pub fn builtin() -> Result<Self, RulesError> {
        Self::from_yaml(BUILTIN_RULES)
    }

    /// Loads a table from a YAML file.
    pub fn load(path: &Path) -> Result<Self, RulesError> {
        let yaml = fs::read_to_string(path).map_err(|source| RulesError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml(&yaml)
    }

    pub fn from_yaml(yaml: &str) -> Result<Self, RulesError> {
        let file: RulesFile = serde_yaml::from_str(yaml)?;

        let anti_cache_patterns = file
            .anti_cache_commands_regex
            .iter()
            .map(|p| compile_anchored("anti-cache-commands-regex", p))
            .collect::<Result<Vec<_>, _>>()?;

        let mut rules = Vec::with_capacity(file.package_managers.len());
        for (name, pm) in file.package_managers {
            if pm.commands_regex_run.is_empty() {
                return Err(RulesError::MissingRunPatterns(name));
            }
            if pm.default_cache_dirs.is_empty() {
                return Err(RulesError::MissingCacheDirs(name));
            }
            let executables = if pm.executables.is_empty() {
                vec![name.clone()]
            } else {
                pm.executables
            };
            let run_patterns = pm
                .commands_regex_run
                .iter()
                .map(|p| compile_anchored(&name, p))
                .collect::<Result<Vec<_>, _>>()?;
            let cache_dir_override_patterns = pm
                .commands_regex_modify_cache_dir
                .iter()
                .map(|p| compile_anchored(&name, p))
                .collect::<Result<Vec<_>, _>>()?;
            rules.push(PmRule {
                name,
                executables,
                run_patterns,
                default_cache_dirs: pm.default_cache_dirs,
                cache_dir_override_patterns,
                pre_commands: pm.additional_pre_commands,
                anti_cache_options: pm.anti_cache_options,
            });
        }

        Ok(Self {
            rules,
            anti_cache_patterns,
        })
    }

    /// The rule owning the given executable name, if any.
    pub fn pm_for_executable(&self, executable: &str) -> Option<&PmRule> {
        self.rules
            .iter()
            .find(|rule| rule.executables.iter().any(|e| e == executable))
    }

    pub fn package_managers(&self) -> &[PmRule] {
        &self.rules
    }

    /// Global patterns recognizing cache-defeating commands, regardless of
    /// executable.
    pub fn anti_cache_patterns(&self) -> &[Regex] {
        &self.anti_cache_patterns
    }
}

/// Anchors a pattern at the start of its input, matching the semantics the
/// table was written against.
fn compile_anchored(name: &str, pattern: &str) -> Result<Regex, RulesError> {
    Regex::new(&format!("^(?:{})", pattern)).map_err(|source| RulesError::InvalidPattern {
        name: name.to_string(),
        pattern: pattern.to_string(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_table_loads() {
        let rules = Ruleset::builtin().unwrap();
        assert!(rules.pm_for_executable("apt-get").is_some());
        assert!(rules.pm_for_executable("npm").is_some());
        assert!(rules.pm_for_executable("pip3").is_some());
        assert!(rules.pm_for_executable("made-up").is_none());
    }

    #[test]
    fn test_builtin_apt_defaults() {
        let rules = Ruleset::builtin().unwrap();
        let apt = rules.pm_for_executable("apt").unwrap();
        assert_eq!(apt.name, "apt");
        assert_eq!(
            apt.default_cache_dirs,
            vec!["/var/lib/apt".to_string(), "/var/cache/apt".to_string()]
        );
        assert!(!apt.pre_commands.is_empty());
    }

    #[test]
    fn test_missing_run_patterns_is_fatal() {
        let yaml = r#"
packageManagers:
  broken:
    default-cache-dirs: ["/tmp/cache"]
"#;
        let err = Ruleset::from_yaml(yaml).unwrap_err();
        assert!(matches!(err, RulesError::MissingRunPatterns(name) if name == "broken"));
    }

    #[test]
    fn test_missing_cache_dirs_is_fatal() {
        let yaml = r#"
packageManagers:
  broken:
    commands-regex-run: ["install.*"]
"#;
        let err = Ruleset::from_yaml(yaml).unwrap_err();
        assert!(matches!(err, RulesError::MissingCacheDirs(name) if name == "broken"));
    }

    #[test]
    fn test_invalid_pattern_is_fatal() {
        let yaml = r#"
packageManagers:
  broken:
    commands-regex-run: ["(unclosed"]
    default-cache-dirs: ["/tmp/cache"]
"#;
        let err = Ruleset::from_yaml(yaml).unwrap_err();
        assert!(matches!(err, RulesError::InvalidPattern { .. }));
    }

    #[test]
    fn test_executables_default_to_name() {
        let yaml = r#"
packageManagers:
  mytool:
    commands-regex-run: ["install.*"]
    default-cache-dirs: ["~/.cache/mytool"]
"#;
        let rules = Ruleset::from_yaml(yaml).unwrap();
        assert!(rules.pm_for_executable("mytool").is_some());
    }

    #[test]
    fn test_patterns_are_anchored() {
        let rules = Ruleset::builtin().unwrap();
        let apt = rules.pm_for_executable("apt-get").unwrap();
        // "xinstall" must not be recognized through the "install" pattern
        assert!(!apt.run_patterns.iter().any(|re| re.is_match("xinstall")));
        assert!(apt.run_patterns.iter().any(|re| re.is_match("install gcc")));
    }
}
