//! Package-manager rule engine.
//!
//! Consumes the tokenized commands of a RUN instruction, keeps per-stage
//! cache state for each package manager, and emits edit strategies: cache
//! mounts to add, setup commands to insert, and cache-disabling options to
//! strip.

use crate::model::{
    join_words, Command, GlobalStatus, OptimizationStrategy, PmStatus, Quoting,
};
use crate::rules::Ruleset;
use std::collections::BTreeMap;
use tracing::debug;

pub struct PmHandler<'a> {
    rules: &'a Ruleset,
    statuses: BTreeMap<String, PmStatus>,
}

impl<'a> PmHandler<'a> {
    pub fn new(rules: &'a Ruleset) -> Self {
        Self {
            rules,
            statuses: BTreeMap::new(),
        }
    }

    /// Handles all package-manager commands of one instruction.
    ///
    /// Strategies that can repeat per instruction (cache mounts, inserted
    /// setup commands) are created once and shared across the instruction's
    /// commands; directories and inserted commands are de-duplicated in
    /// first-seen order.
    pub fn handle(
        &mut self,
        commands: &[(usize, &Command)],
        instruction_index: usize,
        status: &GlobalStatus,
        strategies: &mut Vec<OptimizationStrategy>,
    ) {
        let rules = self.rules;
        let mut cache_dirs: Option<Vec<String>> = None;
        let mut pre_commands: Option<Vec<String>> = None;

        for &(command_index, command) in commands {
            let Some(first) = command.first() else {
                continue;
            };
            let Some(rule) = rules.pm_for_executable(&first.text) else {
                continue;
            };
            let pm_status = self.statuses.entry(rule.name.clone()).or_default();
            let args_str = join_words(&command[1..]);

            // A command that reconfigures the cache location takes exclusive
            // effect: it is not itself cached or stripped of options.
            if let Some(new_dirs) = match_cache_dir_override(rule, &args_str, status) {
                debug!(pm = %rule.name, dirs = ?new_dirs, "cache directory override");
                pm_status.cache_dirs = new_dirs;
                continue;
            }

            if rule.run_patterns.iter().any(|re| re.is_match(&args_str)) {
                let dirs = if pm_status.cache_dirs.is_empty() {
                    rule.resolved_default_dirs(status)
                } else {
                    pm_status.cache_dirs.clone()
                };
                let merged = cache_dirs.get_or_insert_with(Vec::new);
                for dir in dirs {
                    if !merged.contains(&dir) {
                        merged.push(dir);
                    }
                }
                if !rule.pre_commands.is_empty() && !pm_status.pre_commands_emitted {
                    let inserts = pre_commands.get_or_insert_with(Vec::new);
                    for pre in &rule.pre_commands {
                        if !inserts.contains(pre) {
                            inserts.push(pre.clone());
                        }
                    }
                    pm_status.pre_commands_emitted = true;
                }
            }

            let options: Vec<String> = command[1..]
                .iter()
                .filter(|w| matches!(w.quoting, Quoting::Unquoted | Quoting::ExecArrayArg))
                .filter(|w| rule.anti_cache_options.iter().any(|o| o == &w.text))
                .map(|w| w.text.clone())
                .collect();
            if !options.is_empty() {
                strategies.push(OptimizationStrategy::RemoveOption {
                    instruction_index,
                    command_index,
                    options,
                });
            }
        }

        if let Some(commands) = pre_commands {
            strategies.push(OptimizationStrategy::InsertBefore {
                instruction_index,
                commands,
            });
        }
        if let Some(cache_dirs) = cache_dirs {
            strategies.push(OptimizationStrategy::AddCache {
                instruction_index,
                cache_dirs,
            });
        }
    }

    /// All cache directories currently known in this stage: the tracked
    /// state for sighted package managers, the resolved defaults otherwise.
    pub fn known_cache_dirs(&self, status: &GlobalStatus) -> Vec<String> {
        let mut dirs: Vec<String> = Vec::new();
        for rule in self.rules.package_managers() {
            let resolved = match self.statuses.get(&rule.name) {
                Some(pm_status) if !pm_status.cache_dirs.is_empty() => {
                    pm_status.cache_dirs.clone()
                }
                _ => rule.resolved_default_dirs(status),
            };
            for dir in resolved {
                if !dirs.contains(&dir) {
                    dirs.push(dir);
                }
            }
        }
        dirs
    }
}

fn match_cache_dir_override(
    rule: &crate::rules::PmRule,
    args_str: &str,
    status: &GlobalStatus,
) -> Option<Vec<String>> {
    for pattern in &rule.cache_dir_override_patterns {
        if let Some(captures) = pattern.captures(args_str) {
            let dirs: Vec<String> = captures
                .iter()
                .skip(1)
                .flatten()
                .map(|m| status.absolute(&status.expand_home(m.as_str().trim())))
                .collect();
            if !dirs.is_empty() {
                return Some(dirs);
            }
        }
    }
    None
}
