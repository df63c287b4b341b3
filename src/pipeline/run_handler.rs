//! RUN instruction analysis.
//!
//! Tokenizes a RUN body, applies the built-in knowledge of identity-changing
//! commands (`useradd`, `usermod`), detects cache-defeating commands, and
//! routes package-manager invocations to the rule engine.

use crate::error::OptimizeError;
use crate::model::{
    join_words, Command, CommandRemoval, Context, GlobalStatus, OptimizationStrategy,
};
use crate::pipeline::pm_handler::PmHandler;
use crate::rules::Ruleset;
use crate::shell;
use std::collections::BTreeMap;
use tracing::debug;

pub struct RunHandler<'a> {
    rules: &'a Ruleset,
    pm: PmHandler<'a>,
}

impl<'a> RunHandler<'a> {
    pub fn new(rules: &'a Ruleset) -> Self {
        Self {
            rules,
            pm: PmHandler::new(rules),
        }
    }

    /// Analyzes the body of one RUN instruction.
    pub fn handle(
        &mut self,
        body: &str,
        context: &Context,
        instruction_index: usize,
        status: &mut GlobalStatus,
        strategies: &mut Vec<OptimizationStrategy>,
    ) -> Result<(), OptimizeError> {
        // RUN options such as --mount do not belong to the command line
        let (_options, body) = shell::separate_run_options(body);
        let (commands, _connectors) = shell::tokenize(&body, context)?;

        let mut pm_commands: Vec<(usize, &Command)> = Vec::new();
        let mut removals: BTreeMap<usize, CommandRemoval> = BTreeMap::new();

        for (index, command) in commands.iter().enumerate() {
            let Some(first) = command.first() else {
                continue;
            };
            match first.text.as_str() {
                "useradd" => handle_useradd(command, status),
                "usermod" => handle_usermod(command, status),
                "rm" => {
                    if let Some(removal) = self.match_rm_against_cache_dirs(command, status) {
                        removals.insert(index, removal);
                    }
                }
                executable => {
                    if self.rules.pm_for_executable(executable).is_some() {
                        pm_commands.push((index, command));
                    }
                }
            }
            if self.is_anti_cache_command(command) {
                debug!(command = %join_words(command), "anti-cache command marked for removal");
                removals.insert(index, CommandRemoval::WholeCommand);
            }
        }

        if !pm_commands.is_empty() {
            self.pm
                .handle(&pm_commands, instruction_index, status, strategies);
        }
        if !removals.is_empty() {
            strategies.push(OptimizationStrategy::RemoveCommand {
                instruction_index,
                removals: removals.into_iter().collect(),
            });
        }
        Ok(())
    }

    /// Tests an `rm` invocation against the cache directories known in this
    /// stage. Paths are matched as prefixes in either direction: deleting a
    /// cache directory's parent defeats the cache just as surely as deleting
    /// a file inside it.
    fn match_rm_against_cache_dirs(
        &self,
        command: &Command,
        status: &GlobalStatus,
    ) -> Option<CommandRemoval> {
        let args: Vec<&str> = command[1..]
            .iter()
            .map(|w| w.text.as_str())
            .filter(|t| !t.starts_with('-'))
            .collect();
        if args.is_empty() {
            return None;
        }
        let cache_dirs = self.pm.known_cache_dirs(status);
        let matched: Vec<String> = args
            .iter()
            .filter(|arg| {
                let resolved = status.absolute(&status.expand_home(arg));
                cache_dirs
                    .iter()
                    .any(|dir| resolved.starts_with(dir.as_str()) || dir.starts_with(&resolved))
            })
            .map(|arg| arg.to_string())
            .collect();
        if matched.len() == args.len() {
            Some(CommandRemoval::WholeCommand)
        } else if !matched.is_empty() {
            Some(CommandRemoval::PathArgs(matched))
        } else {
            None
        }
    }

    fn is_anti_cache_command(&self, command: &Command) -> bool {
        let command_str = join_words(command);
        self.rules
            .anti_cache_patterns()
            .iter()
            .any(|re| re.is_match(&command_str))
    }
}

/// Applies a `useradd` command to the simulated user table. The home is the
/// explicit `-d/--home-dir`, else `-b/--base-dir` plus the user name, else
/// the conventional location.
fn handle_useradd(command: &Command, status: &mut GlobalStatus) {
    if command.len() < 2 {
        return;
    }
    let user = command.last().map(|w| w.text.clone()).unwrap_or_default();
    let mut home_dir = String::new();
    let mut base_dir = String::new();
    let mut expect_home = false;
    let mut expect_base = false;
    for word in &command[1..] {
        let text = word.text.as_str();
        if text == "-d" || text == "--home-dir" {
            expect_home = true;
        } else if expect_home {
            home_dir = with_trailing_slash(text);
            expect_home = false;
        } else if text == "-b" || text == "--base-dir" {
            expect_base = true;
        } else if expect_base {
            base_dir = with_trailing_slash(text);
            expect_base = false;
        }
    }
    let home = if !home_dir.is_empty() {
        home_dir
    } else if !base_dir.is_empty() {
        format!("{}{}/", base_dir, user)
    } else {
        GlobalStatus::default_home_for(&user)
    };
    status.user_dirs.insert(user, home);
}

/// Applies a `usermod` command; only `-d/--home` is understood.
fn handle_usermod(command: &Command, status: &mut GlobalStatus) {
    if command.len() < 2 {
        return;
    }
    let user = command.last().map(|w| w.text.clone()).unwrap_or_default();
    let mut home_dir = String::new();
    let mut expect_home = false;
    for word in &command[1..] {
        let text = word.text.as_str();
        if text == "-d" || text == "--home" {
            expect_home = true;
        } else if expect_home {
            home_dir = with_trailing_slash(text);
            expect_home = false;
        }
    }
    let home = if home_dir.is_empty() {
        GlobalStatus::default_home_for(&user)
    } else {
        home_dir
    };
    status.user_dirs.insert(user, home);
}

fn with_trailing_slash(path: &str) -> String {
    if path.ends_with('/') {
        path.to_string()
    } else {
        format!("{}/", path)
    }
}
