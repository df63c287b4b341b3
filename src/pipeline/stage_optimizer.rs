//! Stage text reconstruction.
//!
//! Applies the strategies collected during simulation to a stage's
//! instruction list and produces the output lines. Untouched instructions
//! are re-emitted byte for byte; blank-line gaps between instructions are
//! preserved. Edits are applied per instruction in a fixed order: option
//! removal, command insertion, command removal, cache-mount addition.

use crate::error::OptimizeError;
use crate::model::{
    join_words, CommandRemoval, Connector, Context, Instruction, OptimizationStrategy, OptimizeStats,
    Quoting,
};
use crate::pipeline::splitter::Stage;
use crate::shell;

pub struct StageOptimizer<'a> {
    stage: &'a Stage,
    /// When true (the default policy), a removed command is replaced with
    /// the literal `true` so connector structure survives; otherwise the
    /// command and its connector are deleted outright.
    remove_with_true: bool,
}

impl<'a> StageOptimizer<'a> {
    pub fn new(stage: &'a Stage, remove_with_true: bool) -> Self {
        Self {
            stage,
            remove_with_true,
        }
    }

    /// Applies `strategies` and returns the stage's output lines.
    pub fn optimize(
        &self,
        strategies: &[OptimizationStrategy],
        stats: &mut OptimizeStats,
    ) -> Result<Vec<String>, OptimizeError> {
        if strategies.is_empty() {
            return Ok(self
                .stage
                .instructions
                .iter()
                .map(|i| i.raw.clone())
                .collect());
        }

        let mut lines: Vec<String> = Vec::new();
        let mut previous: Option<&Instruction> = None;
        // body of the most recently emitted instruction, used to suppress
        // re-inserting a command that is already present above
        let mut last_body: Option<String> = None;

        for (index, instruction) in self.stage.instructions.iter().enumerate() {
            let context = &self.stage.contexts[index];

            if let Some(prev) = previous {
                if let Some(end) = prev.end_line {
                    let gap = instruction.start_line.saturating_sub(end + 1);
                    if gap > 0 {
                        lines.push("\n".repeat(gap));
                    }
                }
            }

            let matched: Vec<&OptimizationStrategy> = strategies
                .iter()
                .filter(|s| s.instruction_index() == index)
                .collect();

            if matched.is_empty() {
                lines.push(instruction.raw.clone());
                last_body = Some(instruction.value.clone());
                previous = Some(instruction);
                continue;
            }

            let mut value = instruction.value.clone();

            for strategy in &matched {
                if let OptimizationStrategy::RemoveOption {
                    command_index,
                    options,
                    ..
                } = strategy
                {
                    value = apply_remove_option(&value, *command_index, options)?;
                    stats.remove_option();
                }
            }

            for strategy in &matched {
                if let OptimizationStrategy::InsertBefore { commands, .. } = strategy {
                    for command in commands {
                        if last_body.as_deref() == Some(command.as_str()) {
                            continue;
                        }
                        lines.push(format!("RUN {}\n", command));
                        last_body = Some(command.clone());
                        stats.insert_before();
                    }
                }
            }

            for strategy in &matched {
                if let OptimizationStrategy::RemoveCommand { removals, .. } = strategy {
                    value = apply_remove_command(&value, removals, self.remove_with_true)?;
                    stats.remove_command();
                }
            }

            for strategy in &matched {
                if let OptimizationStrategy::AddCache { cache_dirs, .. } = strategy {
                    value = apply_add_cache(&value, cache_dirs, context)?;
                    stats.add_cache();
                }
            }

            // removals can leave an instruction empty; drop it entirely
            let verb = instruction.kind.verb();
            let body = value.trim();
            if !body.is_empty() {
                lines.push(format!("{} {}\n", verb, body));
                last_body = Some(body.to_string());
            }
            previous = Some(instruction);
        }
        Ok(lines)
    }
}

/// Strips the given option tokens from one command of the body.
fn apply_remove_option(
    value: &str,
    command_index: usize,
    options: &[String],
) -> Result<String, OptimizeError> {
    let (run_options, body) = shell::separate_run_options(value);
    let (mut commands, connectors) = shell::split_command_strings(&body)?;
    if let Some(command_str) = commands.get_mut(command_index) {
        let words = shell::words_of(command_str)?;
        let kept: Vec<_> = words
            .into_iter()
            .filter(|w| {
                !(matches!(w.quoting, Quoting::Unquoted) && options.iter().any(|o| o == &w.text))
            })
            .collect();
        *command_str = join_words(&kept);
    }
    Ok(assemble(
        &run_options,
        &shell::connect_commands(&commands, &connectors),
    ))
}

/// Removes or neutralizes the targeted commands of the body.
fn apply_remove_command(
    value: &str,
    removals: &[(usize, CommandRemoval)],
    remove_with_true: bool,
) -> Result<String, OptimizeError> {
    let (run_options, body) = shell::separate_run_options(value);
    let (commands, connectors) = shell::split_command_strings(&body)?;
    let removal_for = |i: usize| removals.iter().find(|(idx, _)| *idx == i).map(|(_, r)| r);

    let mut new_commands: Vec<String> = Vec::new();
    let mut new_connectors: Vec<Connector> = Vec::new();
    let last = commands.len() - 1;
    for (i, command_str) in commands.iter().enumerate() {
        let is_last = i == last;
        match removal_for(i) {
            None => {
                new_commands.push(command_str.clone());
                if !is_last {
                    new_connectors.push(connectors[i]);
                }
            }
            Some(CommandRemoval::WholeCommand) => {
                if remove_with_true {
                    new_commands.push(" true ".to_string());
                    if !is_last {
                        new_connectors.push(connectors[i]);
                    }
                } else if is_last {
                    // deleting the final command deletes the connector
                    // before it instead
                    new_connectors.pop();
                }
            }
            Some(CommandRemoval::PathArgs(args)) => {
                new_commands.push(strip_path_args(command_str, args)?);
                if !is_last {
                    new_connectors.push(connectors[i]);
                }
            }
        }
    }

    let mut content = assemble(
        &run_options,
        &shell::connect_commands(&new_commands, &new_connectors),
    );
    // command deletion can leave a dangling line-continuation marker
    while content.ends_with('\\') {
        content.pop();
        content = content.trim_end().to_string();
    }
    Ok(content)
}

fn strip_path_args(command_str: &str, args: &[String]) -> Result<String, OptimizeError> {
    let words = shell::words_of(command_str)?;
    let kept: Vec<_> = words
        .into_iter()
        .filter(|w| !(matches!(w.quoting, Quoting::Unquoted) && args.iter().any(|a| a == &w.text)))
        .collect();
    Ok(join_words(&kept))
}

/// Prepends `--mount=type=cache,target=<dir>` options for every cache
/// directory not already mounted by the instruction.
fn apply_add_cache(
    value: &str,
    cache_dirs: &[String],
    context: &Context,
) -> Result<String, OptimizeError> {
    let existing = existing_cache_targets(value, context)?;
    let mounts: Vec<String> = cache_dirs
        .iter()
        .filter(|dir| !existing.contains(*dir))
        .map(|dir| format!("--mount=type=cache,target={}", dir))
        .collect();
    if mounts.is_empty() {
        return Ok(value.to_string());
    }
    Ok(format!("{} {}", mounts.join(" "), value))
}

/// Target directories of the cache mounts already present in the body's RUN
/// options, with variables substituted for comparison.
fn existing_cache_targets(value: &str, context: &Context) -> Result<Vec<String>, OptimizeError> {
    let (run_options, _) = shell::separate_run_options(value);
    let mut targets = Vec::new();
    let mut from = 0;
    while let Some(found) = run_options[from..].find("--mount=type=cache") {
        let option_start = from + found;
        let option_end = run_options[option_start..]
            .find(char::is_whitespace)
            .map(|e| option_start + e)
            .unwrap_or(run_options.len());
        let option = &run_options[option_start..option_end];
        let target_pos = option
            .find("target=")
            .ok_or_else(|| OptimizeError::MountMissingTarget(option.to_string()))?;
        let target = option[target_pos + "target=".len()..]
            .split(',')
            .next()
            .unwrap_or("");
        targets.push(context.substitute(target));
        from = option_start + "--mount=type=cache".len();
    }
    Ok(targets)
}

fn assemble(run_options: &str, body: &str) -> String {
    if run_options.is_empty() {
        body.trim().to_string()
    } else {
        format!("{} {}", run_options, body.trim())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse;
    use crate::pipeline::simulator::simulate;
    use crate::pipeline::splitter::split_stages;
    use crate::rules::Ruleset;

    const APT_PRE_COMMAND: &str = "rm -f /etc/apt/apt.conf.d/docker-clean; echo 'Binary::apt::APT::Keep-Downloaded-Packages \"true\";' > /etc/apt/apt.conf.d/keep-cache";

    fn optimize_stage(text: &str) -> Vec<String> {
        optimize_stage_with_policy(text, true)
    }

    fn optimize_stage_with_policy(text: &str, remove_with_true: bool) -> Vec<String> {
        let rules = Ruleset::builtin().unwrap();
        let df = parse(text);
        let stage = split_stages(&df).into_iter().next().unwrap();
        let strategies = simulate(&stage, &rules).unwrap();
        let mut stats = OptimizeStats::new();
        StageOptimizer::new(&stage, remove_with_true)
            .optimize(&strategies, &mut stats)
            .unwrap()
    }

    #[test]
    fn test_two_apt_instructions_share_one_pre_command() {
        let lines = optimize_stage(
            "RUN apt update\nRUN --mount=type=cache,target=/var/lib/apt apt-get install\n",
        );
        assert_eq!(
            lines,
            vec![
                format!("RUN {}\n", APT_PRE_COMMAND),
                "RUN --mount=type=cache,target=/var/lib/apt --mount=type=cache,target=/var/cache/apt apt update\n".to_string(),
                "RUN --mount=type=cache,target=/var/cache/apt --mount=type=cache,target=/var/lib/apt apt-get install\n".to_string(),
            ]
        );
    }

    #[test]
    fn test_exec_form_gets_cache_mounts() {
        let lines = optimize_stage(
            "RUN --mount=type=cache,target=/var/lib/apt [ \"apt-get\", \"update\" ]\n",
        );
        assert_eq!(
            lines,
            vec![
                format!("RUN {}\n", APT_PRE_COMMAND),
                "RUN --mount=type=cache,target=/var/cache/apt --mount=type=cache,target=/var/lib/apt [ \"apt-get\", \"update\" ]\n".to_string(),
            ]
        );
    }

    #[test]
    fn test_bash_c_exec_form_expansion() {
        let lines = optimize_stage(
            "RUN --mount=type=cache,target=/var/lib/apt [ \"bash\", \"-c\", \"apt-get update\" ]\n",
        );
        assert_eq!(
            lines,
            vec![
                format!("RUN {}\n", APT_PRE_COMMAND),
                "RUN --mount=type=cache,target=/var/cache/apt --mount=type=cache,target=/var/lib/apt [ \"bash\", \"-c\", \"apt-get update\" ]\n".to_string(),
            ]
        );
    }

    #[test]
    fn test_existing_mount_target_compared_through_variables() {
        let lines = optimize_stage(
            "ENV dir=/var/lib/apt\nRUN --mount=type=cache,target=${dir} apt-get install\n",
        );
        assert_eq!(
            lines,
            vec![
                "ENV dir=/var/lib/apt\n".to_string(),
                format!("RUN {}\n", APT_PRE_COMMAND),
                "RUN --mount=type=cache,target=/var/cache/apt --mount=type=cache,target=${dir} apt-get install\n".to_string(),
            ]
        );
    }

    #[test]
    fn test_cache_dir_override_switches_later_mounts() {
        let lines = optimize_stage(
            "RUN npm install\nRUN npm config set prefix /x\nRUN npm install\n",
        );
        assert_eq!(
            lines,
            vec![
                "RUN --mount=type=cache,target=/root/.npm npm install\n".to_string(),
                "RUN npm config set prefix /x\n".to_string(),
                "RUN --mount=type=cache,target=/x npm install\n".to_string(),
            ]
        );
    }

    #[test]
    fn test_rm_of_cache_dir_replaced_with_true() {
        let lines = optimize_stage("RUN rm -rf /var/lib/apt/lists/*\n");
        assert_eq!(lines, vec!["RUN true\n".to_string()]);
    }

    #[test]
    fn test_removal_keeps_connector_structure() {
        let lines = optimize_stage("RUN rm -rf /var/lib/apt/lists/* && apt-get update\n");
        assert_eq!(
            lines,
            vec![
                format!("RUN {}\n", APT_PRE_COMMAND),
                "RUN --mount=type=cache,target=/var/lib/apt --mount=type=cache,target=/var/cache/apt true  &&  apt-get update\n".to_string(),
            ]
        );
    }

    #[test]
    fn test_removal_with_delete_policy_drops_command_and_connector() {
        let lines = optimize_stage_with_policy(
            "RUN echo keep && rm -rf /var/lib/apt/lists/*\n",
            false,
        );
        assert_eq!(lines, vec!["RUN echo keep\n".to_string()]);
    }

    #[test]
    fn test_anti_cache_option_stripped() {
        let lines = optimize_stage("RUN pip --no-cache-dir install pandas\n");
        assert_eq!(
            lines,
            vec!["RUN --mount=type=cache,target=/root/.cache/pip pip install pandas\n".to_string()]
        );
    }

    #[test]
    fn test_untouched_instruction_is_byte_identical() {
        let text = "COPY . /app\nRUN apt-get update\nCMD  [\"./serve\"]  \n";
        let lines = optimize_stage(text);
        assert_eq!(lines[0], "COPY . /app\n");
        assert_eq!(lines.last().unwrap(), "CMD  [\"./serve\"]  \n");
    }

    #[test]
    fn test_blank_line_gaps_preserved() {
        let lines = optimize_stage("RUN apt-get update\n\n\nRUN echo done\n");
        assert_eq!(
            lines,
            vec![
                format!("RUN {}\n", APT_PRE_COMMAND),
                "RUN --mount=type=cache,target=/var/lib/apt --mount=type=cache,target=/var/cache/apt apt-get update\n".to_string(),
                "\n\n".to_string(),
                "RUN echo done\n".to_string(),
            ]
        );
    }

    #[test]
    fn test_stage_without_strategies_is_raw() {
        let text = "FROM debian\nCOPY . /app\n  CMD [\"x\"]\n";
        let lines = optimize_stage(text);
        assert_eq!(lines.join(""), text);
    }

    #[test]
    fn test_pre_command_not_duplicated_on_second_run() {
        let first = optimize_stage("RUN apt-get update\n").join("");
        let second = optimize_stage(&first).join("");
        assert_eq!(first, second);
    }

    #[test]
    fn test_multiline_run_collapses_when_edited() {
        let lines = optimize_stage("RUN apt-get update && \\\n    apt-get install -y gcc\n");
        assert_eq!(
            lines,
            vec![
                format!("RUN {}\n", APT_PRE_COMMAND),
                "RUN --mount=type=cache,target=/var/lib/apt --mount=type=cache,target=/var/cache/apt apt-get update && apt-get install -y gcc\n".to_string(),
            ]
        );
    }
}
