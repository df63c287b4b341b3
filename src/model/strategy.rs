//! Structured, position-addressed edit operations produced by analysis and
//! applied later by the stage reconstructor.

/// How one command targeted by [`OptimizationStrategy::RemoveCommand`] is
/// edited.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandRemoval {
    /// The whole command is removed (or replaced with `true`, depending on
    /// the configured removal policy).
    WholeCommand,
    /// Only the listed path arguments are removed from the command.
    PathArgs(Vec<String>),
}

/// An edit to apply to one instruction of a stage, addressed by its position
/// in the stage's instruction list. Multiple strategies may target the same
/// instruction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OptimizationStrategy {
    /// Prepend `--mount=type=cache,target=<dir>` options to a RUN
    /// instruction. At most one per instruction.
    AddCache {
        instruction_index: usize,
        cache_dirs: Vec<String>,
    },
    /// Insert standalone RUN lines immediately before the instruction.
    InsertBefore {
        instruction_index: usize,
        commands: Vec<String>,
    },
    /// Remove (or neutralize) commands inside the instruction body.
    RemoveCommand {
        instruction_index: usize,
        removals: Vec<(usize, CommandRemoval)>,
    },
    /// Strip specific option tokens from one command of the instruction.
    RemoveOption {
        instruction_index: usize,
        command_index: usize,
        options: Vec<String>,
    },
}

impl OptimizationStrategy {
    pub fn instruction_index(&self) -> usize {
        match self {
            OptimizationStrategy::AddCache {
                instruction_index, ..
            }
            | OptimizationStrategy::InsertBefore {
                instruction_index, ..
            }
            | OptimizationStrategy::RemoveCommand {
                instruction_index, ..
            }
            | OptimizationStrategy::RemoveOption {
                instruction_index, ..
            } => *instruction_index,
        }
    }
}
