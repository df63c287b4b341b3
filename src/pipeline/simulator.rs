//! Stage simulation.
//!
//! Walks one stage's instructions in order, maintaining working-directory
//! and user state, and dispatches RUN bodies to the run handler. The walk
//! is a single synchronous pass; every instruction kind outside the
//! recognized subset is ignored.

use crate::error::OptimizeError;
use crate::model::{GlobalStatus, InstructionKind, OptimizationStrategy};
use crate::pipeline::run_handler::RunHandler;
use crate::pipeline::splitter::Stage;
use crate::rules::Ruleset;

/// Simulates a stage and returns the edit strategies it produced.
pub fn simulate(stage: &Stage, rules: &Ruleset) -> Result<Vec<OptimizationStrategy>, OptimizeError> {
    let mut status = GlobalStatus::default();
    let mut handler = RunHandler::new(rules);
    let mut strategies = Vec::new();

    for (index, instruction) in stage.instructions.iter().enumerate() {
        let context = &stage.contexts[index];
        match &instruction.kind {
            InstructionKind::User => {
                let user = instruction.value.trim().to_string();
                if !status.user_dirs.contains_key(&user) {
                    status
                        .user_dirs
                        .insert(user.clone(), GlobalStatus::default_home_for(&user));
                }
                status.user = user;
            }
            InstructionKind::Workdir => {
                let mut dir = instruction.value.trim().to_string();
                if !dir.ends_with('/') {
                    dir.push('/');
                }
                if dir.starts_with('/') {
                    status.work_dir = dir;
                } else {
                    status.work_dir.push_str(&dir);
                }
            }
            InstructionKind::Run => {
                handler.handle(
                    &instruction.value,
                    context,
                    index,
                    &mut status,
                    &mut strategies,
                )?;
            }
            // FROM already served as the stage boundary; everything else
            // is outside the simulated subset
            _ => {}
        }
    }
    Ok(strategies)
}
