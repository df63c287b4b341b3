//! Splits a Dockerfile into build stages on FROM boundaries.

use crate::model::{Context, Instruction, InstructionKind};
use crate::parser::Dockerfile;

/// One build stage: the instructions from a FROM up to (excluding) the next
/// FROM, with the context visible at each instruction. Anything before the
/// first FROM (comments, ARGs) belongs to the first stage.
#[derive(Debug)]
pub struct Stage {
    pub instructions: Vec<Instruction>,
    pub contexts: Vec<Context>,
}

pub fn split_stages(dockerfile: &Dockerfile) -> Vec<Stage> {
    let mut stages = Vec::new();
    let mut instructions: Vec<Instruction> = Vec::new();
    let mut contexts: Vec<Context> = Vec::new();
    let mut seen_from = false;

    for (instruction, context) in dockerfile
        .instructions
        .iter()
        .zip(dockerfile.contexts.iter())
    {
        if instruction.kind == InstructionKind::From {
            if seen_from {
                stages.push(Stage {
                    instructions: std::mem::take(&mut instructions),
                    contexts: std::mem::take(&mut contexts),
                });
            }
            seen_from = true;
        }
        instructions.push(instruction.clone());
        contexts.push(context.clone());
    }
    if !instructions.is_empty() {
        stages.push(Stage {
            instructions,
            contexts,
        });
    }
    stages
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse;

    #[test]
    fn test_single_stage() {
        let df = parse("FROM debian\nRUN apt-get update\n");
        let stages = split_stages(&df);
        assert_eq!(stages.len(), 1);
        assert_eq!(stages[0].instructions.len(), 2);
    }

    #[test]
    fn test_multistage_split_on_from() {
        let df = parse("FROM golang AS build\nRUN go build\nFROM debian\nRUN apt-get update\n");
        let stages = split_stages(&df);
        assert_eq!(stages.len(), 2);
        assert_eq!(stages[0].instructions.len(), 2);
        assert_eq!(stages[1].instructions.len(), 2);
        assert_eq!(stages[1].instructions[0].kind, InstructionKind::From);
    }

    #[test]
    fn test_leading_comments_stay_in_first_stage() {
        let df = parse("# syntax=docker/dockerfile:1.2\nFROM debian\nFROM alpine\n");
        let stages = split_stages(&df);
        assert_eq!(stages.len(), 2);
        assert_eq!(stages[0].instructions[0].kind, InstructionKind::Comment);
    }

    #[test]
    fn test_empty_dockerfile_has_no_stages() {
        let df = parse("\n\n");
        assert!(split_stages(&df).is_empty());
    }
}
