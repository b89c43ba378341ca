//! Persistent step chain
//!
//! Environment state is modelled as an append-only chain of applied steps,
//! similar to how an LLB graph feeds each exec the output of the previous
//! one. Appending never mutates an existing chain: it returns a new head that
//! shares every earlier node, so any prefix can be kept around and inspected.

use super::shell::{display_command, sh_dash_c};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;

/// An immutable shell-level instruction applied to an environment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommandStep {
    args: Vec<String>,
    workdir: Option<String>,
    name: Option<String>,
}

impl CommandStep {
    /// Run a program directly (exec form).
    pub fn exec<I, S>(args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            args: args.into_iter().map(Into::into).collect(),
            workdir: None,
            name: None,
        }
    }

    /// Run several shell instructions as one fail-fast step.
    pub fn shell<I, S>(instructions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self::exec(sh_dash_c(instructions))
    }

    pub fn append(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn with_workdir(mut self, workdir: impl Into<String>) -> Self {
        self.workdir = Some(workdir.into());
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }

    pub fn program(&self) -> Option<&str> {
        self.args.first().map(String::as_str)
    }

    pub fn workdir(&self) -> Option<&str> {
        self.workdir.as_deref()
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn command_line(&self) -> String {
        display_command(&self.args)
    }
}

impl fmt::Display for CommandStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.name {
            Some(name) => write!(f, "{}", name),
            None => write!(f, "{}", self.command_line()),
        }
    }
}

/// What a chain node did to the environment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StepOp {
    Exec { step: CommandStep, exit_code: i64 },
    Stage { target: String, files: usize },
}

impl fmt::Display for StepOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StepOp::Exec { step, exit_code } => write!(f, "exec `{}` (exit {})", step, exit_code),
            StepOp::Stage { target, files } => write!(f, "stage {} files into {}", files, target),
        }
    }
}

/// A step as recorded on the chain, with the optional image reference of the
/// committed state right after it ran.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AppliedStep {
    pub op: StepOp,
    pub snapshot: Option<String>,
}

#[derive(Debug)]
struct StepNode {
    step: AppliedStep,
    parent: Option<Arc<StepNode>>,
    depth: usize,
}

/// Head pointer into a persistent list of applied steps.
#[derive(Debug, Clone, Default)]
pub struct StepChain {
    head: Option<Arc<StepNode>>,
}

impl StepChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return a new chain with `step` applied on top of this one.
    pub fn push(&self, step: AppliedStep) -> StepChain {
        let depth = self.len() + 1;
        StepChain {
            head: Some(Arc::new(StepNode {
                step,
                parent: self.head.clone(),
                depth,
            })),
        }
    }

    pub fn len(&self) -> usize {
        self.head.as_ref().map_or(0, |node| node.depth)
    }

    pub fn is_empty(&self) -> bool {
        self.head.is_none()
    }

    /// The most recently applied step.
    pub fn last(&self) -> Option<&AppliedStep> {
        self.head.as_ref().map(|node| &node.step)
    }

    /// The chain as it was after the first `len` steps.
    pub fn prefix(&self, len: usize) -> Option<StepChain> {
        if len > self.len() {
            return None;
        }
        let mut current = self.head.clone();
        while let Some(node) = current.clone() {
            if node.depth <= len {
                break;
            }
            current = node.parent.clone();
        }
        Some(StepChain { head: current })
    }

    /// Applied steps, oldest first.
    pub fn steps(&self) -> Vec<AppliedStep> {
        let mut steps = Vec::with_capacity(self.len());
        let mut current = self.head.as_deref();
        while let Some(node) = current {
            steps.push(node.step.clone());
            current = node.parent.as_deref();
        }
        steps.reverse();
        steps
    }

    /// True when both chains point at the same realized node.
    pub fn same_head(&self, other: &StepChain) -> bool {
        match (&self.head, &other.head) {
            (Some(a), Some(b)) => Arc::ptr_eq(a, b),
            (None, None) => true,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn exec_step(cmd: &str) -> AppliedStep {
        AppliedStep {
            op: StepOp::Exec {
                step: CommandStep::exec(cmd.split_whitespace()),
                exit_code: 0,
            },
            snapshot: None,
        }
    }

    #[test]
    fn test_push_does_not_mutate_previous_chain() {
        let base = StepChain::new();
        let one = base.push(exec_step("apt-get update"));
        let two = one.push(exec_step("npm install -g prettier@2.8.1"));

        assert!(base.is_empty());
        assert_eq!(one.len(), 1);
        assert_eq!(two.len(), 2);
        assert_eq!(one.steps().len(), 1);
    }

    #[test]
    fn test_steps_are_oldest_first() {
        let chain = StepChain::new()
            .push(exec_step("first"))
            .push(exec_step("second"))
            .push(exec_step("third"));

        let names: Vec<String> = chain
            .steps()
            .iter()
            .map(|s| match &s.op {
                StepOp::Exec { step, .. } => step.command_line(),
                StepOp::Stage { .. } => unreachable!(),
            })
            .collect();
        assert_eq!(names, vec!["first", "second", "third"]);
    }

    #[test]
    fn test_branches_share_prefix() {
        let base = StepChain::new().push(exec_step("setup"));
        let left = base.push(exec_step("left"));
        let right = base.push(exec_step("right"));

        assert!(left.prefix(1).unwrap().same_head(&base));
        assert!(right.prefix(1).unwrap().same_head(&base));
        assert!(!left.same_head(&right));
    }

    #[test]
    fn test_prefix_bounds() {
        let chain = StepChain::new().push(exec_step("a")).push(exec_step("b"));
        assert!(chain.prefix(0).unwrap().is_empty());
        assert_eq!(chain.prefix(2).unwrap().len(), 2);
        assert!(chain.prefix(3).is_none());
    }

    #[test]
    fn test_shell_step_uses_composer() {
        let step = CommandStep::shell(["apt-get update", "apt-get install -y bash"]);
        assert_eq!(step.program(), Some("sh"));
        assert!(step.args()[2].ends_with("apt-get update && apt-get install -y bash"));
    }

    #[test]
    fn test_display_prefers_name() {
        let step = CommandStep::exec(["prettier", "--write", "."]).with_name("Run prettier");
        assert_eq!(step.to_string(), "Run prettier");
        assert_eq!(step.command_line(), "prettier --write .");
    }

    #[test]
    fn test_stage_op_display() {
        let op = StepOp::Stage {
            target: "/src".to_string(),
            files: 3,
        };
        assert_eq!(op.to_string(), "stage 3 files into /src");
    }
}
