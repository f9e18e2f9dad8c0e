use std::env;
use std::path::PathBuf;
use std::process::Command;

use anyhow::{Context, Result, bail};
use serde::Serialize;
use tracing::info;

pub const JOB_STEPS: &[&str] = &["fetch", "summarize"];

/// Program plus leading arguments; each step appends its subcommand.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobCommand {
    pub program: PathBuf,
    pub args_prefix: Vec<String>,
}

impl JobCommand {
    pub fn new(program: impl Into<PathBuf>, args_prefix: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args_prefix,
        }
    }

    /// Re-invokes the running binary with the same `--config`/`--database`
    /// style prefix arguments.
    pub fn current_exe(args_prefix: Vec<String>) -> Result<Self> {
        let program = env::current_exe().context("failed to locate current executable")?;
        Ok(Self::new(program, args_prefix))
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct JobStepResult {
    pub step: String,
    pub exit_code: Option<i32>,
}

#[derive(Debug, Clone, Serialize)]
pub struct JobReport {
    pub steps: Vec<JobStepResult>,
}

/// Runs each step as a child process, in order, stopping at the first failure.
pub fn run_skill_jobs(command: &JobCommand) -> Result<JobReport> {
    let mut report = JobReport { steps: Vec::new() };
    for step in JOB_STEPS {
        info!(step, program = %command.program.display(), "running job step");
        let status = Command::new(&command.program)
            .args(&command.args_prefix)
            .arg(step)
            .status()
            .with_context(|| {
                format!(
                    "step {step} could not be started ({})",
                    command.program.display()
                )
            })?;
        if !status.success() {
            bail!("step {step} exited with {status}");
        }
        report.steps.push(JobStepResult {
            step: (*step).to_string(),
            exit_code: status.code(),
        });
    }
    Ok(report)
}
