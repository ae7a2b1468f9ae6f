//! Fetching the ordered repair plan from the external range-repair tool.
//!
//! The tool is run in dry-run mode and prints one step per line:
//! `<step-name> <shell command>`.

use std::{fmt, path::PathBuf, process::Stdio};

use async_trait::async_trait;
use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, info};

use crate::records::{RecordKey, RepairStatus};

#[derive(Error, Debug)]
pub enum PlanError {
    #[error("failed to spawn {tool}: {source}")]
    Spawn {
        tool: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{tool} exited with {status}: {stderr}")]
    Exit {
        tool: String,
        status: std::process::ExitStatus,
        stderr: String,
    },

    #[error("line {line} is not `<step> <command>`: {content:?}")]
    Malformed { line: usize, content: String },

    #[error("line {line} uses the reserved status label {name:?} as a step name")]
    ReservedStep { line: usize, name: String },

    #[error("planner output is not valid UTF-8: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RepairStep {
    pub name: String,
    pub command: String,
}

/// Ordered steps of one repair run.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct RepairPlan {
    pub steps: Vec<RepairStep>,
}

impl RepairPlan {
    /// Parses planner output. Blank lines are skipped; the step name ends at
    /// the first space and the rest of the line is the command.
    pub fn parse(output: &str) -> Result<Self, PlanError> {
        let mut steps = Vec::new();
        for (index, line) in output.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            let Some((name, command)) = line.split_once(' ') else {
                return Err(PlanError::Malformed {
                    line: index + 1,
                    content: line.to_string(),
                });
            };
            if name.is_empty() || command.trim().is_empty() {
                return Err(PlanError::Malformed {
                    line: index + 1,
                    content: line.to_string(),
                });
            }
            if RepairStatus::is_reserved(name) {
                return Err(PlanError::ReservedStep {
                    line: index + 1,
                    name: name.to_string(),
                });
            }
            steps.push(RepairStep {
                name: name.to_string(),
                command: command.to_string(),
            });
        }
        Ok(Self { steps })
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

#[async_trait]
pub trait Planner: Send + Sync + fmt::Debug {
    async fn plan(&self, key: &RecordKey) -> Result<RepairPlan, PlanError>;
}

/// Runs `<tool> -D <dc> -H <node> --dry-run [--local]`.
#[derive(Clone, Debug)]
pub struct RangeRepairPlanner {
    tool: PathBuf,
    local: bool,
}

impl RangeRepairPlanner {
    pub fn new(tool: impl Into<PathBuf>, local: bool) -> Self {
        Self {
            tool: tool.into(),
            local,
        }
    }

    fn command(&self, key: &RecordKey) -> Command {
        let mut cmd = Command::new(&self.tool);
        cmd.arg("-D")
            .arg(&key.data_center)
            .arg("-H")
            .arg(&key.nodename)
            .arg("--dry-run");
        if self.local {
            cmd.arg("--local");
        }
        cmd.stdin(Stdio::null());
        cmd
    }
}

#[async_trait]
impl Planner for RangeRepairPlanner {
    async fn plan(&self, key: &RecordKey) -> Result<RepairPlan, PlanError> {
        let tool = self.tool.display().to_string();
        debug!(%tool, local = self.local, "fetching repair steps, this may take a while");

        let output = self
            .command(key)
            .output()
            .await
            .map_err(|source| PlanError::Spawn {
                tool: tool.clone(),
                source,
            })?;
        if !output.status.success() {
            return Err(PlanError::Exit {
                tool,
                status: output.status,
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        let plan = RepairPlan::parse(&String::from_utf8(output.stdout)?)?;
        info!(steps = plan.len(), "repair plan ready");
        Ok(plan)
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;
    use std::os::unix::fs::PermissionsExt;

    use super::*;

    fn script(body: &str) -> tempfile::TempPath {
        let mut file = tempfile::Builder::new()
            .prefix("range_repair")
            .suffix(".sh")
            .tempfile()
            .expect("temp file");
        writeln!(file, "#!/bin/sh\n{body}").expect("write script");
        let path = file.into_temp_path();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755))
            .expect("chmod");
        path
    }

    #[test]
    fn parse_splits_on_first_space() {
        let plan = RepairPlan::parse("r1 nodetool repair -st 0 -et 10\n\nr2 echo done\n")
            .expect("valid plan");
        assert_eq!(
            plan.steps,
            vec![
                RepairStep {
                    name: "r1".into(),
                    command: "nodetool repair -st 0 -et 10".into()
                },
                RepairStep {
                    name: "r2".into(),
                    command: "echo done".into()
                },
            ]
        );
    }

    #[test]
    fn line_without_command_is_malformed() {
        let err = RepairPlan::parse("r1 echo ok\nbroken\n").expect_err("no space");
        assert!(matches!(err, PlanError::Malformed { line: 2, .. }));
    }

    #[test]
    fn lifecycle_labels_cannot_name_steps() {
        let err = RepairPlan::parse("r1 echo ok\nCompleted echo early\n").expect_err("reserved");
        match err {
            PlanError::ReservedStep { line, name } => {
                assert_eq!(line, 2);
                assert_eq!(name, "Completed");
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(matches!(
            RepairPlan::parse("Started echo again\n"),
            Err(PlanError::ReservedStep { line: 1, .. })
        ));
    }

    #[test]
    fn empty_output_is_an_empty_plan() {
        assert!(RepairPlan::parse("\n\n").unwrap().is_empty());
    }

    #[tokio::test]
    async fn planner_passes_identity_and_local_flag() {
        // Echo the arguments back as the command of a single step.
        let tool = script(r#"echo "step1 $*""#);
        let planner = RangeRepairPlanner::new(tool.to_path_buf(), true);
        let plan = planner
            .plan(&RecordKey::new("node-a", "dc1"))
            .await
            .expect("plan");
        assert_eq!(plan.steps.len(), 1);
        assert_eq!(plan.steps[0].command, "-D dc1 -H node-a --dry-run --local");
    }

    #[tokio::test]
    async fn failing_planner_is_an_error() {
        let tool = script("echo boom >&2; exit 3");
        let planner = RangeRepairPlanner::new(tool.to_path_buf(), false);
        let err = planner
            .plan(&RecordKey::new("node-a", "dc1"))
            .await
            .expect_err("non-zero exit");
        match err {
            PlanError::Exit { status, stderr, .. } => {
                assert_eq!(status.code(), Some(3));
                assert_eq!(stderr, "boom");
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[tokio::test]
    async fn missing_planner_fails_to_spawn() {
        let planner = RangeRepairPlanner::new("/nonexistent/range_repair", false);
        let err = planner
            .plan(&RecordKey::new("node-a", "dc1"))
            .await
            .expect_err("missing tool");
        assert!(matches!(err, PlanError::Spawn { .. }));
    }
}
