//! External diff3 tool, run as
//! `<cmd> -E -m [options] -L <target> -L <left> -L <right> <mine> <older> <yours>`.
//!
//! Exit status 0 means a clean merge, 1 means conflicts were marked. Anything
//! else is a failure.

use std::fs::File;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use tracing::{debug, instrument, warn};

use super::{Diff3Inputs, Diff3Status, DiffEngine};
use crate::errors::MergeError;

#[derive(Debug, Clone)]
pub struct ExternalDiff3 {
    command: PathBuf,
    name: String,
}

impl ExternalDiff3 {
    pub fn new(command: impl Into<PathBuf>) -> Self {
        let command = command.into();
        let name = command.to_string_lossy().into_owned();
        Self { command, name }
    }

    fn build_command(&self, inputs: &Diff3Inputs<'_>) -> Command {
        let mut cmd = Command::new(&self.command);
        cmd.arg("-E").arg("-m");
        cmd.args(inputs.options);
        cmd.arg("-L").arg(inputs.labels.target_or_default());
        cmd.arg("-L").arg(inputs.labels.left_or_default());
        cmd.arg("-L").arg(inputs.labels.right_or_default());
        cmd.arg(inputs.mine).arg(inputs.older).arg(inputs.yours);
        if let Some(dir) = inputs.mine.parent().filter(|d| !d.as_os_str().is_empty()) {
            cmd.current_dir(dir);
        }
        cmd
    }

    fn failure(&self, exit_code: Option<i32>, stderr: String) -> MergeError {
        MergeError::ExternalTool {
            command: self.name.clone(),
            exit_code,
            stderr,
        }
    }
}

impl DiffEngine for ExternalDiff3 {
    fn name(&self) -> &str {
        &self.name
    }

    #[instrument(skip_all, fields(cmd = %self.name))]
    fn merge(&self, inputs: &Diff3Inputs<'_>, output: &Path) -> Result<Diff3Status, MergeError> {
        let out_file = File::create(output).map_err(MergeError::io("create", output))?;

        let mut cmd = self.build_command(inputs);
        cmd.stdin(Stdio::null())
            .stdout(Stdio::from(out_file))
            .stderr(Stdio::piped());

        debug!(args = ?cmd.get_args().collect::<Vec<_>>(), "running external diff3");
        let result = cmd
            .output()
            .map_err(|e| self.failure(None, format!("could not start: {e}")))?;

        let stderr = String::from_utf8_lossy(&result.stderr).trim().to_string();
        match result.status.code() {
            Some(0) => Ok(Diff3Status::Clean),
            Some(1) => Ok(Diff3Status::Conflicted),
            code => {
                warn!(exit_code = ?code, %stderr, "external diff3 failed");
                Err(self.failure(code, stderr))
            }
        }
    }

    fn wants_colocated_inputs(&self) -> bool {
        true
    }
}
