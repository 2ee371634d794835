use std::{
    fmt,
    fs::{File, OpenOptions},
    os::unix::process::CommandExt,
    path::{Path, PathBuf},
    process::{Command, Stdio},
};

use serde::{Deserialize, Serialize};
use tracing::trace;
use warden_model::{Env, ServiceDefinition};

use crate::{ExecError, ExecResult};

/// Fully-resolved invocation of the managed service.
///
/// Built by the controller loop from a [`ServiceDefinition`] and handed to the
/// gated shim, which applies it verbatim. Nothing is inherited from whichever
/// process performs the exec: the environment is exactly `env`, identity is
/// exactly `uid`/`gid`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecPlan {
    pub program: PathBuf,
    pub args: Vec<String>,
    pub env: Env,
    pub cwd: PathBuf,
    pub stdin: PathBuf,
    pub stdout: PathBuf,
    pub stderr: PathBuf,
    pub uid: u32,
    pub gid: u32,
}

impl ExecPlan {
    pub fn from_definition(def: &ServiceDefinition) -> Self {
        Self {
            program: def.cmd.clone(),
            args: def.argv.clone(),
            env: def.env.clone(),
            cwd: def.cwd.clone(),
            stdin: def.stdin.clone(),
            stdout: def.stdout.clone(),
            stderr: def.stderr.clone(),
            uid: def.uid,
            gid: def.gid,
        }
    }

    /// Validate the plan before handing it to a spawn.
    ///
    /// Rules:
    /// - `program` is an absolute path;
    /// - `cwd` is an existing directory.
    pub fn validate(&self) -> ExecResult<()> {
        if !self.program.is_absolute() {
            return Err(ExecError::InvalidPlan(format!(
                "program '{}' is not absolute",
                self.program.display()
            )));
        }
        if !self.cwd.is_dir() {
            return Err(ExecError::InvalidPlan(format!(
                "cwd '{}' is not a directory",
                self.cwd.display()
            )));
        }
        Ok(())
    }

    pub fn to_json(&self) -> ExecResult<String> {
        serde_json::to_string(self).map_err(|e| ExecError::InvalidPlan(e.to_string()))
    }

    pub fn from_json(raw: &str) -> ExecResult<Self> {
        serde_json::from_str(raw).map_err(|e| ExecError::InvalidPlan(e.to_string()))
    }

    /// Build the command: clean environment, identity change, working
    /// directory, and stdio opened from the plan's paths.
    ///
    /// Stdio files are opened by the calling process, before the identity change.
    pub fn command(&self) -> ExecResult<Command> {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .env_clear()
            .envs(self.env.iter())
            .current_dir(&self.cwd)
            .gid(self.gid)
            .uid(self.uid)
            .stdin(Stdio::from(File::open(&self.stdin)?))
            .stdout(Stdio::from(append(&self.stdout)?))
            .stderr(Stdio::from(append(&self.stderr)?));

        trace!(
            program = %self.program.display(),
            args = ?self.args,
            cwd = %self.cwd.display(),
            env_len = self.env.len(),
            uid = self.uid,
            gid = self.gid,
            "exec plan resolved"
        );
        Ok(cmd)
    }

    /// Replace the current process image with the planned one.
    ///
    /// Only returns on failure.
    pub fn exec(&self) -> ExecError {
        match self.command() {
            Ok(mut cmd) => ExecError::SpawnFailed(format!(
                "exec {}: {}",
                self.program.display(),
                cmd.exec()
            )),
            Err(e) => e,
        }
    }
}

fn append(path: &Path) -> std::io::Result<File> {
    OpenOptions::new().create(true).append(true).open(path)
}

impl fmt::Display for ExecPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ExecPlan(cmd='{}', args={}, env={}, cwd={:?}, uid={}, gid={})",
            self.program.display(),
            self.args.len(),
            self.env.len(),
            self.cwd,
            self.uid,
            self.gid,
        )
    }
}
