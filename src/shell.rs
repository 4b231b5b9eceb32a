//! Launching external processes.
//!
//! Every process is started with all three standard streams inherited from
//! the orchestrator, so prompts and colored output reach the terminal
//! unchanged. The environment is the inherited process environment with an
//! optional overlay on top; the overlay is applied to the child only and the
//! orchestrator's own environment is never modified.

use std::collections::BTreeMap;
use std::ffi::{OsStr, OsString};
use std::process::{Command, ExitStatus, Stdio};

use camino::{Utf8Path, Utf8PathBuf};

use crate::error::CommandError;

/// A single external process invocation.
#[derive(Debug, Clone)]
pub struct Invocation {
    program: OsString,
    args: Vec<OsString>,
    envs: BTreeMap<String, String>,
    dir: Option<Utf8PathBuf>,
}

impl Invocation {
    pub fn new(program: impl AsRef<OsStr>) -> Self {
        Self {
            program: program.as_ref().to_owned(),
            args: Vec::new(),
            envs: BTreeMap::new(),
            dir: None,
        }
    }

    pub fn arg(mut self, arg: impl AsRef<OsStr>) -> Self {
        self.args.push(arg.as_ref().to_owned());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        self.args
            .extend(args.into_iter().map(|arg| arg.as_ref().to_owned()));
        self
    }

    /// Adds a variable to the child's environment overlay.
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.envs.insert(key.into(), value.into());
        self
    }

    pub fn envs<'a>(mut self, envs: impl IntoIterator<Item = (&'a String, &'a String)>) -> Self {
        self.envs
            .extend(envs.into_iter().map(|(k, v)| (k.clone(), v.clone())));
        self
    }

    pub fn current_dir(mut self, dir: impl AsRef<Utf8Path>) -> Self {
        self.dir = Some(dir.as_ref().to_owned());
        self
    }

    pub fn program(&self) -> String {
        self.program.to_string_lossy().into_owned()
    }

    pub fn get_args(&self) -> &[OsString] {
        &self.args
    }

    pub fn get_envs(&self) -> &BTreeMap<String, String> {
        &self.envs
    }

    /// Runs the process to completion, blocking until it exits.
    ///
    /// Succeeds only on a zero exit status.
    pub fn run(&self) -> Result<(), CommandError> {
        let status = self.status()?;

        if status.success() {
            Ok(())
        } else {
            Err(CommandError::Status {
                program: self.program(),
                status,
            })
        }
    }

    /// Runs the process to completion and returns its raw exit status.
    pub fn status(&self) -> Result<ExitStatus, CommandError> {
        tracing::debug!(
            program = %self.program(),
            args = ?self.args,
            overlay = ?self.envs.keys().collect::<Vec<_>>(),
            "spawning process"
        );

        let mut command = Command::new(&self.program);
        command
            .args(&self.args)
            .envs(&self.envs)
            .stdin(Stdio::inherit())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit());

        if let Some(dir) = &self.dir {
            command.current_dir(dir);
        }

        let status = command.status().map_err(|source| CommandError::Spawn {
            program: self.program(),
            source,
        })?;

        tracing::debug!(program = %self.program(), %status, "process exited");
        Ok(status)
    }
}
