use std::process::ExitStatus;

use camino::Utf8PathBuf;
use thiserror::Error;

/// Result returned by task actions and recipe setup functions.
pub type TaskResult<T = ()> = anyhow::Result<T, anyhow::Error>;

#[derive(Debug, Error)]
pub enum BakeError {
    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error(transparent)]
    Command(#[from] CommandError),

    #[error(transparent)]
    Metadata(#[from] MetadataError),

    #[error(transparent)]
    Recipe(#[from] RecipeError),

    #[error(transparent)]
    Build(#[from] BuildError),

    #[error(transparent)]
    Version(#[from] VersionError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Unknown task: {0}")]
    UnknownTask(String),

    #[error("Task name must not be empty")]
    InvalidName,

    #[error("Cycle detected at task '{0}'")]
    Cycle(String),

    #[error("Task '{0}' failed: {1:#}")]
    Task(String, anyhow::Error),
}

impl EngineError {
    /// Name of the task this error is attached to, if any.
    pub fn task(&self) -> Option<&str> {
        match self {
            EngineError::UnknownTask(name)
            | EngineError::Cycle(name)
            | EngineError::Task(name, _) => Some(name),
            EngineError::InvalidName => None,
        }
    }
}

#[derive(Debug, Error)]
pub enum CommandError {
    #[error("Couldn't launch '{program}'.\n{source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Command '{program}' failed with {status}")]
    Status { program: String, status: ExitStatus },
}

impl CommandError {
    /// Exit code of the failed process, `None` for launch failures or signals.
    pub fn code(&self) -> Option<i32> {
        match self {
            CommandError::Spawn { .. } => None,
            CommandError::Status { status, .. } => status.code(),
        }
    }
}

#[derive(Debug, Error)]
pub enum MetadataError {
    #[error("Couldn't access metadata file '{0}'.\n{1}")]
    Io(Utf8PathBuf, #[source] std::io::Error),

    #[error("{path}:{line}: {message}")]
    Parse {
        path: Utf8PathBuf,
        line: usize,
        message: String,
    },

    #[error("Can't save '{path}': value of `{key}` spans multiple lines")]
    Multiline { path: Utf8PathBuf, key: String },

    #[error("No project metadata loaded")]
    Missing,
}

#[derive(Debug, Error)]
pub enum RecipeError {
    #[error("Error reading recipe '{0}'.\n{1}")]
    Read(Utf8PathBuf, #[source] std::io::Error),

    #[error("Error creating recipe workspace in '{0}'.\n{1}")]
    Workspace(Utf8PathBuf, #[source] std::io::Error),

    #[error("Error writing '{0}'.\n{1}")]
    Write(Utf8PathBuf, #[source] std::io::Error),

    #[error("Recipe workspace path is not valid UTF-8: {0}")]
    Path(#[from] camino::FromPathBufError),

    #[error("Couldn't launch the toolchain.\n{0}")]
    Toolchain(#[source] CommandError),

    #[error("Recipe failed with {0}")]
    Failed(ExitStatus),

    #[error("Error removing recipe workspace.\n{0}")]
    Cleanup(#[source] std::io::Error),
}

impl RecipeError {
    /// Exit code the orchestrator should terminate with for this error.
    pub fn exit_code(&self) -> i32 {
        match self {
            RecipeError::Failed(status) => status.code().filter(|&c| c != 0).unwrap_or(1),
            _ => 1,
        }
    }
}

#[derive(Debug, Error)]
pub enum BuildError {
    #[error("Unsupported build target {os}/{arch}")]
    Target { os: String, arch: String },

    #[error(transparent)]
    Command(#[from] CommandError),

    #[error("Couldn't determine the binary name, pass `--bin <name>` or load metadata")]
    BinaryName,

    #[error("Couldn't copy artifact '{0}' to '{1}'.\n{2}")]
    Artifact(Utf8PathBuf, Utf8PathBuf, #[source] std::io::Error),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum VersionError {
    #[error("Invalid version format (expected X.Y.Z): {0}")]
    Format(String),

    #[error("Invalid bump part: {0} (use major, minor, or patch)")]
    Part(String),
}
