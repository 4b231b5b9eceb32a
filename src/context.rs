use std::collections::BTreeMap;
use std::ffi::OsStr;
use std::fmt::Display;
use std::fs;

use camino::{Utf8Path, Utf8PathBuf};

use crate::cross;
use crate::engine::Engine;
use crate::error::{BuildError, CommandError};
use crate::metadata::Metadata;
use crate::shell::Invocation;

/// The handle passed to every task action during one [`Engine::execute`]
/// call.
///
/// A context carries the arguments that followed the task name on the
/// command line and a set of environment overrides. Overrides set with
/// [`Context::set_env`] are visible to every process the run launches
/// afterwards, and to nothing else: the orchestrator's own environment is
/// left untouched.
pub struct Context<'e> {
    engine: &'e Engine,
    args: Vec<String>,
    env: BTreeMap<String, String>,
}

impl<'e> Context<'e> {
    pub(crate) fn new(engine: &'e Engine, args: Vec<String>) -> Self {
        Self {
            engine,
            args,
            env: BTreeMap::new(),
        }
    }

    pub fn engine(&self) -> &'e Engine {
        self.engine
    }

    /// Project metadata, if the recipe loaded it.
    pub fn metadata(&self) -> Option<&'e Metadata> {
        self.engine.metadata()
    }

    /// Arguments given after the task name.
    pub fn args(&self) -> &[String] {
        &self.args
    }

    /// Prints a prefixed line to standard output.
    pub fn log(&self, message: impl Display) {
        println!("{} {message}", crate::utils::prefix());
    }

    /// Sets an environment variable for processes launched later in this
    /// run.
    pub fn set_env(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.env.insert(key.into(), value.into());
    }

    /// Environment overrides recorded so far.
    pub fn env(&self) -> &BTreeMap<String, String> {
        &self.env
    }

    /// Prepares a process invocation that carries this run's overrides.
    pub fn command(&self, program: impl AsRef<OsStr>) -> Invocation {
        Invocation::new(program).envs(&self.env)
    }

    /// Runs a program with inherited standard streams and waits for it.
    ///
    /// ```rust,no_run
    /// # let mut bake = bakehouse::Engine::new();
    /// bake.task("fmt", "Check formatting", |ctx| {
    ///     ctx.run("cargo", ["fmt", "--check"])?;
    ///     Ok(())
    /// });
    /// ```
    pub fn run<I, S>(&self, program: impl AsRef<OsStr>, args: I) -> Result<(), CommandError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        self.command(program).args(args).run()
    }

    /// Installs every tool listed in the metadata with `cargo install`, in
    /// order, stopping at the first failure.
    pub fn install_tools(&self) -> Result<(), CommandError> {
        let tools = self.metadata().map(|m| m.tools.as_slice()).unwrap_or_default();

        if tools.is_empty() {
            self.log("No tools defined in recipe.piml");
            return Ok(());
        }

        for tool in tools {
            self.log(format_args!("Installing tool: {tool}"));
            self.command(self.cargo()).args(["install", tool.as_str()]).run()?;
        }

        Ok(())
    }

    /// Cross-compiles the current package for `os`/`arch` and copies the
    /// resulting executable to `output`.
    ///
    /// `flags` are passed to `cargo build` unchanged. The binary is the one
    /// named by `--bin`, otherwise the package name from the metadata. The
    /// build sees `CARGO_BUILD_TARGET`, `BAKEHOUSE_TARGET_OS` and
    /// `BAKEHOUSE_TARGET_ARCH` on top of the inherited environment.
    pub fn build_binary<I, S>(
        &self,
        os: &str,
        arch: &str,
        output: impl AsRef<Utf8Path>,
        flags: I,
    ) -> Result<(), BuildError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let output = output.as_ref();
        let flags: Vec<String> = flags.into_iter().map(Into::into).collect();

        let triple = cross::target_triple(os, arch).ok_or_else(|| BuildError::Target {
            os: os.to_string(),
            arch: arch.to_string(),
        })?;

        let name = flag_value(&flags, "--bin")
            .map(str::to_string)
            .or_else(|| {
                self.metadata()
                    .map(|m| m.name.clone())
                    .filter(|name| !name.is_empty())
            })
            .ok_or(BuildError::BinaryName)?;

        self.log(format_args!("Baking binary for {os}/{arch} -> {output}"));

        self.command(self.cargo())
            .arg("build")
            .args(&flags)
            .env("CARGO_BUILD_TARGET", &triple)
            .env("BAKEHOUSE_TARGET_OS", os)
            .env("BAKEHOUSE_TARGET_ARCH", arch)
            .run()?;

        let artifact = self
            .target_dir(&flags)
            .join(&triple)
            .join(profile_dir(&flags))
            .join(cross::executable_name(&name, &triple));

        tracing::debug!(%artifact, %output, "copying build artifact");

        let copy = || -> std::io::Result<()> {
            if let Some(parent) = output.parent().filter(|p| !p.as_str().is_empty()) {
                fs::create_dir_all(parent)?;
            }
            fs::copy(&artifact, output)?;
            Ok(())
        };

        copy().map_err(|e| BuildError::Artifact(artifact.clone(), output.to_owned(), e))
    }

    /// Copies a file.
    pub fn copy(&self, from: impl AsRef<Utf8Path>, to: impl AsRef<Utf8Path>) -> std::io::Result<()> {
        fs::copy(from.as_ref(), to.as_ref()).map(|_| ())
    }

    /// Moves a file or directory.
    pub fn rename(&self, from: impl AsRef<Utf8Path>, to: impl AsRef<Utf8Path>) -> std::io::Result<()> {
        fs::rename(from.as_ref(), to.as_ref())
    }

    /// Removes a file, or a directory with everything in it.
    pub fn remove(&self, path: impl AsRef<Utf8Path>) -> std::io::Result<()> {
        let path = path.as_ref();
        if fs::symlink_metadata(path)?.is_dir() {
            fs::remove_dir_all(path)
        } else {
            fs::remove_file(path)
        }
    }

    /// Creates a directory and any missing parents.
    pub fn create_dir(&self, path: impl AsRef<Utf8Path>) -> std::io::Result<()> {
        fs::create_dir_all(path.as_ref())
    }

    fn cargo(&self) -> &'e str {
        &self.engine.settings().cargo
    }

    fn target_dir(&self, flags: &[String]) -> Utf8PathBuf {
        flag_value(flags, "--target-dir")
            .map(Utf8PathBuf::from)
            .or_else(|| self.env.get("CARGO_TARGET_DIR").map(Utf8PathBuf::from))
            .or_else(|| std::env::var("CARGO_TARGET_DIR").ok().map(Utf8PathBuf::from))
            .unwrap_or_else(|| Utf8PathBuf::from("target"))
    }
}

/// Finds `--flag value` or `--flag=value`.
fn flag_value<'a>(flags: &'a [String], flag: &str) -> Option<&'a str> {
    let mut iter = flags.iter();
    while let Some(current) = iter.next() {
        if current == flag {
            return iter.next().map(String::as_str);
        }
        if let Some(value) = current.strip_prefix(flag).and_then(|r| r.strip_prefix('=')) {
            return Some(value);
        }
    }
    None
}

/// Directory under `target/<triple>/` that holds artifacts for the selected
/// profile.
fn profile_dir(flags: &[String]) -> String {
    if flags.iter().any(|f| f == "--release" || f == "-r") {
        return "release".to_string();
    }

    match flag_value(flags, "--profile") {
        None | Some("dev" | "test") => "debug".to_string(),
        Some("bench") => "release".to_string(),
        Some(profile) => profile.to_string(),
    }
}
