//! Running `Recipe.rs` without compiling it into the orchestrator.
//!
//! A recipe is an ordinary Rust file exposing
//! `pub fn run(bake: &mut bakehouse::Engine) -> bakehouse::TaskResult`.
//! To run it, the recipe is staged into a hidden workspace next to a
//! generated runner and a generated manifest, and the whole thing is handed to
//! `cargo run`. The workspace is removed afterwards whatever the outcome.
//!
//! Two marker lines are understood, each rewritten on first occurrence only:
//!
//! * `#![cfg(bakehouse)]` keeps the file out of ordinary builds and is
//!   blanked out in the staged copy.
//! * `#![crate_name = "..."]` is normalized to the crate name of the
//!   generated library target.
//!
//! Every other line is copied verbatim and line numbers are preserved, so
//! compiler diagnostics point at the right place in the user's file.

use std::ffi::OsStr;
use std::fs;

use camino::{Utf8Path, Utf8PathBuf};
use tempfile::TempDir;

use crate::config::{Library, Settings};
use crate::error::RecipeError;
use crate::shell::Invocation;

/// Default recipe file name in the project root.
pub const RECIPE_FILE: &str = "Recipe.rs";

/// Line that excludes a recipe from ordinary builds.
pub const EXCLUDE_MARKER: &str = "#![cfg(bakehouse)]";

/// Crate name the staged recipe is compiled under.
pub const ENTRY_CRATE: &str = "bake_recipe";

const WORKSPACE_PREFIX: &str = ".bakehouse-";
const STAGED_RECIPE: &str = "recipe.rs";
const STAGED_RUNNER: &str = "runner.rs";
const STAGED_MANIFEST: &str = "Cargo.toml";

const RUNNER: &str = r#"// Generated by bakehouse, do not edit.
use std::process::ExitCode;

fn main() -> ExitCode {
    bakehouse::init_logging();

    let mut bake = bakehouse::Engine::new();
    if let Err(err) = bake_recipe::run(&mut bake) {
        eprintln!("Recipe setup failed: {err:#}");
        return ExitCode::from(1);
    }

    bake.dispatch(std::env::args().skip(1))
}
"#;

/// Rewrites recipe source for staging.
pub fn rewrite(source: &str) -> String {
    let mut out = String::with_capacity(source.len() + ENTRY_CRATE.len());
    let mut excluded = false;
    let mut named = false;

    for line in source.split_inclusive('\n') {
        let body = line.trim_end_matches(['\n', '\r']);
        let ending = &line[body.len()..];
        let trimmed = body.trim();

        if !excluded && trimmed == EXCLUDE_MARKER {
            excluded = true;
            out.push_str(ending);
        } else if !named && is_crate_name(trimmed) {
            named = true;
            out.push_str(&format!("#![crate_name = \"{ENTRY_CRATE}\"]"));
            out.push_str(ending);
        } else {
            out.push_str(line);
        }
    }

    out
}

fn is_crate_name(line: &str) -> bool {
    line.strip_prefix("#![")
        .and_then(|rest| rest.strip_suffix(']'))
        .and_then(|attr| attr.strip_prefix("crate_name"))
        .is_some_and(|rest| rest.trim_start().starts_with('='))
}

/// Source of the generated entry point.
pub fn runner_source() -> &'static str {
    RUNNER
}

/// Manifest pairing the staged recipe (library) with the runner (binary).
pub fn manifest(library: &Library) -> String {
    format!(
        r#"# Generated by bakehouse, do not edit.
[package]
name = "{ENTRY_CRATE}"
version = "0.0.0"
edition = "2024"
publish = false

[lib]
name = "{ENTRY_CRATE}"
path = "{STAGED_RECIPE}"

[[bin]]
name = "bake_runner"
path = "{STAGED_RUNNER}"

[dependencies]
bakehouse = {{ {library}, default-features = false, features = ["logging"] }}
anyhow = "1.0"

[workspace]
"#,
        library = library.to_toml(),
    )
}

/// Stages and runs a project's recipe.
#[derive(Debug, Clone)]
pub struct RecipeRunner {
    settings: Settings,
    project_dir: Utf8PathBuf,
    recipe_file: Utf8PathBuf,
}

impl RecipeRunner {
    pub fn new(settings: Settings) -> Self {
        Self {
            settings,
            project_dir: Utf8PathBuf::from("."),
            recipe_file: Utf8PathBuf::from(RECIPE_FILE),
        }
    }

    pub fn project_dir(mut self, dir: impl Into<Utf8PathBuf>) -> Self {
        self.project_dir = dir.into();
        self
    }

    pub fn recipe_file(mut self, file: impl Into<Utf8PathBuf>) -> Self {
        self.recipe_file = file.into();
        self
    }

    pub fn recipe_path(&self) -> Utf8PathBuf {
        self.project_dir.join(&self.recipe_file)
    }

    pub fn exists(&self) -> bool {
        self.recipe_path().is_file()
    }

    /// Runs the recipe, forwarding `args` to its runner.
    ///
    /// Standard streams are inherited. A non-zero exit of the recipe is
    /// returned as [`RecipeError::Failed`]. The staging workspace is gone by
    /// the time this returns.
    pub fn run<I, S>(&self, args: I) -> Result<(), RecipeError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let recipe = self.recipe_path();
        let source = fs::read_to_string(&recipe).map_err(|e| RecipeError::Read(recipe.clone(), e))?;

        let project = self
            .project_dir
            .canonicalize_utf8()
            .map_err(|e| RecipeError::Workspace(self.project_dir.clone(), e))?;

        let workspace = Workspace::create(&project)?;
        tracing::debug!(workspace = %workspace.path, %recipe, "staging recipe");

        let result = workspace
            .stage(&source, &self.settings.library)
            .and_then(|()| self.invoke(&project, &workspace, args));

        let cleanup = workspace.close();
        result?;
        cleanup
    }

    fn invoke<I, S>(&self, project: &Utf8Path, workspace: &Workspace, args: I) -> Result<(), RecipeError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let status = Invocation::new(&self.settings.cargo)
            .args(["run", "--quiet", "--manifest-path"])
            .arg(workspace.path.join(STAGED_MANIFEST))
            .arg("--target-dir")
            .arg(self.settings.recipe_target_dir(project))
            .arg("--")
            .args(args)
            .current_dir(project)
            .status()
            .map_err(RecipeError::Toolchain)?;

        if status.success() {
            Ok(())
        } else {
            tracing::debug!(%status, "recipe exited unsuccessfully");
            Err(RecipeError::Failed(status))
        }
    }
}

/// Hidden directory holding the staged sources. Dropping it removes the
/// directory; [`Workspace::close`] does the same but reports failures.
struct Workspace {
    dir: TempDir,
    path: Utf8PathBuf,
}

impl Workspace {
    fn create(project: &Utf8Path) -> Result<Self, RecipeError> {
        let dir = tempfile::Builder::new()
            .prefix(WORKSPACE_PREFIX)
            .tempdir_in(project)
            .map_err(|e| RecipeError::Workspace(project.to_owned(), e))?;

        let path = Utf8PathBuf::try_from(dir.path().to_path_buf())?;

        Ok(Self { dir, path })
    }

    fn stage(&self, source: &str, library: &Library) -> Result<(), RecipeError> {
        let files = [
            (STAGED_RECIPE, rewrite(source)),
            (STAGED_RUNNER, RUNNER.to_string()),
            (STAGED_MANIFEST, manifest(library)),
        ];

        for (name, contents) in files {
            let path = self.path.join(name);
            fs::write(&path, contents).map_err(|e| RecipeError::Write(path, e))?;
        }

        Ok(())
    }

    fn close(self) -> Result<(), RecipeError> {
        tracing::debug!(workspace = %self.path, "removing workspace");
        self.dir.close().map_err(RecipeError::Cleanup)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leftover_workspaces(dir: &Utf8Path) -> Vec<String> {
        fs::read_dir(dir)
            .unwrap()
            .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
            .filter(|name| name.starts_with(WORKSPACE_PREFIX))
            .collect()
    }

    fn project() -> (tempfile::TempDir, Utf8PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = Utf8Path::from_path(dir.path()).unwrap().to_owned();
        (dir, path)
    }

    #[test]
    fn rewrite_strips_marker_and_normalizes_name() {
        let source = "#![cfg(bakehouse)]\n#![crate_name = \"my_recipe\"]\nuse bakehouse::Engine;\n";
        assert_eq!(
            rewrite(source),
            "\n#![crate_name = \"bake_recipe\"]\nuse bakehouse::Engine;\n"
        );
    }

    #[test]
    fn rewrite_without_markers_is_identity() {
        let source = "use bakehouse::{Engine, TaskResult};\r\n\r\npub fn run(_: &mut Engine) -> TaskResult {\r\n    Ok(())\r\n}";
        assert_eq!(rewrite(source), source);
    }

    #[test]
    fn rewrite_touches_first_occurrence_only() {
        let source = "#![cfg(bakehouse)]\nconst DOC: &str = \"x\";\n#![cfg(bakehouse)]\n";
        assert_eq!(
            rewrite(source),
            "\nconst DOC: &str = \"x\";\n#![cfg(bakehouse)]\n"
        );
    }

    #[test]
    fn crate_name_detection() {
        assert!(is_crate_name("#![crate_name = \"x\"]"));
        assert!(is_crate_name("#![crate_name=\"x\"]"));
        assert!(!is_crate_name("#![crate_type = \"lib\"]"));
        assert!(!is_crate_name("// #![crate_name = \"x\"]"));
    }

    #[test]
    fn manifest_pairs_recipe_and_runner() {
        let manifest = manifest(&Library::Version("=0.1.0".into()));
        assert!(manifest.contains("[lib]\nname = \"bake_recipe\"\npath = \"recipe.rs\""));
        assert!(manifest.contains("[[bin]]\nname = \"bake_runner\"\npath = \"runner.rs\""));
        assert!(manifest.contains(
            "bakehouse = { version = \"=0.1.0\", default-features = false, features = [\"logging\"] }"
        ));
        assert!(manifest.ends_with("[workspace]\n"));
    }

    #[test]
    fn runner_calls_setup_then_dispatch() {
        let runner = runner_source();
        let setup = runner.find("bake_recipe::run(&mut bake)").unwrap();
        let dispatch = runner.find("bake.dispatch(").unwrap();
        assert!(setup < dispatch);
        assert!(runner.contains("ExitCode::from(1)"));
    }

    #[test]
    fn missing_recipe_is_reported_without_workspace() {
        let (_guard, dir) = project();
        let runner = RecipeRunner::new(Settings::default()).project_dir(&dir);

        assert!(!runner.exists());
        let err = runner.run(Vec::<String>::new()).unwrap_err();
        assert!(matches!(err, RecipeError::Read(..)));
        assert!(leftover_workspaces(&dir).is_empty());
    }

    #[cfg(unix)]
    #[test]
    fn failed_run_removes_workspace() {
        let (_guard, dir) = project();
        fs::write(dir.join(RECIPE_FILE), "pub fn run() {}\n").unwrap();

        let runner = RecipeRunner::new(Settings::default().with_cargo("false")).project_dir(&dir);
        let err = runner.run(["build"]).unwrap_err();

        assert!(matches!(err, RecipeError::Failed(_)));
        assert_eq!(err.exit_code(), 1);
        assert!(leftover_workspaces(&dir).is_empty());
    }

    #[cfg(unix)]
    #[test]
    fn missing_toolchain_removes_workspace() {
        let (_guard, dir) = project();
        fs::write(dir.join(RECIPE_FILE), "pub fn run() {}\n").unwrap();

        let runner = RecipeRunner::new(
            Settings::default().with_cargo("bakehouse-no-such-cargo"),
        )
        .project_dir(&dir);

        let err = runner.run(["build"]).unwrap_err();
        assert!(matches!(err, RecipeError::Toolchain(_)));
        assert!(leftover_workspaces(&dir).is_empty());
    }

    #[cfg(unix)]
    #[test]
    fn stages_sources_and_forwards_arguments() {
        use std::os::unix::fs::PermissionsExt;

        let (_guard, dir) = project();
        fs::write(
            dir.join(RECIPE_FILE),
            "#![cfg(bakehouse)]\n#![crate_name = \"recipe\"]\npub fn run() {}\n",
        )
        .unwrap();

        let script = dir.join("fake-cargo");
        fs::write(
            &script,
            r#"#!/bin/sh
set -e
[ "$1" = run ]
[ "$3" = --manifest-path ]
manifest="$4"
staged=$(dirname "$manifest")
grep -q 'name = "bake_recipe"' "$manifest"
grep -q 'crate_name = "bake_recipe"' "$staged/recipe.rs"
if grep -q 'cfg(bakehouse)' "$staged/recipe.rs"; then exit 5; fi
grep -q 'bake_recipe::run' "$staged/runner.rs"
[ "$7" = -- ]
shift 7
echo "$@" > forwarded.txt
echo "$staged" > staged.txt
"#,
        )
        .unwrap();
        fs::set_permissions(&script, fs::Permissions::from_mode(0o755)).unwrap();

        let runner =
            RecipeRunner::new(Settings::default().with_cargo(script.as_str())).project_dir(&dir);
        runner.run(["build", "--fast"]).unwrap();

        let forwarded = fs::read_to_string(dir.join("forwarded.txt")).unwrap();
        assert_eq!(forwarded, "build --fast\n");

        let staged = fs::read_to_string(dir.join("staged.txt")).unwrap();
        assert!(!Utf8Path::new(staged.trim()).exists());
        assert!(leftover_workspaces(&dir).is_empty());
    }

    #[cfg(unix)]
    #[test]
    fn exit_code_of_the_recipe_is_kept() {
        let (_guard, dir) = project();
        fs::write(dir.join(RECIPE_FILE), "pub fn run() {}\n").unwrap();

        let script = dir.join("fake-cargo");
        fs::write(&script, "#!/bin/sh\nexit 7\n").unwrap();
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&script, fs::Permissions::from_mode(0o755)).unwrap();
        }

        let runner =
            RecipeRunner::new(Settings::default().with_cargo(script.as_str())).project_dir(&dir);
        let err = runner.run(Vec::<String>::new()).unwrap_err();
        assert_eq!(err.exit_code(), 7);
    }
}
