use std::env;

use camino::{Utf8Path, Utf8PathBuf};

/// Where generated recipe workspaces get the `bakehouse` library from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Library {
    /// A local checkout of the library.
    Path(Utf8PathBuf),
    /// A registry version requirement.
    Version(String),
}

impl Library {
    /// Renders the source key of an inline dependency table.
    pub(crate) fn to_toml(&self) -> String {
        match self {
            Library::Path(path) => format!("path = {}", toml_string(path.as_str())),
            Library::Version(version) => format!("version = {}", toml_string(version)),
        }
    }
}

/// Runtime settings for the orchestrator.
///
/// Defaults come from the environment through [`Settings::from_env`]:
///
/// * `BAKEHOUSE_CARGO`, then `CARGO`: the toolchain program (`cargo`).
/// * `BAKEHOUSE_LIB_PATH`: local `bakehouse` checkout used by recipes.
/// * `BAKEHOUSE_TARGET_DIR`: compile cache for recipes
///   (`<project>/target/bakehouse`).
#[derive(Debug, Clone)]
pub struct Settings {
    /// Toolchain program used for building, installing and running recipes.
    pub cargo: String,
    /// Library source written into generated recipe manifests.
    pub library: Library,
    /// Target directory for recipe builds, relative to the project unless
    /// absolute. `None` uses the default location.
    pub target_dir: Option<Utf8PathBuf>,
}

impl Settings {
    pub fn from_env() -> Self {
        let cargo = env::var("BAKEHOUSE_CARGO")
            .or_else(|_| env::var("CARGO"))
            .unwrap_or_else(|_| "cargo".to_string());

        let library = match env::var("BAKEHOUSE_LIB_PATH") {
            Ok(path) if !path.is_empty() => Library::Path(path.into()),
            _ => default_library(),
        };

        let target_dir = env::var("BAKEHOUSE_TARGET_DIR")
            .ok()
            .filter(|dir| !dir.is_empty())
            .map(Utf8PathBuf::from);

        Self {
            cargo,
            library,
            target_dir,
        }
    }

    pub fn with_cargo(mut self, cargo: impl Into<String>) -> Self {
        self.cargo = cargo.into();
        self
    }

    pub fn with_library(mut self, library: Library) -> Self {
        self.library = library;
        self
    }

    pub fn with_target_dir(mut self, dir: impl Into<Utf8PathBuf>) -> Self {
        self.target_dir = Some(dir.into());
        self
    }

    /// Resolves the recipe target directory for a project.
    pub fn recipe_target_dir(&self, project: &Utf8Path) -> Utf8PathBuf {
        match &self.target_dir {
            Some(dir) if dir.is_absolute() => dir.clone(),
            Some(dir) => project.join(dir),
            None => project.join("target").join("bakehouse"),
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            cargo: "cargo".to_string(),
            library: default_library(),
            target_dir: None,
        }
    }
}

/// The checkout this binary was built from when it still exists, otherwise
/// the published version of the same release.
fn default_library() -> Library {
    let manifest_dir = Utf8Path::new(env!("CARGO_MANIFEST_DIR"));

    if manifest_dir.join("Cargo.toml").is_file() {
        Library::Path(manifest_dir.to_owned())
    } else {
        Library::Version(format!("={}", env!("CARGO_PKG_VERSION")))
    }
}

/// Quotes a value as a TOML basic string.
pub(crate) fn toml_string(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('"');
    for c in value.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            c => out.push(c),
        }
    }
    out.push('"');
    out
}
