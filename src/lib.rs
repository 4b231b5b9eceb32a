#![forbid(unsafe_code)]
//! A project-local build orchestrator.
//!
//! Tasks are declared in a `Recipe.rs` file at the project root:
//!
//! ```no_run
//! use bakehouse::{Engine, TaskResult};
//!
//! pub fn run(bake: &mut Engine) -> TaskResult {
//!     bake.load_metadata("recipe.piml")?;
//!
//!     bake.task("fmt", "Format the sources", |ctx| {
//!         ctx.run("cargo", ["fmt"])?;
//!         Ok(())
//!     });
//!
//!     bake.task_with_deps("build", "Build the project", ["fmt"], |ctx| {
//!         ctx.run("cargo", ["build", "--release"])?;
//!         Ok(())
//!     });
//!
//!     Ok(())
//! }
//! ```
//!
//! The `bakehouse` binary stages the recipe together with a generated runner,
//! compiles it with cargo and forwards the command line, so `bakehouse build`
//! runs `fmt` and then `build`.

mod config;
mod context;
mod cross;
mod engine;
mod error;
pub mod metadata;
pub mod recipe;
mod shell;
mod utils;
pub mod version;

pub use crate::config::{Library, Settings};
pub use crate::context::Context;
pub use crate::cross::target_triple;
pub use crate::engine::{Action, Engine, Task};
pub use crate::error::*;
pub use crate::metadata::Metadata;
pub use crate::recipe::RecipeRunner;
pub use crate::shell::Invocation;
pub use crate::utils::{LOG_ENV, init_logging};

pub use anyhow;

/// Version of this release, as printed by `bakehouse version`.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
