use std::process::ExitCode;

use anyhow::Context as _;
use bakehouse::metadata::{self, FILE_NAME};
use bakehouse::recipe::RECIPE_FILE;
use bakehouse::version::{self, Bump};
use bakehouse::{BakeError, Invocation, RecipeError, RecipeRunner, Settings};
use camino::{Utf8Path, Utf8PathBuf};
use clap::{Parser, Subcommand};
use console::style;

const RECIPE_TEMPLATE: &str = include_str!("../templates/Recipe.rs");
const METADATA_TEMPLATE: &str = include_str!("../templates/recipe.piml");

/// Project-local build orchestrator.
///
/// Any command not listed below is forwarded to the project's `Recipe.rs`.
#[derive(Parser, Debug)]
#[command(name = "bakehouse", disable_help_subcommand = true, disable_version_flag = true)]
struct Cli {
    /// Print the version and exit
    #[arg(short = 'V', long = "version")]
    version: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Initialize a new project
    Init,

    /// Show the bakehouse version
    Version,

    /// Bump the project version in recipe.piml
    Bump {
        /// major, minor or patch
        part: Bump,
    },

    /// Clone a git template and add missing recipe files
    Template {
        /// Repository URL
        url: String,
    },

    /// Add a tool to recipe.piml
    #[command(name = "add-tool")]
    AddTool { tool: String },

    /// Remove a tool from recipe.piml
    #[command(name = "remove-tool")]
    RemoveTool { tool: String },

    /// Add a library dependency with `cargo add`
    #[command(name = "add-dep")]
    AddDep {
        #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
        args: Vec<String>,
    },

    /// Remove a library dependency with `cargo remove`
    #[command(name = "remove-dep")]
    RemoveDep {
        #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
        args: Vec<String>,
    },

    /// Show this help and the project's tasks
    Help,

    #[command(external_subcommand)]
    Recipe(Vec<String>),
}

fn main() -> ExitCode {
    bakehouse::init_logging();

    let cli = Cli::parse();
    let settings = Settings::from_env();

    if cli.version {
        print_version();
        return ExitCode::SUCCESS;
    }

    let result = match cli.command {
        Some(Command::Init) => init(&settings),
        Some(Command::Version) => {
            print_version();
            Ok(())
        }
        Some(Command::Bump { part }) => bump(Utf8Path::new(FILE_NAME), part),
        Some(Command::Template { url }) => template(&url),
        Some(Command::AddTool { tool }) => add_tool(Utf8Path::new(FILE_NAME), &tool),
        Some(Command::RemoveTool { tool }) => remove_tool(Utf8Path::new(FILE_NAME), &tool),
        Some(Command::AddDep { args }) => cargo(&settings, "add", &args),
        Some(Command::RemoveDep { args }) => cargo(&settings, "remove", &args),
        Some(Command::Help) => return help(&settings),
        Some(Command::Recipe(args)) => return forward(&settings, &args),
        None => return forward(&settings, &[]),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => report(&err),
    }
}

fn report(err: &BakeError) -> ExitCode {
    eprintln!("{} {err:#}", style("error:").red().bold());

    match err {
        BakeError::Command(err) => err
            .code()
            .and_then(|code| u8::try_from(code).ok())
            .map_or(ExitCode::FAILURE, ExitCode::from),
        BakeError::Recipe(err) => exit_code(err),
        _ => ExitCode::FAILURE,
    }
}

fn print_version() {
    println!("bakehouse version {}", bakehouse::VERSION);
}

/// Runs the recipe with `args`, or explains how to create one.
fn forward(settings: &Settings, args: &[String]) -> ExitCode {
    let runner = RecipeRunner::new(settings.clone());

    if !runner.exists() {
        print_hint();
        return ExitCode::SUCCESS;
    }

    match runner.run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err @ RecipeError::Failed(_)) => {
            tracing::debug!("{err}");
            exit_code(&err)
        }
        Err(err) => {
            eprintln!("{} {err}", style("error:").red().bold());
            exit_code(&err)
        }
    }
}

fn exit_code(err: &RecipeError) -> ExitCode {
    ExitCode::from(u8::try_from(err.exit_code()).unwrap_or(1))
}

fn print_hint() {
    if Utf8Path::new(FILE_NAME).is_file() {
        println!("Found {FILE_NAME} but no {RECIPE_FILE}.");
        println!("Create a {RECIPE_FILE} file to define your build tasks.");
        println!("\nExample {RECIPE_FILE}:\n");
        print!("{RECIPE_TEMPLATE}");
    } else {
        println!("bakehouse: No {RECIPE_FILE} or {FILE_NAME} found in the current directory.");
        println!("Run 'bakehouse init' to create a new project configuration.");
    }
}

fn help(settings: &Settings) -> ExitCode {
    use clap::CommandFactory;

    let mut command = Cli::command();
    if command.print_long_help().is_err() {
        return ExitCode::FAILURE;
    }

    let runner = RecipeRunner::new(settings.clone());
    if !runner.exists() {
        return ExitCode::SUCCESS;
    }

    println!("\n--- Project Tasks ---");
    forward(settings, &[])
}

fn init(settings: &Settings) -> Result<(), BakeError> {
    for existing in [FILE_NAME, RECIPE_FILE] {
        if Utf8Path::new(existing).exists() {
            return Err(anyhow::anyhow!("{existing} already exists").into());
        }
    }

    let dir = current_dir()?;

    if !Utf8Path::new("Cargo.toml").exists() {
        println!("Cargo.toml not found. Running '{} init'...", settings.cargo);
        if let Err(err) = Invocation::new(&settings.cargo).arg("init").run() {
            println!("Warning: '{} init' failed: {err}", settings.cargo);
        }
    }

    write_templates(&dir, &project_name(&dir))?;

    println!("\nInitialized bakehouse project.");
    println!("Run 'bakehouse build' to start.");
    Ok(())
}

/// Writes `recipe.piml` and `Recipe.rs` into `dir` where they don't exist.
fn write_templates(dir: &Utf8Path, name: &str) -> Result<(), BakeError> {
    let files = [
        (FILE_NAME, METADATA_TEMPLATE.replace("{{name}}", name)),
        (RECIPE_FILE, RECIPE_TEMPLATE.to_string()),
    ];

    for (file, contents) in files {
        let path = dir.join(file);
        if path.exists() {
            println!("{file} already exists.");
            continue;
        }

        std::fs::write(&path, contents).with_context(|| format!("Error creating {path}"))?;
        println!("Created {file}");
    }

    Ok(())
}

fn bump(path: &Utf8Path, part: Bump) -> Result<(), BakeError> {
    let mut meta = metadata::load(path)?;

    let current = meta.version.clone();
    meta.version = version::bump(&current, part)?;
    metadata::save(path, &meta)?;

    println!("Bumped version: {current} -> {}", meta.version);
    Ok(())
}

fn template(url: &str) -> Result<(), BakeError> {
    let dir = Utf8PathBuf::from(template_dir(url));

    println!("Cloning {url} into {dir}...");
    Invocation::new("git")
        .args(["clone", url, dir.as_str()])
        .run()?;

    write_templates(&dir, &project_name(&dir))?;

    println!("\nProject ready in directory: {dir}");
    println!("cd {dir}");
    println!("bakehouse build");
    Ok(())
}

/// Directory a template is cloned into: the last URL segment without `.git`.
fn template_dir(url: &str) -> String {
    let base = url
        .trim_end_matches('/')
        .rsplit(['/', ':'])
        .next()
        .unwrap_or_default();

    match base.trim_end_matches(".git") {
        "" | "." | ".." => "new-project".to_string(),
        name => name.to_string(),
    }
}

fn add_tool(path: &Utf8Path, tool: &str) -> Result<(), BakeError> {
    let mut meta = metadata::load(path)?;

    if meta.tools.iter().any(|t| t == tool) {
        println!("Tool {tool} already exists in {FILE_NAME}");
        return Ok(());
    }

    meta.tools.push(tool.to_string());
    metadata::save(path, &meta)?;

    println!("Added tool {tool} to {FILE_NAME}");
    Ok(())
}

fn remove_tool(path: &Utf8Path, tool: &str) -> Result<(), BakeError> {
    let mut meta = metadata::load(path)?;

    let before = meta.tools.len();
    meta.tools.retain(|t| t != tool);

    if meta.tools.len() == before {
        println!("Tool '{tool}' not found in {FILE_NAME}");
        return Ok(());
    }

    metadata::save(path, &meta)?;

    println!("Removed tool {tool} from {FILE_NAME}");
    Ok(())
}

fn cargo(settings: &Settings, subcommand: &str, args: &[String]) -> Result<(), BakeError> {
    Invocation::new(&settings.cargo)
        .arg(subcommand)
        .args(args)
        .run()?;

    Ok(())
}

fn current_dir() -> Result<Utf8PathBuf, BakeError> {
    let dir = std::env::current_dir()?;
    Utf8PathBuf::try_from(dir).map_err(|err| BakeError::Io(err.into_io_error()))
}

fn project_name(dir: &Utf8Path) -> String {
    dir.file_name().unwrap_or("project").to_string()
}
