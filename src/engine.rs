//! The task registry and the dependency-ordered executor.
//!
//! Tasks are registered by name together with the names of the tasks they
//! depend on. Dependencies are resolved only when a task is executed, so a
//! recipe may register tasks in any order and refer to tasks it registers
//! later.
//!
//! Execution is a depth-first walk from the requested task. Dependencies run
//! left to right before the task that declares them, each task runs at most
//! once per [`Engine::execute`] call, and the first failure aborts the run. A
//! task that is re-entered while its own dependencies are still being
//! resolved forms a cycle, which is reported as [`EngineError::Cycle`]. Only
//! the part of the graph reachable from the requested task is checked; use
//! [`Engine::validate`] for an eager check of the whole registry.

use std::collections::{HashMap, HashSet};
use std::fmt::{Debug, Write};
use std::process::ExitCode;

use camino::Utf8Path;
use petgraph::Graph;
use petgraph::graph::NodeIndex;

use crate::config::Settings;
use crate::context::Context;
use crate::error::{EngineError, MetadataError, TaskResult};
use crate::metadata::{self, Metadata};

/// Unit of work performed by a task.
pub type Action = Box<dyn Fn(&mut Context<'_>) -> TaskResult>;

/// A named, described unit of build work with declared prerequisites.
pub struct Task {
    name: String,
    description: String,
    dependencies: Vec<String>,
    action: Action,
}

impl Task {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    /// Names of the tasks that must complete before this one, in order.
    pub fn dependencies(&self) -> &[String] {
        &self.dependencies
    }
}

impl Debug for Task {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Task")
            .field("name", &self.name)
            .field("description", &self.description)
            .field("dependencies", &self.dependencies)
            .finish_non_exhaustive()
    }
}

/// The task graph engine.
///
/// Recipes receive a `&mut Engine`, register their tasks on it and optionally
/// load the project metadata. The runner then hands the command line to
/// [`Engine::dispatch`].
///
/// ```rust,no_run
/// use bakehouse::Engine;
///
/// let mut bake = Engine::new();
///
/// bake.task("test", "Run unit tests", |ctx| {
///     ctx.run("cargo", ["test"])?;
///     Ok(())
/// });
///
/// bake.task_with_deps("install", "Install the binary", ["test"], |ctx| {
///     ctx.run("cargo", ["install", "--path", "."])?;
///     Ok(())
/// });
///
/// bake.execute("install", &[]).unwrap();
/// ```
pub struct Engine {
    tasks: HashMap<String, Task>,
    /// Task names in first-registration order.
    order: Vec<String>,
    metadata: Option<Metadata>,
    settings: Settings,
}

impl Engine {
    /// Creates an empty engine configured from the environment.
    pub fn new() -> Self {
        Self::with_settings(Settings::from_env())
    }

    pub fn with_settings(settings: Settings) -> Self {
        Self {
            tasks: HashMap::new(),
            order: Vec::new(),
            metadata: None,
            settings,
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Registers a task without dependencies.
    pub fn task<F>(
        &mut self,
        name: impl Into<String>,
        description: impl Into<String>,
        action: F,
    ) -> &mut Self
    where
        F: Fn(&mut Context<'_>) -> TaskResult + 'static,
    {
        self.task_with_deps(name, description, Vec::<String>::new(), action)
    }

    /// Registers a task that runs after `dependencies`.
    ///
    /// Registering a name twice replaces the earlier task. The name keeps the
    /// position of its first registration in listings.
    pub fn task_with_deps<F, I, S>(
        &mut self,
        name: impl Into<String>,
        description: impl Into<String>,
        dependencies: I,
        action: F,
    ) -> &mut Self
    where
        F: Fn(&mut Context<'_>) -> TaskResult + 'static,
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let name = name.into();

        if name.is_empty() {
            tracing::warn!("ignoring task registered with an empty name");
            return self;
        }

        let task = Task {
            name: name.clone(),
            description: description.into(),
            dependencies: dependencies.into_iter().map(Into::into).collect(),
            action: Box::new(action),
        };

        if self.tasks.insert(name.clone(), task).is_some() {
            tracing::debug!(task = %name, "task replaced");
        } else {
            self.order.push(name);
        }

        self
    }

    pub fn get(&self, name: &str) -> Option<&Task> {
        self.tasks.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tasks.contains_key(name)
    }

    /// Registered tasks in registration order.
    pub fn tasks(&self) -> impl Iterator<Item = &Task> {
        self.order.iter().filter_map(|name| self.tasks.get(name))
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Loads project metadata, replacing any previously loaded record.
    pub fn load_metadata(&mut self, path: impl AsRef<Utf8Path>) -> Result<&Metadata, MetadataError> {
        let loaded = metadata::load(path)?;
        Ok(&*self.metadata.insert(loaded))
    }

    /// Writes the loaded metadata back to `path`.
    pub fn save_metadata(&self, path: impl AsRef<Utf8Path>) -> Result<(), MetadataError> {
        let info = self.metadata.as_ref().ok_or(MetadataError::Missing)?;
        metadata::save(path, info)
    }

    pub fn metadata(&self) -> Option<&Metadata> {
        self.metadata.as_ref()
    }

    pub fn metadata_mut(&mut self) -> Option<&mut Metadata> {
        self.metadata.as_mut()
    }

    pub fn set_metadata(&mut self, metadata: Metadata) {
        self.metadata = Some(metadata);
    }

    /// Runs `name` after all of its transitive dependencies.
    ///
    /// `args` are made available to every action through
    /// [`Context::args`]. Nothing is retried: the first unknown task, cycle or
    /// failing action ends the run. A later call starts from scratch, so a
    /// task that failed is attempted again.
    pub fn execute(&self, name: &str, args: &[String]) -> Result<(), EngineError> {
        if name.is_empty() {
            return Err(EngineError::InvalidName);
        }

        let mut context = Context::new(self, args.to_vec());
        let mut run = Run::default();

        run.visit(self, name, &mut |task| {
            let span = tracing::info_span!("task", name = %task.name);
            let _enter = span.enter();
            tracing::debug!("running action");

            (task.action)(&mut context).map_err(|err| EngineError::Task(task.name.clone(), err))
        })
    }

    /// Returns the order in which [`Engine::execute`] would run actions for
    /// `name`, without running any of them.
    pub fn plan(&self, name: &str) -> Result<Vec<String>, EngineError> {
        if name.is_empty() {
            return Err(EngineError::InvalidName);
        }

        let mut order = Vec::new();
        Run::default().visit(self, name, &mut |task| {
            order.push(task.name.clone());
            Ok(())
        })?;

        Ok(order)
    }

    /// Checks the whole registry for dependencies on unregistered tasks and
    /// for cycles.
    pub fn validate(&self) -> Result<(), EngineError> {
        for task in self.tasks() {
            if let Some(missing) = task.dependencies.iter().find(|dep| !self.contains(dep)) {
                return Err(EngineError::UnknownTask(missing.clone()));
            }
        }

        let graph = self.graph();
        petgraph::algo::toposort(&graph, None)
            .map_err(|cycle| EngineError::Cycle(graph[cycle.node_id()].to_string()))?;

        Ok(())
    }

    /// Interprets a command line of the form `<task> [args...]`.
    ///
    /// With no arguments, or with `help`, `--help` or `-h` when no task of that
    /// name exists, the task list is printed instead.
    pub fn run_args<I, S>(&self, args: I) -> Result<(), EngineError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut args = args.into_iter().map(Into::into);

        let Some(name) = args.next() else {
            print!("{}", self.help());
            return Ok(());
        };

        if matches!(name.as_str(), "help" | "--help" | "-h") && !self.contains(&name) {
            print!("{}", self.help());
            return Ok(());
        }

        let rest: Vec<String> = args.collect();
        self.execute(&name, &rest)
    }

    /// Like [`Engine::run_args`], reporting failures on stderr and mapping
    /// them to a failing exit code.
    pub fn dispatch<I, S>(&self, args: I) -> ExitCode
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        match self.run_args(args) {
            Ok(()) => ExitCode::SUCCESS,
            Err(err) => {
                eprintln!("{} {err}", crate::utils::error_label());
                if let EngineError::UnknownTask(_) = err {
                    eprint!("\n{}", self.help());
                }
                ExitCode::FAILURE
            }
        }
    }

    /// Usage text listing every task in registration order.
    pub fn help(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "Usage: bakehouse <task> [args]");
        let _ = writeln!(out);
        let _ = writeln!(out, "Available tasks:");

        if self.is_empty() {
            let _ = writeln!(out, "  (none)");
        }

        for task in self.tasks() {
            let _ = write!(out, "  {:<15} {}", task.name, task.description);
            if !task.dependencies.is_empty() {
                let _ = write!(out, " [after: {}]", task.dependencies.join(", "));
            }
            let _ = writeln!(out);
        }

        out
    }

    /// Projects the registry onto a graph with edges pointing from each
    /// dependency to its dependent. Unregistered dependencies become nodes
    /// too.
    fn graph(&self) -> Graph<&str, ()> {
        let mut graph = Graph::new();
        let mut nodes: HashMap<&str, NodeIndex> = HashMap::new();

        for name in &self.order {
            nodes.insert(name.as_str(), graph.add_node(name.as_str()));
        }

        for task in self.tasks() {
            let index = nodes[task.name.as_str()];
            for dependency in &task.dependencies {
                let source = *nodes
                    .entry(dependency.as_str())
                    .or_insert_with(|| graph.add_node(dependency.as_str()));
                graph.add_edge(source, index, ());
            }
        }

        graph
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for Engine {
    /// Renders the task graph as a Mermaid flowchart.
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let graph = self.graph();

        writeln!(f, "graph LR")?;

        for index in graph.node_indices() {
            let name = graph[index].replace('"', "\\\"");
            if self.contains(graph[index]) {
                writeln!(f, "    {}[\"{}\"]", index.index(), name)?;
            } else {
                writeln!(f, "    {}[\"{} (missing)\"]", index.index(), name)?;
            }
        }

        for edge in graph.raw_edges() {
            writeln!(
                f,
                "    {} --> {}",
                edge.source().index(),
                edge.target().index()
            )?;
        }

        Ok(())
    }
}

impl Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("tasks", &self.tasks().collect::<Vec<_>>())
            .field("metadata", &self.metadata)
            .field("settings", &self.settings)
            .finish()
    }
}

/// Bookkeeping for a single traversal.
#[derive(Default)]
struct Run {
    /// Tasks whose action already succeeded during this run.
    completed: HashSet<String>,
    /// Tasks on the current descent.
    entering: HashSet<String>,
}

type Visitor<'t, 'v> = dyn FnMut(&'t Task) -> Result<(), EngineError> + 'v;

impl Run {
    fn visit<'t>(
        &mut self,
        engine: &'t Engine,
        name: &str,
        ready: &mut Visitor<'t, '_>,
    ) -> Result<(), EngineError> {
        if self.completed.contains(name) {
            return Ok(());
        }

        if !self.entering.insert(name.to_string()) {
            tracing::debug!(task = name, "re-entered while resolving dependencies");
            return Err(EngineError::Cycle(name.to_string()));
        }

        let resolved = self.descend(engine, name, ready);
        self.entering.remove(name);
        let task = resolved?;

        ready(task)?;
        self.completed.insert(name.to_string());

        Ok(())
    }

    fn descend<'t>(
        &mut self,
        engine: &'t Engine,
        name: &str,
        ready: &mut Visitor<'t, '_>,
    ) -> Result<&'t Task, EngineError> {
        let task = engine
            .tasks
            .get(name)
            .ok_or_else(|| EngineError::UnknownTask(name.to_string()))?;

        for dependency in &task.dependencies {
            self.visit(engine, dependency, ready)?;
        }

        Ok(task)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    type Log = Rc<RefCell<Vec<String>>>;

    fn record(log: &Log, name: &'static str) -> impl Fn(&mut Context<'_>) -> TaskResult + 'static {
        let log = log.clone();
        move |_| {
            log.borrow_mut().push(name.to_string());
            Ok(())
        }
    }

    fn fail(log: &Log, name: &'static str) -> impl Fn(&mut Context<'_>) -> TaskResult + 'static {
        let log = log.clone();
        move |_| {
            log.borrow_mut().push(name.to_string());
            anyhow::bail!("{name} broke")
        }
    }

    #[test]
    fn registers_task() {
        let mut engine = Engine::new();
        engine.task("test-task", "A test task", |_| Ok(()));

        let task = engine.get("test-task").unwrap();
        assert_eq!(task.name(), "test-task");
        assert_eq!(task.description(), "A test task");
        assert!(task.dependencies().is_empty());
    }

    #[test]
    fn reregistering_replaces_and_keeps_position() {
        let log = Log::default();
        let mut engine = Engine::new();
        engine.task("a", "first", record(&log, "old"));
        engine.task("b", "second", record(&log, "b"));
        engine.task("a", "replaced", record(&log, "new"));

        let names: Vec<_> = engine.tasks().map(Task::name).collect();
        assert_eq!(names, ["a", "b"]);
        assert_eq!(engine.get("a").unwrap().description(), "replaced");

        engine.execute("a", &[]).unwrap();
        assert_eq!(*log.borrow(), ["new"]);
    }

    #[test]
    fn dependencies_run_first_in_declared_order() {
        let log = Log::default();
        let mut engine = Engine::new();
        // Registered out of order on purpose.
        engine.task_with_deps("t", "target", ["d1", "d2"], record(&log, "t"));
        engine.task("unrelated", "", record(&log, "unrelated"));
        engine.task("d2", "", record(&log, "d2"));
        engine.task("d1", "", record(&log, "d1"));

        engine.execute("t", &[]).unwrap();
        assert_eq!(*log.borrow(), ["d1", "d2", "t"]);
    }

    #[test]
    fn diamond_runs_shared_dependency_once() {
        let log = Log::default();
        let mut engine = Engine::new();
        engine.task_with_deps("a", "", ["b", "c"], record(&log, "a"));
        engine.task_with_deps("b", "", ["d"], record(&log, "b"));
        engine.task_with_deps("c", "", ["d"], record(&log, "c"));
        engine.task("d", "", record(&log, "d"));

        engine.execute("a", &[]).unwrap();
        assert_eq!(*log.borrow(), ["d", "b", "c", "a"]);
    }

    #[test]
    fn cycle_is_reported_and_nothing_runs() {
        let log = Log::default();
        let mut engine = Engine::new();
        engine.task_with_deps("a", "", ["b"], record(&log, "a"));
        engine.task_with_deps("b", "", ["a"], record(&log, "b"));

        for start in ["a", "b"] {
            match engine.execute(start, &[]) {
                Err(EngineError::Cycle(name)) => assert!(name == "a" || name == "b"),
                other => panic!("expected cycle, got {other:?}"),
            }
        }

        assert!(log.borrow().is_empty());
    }

    #[test]
    fn self_dependency_is_a_cycle() {
        let mut engine = Engine::new();
        engine.task_with_deps("loop", "", ["loop"], |_| Ok(()));

        assert!(matches!(engine.execute("loop", &[]), Err(EngineError::Cycle(n)) if n == "loop"));
    }

    #[test]
    fn cycle_elsewhere_does_not_block_unrelated_tasks() {
        let log = Log::default();
        let mut engine = Engine::new();
        engine.task_with_deps("x", "", ["y"], record(&log, "x"));
        engine.task_with_deps("y", "", ["x"], record(&log, "y"));
        engine.task("ok", "", record(&log, "ok"));

        engine.execute("ok", &[]).unwrap();
        assert_eq!(*log.borrow(), ["ok"]);
        assert!(matches!(engine.validate(), Err(EngineError::Cycle(_))));
    }

    #[test]
    fn unknown_task_runs_nothing() {
        let log = Log::default();
        let mut engine = Engine::new();
        engine.task("known", "", record(&log, "known"));

        match engine.execute("missing", &[]) {
            Err(EngineError::UnknownTask(name)) => assert_eq!(name, "missing"),
            other => panic!("expected unknown task, got {other:?}"),
        }
        assert!(log.borrow().is_empty());
    }

    #[test]
    fn unknown_dependency_is_resolved_lazily() {
        let log = Log::default();
        let mut engine = Engine::new();
        engine.task_with_deps("t", "", ["d1", "ghost"], record(&log, "t"));
        engine.task("d1", "", record(&log, "d1"));

        let err = engine.execute("t", &[]).unwrap_err();
        assert!(matches!(err, EngineError::UnknownTask(ref n) if n == "ghost"));
        assert_eq!(*log.borrow(), ["d1"]);

        engine.task("ghost", "", record(&log, "ghost"));
        log.borrow_mut().clear();
        engine.execute("t", &[]).unwrap();
        assert_eq!(*log.borrow(), ["d1", "ghost", "t"]);
    }

    #[test]
    fn first_failure_stops_the_run() {
        let log = Log::default();
        let mut engine = Engine::new();
        engine.task_with_deps("t", "", ["bad", "good"], record(&log, "t"));
        engine.task("bad", "", fail(&log, "bad"));
        engine.task("good", "", record(&log, "good"));

        let err = engine.execute("t", &[]).unwrap_err();
        assert_eq!(err.task(), Some("bad"));
        assert!(err.to_string().contains("bad broke"));
        assert_eq!(*log.borrow(), ["bad"]);
    }

    #[test]
    fn failed_task_is_attempted_again_by_a_later_execute() {
        let attempts = Rc::new(RefCell::new(0));
        let mut engine = Engine::new();

        let counter = attempts.clone();
        engine.task("flaky", "", move |_| {
            *counter.borrow_mut() += 1;
            if *counter.borrow() == 1 {
                anyhow::bail!("first attempt fails");
            }
            Ok(())
        });

        assert!(engine.execute("flaky", &[]).is_err());
        engine.execute("flaky", &[]).unwrap();
        assert_eq!(*attempts.borrow(), 2);
    }

    #[test]
    fn completed_tasks_reset_between_executes() {
        let log = Log::default();
        let mut engine = Engine::new();
        engine.task("once", "", record(&log, "once"));

        engine.execute("once", &[]).unwrap();
        engine.execute("once", &[]).unwrap();
        assert_eq!(*log.borrow(), ["once", "once"]);
    }

    #[test]
    fn args_reach_every_action() {
        let seen = Log::default();
        let mut engine = Engine::new();

        let s = seen.clone();
        engine.task("dep", "", move |ctx| {
            s.borrow_mut().extend(ctx.args().iter().cloned());
            Ok(())
        });
        let s = seen.clone();
        engine.task_with_deps("main", "", ["dep"], move |ctx| {
            s.borrow_mut().push(ctx.args().join(" "));
            Ok(())
        });

        engine
            .run_args(["main", "--fast", "x"].map(String::from))
            .unwrap();
        assert_eq!(*seen.borrow(), ["--fast", "x", "--fast x"]);
    }

    #[test]
    fn empty_names_are_rejected() {
        let mut engine = Engine::new();
        engine.task("", "nameless", |_| Ok(()));

        assert!(engine.is_empty());
        assert!(matches!(engine.execute("", &[]), Err(EngineError::InvalidName)));
        assert!(matches!(engine.plan(""), Err(EngineError::InvalidName)));
    }

    #[test]
    fn plan_matches_execution_order() {
        let mut engine = Engine::new();
        engine.task_with_deps("release", "", ["test", "build"], |_| Ok(()));
        engine.task_with_deps("build", "", ["fmt"], |_| Ok(()));
        engine.task_with_deps("test", "", ["fmt"], |_| Ok(()));
        engine.task("fmt", "", |_| Ok(()));

        assert_eq!(
            engine.plan("release").unwrap(),
            ["fmt", "test", "build", "release"]
        );
    }

    #[test]
    fn help_lists_tasks_in_registration_order() {
        let mut engine = Engine::new();
        engine.task("zeta", "Last letter", |_| Ok(()));
        engine.task_with_deps("alpha", "First letter", ["zeta"], |_| Ok(()));

        let help = engine.help();
        let zeta = help.find("zeta").unwrap();
        let alpha = help.find("alpha").unwrap();
        assert!(zeta < alpha);
        assert!(help.contains("  alpha           First letter [after: zeta]\n"));
    }

    #[test]
    fn help_is_reserved_only_when_unregistered() {
        let log = Log::default();
        let mut engine = Engine::new();
        engine.run_args(["help"]).unwrap();

        engine.task("help", "custom", record(&log, "help"));
        engine.run_args(["help"]).unwrap();
        assert_eq!(*log.borrow(), ["help"]);
    }

    #[test]
    fn validate_reports_missing_dependency() {
        let mut engine = Engine::new();
        engine.task_with_deps("a", "", ["nope"], |_| Ok(()));

        assert!(matches!(engine.validate(), Err(EngineError::UnknownTask(n)) if n == "nope"));
    }

    #[test]
    fn renders_mermaid_graph() {
        let mut engine = Engine::new();
        engine.task("build", "", |_| Ok(()));
        engine.task_with_deps("install", "", ["build", "fetch"], |_| Ok(()));

        let rendered = engine.to_string();
        assert_eq!(
            rendered,
            "graph LR\n    0[\"build\"]\n    1[\"install\"]\n    2[\"fetch (missing)\"]\n    0 --> 1\n    2 --> 1\n"
        );
    }

    #[test]
    fn metadata_save_requires_loaded_record() {
        let engine = Engine::new();
        assert!(matches!(
            engine.save_metadata("unused.piml"),
            Err(MetadataError::Missing)
        ));
    }
}
