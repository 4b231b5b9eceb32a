#![cfg(bakehouse)]
#![crate_name = "recipe"]

use bakehouse::{Engine, TaskResult};

pub fn run(bake: &mut Engine) -> TaskResult {
    bake.load_metadata("recipe.piml")?;

    bake.task("tools", "Install the tools listed in recipe.piml", |ctx| {
        ctx.install_tools()?;
        Ok(())
    });

    bake.task("fmt", "Format the sources", |ctx| {
        ctx.run("cargo", ["fmt"])?;
        Ok(())
    });

    bake.task("test", "Run the test suite", |ctx| {
        ctx.run("cargo", ["test"])?;
        Ok(())
    });

    bake.task_with_deps("build", "Build a release binary", ["fmt"], |ctx| {
        let args = ctx.args().to_vec();
        ctx.run("cargo", ["build", "--release"].into_iter().map(String::from).chain(args))?;
        Ok(())
    });

    Ok(())
}
