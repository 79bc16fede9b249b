//! CLI for level import/export/inspection and for driving a fixed number of
//! frames against a loaded level, for manual testing and benchmarking.

mod cli;

use anyhow::{Context, Result};
use clap::Parser;
use cli::{Cli, Commands};
use ecdb_core::config::EcdbConfig;
use ecdb_runtime::Server;

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Inspect { path } => inspect(&path),
        Commands::Run { level, frames, out } => run(&level, frames, out.as_deref()),
    }
}

fn inspect(path: &std::path::Path) -> Result<()> {
    let container = ecdb_core::level::read_level_file(path)
        .with_context(|| format!("reading level file {}", path.display()))?
        .with_context(|| format!("level file {} does not exist", path.display()))?;

    println!("schema version: {}", container.schema.version);
    println!("components: {}", container.schema.components.len());
    for component in &container.schema.components {
        println!("  {} ({} bytes)", component.name, component.type_size);
    }
    let total_rows: u32 = container.groups.iter().map(|g| g.num_rows).sum();
    println!("groups: {} ({} rows total)", container.groups.len(), total_rows);
    Ok(())
}

fn run(level: &std::path::Path, frames: u32, out: Option<&std::path::Path>) -> Result<()> {
    let mut server = Server::new(EcdbConfig::default());
    let id = server.create_world().context("creating world")?;
    let world = server.world_mut(id).expect("just-created world is present");

    let entities = world
        .preload_level(level)
        .with_context(|| format!("preloading level {}", level.display()))?
        .with_context(|| format!("level file {} does not exist", level.display()))?;
    tracing::info!(count = entities.len(), "preloaded entities");

    for frame in 0..frames {
        server.run_frame();
        tracing::debug!(frame, "frame complete");
    }

    if let Some(out) = out {
        let world = server.world(id).expect("world still present after run");
        world
            .export_level(out)
            .with_context(|| format!("exporting level to {}", out.display()))?;
        println!("wrote {}", out.display());
    }

    println!("ran {frames} frames over {} entities", entities.len());
    Ok(())
}
