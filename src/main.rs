//! inkpeek - local preview server for e-ink display templates.

#![allow(dead_code)]

mod actor;
mod cli;
mod config;
mod context;
mod error;
mod logger;
mod reload;
mod render;
mod shutdown;
mod view;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::{ColorChoice, Parser};

use cli::{Cli, Commands};
use config::{ProjectConfig, ProjectPaths};
use context::{Collaborators, Context, SampleDataSource, UnzipExtractor};
use render::{ChromiumEngine, MissingEngine, RenderEngine, TemplateResolver};

fn main() -> Result<()> {
    // Setup global Ctrl+C handler (before any blocking operations)
    shutdown::setup_shutdown_handler()?;

    let cli = Cli::parse();

    // Set global color override based on CLI option
    match cli.color {
        ColorChoice::Always => owo_colors::set_override(true),
        ColorChoice::Never => owo_colors::set_override(false),
        ColorChoice::Auto => {} // owo-colors auto-detects TTY
    }
    logger::set_verbose(cli.verbose);

    let paths = ProjectPaths::new(cli.dir.clone());
    let config = ProjectConfig::load(&paths.config_file())?;
    let context = Arc::new(Context::open(paths.clone(), build_collaborators(&paths, &config))?);

    match cli.command {
        Commands::Serve {
            interface,
            port,
            no_watch,
        } => {
            let interface = interface.unwrap_or(config.serve.interface);
            let port = port.unwrap_or(config.serve.port);
            cli::serve::run(context, interface, port, !no_watch)
        }
        Commands::Build { image } => cli::build::run(&context, image),
    }
}

/// Wire up the default collaborator set for a project.
///
/// A missing browser is not fatal: markup preview and polling keep working,
/// only PNG rendering errors until an engine is installed.
fn build_collaborators(paths: &ProjectPaths, config: &ProjectConfig) -> Collaborators {
    let timeout = Duration::from_secs(config.render.timeout_secs);
    let engine: Box<dyn RenderEngine> =
        match ChromiumEngine::detect(config.render.engine.as_deref(), timeout) {
            Ok(engine) => Box::new(engine),
            Err(e) => {
                log!("error"; "{}", e);
                Box::new(MissingEngine::new(e.to_string()))
            }
        };

    Collaborators {
        source: Box::new(SampleDataSource::new(paths.sample_data())),
        resolver: Box::new(TemplateResolver::new(paths.clone())),
        engine,
        extractor: Box::new(UnzipExtractor),
    }
}
