mod cli;

use std::fs::OpenOptions;
use std::path::PathBuf;

use anyhow::{Result, anyhow};
use cli::{Cli, Commands};
use labelsmith_rs::{FeatureCatalog, FeatureCategory, FeaturePipeline};
use tracing_appender::non_blocking;
use tracing_subscriber::{EnvFilter, prelude::*};

fn init_tracing(log_file: Option<PathBuf>) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let stdout_layer = tracing_subscriber::fmt::layer().with_writer(std::io::stdout);

    if let Some(path) = log_file {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|err| anyhow!("failed to create log directory {parent:?}: {err}"))?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|err| anyhow!("failed to open log file {path:?}: {err}"))?;
        let (non_blocking_writer, guard) = non_blocking(file);
        // The writer thread flushes only while the guard lives.
        let _guard = Box::leak(Box::new(guard));
        let file_layer = tracing_subscriber::fmt::layer()
            .with_ansi(false)
            .with_writer(non_blocking_writer);
        tracing_subscriber::registry()
            .with(filter)
            .with(stdout_layer)
            .with(file_layer)
            .try_init()
            .map_err(|err| anyhow!("failed to initialize tracing: {err}"))
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(stdout_layer)
            .try_init()
            .map_err(|err| anyhow!("failed to initialize tracing: {err}"))
    }
}

fn log_invocation(log_file: Option<&PathBuf>) {
    let cwd = std::env::current_dir().ok();
    let argv: Vec<String> = std::env::args_os()
        .map(|arg| arg.to_string_lossy().into_owned())
        .collect();

    tracing::info!("==================== new labelsmith_cli run ====================");
    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        cwd = ?cwd,
        log_file = ?log_file,
        argv = ?argv,
        "labelsmith_cli invoked"
    );
    if argv.len() >= 2 {
        tracing::info!(
            "cargo_repro_command=cargo run --release -p labelsmith_cli -- {}",
            argv[1..].join(" ")
        );
    }
}

fn print_catalog(catalog: &FeatureCatalog) {
    println!("{:<20} {:<16} note", "column", "category");
    for descriptor in &catalog.descriptors {
        let category = match descriptor.category {
            FeatureCategory::Causal => "feature",
            FeatureCategory::ForwardLooking => "forward-looking",
        };
        println!("{:<20} {:<16} {}", descriptor.name, category, descriptor.note);
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Build(args) => {
            let no_file_log = args.no_file_log;
            let config = args.into_config()?;
            let log_file = if no_file_log {
                None
            } else {
                Some(config.output_dir.join("labelsmith.log"))
            };
            init_tracing(log_file.clone())?;
            log_invocation(log_file.as_ref());

            let report = FeaturePipeline::new(config)?.run()?;
            for path in &report.outputs {
                println!("Saved: {}", path.display());
            }
            if let Some(summary) = &report.summary {
                println!("rows={} | entities={}", summary.rows, summary.entities);
            }
            Ok(())
        }
        Commands::Columns(args) => {
            let config = args.into_config()?;
            print_catalog(&FeatureCatalog::for_config(&config));
            Ok(())
        }
    }
}
