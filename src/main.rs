//! parlgraph CLI entry point.

use anyhow::Result;
use clap::Parser;
use parlgraph::cli::{commands, Cli, Commands};
use parlgraph::config::Settings;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::registry()
        .with(EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| format!("parlgraph={}", log_level)),
        ))
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    // Load configuration
    let config_path = cli.config.as_deref().map(Settings::expand_path);
    let settings = Settings::load_from(config_path.as_ref())?;

    // Ensure data directory exists
    std::fs::create_dir_all(settings.data_dir())?;

    // Execute command
    match &cli.command {
        Commands::Ingest { source, ids, force } => {
            commands::run_ingest(source, ids, *force, settings).await?;
        }

        Commands::Build { ids, force } => {
            commands::run_build(ids, *force, settings).await?;
        }

        Commands::Search {
            query,
            limit,
            from,
            to,
            ministry,
            keyword,
        } => {
            commands::run_search(
                query,
                *limit,
                from.as_deref(),
                to.as_deref(),
                ministry.as_deref(),
                *keyword,
                settings,
            )
            .await?;
        }

        Commands::Lookup { entity_type, label } => {
            commands::run_lookup(entity_type, label, settings).await?;
        }

        Commands::Export {
            video_id,
            output,
            format,
        } => {
            commands::run_export(video_id, output.clone(), format, settings).await?;
        }

        Commands::List => {
            commands::run_list(settings).await?;
        }

        Commands::Stats => {
            commands::run_stats(settings).await?;
        }

        Commands::Reembed { yes } => {
            commands::run_reembed(*yes, settings).await?;
        }

        Commands::Serve { host, port } => {
            commands::run_serve(host, *port, settings).await?;
        }

        Commands::Config { action } => {
            commands::run_config(action, settings, config_path)?;
        }
    }

    Ok(())
}
