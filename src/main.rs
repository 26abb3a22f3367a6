use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::sync::Arc;

use waypoint::config::Config;
use waypoint::logging;
use waypoint::rest::{self, ApiDoc, ApiState};
use waypoint::services::Services;

#[derive(Parser)]
#[command(name = "waypoint")]
#[command(about = "Operator-guided multi-step session server")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Config file path
    #[arg(short, long, global = true)]
    config: Option<String>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the REST API server (default)
    Serve {
        /// Port to listen on (default: 7410)
        #[arg(short, long)]
        port: Option<u16>,

        /// Address to bind (default: 127.0.0.1)
        #[arg(long)]
        host: Option<String>,
    },

    /// Print the OpenAPI document
    Openapi {
        /// Emit YAML instead of JSON
        #[arg(long)]
        yaml: bool,
    },

    /// Print the effective configuration as TOML
    Config {
        /// Also write it to ./waypoint.toml
        #[arg(long)]
        save: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = Config::load(cli.config.as_deref())?;

    match cli.command {
        Some(Commands::Openapi { yaml }) => cmd_openapi(yaml),
        Some(Commands::Config { save }) => cmd_config(&config, save),
        Some(Commands::Serve { port, host }) => cmd_serve(config, port, host, cli.debug).await,
        None => cmd_serve(config, None, None, cli.debug).await,
    }
}

async fn cmd_serve(
    mut config: Config,
    port: Option<u16>,
    host: Option<String>,
    debug: bool,
) -> Result<()> {
    if let Some(port) = port {
        config.server.port = port;
    }
    if let Some(host) = host {
        config.server.host = host;
    }

    let logging_handle = logging::init_logging(&config, debug)?;
    if let Some(path) = &logging_handle.log_file_path {
        println!("Logging to {}", path.display());
    }

    let services = Services::open(&config)
        .await
        .context("Failed to open record store")?;
    if let Some(path) = &config.store.snapshot_path {
        tracing::info!(path = %path.display(), "record store snapshot enabled");
    }

    println!("Starting waypoint on http://{}", config.bind_addr());
    println!();
    println!("    GET  /api/v1/health                          Health check");
    println!("    GET  /api/v1/status                          Session counts");
    println!("    POST /api/v1/sessions                        Create or reuse a session");
    println!("    GET  /api/v1/sessions/:id/step/stream        Step changes (SSE)");
    println!("    POST /api/v1/sessions/:id/checkpoints        Open a checkpoint");
    println!("    POST /api/v1/sessions/:id/checkpoints/resolve  Resolve a checkpoint");
    println!("    GET  /swagger-ui                             API explorer");
    println!();

    let state = ApiState::new(Arc::new(services), config);
    rest::serve(state).await
}

fn cmd_openapi(yaml: bool) -> Result<()> {
    let doc = if yaml {
        ApiDoc::yaml().context("Failed to render OpenAPI YAML")?
    } else {
        ApiDoc::json().context("Failed to render OpenAPI JSON")?
    };
    println!("{doc}");
    Ok(())
}

fn cmd_config(config: &Config, save: bool) -> Result<()> {
    let rendered = toml::to_string_pretty(config).context("Failed to serialize config")?;
    println!("{rendered}");
    if save {
        let path = config.save()?;
        eprintln!("Saved to {}", path.display());
    }
    Ok(())
}
