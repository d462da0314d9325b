use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use nexus_domain::config::RuntimeConfig;
use nexus_gateway::{api, bootstrap};

#[derive(Parser)]
#[command(name = "nexus", about = "Nexus Core — multi-tenant agent runtime")]
struct Cli {
    /// Path to the runtime config file.
    #[arg(long, default_value = "nexus.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Start the gateway (default).
    Serve,
    /// Parse and print the effective configuration.
    ConfigShow,
    /// Print the version.
    Version,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let exit = match cli.command {
        None | Some(Command::Serve) => {
            init_tracing();
            match run_server(&cli.config).await {
                Ok(()) => 0,
                Err(e) => {
                    eprintln!("nexus: {e:#}");
                    1
                }
            }
        }
        Some(Command::ConfigShow) => match RuntimeConfig::load(&cli.config) {
            Ok(config) => {
                match toml::to_string_pretty(&config) {
                    Ok(rendered) => {
                        println!("{rendered}");
                        0
                    }
                    Err(e) => {
                        eprintln!("nexus: {e}");
                        1
                    }
                }
            }
            Err(e) => {
                // Validation problems exit 2, per the CLI contract.
                eprintln!("nexus: {e}");
                2
            }
        },
        Some(Command::Version) => {
            println!("nexus {}", env!("CARGO_PKG_VERSION"));
            0
        }
    };
    std::process::exit(exit);
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,nexus_gateway=debug")),
        )
        .json()
        .init();
}

async fn run_server(config_path: &PathBuf) -> anyhow::Result<()> {
    tracing::info!("Nexus Core starting");

    let config = RuntimeConfig::load(config_path).context("loading config")?;
    let bind_addr = config.server.bind_addr.clone();

    // Relational persistence is a future backend; the stores below are
    // file-backed regardless of DATABASE_URL.
    if std::env::var("DATABASE_URL").is_ok() {
        tracing::info!("DATABASE_URL is set but unused: state is file-backed this release");
    }

    let state = bootstrap::build_state(config).await?;
    bootstrap::spawn_background(&state).await;

    let app = api::router(state)
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .layer(tower_http::cors::CorsLayer::permissive())
        .into_make_service_with_connect_info::<std::net::SocketAddr>();

    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("binding to {bind_addr}"))?;
    tracing::info!(addr = %bind_addr, "Nexus listening");

    axum::serve(listener, app).await.context("axum server error")?;
    Ok(())
}
