//! nv-exporter binary
//!
//! Logs in to the controller, runs federation enrollment once, then stays
//! up until a shutdown signal and logs out.

use clap::Parser;
use tracing::{error, info};

use nv_exporter::{run_enrollment, AuthSession, ProcessEnv};

#[derive(Parser, Debug)]
#[command(name = "nv-exporter")]
#[command(about = "Security platform metrics exporter")]
struct Cli {
    /// Exporter port
    #[arg(short = 'e', long, env = "EXPORTER_PORT")]
    port: u16,

    /// Controller API service (host:port)
    #[arg(short, long, env = "CTRL_API_SERVICE")]
    server: String,

    /// Controller user name
    #[arg(short, long, env = "CTRL_USERNAME", default_value = "admin")]
    username: String,

    /// Controller user password
    #[arg(short, long, env = "CTRL_PASSWORD", default_value = "admin", hide_env_values = true)]
    password: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("nv_exporter={},info", cli.log_level).into()),
        )
        .init();

    let session = AuthSession::new(&cli.server, cli.username, cli.password)?;
    if let Err(e) = session.login().await {
        error!(error = %e, "Login to controller failed");
        std::process::exit(1);
    }

    let joined = run_enrollment(&ProcessEnv, &session).await;
    info!(joined, "Federation enrollment finished");

    info!(port = cli.port, "Exporter running, waiting for shutdown signal");
    tokio::signal::ctrl_c().await?;

    session.logout().await;
    Ok(())
}
