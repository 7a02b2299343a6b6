//! Gatehouse demo host
//!
//! Loads one config file, installs telemetry, seeds an in-memory credential
//! backend and serves an axum router behind the auth layer.
//!
//! ```text
//! gatehouse-demo --config demo/gatehouse.toml token alice wonderland
//! gatehouse-demo --config demo/gatehouse.toml serve --enforce
//! curl -i -H 'cookie: gatehouse_session=<token>' localhost:8080/admin/reports
//! ```

mod app;
mod settings;

use std::future::Future;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use gatehouse_auth::Authenticator;
use secrecy::SecretString;
use settings::Settings;
use tracing::info;

#[derive(Debug, Parser)]
#[command(name = "gatehouse-demo", version, about)]
struct Args {
    /// Config file (TOML, YAML or JSON); GATEHOUSE_* variables alone when omitted
    #[arg(short, long, global = true, env = "GATEHOUSE_DEMO_CONFIG")]
    config: Option<PathBuf>,

    /// Pretty logs instead of JSON
    #[arg(long, global = true)]
    pretty: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Serve the demo router
    Serve {
        /// Listen address
        #[arg(long, env = "GATEHOUSE_DEMO_BIND", default_value = "127.0.0.1:8080")]
        bind: SocketAddr,

        /// Reject requests that are not both authenticated and authorized
        #[arg(long)]
        enforce: bool,
    },
    /// Check a seeded user's password and print a session token
    Token { username: String, password: String },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let mut settings = Settings::load(args.config.as_deref())?;
    if args.pretty {
        settings.host.telemetry.json_logs = false;
    }

    let _telemetry = settings
        .host
        .telemetry
        .clone()
        .init()
        .context("initializing telemetry")?;
    gatehouse_auth::init_metrics();

    let backend = Arc::new(settings.seed_backend().await?);
    let authenticator = Arc::new(
        Authenticator::new(&settings.engine, backend).context("engine configuration rejected")?,
    );

    match args.command {
        Command::Serve { bind, enforce } => {
            run_with_shutdown(authenticator, bind, enforce, async {
                let _ = tokio::signal::ctrl_c().await;
            })
            .await
        }
        Command::Token { username, password } => {
            let session = authenticator
                .login(&username, &SecretString::new(password))
                .await
                .context("login failed")?;
            println!("{}", session.token);
            println!("Set-Cookie: {}", session.set_cookie);
            Ok(())
        }
    }
}

async fn run_with_shutdown<F>(
    authenticator: Arc<Authenticator>,
    bind: SocketAddr,
    enforce: bool,
    shutdown: F,
) -> anyhow::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let app = app::build_router(authenticator, enforce);

    let listener = tokio::net::TcpListener::bind(bind).await?;
    info!(addr = %bind, enforce, "gatehouse demo listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;
    Ok(())
}
