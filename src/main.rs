use anyhow::{Context, Result, anyhow};
use clap::{Parser, Subcommand};
use rowgate::{AppConfig, Input, Record, RecordStore, RecordType, Rowgate};
use serde_json::Value;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "rowgate")]
#[command(about = "Transactional record update endpoint")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Seed record 1 and run a single update through the pipeline
    Demo {
        #[arg(long, default_value_t = 1)]
        id: i64,
        #[arg(long, default_value = "test")]
        name: String,
        #[arg(long = "type", default_value = "bank_account")]
        record_type: String,
        /// Extra field merged into the record, as key=value
        #[arg(long = "detail")]
        details: Vec<String>,
    },
    /// Serve the HTTP API
    Serve,
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let config = AppConfig::from_env().context("failed to load configuration")?;

    match cli.command {
        Command::Demo {
            id,
            name,
            record_type,
            details,
        } => {
            let mut input = Input::new(id, name, record_type);
            for detail in &details {
                let (key, value) = parse_detail(detail)?;
                input = input.with_detail(key, value);
            }
            demo(&config, input).await
        }
        Command::Serve => serve(&config).await,
    }
}

async fn demo(config: &AppConfig, input: Input) -> Result<()> {
    let app = Rowgate::from_config(config)?;
    if app.store.get(1).await?.is_none() {
        app.store
            .seed(vec![Record::new(1, "seed", RecordType::BankAccount)])
            .await
            .context("failed to seed demo record")?;
    }

    let result = app.controller.handle(&input).await;
    println!("{}", serde_json::to_string_pretty(&result)?);
    println!("status: {}", result.status());
    Ok(())
}

async fn serve(config: &AppConfig) -> Result<()> {
    let app = Rowgate::from_config(config)?;
    let router = app.router();
    let listener = tokio::net::TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.bind_addr))?;

    info!(
        bind_addr = %config.bind_addr,
        durable = config.data_dir.is_some(),
        gateway = config.gateway_url.as_deref().unwrap_or("fixed"),
        "rowgate started"
    );

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    if let Err(err) = app.store.checkpoint().await {
        error!(error = %err, "final checkpoint failed");
    }
    Ok(())
}

/// `key=value`; the value is read as JSON when it parses, as a string otherwise.
fn parse_detail(raw: &str) -> Result<(String, Value)> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| anyhow!("detail '{}' must look like key=value", raw))?;
    if key.is_empty() {
        return Err(anyhow!("detail '{}' has an empty key", raw));
    }
    let value = serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.to_string()));
    Ok((key.to_string(), value))
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("rowgate=info,tower_http=info")),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            error!(error = %err, "unable to install ctrl+c handler");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};

        match signal(SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                error!(error = %err, "unable to install sigterm handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
