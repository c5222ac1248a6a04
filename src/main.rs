use anyhow::Context;
use generation_ledger::{router, server::Server};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use clap::{Parser, ValueEnum};

use std::fmt::{Display, Formatter};

#[derive(Parser)]
#[command(version, about, long_about = None)]
struct Args {
    #[arg(long, default_value = "0.0.0.0")]
    addr: String,
    #[arg(long, default_value_t = 3000)]
    port: u16,
    #[arg(long, default_value = "info")]
    log_level: LogLevel,
}

#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, ValueEnum)]
enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl Display for LogLevel {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let level = match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        };
        write!(f, "{}", level)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize tracing with env filter, e.g. RUST_LOG=debug,tower_http=info
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("{},ort=warn,tower_http=info", args.log_level).into()),
        )
        .with(fmt::layer().compact())
        .init();

    let addr = format!("{}:{}", args.addr, args.port);
    let mut srv = Server::default();

    let api_router = router::get_router()
        .await
        .context("error creating router")?;
    srv.add_router("/api/v1", api_router);
    srv.serve(addr.clone())
        .await
        .with_context(|| format!("server on {} failed", addr))?;
    Ok(())
}
