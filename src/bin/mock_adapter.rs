//! Mock DAP adapter
//!
//! Serves the baseline request vocabulary over stdio (or one TCP client)
//! backed by the in-memory engine, for exercising DAP clients without a
//! real debugger.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio::net::TcpListener;

use dap_session::common::{config::SessionConfig, logging};
use dap_session::engine::FrameId;
use dap_session::requests::register_default_handlers;
use dap_session::session::repl::ReplMode;
use dap_session::testing::{MockEngine, MockValue};
use dap_session::{Result, Session};

#[derive(Parser)]
#[command(name = "mock-adapter", about = "DAP adapter backed by an in-memory engine")]
#[command(version, long_about = None)]
struct Cli {
    /// How debug console input is interpreted
    #[arg(long, value_parser = parse_repl_mode)]
    repl_mode: Option<ReplMode>,

    /// Configuration file (defaults to the platform config directory)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Log file (defaults to the platform data directory)
    #[arg(long)]
    log_file: Option<PathBuf>,

    /// Serve one client on this TCP port instead of stdio
    #[arg(long)]
    port: Option<u16>,
}

fn parse_repl_mode(value: &str) -> std::result::Result<ReplMode, String> {
    value.parse().map_err(|e: dap_session::Error| e.to_string())
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let log_file = cli.log_file.clone().or_else(logging::default_log_path);
    let _guard = logging::init(log_file.as_deref());

    if let Err(e) = run(cli).await {
        tracing::error!("{}", e);
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let mut config = match &cli.config {
        Some(path) => SessionConfig::from_path(path)?,
        None => SessionConfig::load()?,
    };
    if let Some(mode) = cli.repl_mode {
        config.repl_mode = mode;
    }

    let engine = Arc::new(sample_engine());

    match cli.port {
        Some(port) => {
            let listener = TcpListener::bind(("127.0.0.1", port)).await?;
            tracing::info!("Listening on {}", listener.local_addr()?);
            let (stream, peer) = listener.accept().await?;
            tracing::info!("Client connected from {}", peer);

            let (reader, writer) = stream.into_split();
            serve(Session::new(reader, writer, engine, config)).await
        }
        None => {
            tracing::info!("Serving on stdio");
            serve(Session::new(tokio::io::stdin(), tokio::io::stdout(), engine, config)).await
        }
    }
}

async fn serve(mut session: Session<MockEngine>) -> Result<()> {
    register_default_handlers(&mut session);
    session.run().await
}

/// Engine with one thread and a small set of variables to browse
fn sample_engine() -> MockEngine {
    const MAIN_FRAME: FrameId = 1;

    let engine = MockEngine::new();
    engine.set_locals(
        MAIN_FRAME,
        vec![
            MockValue::scalar("argc", "1", "int"),
            MockValue::scalar("argv", "0x00007ffeefbff5a8", "char **"),
            MockValue::aggregate(
                "point",
                "Point",
                vec![
                    MockValue::scalar("x", "10", "int"),
                    MockValue::scalar("y", "20", "int"),
                ],
            ),
        ],
    );
    engine.set_globals(vec![MockValue::scalar("counter", "0", "unsigned int")]);
    engine.set_registers(vec![
        MockValue::scalar("pc", "0x0000000100003f50", "unsigned long"),
        MockValue::scalar("sp", "0x00007ffeefbff580", "unsigned long"),
    ]);
    engine
}
