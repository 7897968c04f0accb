//! Toolbridge CLI — load config, connect the fleet, answer queries from stdin.
//!
//! All orchestration logic lives in the library; this binary only wires the
//! pieces together and loops over input lines.

use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context};
use tokio::io::AsyncBufReadExt;

use toolbridge::config::{AppConfig, PolicyResolver};
use toolbridge::mcp_client::SessionRegistry;
use toolbridge::model::HttpModelClient;
use toolbridge::observer::TracingObserver;
use toolbridge::pipeline::QueryOrchestrator;

/// Initialize the tracing subscriber — structured logs to stderr, filtered
/// by `RUST_LOG` (default `toolbridge=info,warn`).
fn init_tracing() {
    use tracing_subscriber::fmt;
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("toolbridge=info,warn"));

    fmt::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .with_target(true)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let config_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("toolbridge.yaml"));

    let config = AppConfig::load(&config_path)
        .with_context(|| format!("loading {}", config_path.display()))?;

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        config = %config_path.display(),
        servers = config.servers.len(),
        "toolbridge starting"
    );

    let observer = Arc::new(TracingObserver);

    let mut registry = SessionRegistry::new();
    let failures = registry
        .connect_all(&config.servers, observer.as_ref())
        .await;
    for (name, error) in &failures {
        tracing::warn!(server = %name, error = %error, "server excluded from fleet");
    }

    let connected = registry.connected_servers();
    if connected.is_empty() {
        bail!("no tool servers connected; cannot accept queries");
    }
    tracing::info!(servers = ?connected, "fleet ready");

    let model = Arc::new(HttpModelClient::new(config.model.clone())?);
    let policies = PolicyResolver::new(config.tools.clone(), &config.servers);
    let orchestrator = QueryOrchestrator::new(model, policies)
        .with_observer(observer)
        .with_call_timeout(config.call_timeout_ms.map(Duration::from_millis));

    let mut lines = tokio::io::BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = std::io::stdout();

    loop {
        print!("> ");
        stdout.flush()?;

        let Some(line) = lines.next_line().await? else {
            break; // EOF
        };
        let query = line.trim();
        if query.is_empty() {
            continue;
        }
        if query == "exit" || query == "quit" {
            break;
        }

        match orchestrator.run(&registry, query).await {
            Ok(result) => {
                println!("{}", result.trace);
            }
            Err(e) => {
                eprintln!("error: {e}");
            }
        }
    }

    registry.close_all().await;
    Ok(())
}
