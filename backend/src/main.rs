//! zmdata - JSON-lines request runner
//!
//! Reads one mediator request per line from stdin (or `--request <file>`)
//! and writes one result per line to stdout:
//! - `{"ok": <outcome>}` on success
//! - `{"error": {"kind": "...", "message": "..."}}` on failure
//!
//! Logs go to stderr as JSON.

mod cli;
mod retry;

use std::sync::Arc;

use anyhow::{Context, Result};
use serde_json::{Value as JsonValue, json};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use zmdata::backend::SqliteBackend;
use zmdata::config::Config;
use zmdata::mediator::{Mediator, Operation, Request};
use zmdata::schema::zoneminder;

use crate::cli::CliOptions;
use crate::retry::{RetryConfig, retry_async};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "zmdata=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
        .init();

    let options = CliOptions::from_args();
    let registry = Arc::new(zoneminder::registry().context("Invalid entity table")?);

    if options.list_entities {
        for name in registry.names() {
            println!("{}", name);
        }
        return Ok(());
    }
    if let Some(name) = &options.describe {
        let entity = registry
            .describe(name)
            .with_context(|| format!("Cannot describe {}", name))?;
        println!("{}", serde_json::to_string_pretty(entity.as_ref())?);
        return Ok(());
    }

    let config = Config::from_env()?;
    tracing::info!(database = %config.database_url, "Starting zmdata");

    let backend = SqliteBackend::connect(&config.database_url, config.max_connections)
        .await
        .context("Failed to connect to database")?;
    backend
        .ensure_schema(&registry)
        .await
        .context("Failed to create tables")?;
    tracing::info!("Database connected");

    let mediator = Mediator::new(registry, Arc::new(backend)).with_limits(config.limits);
    let retry = RetryConfig::with_attempts(config.retry_attempts);

    let input: Box<dyn AsyncBufRead + Unpin> = match &options.request_file {
        Some(path) => {
            let file = tokio::fs::File::open(path)
                .await
                .with_context(|| format!("Failed to open {}", path.display()))?;
            Box::new(BufReader::new(file))
        }
        None => Box::new(BufReader::new(tokio::io::stdin())),
    };

    let mut lines = input.lines();
    let mut stdout = tokio::io::stdout();
    let mut handled = 0u64;
    while let Some(line) = lines.next_line().await.context("Failed to read request")? {
        if line.trim().is_empty() {
            continue;
        }
        let response = handle_line(&mediator, &retry, &line).await;
        let mut out = serde_json::to_string(&response)?;
        out.push('\n');
        stdout.write_all(out.as_bytes()).await?;
        stdout.flush().await?;
        handled += 1;
    }

    tracing::info!(requests = handled, "Input exhausted");
    Ok(())
}

/// Run one request line and render its result
async fn handle_line(mediator: &Mediator, retry: &RetryConfig, line: &str) -> JsonValue {
    let request: Request = match serde_json::from_str(line) {
        Ok(request) => request,
        Err(e) => {
            return json!({"error": {"kind": "InvalidRequest", "message": e.to_string()}});
        }
    };

    let read_only = Operation::from_parts(&request.operation, request.args.clone())
        .map(|op| op.is_read_only())
        .unwrap_or(false);

    let result = if read_only {
        retry_async(|| mediator.execute(request.clone()), retry, &request.operation).await
    } else {
        mediator.execute(request).await
    };

    match result {
        Ok(outcome) => json!({ "ok": outcome }),
        Err(e) => json!({"error": {"kind": e.kind(), "message": e.to_string()}}),
    }
}
