//! Ping command - Schema bootstrap and backend connectivity check.

use std::sync::Arc;
use std::time::Instant;

use common::{AppResult, StoreConfig};

use crate::repository::RepositoryContext;
use crate::webhook::TracingTransport;

/// Execute the ping command
pub async fn execute(config: StoreConfig) -> AppResult<()> {
    let started = Instant::now();
    let ctx = RepositoryContext::connect(config, Arc::new(TracingTransport)).await?;
    ctx.ping().await?;

    tracing::info!(elapsed = ?started.elapsed(), "Document store and cache reachable");
    println!("ok");
    Ok(())
}
