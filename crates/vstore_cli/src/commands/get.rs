//! Get command implementation.

use super::{completion, connect, parse_ids, wait};
use std::time::Duration;
use vstore_sync_engine::ClientConfig;

/// Runs the get command.
pub async fn run(
    config: ClientConfig,
    ids: &[String],
    timeout: Duration,
) -> Result<(), Box<dyn std::error::Error>> {
    let ids = parse_ids(ids)?;
    let client = connect(config)?;
    let (callback, rx) = completion();
    client.multi_get(ids.clone(), callback);
    let ok = wait(rx, timeout).await?;
    client.shutdown();

    for id in &ids {
        match client.store().get(id) {
            Some(value) if ok => println!("{}", serde_json::to_string(&value)?),
            _ => println!("{id}: not found"),
        }
    }
    Ok(())
}
