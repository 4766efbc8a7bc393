//! Set command implementation.

use super::{completion, connect, wait};
use std::time::Duration;
use vstore_core::{Data, Value, ValueId};
use vstore_sync_engine::ClientConfig;

/// Runs the set command.
pub async fn run(
    config: ClientConfig,
    id: &str,
    data: &str,
    timeout: Duration,
) -> Result<(), Box<dyn std::error::Error>> {
    let id = ValueId::parse(id)?;
    let data: Data = serde_json::from_str(data)?;
    let client = connect(config)?;
    let (callback, rx) = completion();
    client.multi_set(vec![Value::new(id.clone(), data)], callback);
    let ok = wait(rx, timeout).await?;
    client.shutdown();

    if !ok {
        return Err(format!("authority refused the write to {id}").into());
    }
    println!("{id}: written");
    Ok(())
}
