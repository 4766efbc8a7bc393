//! Watch command implementation.

use super::{connect, parse_ids};
use tracing::{info, warn};
use vstore_core::StoreEvent;
use vstore_sync_engine::ClientConfig;

fn log_event(event: &StoreEvent) {
    match event {
        StoreEvent::Added { value, provenance } => {
            info!(id = %value.id, data = ?value.data, ?provenance, "added");
        }
        StoreEvent::Changed { value, provenance } => {
            info!(id = %value.id, data = ?value.data, ?provenance, "changed");
        }
        StoreEvent::Removed { id, provenance, .. } => {
            info!(id = %id, ?provenance, "removed");
        }
        StoreEvent::ContainerAdded {
            container,
            key,
            provenance,
        } => {
            info!(container = %container, key = %key, ?provenance, "key added");
        }
        StoreEvent::ContainerRemoved {
            container,
            key,
            provenance,
        } => {
            info!(container = %container, key = %key, ?provenance, "key removed");
        }
    }
}

fn on_subscribed(ok: bool) {
    if ok {
        info!("subscribed");
    } else {
        warn!("subscription refused");
    }
}

/// Runs the watch command until Ctrl-C.
pub async fn run(
    config: ClientConfig,
    subscribe_all: bool,
    ids: &[String],
) -> Result<(), Box<dyn std::error::Error>> {
    let ids = parse_ids(ids)?;
    let client = connect(config)?;
    let _log = client.store().observe(log_event);

    if subscribe_all {
        client.subscribe_all(on_subscribed);
    } else if !ids.is_empty() {
        client.subscribe_with_completion(ids, on_subscribed);
    } else {
        warn!("nothing to subscribe to; logging local changes only");
    }

    tokio::signal::ctrl_c().await?;
    client.shutdown();
    Ok(())
}
