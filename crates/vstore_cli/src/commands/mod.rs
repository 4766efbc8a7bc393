//! CLI command implementations.

pub mod check_fragment;
pub mod get;
pub mod set;
pub mod watch;

use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::oneshot;
use vstore_core::{ValueId, ValueStore};
use vstore_sync_engine::{transport_for, ClientConfig, SyncClient, TokioExecutor};

/// Parses dotted ids given on the command line.
pub fn parse_ids(ids: &[String]) -> Result<Vec<ValueId>, Box<dyn std::error::Error>> {
    ids.iter()
        .map(|id| ValueId::parse(id).map_err(Into::into))
        .collect()
}

/// Builds a client on the current runtime and starts connecting.
pub fn connect(config: ClientConfig) -> Result<Arc<SyncClient>, Box<dyn std::error::Error>> {
    let transport = transport_for(&config.endpoint, Handle::current())?;
    let executor = Arc::new(TokioExecutor::current());
    let client = SyncClient::new(config, Arc::new(ValueStore::new()), transport, executor);
    client.start();
    Ok(client)
}

/// Returns a completion callback and the receiver its outcome arrives on.
pub fn completion() -> (impl FnOnce(bool) + Send + 'static, oneshot::Receiver<bool>) {
    let (tx, rx) = oneshot::channel();
    let callback = move |ok: bool| {
        let _ = tx.send(ok);
    };
    (callback, rx)
}

/// Waits for a request outcome.
pub async fn wait(
    rx: oneshot::Receiver<bool>,
    timeout: Duration,
) -> Result<bool, Box<dyn std::error::Error>> {
    match tokio::time::timeout(timeout, rx).await {
        Ok(Ok(ok)) => Ok(ok),
        Ok(Err(_)) => Err("request dropped before completion".into()),
        Err(_) => Err(format!("no answer from the authority within {timeout:?}").into()),
    }
}
