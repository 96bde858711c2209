// Source trait for live update delivery
use crate::domain::events::LiveUpdateEvent;
use async_trait::async_trait;
use tokio::sync::mpsc;

#[async_trait]
pub trait LiveUpdateSource: Send + Sync {
    /// Deliver decoded events into `tx` in arrival order until the receiver
    /// is dropped. Malformed messages are dropped by the source.
    async fn run(&self, tx: mpsc::Sender<LiveUpdateEvent>) -> anyhow::Result<()>;
}
