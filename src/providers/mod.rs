//! Storage abstraction for append-only orchestration history.

use crate::errors::StoreError;
use crate::HistoryEvent;

/// Durable store for the per-orchestration event log.
///
/// The only guarantee the engine assumes is that an appended event is
/// visible to later loads for that id, in append order. Each append is a
/// single event and atomic; no multi-event transaction exists, so a failed
/// append never partially writes.
#[async_trait::async_trait]
pub trait HistoryStore: Send + Sync {
    /// Atomically append one event to the orchestration's log.
    async fn append_event(
        &self,
        orchestration_id: &str,
        event: HistoryEvent,
    ) -> Result<(), StoreError>;

    /// Load the full event sequence, ascending by `event_id`. An unknown
    /// id yields an empty sequence, not an error.
    async fn load_events(&self, orchestration_id: &str) -> Result<Vec<HistoryEvent>, StoreError>;

    /// Enumerate known orchestration ids.
    async fn list_orchestrations(&self) -> Vec<String>;

    /// Clear all stored data (test utility).
    async fn reset(&self);

    /// Pretty-printed dump of every stored log (test utility).
    async fn dump_all_pretty(&self) -> String {
        let mut out = String::new();
        for id in self.list_orchestrations().await {
            out.push_str(&format!("orchestration={id}\n"));
            if let Ok(events) = self.load_events(&id).await {
                for ev in events {
                    out.push_str(&format!("  #{} {:?}\n", ev.event_id, ev.kind));
                }
            }
        }
        out
    }
}

// Providers are datastores only; continuation scheduling is a separate
// collaborator (`crate::scheduler`).

/// In-memory provider for tests.
pub mod in_memory;

/// Filesystem-backed provider for local development.
pub mod fs;
