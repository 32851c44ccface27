use std::collections::HashMap;
use std::sync::Mutex;

use super::HistoryStore;
use crate::errors::StoreError;
use crate::HistoryEvent;

/// In-memory history store. Logs are created implicitly on first append.
#[derive(Default)]
pub struct InMemoryHistoryStore {
    inner: Mutex<HashMap<String, Vec<HistoryEvent>>>,
}

#[async_trait::async_trait]
impl HistoryStore for InMemoryHistoryStore {
    async fn append_event(
        &self,
        orchestration_id: &str,
        event: HistoryEvent,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().unwrap();
        let events = inner.entry(orchestration_id.to_string()).or_default();
        if event.event_id != events.len() as u64 {
            return Err(StoreError::Corrupt {
                orchestration_id: orchestration_id.to_string(),
                message: format!(
                    "append out of order: event_id {} at position {}",
                    event.event_id,
                    events.len()
                ),
            });
        }
        events.push(event);
        Ok(())
    }

    async fn load_events(&self, orchestration_id: &str) -> Result<Vec<HistoryEvent>, StoreError> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .get(orchestration_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn list_orchestrations(&self) -> Vec<String> {
        self.inner.lock().unwrap().keys().cloned().collect()
    }

    async fn reset(&self) {
        self.inner.lock().unwrap().clear();
    }
}
