use std::collections::HashMap;
use std::time::Instant;

use tokio::sync::Mutex;

use crate::HostError;
use splatpipe_transfer::tiers::TRANSFER_TIMEOUT;

/// Table of active download sessions, keyed by document identity.
///
/// One active session per document: a second concurrent start is
/// rejected, which is what stops a duplicate fallback request from
/// double-streaming a multi-gigabyte file. An entry older than the
/// transfer timeout is considered abandoned and may be replaced; there is
/// no explicit cancel message in the protocol.
#[derive(Default)]
pub struct SessionRegistry {
    active: Mutex<HashMap<String, Instant>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claims the document for a new session.
    pub async fn begin(&self, document_id: &str) -> Result<(), HostError> {
        let mut active = self.active.lock().await;
        if let Some(started) = active.get(document_id) {
            if started.elapsed() < TRANSFER_TIMEOUT {
                return Err(HostError::SessionActive(document_id.to_string()));
            }
            tracing::warn!(document_id, "replacing timed-out streaming session");
        }
        active.insert(document_id.to_string(), Instant::now());
        Ok(())
    }

    /// Releases the document after the session ends, however it ends.
    pub async fn finish(&self, document_id: &str) {
        self.active.lock().await.remove(document_id);
    }

    pub async fn is_active(&self, document_id: &str) -> bool {
        self.active.lock().await.contains_key(document_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn second_begin_for_same_document_is_rejected() {
        let registry = SessionRegistry::new();
        registry.begin("doc-1").await.unwrap();
        let err = registry.begin("doc-1").await.unwrap_err();
        assert!(matches!(err, HostError::SessionActive(id) if id == "doc-1"));
    }

    #[tokio::test]
    async fn different_documents_do_not_conflict() {
        let registry = SessionRegistry::new();
        registry.begin("doc-1").await.unwrap();
        registry.begin("doc-2").await.unwrap();
        assert!(registry.is_active("doc-1").await);
        assert!(registry.is_active("doc-2").await);
    }

    #[tokio::test]
    async fn finish_allows_a_new_session() {
        let registry = SessionRegistry::new();
        registry.begin("doc-1").await.unwrap();
        registry.finish("doc-1").await;
        assert!(!registry.is_active("doc-1").await);
        registry.begin("doc-1").await.unwrap();
    }
}
