use crate::storage::{BlockedCallRecord, CallLogStore};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Receiver of blocked-call records from the screening path.
///
/// `record` must return immediately and must not fail; persistence problems
/// are the sink's own business.
pub trait BlockedCallSink: Send + Sync {
    fn record(&self, record: BlockedCallRecord);
}

enum LogMessage {
    Record(BlockedCallRecord),
    Shutdown,
}

/// Queues records for a background worker that appends them to the call log.
#[derive(Clone)]
pub struct CallLogSink {
    sender: mpsc::UnboundedSender<LogMessage>,
    worker: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl CallLogSink {
    /// Starts the writer task. Must be called from within a tokio runtime.
    pub fn spawn(store: CallLogStore) -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        let worker = tokio::spawn(Self::log_worker(store, receiver));
        Self {
            sender,
            worker: Arc::new(Mutex::new(Some(worker))),
        }
    }

    /// Writes everything queued so far, then stops the worker and waits for it.
    ///
    /// Any clone may call this; later calls return at once. Records sent after
    /// shutdown are dropped with a warning.
    pub async fn shutdown(&self) {
        let worker = self
            .worker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let Some(worker) = worker else {
            return;
        };

        if self.sender.send(LogMessage::Shutdown).is_err() {
            log::debug!("Call log worker already stopped");
        }
        if let Err(e) = worker.await {
            log::error!("Call log worker failed: {e}");
        }
    }

    async fn log_worker(store: CallLogStore, mut receiver: mpsc::UnboundedReceiver<LogMessage>) {
        while let Some(message) = receiver.recv().await {
            match message {
                LogMessage::Record(record) => Self::write(&store, record).await,
                LogMessage::Shutdown => break,
            }
        }
        log::debug!("Call log worker stopped");
    }

    async fn write(store: &CallLogStore, record: BlockedCallRecord) {
        let store = store.clone();
        let number = record.phone_number.clone();
        match tokio::task::spawn_blocking(move || store.insert(&record)).await {
            Ok(Ok(id)) => log::debug!("Logged blocked call {number} as #{id}"),
            Ok(Err(e)) => log::error!("Failed to log blocked call: {e:#}"),
            Err(e) => log::error!("Call log writer task failed: {e}"),
        }
    }
}

impl BlockedCallSink for CallLogSink {
    fn record(&self, record: BlockedCallRecord) {
        if self.sender.send(LogMessage::Record(record)).is_err() {
            log::warn!("Call log worker stopped, blocked call record dropped");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::Connection;

    fn temp_db(name: &str) -> std::path::PathBuf {
        std::env::temp_dir().join(format!("callscreen-{name}-{}.db", std::process::id()))
    }

    #[tokio::test]
    async fn test_shutdown_flushes_queued_records() {
        let store = CallLogStore::in_memory().unwrap();
        let sink = CallLogSink::spawn(store.clone());
        let screening_side = sink.clone();

        screening_side.record(BlockedCallRecord::new("+48221234567", "+48", None));
        screening_side.record(BlockedCallRecord::new(
            "+15551234567",
            "Block All Calls",
            Some("Alice".to_string()),
        ));

        // The screening side still holds a clone; shutdown must not wait on it.
        sink.shutdown().await;

        assert_eq!(store.count().unwrap(), 2);
        let recent = store.recent(10).unwrap();
        assert!(recent.iter().any(|r| r.contact_name.as_deref() == Some("Alice")));

        sink.shutdown().await;
    }

    #[tokio::test]
    async fn test_record_after_shutdown_is_dropped() {
        let store = CallLogStore::in_memory().unwrap();
        let sink = CallLogSink::spawn(store.clone());
        sink.shutdown().await;

        sink.record(BlockedCallRecord::new("+48221234567", "+48", None));
        assert_eq!(store.count().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_worker_drains_when_every_sink_is_dropped() {
        let store = CallLogStore::in_memory().unwrap();
        let sink = CallLogSink::spawn(store.clone());
        let worker = sink.worker.lock().unwrap().take().unwrap();

        sink.record(BlockedCallRecord::new("+48221234567", "+48", None));
        drop(sink);
        worker.await.unwrap();

        assert_eq!(store.count().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_storage_failure_is_logged_and_worker_keeps_going() {
        let path = temp_db("sink-failure");
        let _ = std::fs::remove_file(&path);
        let db_path = path.to_string_lossy().to_string();

        let store = CallLogStore::open(&db_path).unwrap();
        let sink = CallLogSink::spawn(store.clone());

        Connection::open(&path)
            .unwrap()
            .execute("DROP TABLE blocked_calls", [])
            .unwrap();

        sink.record(BlockedCallRecord::new("+48221234567", "+48", None));
        sink.record(BlockedCallRecord::new("+44207123456", "International", None));

        // Both inserts fail; the worker still reaches the shutdown marker.
        tokio::time::timeout(std::time::Duration::from_secs(5), sink.shutdown())
            .await
            .unwrap();

        assert!(store.count().is_err());
        drop(store);
        std::fs::remove_file(&path).unwrap();
    }
}
