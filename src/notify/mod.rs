//! Side effects that run once a record update has durably committed.

use crate::core::{Input, Record, RecordId};
use crate::storage::RecordStore;
use crate::transaction::CommitHook;
use crate::transaction::manager::panic_message;
use async_trait::async_trait;
use futures::FutureExt;
use serde::Serialize;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::{error, info};

/// What a listener learns about a committed update.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Notification {
    /// Committed state, read back after the commit.
    pub record: Record,
    pub input_id: RecordId,
    pub input_name: String,
}

#[async_trait]
pub trait CommitListener: Send + Sync {
    async fn on_commit(&self, notification: &Notification) -> anyhow::Result<()>;
}

/// Listener that only writes the notification to the log.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingListener;

#[async_trait]
impl CommitListener for LoggingListener {
    async fn on_commit(&self, notification: &Notification) -> anyhow::Result<()> {
        info!(
            record_id = notification.record.id,
            version = notification.record.version,
            input_name = %notification.input_name,
            "record committed"
        );
        Ok(())
    }
}

/// Builds the hook the pipeline registers with `Transaction::on_commit`.
///
/// The notifier only reads. Failures inside it are logged and never reach the
/// caller of the pipeline.
#[derive(Clone)]
pub struct PostCommitNotifier {
    store: Arc<dyn RecordStore>,
    listeners: Vec<Arc<dyn CommitListener>>,
}

impl PostCommitNotifier {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self {
            store,
            listeners: Vec::new(),
        }
    }

    pub fn with_listener(mut self, listener: Arc<dyn CommitListener>) -> Self {
        self.listeners.push(listener);
        self
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    pub fn hook(&self, record_id: RecordId, input: &Input) -> CommitHook {
        let notifier = self.clone();
        let input_id = input.id;
        let input_name = input.name.clone();
        Box::new(move || {
            async move { notifier.notify(record_id, input_id, input_name).await }.boxed()
        })
    }

    async fn notify(&self, record_id: RecordId, input_id: RecordId, input_name: String) {
        let record = match self.store.get(record_id).await {
            Ok(Some(record)) => record,
            Ok(None) => {
                error!(record_id, "committed record vanished before notification");
                return;
            }
            Err(err) => {
                error!(record_id, error = %err, "failed to re-read committed record");
                return;
            }
        };

        info!(
            record_id,
            data = %serde_json::Value::Object(record.to_payload()),
            "Post-commit notification for object {}",
            record_id
        );

        let notification = Notification {
            record,
            input_id,
            input_name,
        };
        for listener in &self.listeners {
            match AssertUnwindSafe(listener.on_commit(&notification))
                .catch_unwind()
                .await
            {
                Ok(Ok(())) => {}
                Ok(Err(err)) => error!(record_id, error = %err, "commit listener failed"),
                Err(panic) => {
                    error!(record_id, panic = %panic_message(panic.as_ref()), "commit listener panicked")
                }
            }
        }
    }
}

impl std::fmt::Debug for PostCommitNotifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PostCommitNotifier")
            .field("listeners", &self.listeners.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::RecordType;
    use crate::storage::InMemoryRecordStore;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recording {
        seen: Mutex<Vec<Notification>>,
    }

    #[async_trait]
    impl CommitListener for Recording {
        async fn on_commit(&self, notification: &Notification) -> anyhow::Result<()> {
            self.seen.lock().unwrap().push(notification.clone());
            Ok(())
        }
    }

    struct Failing;

    #[async_trait]
    impl CommitListener for Failing {
        async fn on_commit(&self, _notification: &Notification) -> anyhow::Result<()> {
            anyhow::bail!("downstream unavailable")
        }
    }

    fn store() -> Arc<InMemoryRecordStore> {
        Arc::new(InMemoryRecordStore::new().with_records([Record::new(
            1,
            "test_object",
            RecordType::BankAccount,
        )]))
    }

    #[tokio::test]
    async fn test_hook_reads_committed_state() {
        let recording = Arc::new(Recording::default());
        let notifier = PostCommitNotifier::new(store()).with_listener(recording.clone());

        let hook = notifier.hook(1, &Input::new(1, "test", "bank_account"));
        hook().await;

        let seen = recording.seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].record.name, "test_object");
        assert_eq!(seen[0].input_name, "test");
    }

    #[tokio::test]
    async fn test_failing_listener_does_not_stop_others() {
        let recording = Arc::new(Recording::default());
        let notifier = PostCommitNotifier::new(store())
            .with_listener(Arc::new(Failing))
            .with_listener(recording.clone());
        assert_eq!(notifier.listener_count(), 2);

        notifier.hook(1, &Input::new(1, "test", "bank_account"))().await;

        assert_eq!(recording.seen.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_missing_record_skips_listeners() {
        let recording = Arc::new(Recording::default());
        let notifier = PostCommitNotifier::new(store()).with_listener(recording.clone());

        notifier.hook(42, &Input::new(42, "test", "bank_account"))().await;

        assert!(recording.seen.lock().unwrap().is_empty());
    }
}
