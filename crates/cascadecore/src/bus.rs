use crate::ExecutionContext;
use std::sync::Arc;
use tokio::sync::broadcast;

/// Observer callback invoked with a context snapshot after every
/// state-affecting transition.
pub type StateChangeCallback = Arc<dyn Fn(&ExecutionContext) + Send + Sync>;

/// Broadcast channel of immutable context snapshots. This is the engine's
/// sole notification surface; how snapshots are displayed or streamed is a
/// consumer concern.
pub struct StateBus {
    sender: broadcast::Sender<Arc<ExecutionContext>>,
    callback: Option<StateChangeCallback>,
}

impl StateBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender,
            callback: None,
        }
    }

    pub fn with_callback(capacity: usize, callback: StateChangeCallback) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender,
            callback: Some(callback),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Arc<ExecutionContext>> {
        self.sender.subscribe()
    }

    /// Emit a snapshot. Lagging or absent subscribers are not an error.
    pub fn emit(&self, snapshot: ExecutionContext) {
        if let Some(callback) = &self.callback {
            callback(&snapshot);
        }
        let _ = self.sender.send(Arc::new(snapshot));
    }
}
