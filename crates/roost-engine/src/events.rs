//! Live fan-out plane: per-user status channels and per-bot log channels.
//!
//! Delivery is send-if-ready: a slow or closed subscriber never blocks the
//! supervisor. Closed channels are removed lazily on the next send.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use roost_bot::{LogEvent, StatusEvent};
use tokio::sync::mpsc;

const CHANNEL_CAPACITY: usize = 256;

#[derive(Clone, Default)]
pub struct EventBus {
    status: Arc<Mutex<HashMap<String, mpsc::Sender<StatusEvent>>>>,
    logs: Arc<Mutex<HashMap<String, mpsc::Sender<LogEvent>>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the live status subscriber for a user. At most one exists
    /// per user: a new subscription replaces (and thereby closes) the old
    /// one.
    pub fn subscribe_status(&self, user_id: &str) -> mpsc::Receiver<StatusEvent> {
        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
        self.status
            .lock()
            .expect("status subscriber map poisoned")
            .insert(user_id.to_string(), tx);
        rx
    }

    pub fn unsubscribe_status(&self, user_id: &str) {
        self.status
            .lock()
            .expect("status subscriber map poisoned")
            .remove(user_id);
    }

    /// Registers a live-console subscriber for a bot.
    pub fn subscribe_logs(&self, bot_id: &str) -> mpsc::Receiver<LogEvent> {
        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
        self.logs
            .lock()
            .expect("log subscriber map poisoned")
            .insert(bot_id.to_string(), tx);
        rx
    }

    pub fn unsubscribe_logs(&self, bot_id: &str) {
        self.logs
            .lock()
            .expect("log subscriber map poisoned")
            .remove(bot_id);
    }

    /// Delivers a status event to the user's subscriber, if any. Absent or
    /// closed channels are a silent no-op.
    pub fn broadcast_status(&self, user_id: &str, event: StatusEvent) {
        let mut map = self.status.lock().expect("status subscriber map poisoned");
        let Some(tx) = map.get(user_id) else {
            return;
        };

        match tx.try_send(event) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Closed(_)) => {
                map.remove(user_id);
            }
            Err(mpsc::error::TrySendError::Full(_)) => {
                tracing::debug!(user_id, "status subscriber is lagging; dropping event");
            }
        }
    }

    pub fn publish_log(&self, bot_id: &str, event: LogEvent) {
        let mut map = self.logs.lock().expect("log subscriber map poisoned");
        let Some(tx) = map.get(bot_id) else {
            return;
        };

        match tx.try_send(event) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Closed(_)) => {
                map.remove(bot_id);
            }
            Err(mpsc::error::TrySendError::Full(_)) => {
                tracing::debug!(bot_id, "log subscriber is lagging; dropping line");
            }
        }
    }
}
