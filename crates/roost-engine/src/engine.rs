//! The operation surface consumed by the HTTP collaborator. Every
//! operation validates ownership before touching the bot.

use std::sync::Arc;

use roost_bot::{LogEvent, StatusEvent};
use roost_db::entities::{bot_logs, bots};
use roost_db::BotStore;
use tokio::sync::mpsc;

use crate::config::EngineConfig;
use crate::error::{EngineError, OpResult};
use crate::events::EventBus;
use crate::supervisor::Supervisor;
use crate::workspace;

const DEFAULT_LOG_LIMIT: u64 = 100;

#[derive(Clone)]
pub struct Engine {
    cfg: Arc<EngineConfig>,
    store: BotStore,
    events: EventBus,
    supervisor: Supervisor,
}

impl Engine {
    pub fn new(cfg: EngineConfig, store: BotStore) -> Self {
        let cfg = Arc::new(cfg);
        let events = EventBus::new();
        let supervisor = Supervisor::new(cfg.clone(), store.clone(), events.clone());
        Self {
            cfg,
            store,
            events,
            supervisor,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.cfg
    }

    pub fn store(&self) -> &BotStore {
        &self.store
    }

    async fn load_owned(&self, bot_id: &str, caller: &str) -> Result<bots::Model, EngineError> {
        let bot = self
            .store
            .get_bot(bot_id)
            .await?
            .ok_or(EngineError::NotFound)?;
        if bot.owner_id != caller {
            return Err(EngineError::Ownership);
        }
        Ok(bot)
    }

    pub async fn start(&self, bot_id: &str, caller: &str) -> OpResult {
        match self.load_owned(bot_id, caller).await {
            Ok(bot) => self.supervisor.start(&bot).await,
            Err(err) => err.into(),
        }
    }

    pub async fn stop(&self, bot_id: &str, caller: &str) -> OpResult {
        match self.load_owned(bot_id, caller).await {
            Ok(bot) => self.supervisor.stop(&bot).await,
            Err(err) => err.into(),
        }
    }

    pub async fn restart(&self, bot_id: &str, caller: &str) -> OpResult {
        match self.load_owned(bot_id, caller).await {
            Ok(bot) => self.supervisor.restart(&bot).await,
            Err(err) => err.into(),
        }
    }

    pub async fn is_running(&self, bot_id: &str) -> bool {
        self.supervisor.is_running(bot_id).await
    }

    /// Recent log records, newest first.
    pub async fn read_logs(
        &self,
        bot_id: &str,
        caller: &str,
        limit: Option<u64>,
    ) -> Result<Vec<bot_logs::Model>, EngineError> {
        self.load_owned(bot_id, caller).await?;
        let limit = limit.unwrap_or(DEFAULT_LOG_LIMIT);
        Ok(self.store.get_bot_logs(bot_id, limit).await?)
    }

    /// Replaces the content of an existing bot file. The filename must
    /// already exist; new files go through the upload collaborator.
    pub async fn update_file(
        &self,
        bot_id: &str,
        caller: &str,
        filename: &str,
        content: &str,
    ) -> OpResult {
        match self.load_owned(bot_id, caller).await {
            Ok(_) => match self.store.update_bot_file(bot_id, filename, content).await {
                Ok(true) => OpResult::ok("File updated"),
                Ok(false) => OpResult::err(format!("no such file: {filename}")),
                Err(err) => EngineError::from(err).into(),
            },
            Err(err) => err.into(),
        }
    }

    /// Stops the bot if running, then deletes its files, logs, and row,
    /// and notifies the owner's live subscriber.
    pub async fn delete(&self, bot_id: &str, caller: &str) -> OpResult {
        let bot = match self.load_owned(bot_id, caller).await {
            Ok(bot) => bot,
            Err(err) => return err.into(),
        };

        if self.supervisor.is_running(bot_id).await {
            self.supervisor.stop(&bot).await;
        }

        if let Err(err) = self.store.delete_bot(bot_id).await {
            return EngineError::from(err).into();
        }

        // A start may have slipped in between the stop and the row
        // deletion; make sure no orphan process survives the bot.
        if self.supervisor.is_running(bot_id).await {
            self.supervisor.stop(&bot).await;
        }

        self.events.broadcast_status(
            &bot.owner_id,
            StatusEvent::BotDeleted {
                bot_id: bot_id.to_string(),
            },
        );
        tracing::info!(bot_id, "bot deleted");
        OpResult::ok("Bot deleted")
    }

    /// Registers the caller as the single live status subscriber for a
    /// user (the WebSocket collaborator holds the receiving end).
    pub fn subscribe_status(&self, user_id: &str) -> mpsc::Receiver<StatusEvent> {
        self.events.subscribe_status(user_id)
    }

    /// Registers a live-console subscriber for a bot.
    pub fn subscribe_logs(&self, bot_id: &str) -> mpsc::Receiver<LogEvent> {
        self.events.subscribe_logs(bot_id)
    }

    pub fn unsubscribe_status(&self, user_id: &str) {
        self.events.unsubscribe_status(user_id);
    }

    pub fn unsubscribe_logs(&self, bot_id: &str) {
        self.events.unsubscribe_logs(bot_id);
    }

    /// Removes workspaces left behind by a previous run. Call at boot,
    /// before any bot is started.
    pub async fn sweep_stale_workspaces(&self) -> usize {
        let removed = workspace::sweep_stale(&self.cfg.workspace_root).await;
        if removed > 0 {
            tracing::info!(removed, "swept stale workspaces");
        }
        removed
    }
}
