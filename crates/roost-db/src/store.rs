//! Persistence adapter consumed by the engine.
//!
//! Every method is a single-row operation except [`BotStore::delete_bot`],
//! which cascades files -> logs -> bot row.

use chrono::Utc;
use roost_bot::{BotStatus, LogLevel};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, DbErr, EntityTrait, QueryFilter, QueryOrder,
    QuerySelect, Set, Unchanged,
};
use uuid::Uuid;

use crate::entities::{bot_files, bot_logs, bots};

#[derive(Clone)]
pub struct BotStore {
    db: DatabaseConnection,
}

/// Partial update of a bot row. `None` fields are left untouched.
#[derive(Debug, Clone, Default)]
pub struct BotPatch {
    pub status: Option<BotStatus>,
    /// `Some(None)` clears the pid column.
    pub pid: Option<Option<u32>>,
    pub memory: Option<String>,
    pub cpu: Option<String>,
    pub uptime: Option<String>,
    pub last_start: Option<chrono::DateTime<Utc>>,
    pub main_file: Option<String>,
}

impl BotPatch {
    pub fn status(status: BotStatus) -> Self {
        Self {
            status: Some(status),
            ..Default::default()
        }
    }

    /// Patch applied whenever a bot leaves the running/starting states:
    /// pid cleared, resource fields zeroed.
    pub fn cleared(status: BotStatus) -> Self {
        Self {
            status: Some(status),
            pid: Some(None),
            memory: Some("0MB".to_string()),
            cpu: Some("0%".to_string()),
            uptime: Some("0s".to_string()),
            ..Default::default()
        }
    }
}

/// Row shape for bot creation (normally driven by the upload collaborator).
#[derive(Debug, Clone)]
pub struct NewBot {
    pub id: String,
    pub owner_id: String,
    pub name: String,
    pub runtime: String,
    pub main_file: Option<String>,
    pub token: String,
}

#[derive(Debug, Clone)]
pub struct NewBotFile {
    pub bot_id: String,
    pub filename: String,
    pub content: String,
}

impl BotStore {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    pub fn connection(&self) -> &DatabaseConnection {
        &self.db
    }

    pub async fn create_bot(&self, new: NewBot) -> Result<bots::Model, DbErr> {
        let now = Utc::now();
        bots::ActiveModel {
            id: Set(new.id),
            owner_id: Set(new.owner_id),
            name: Set(new.name),
            runtime: Set(new.runtime),
            main_file: Set(new.main_file),
            token: Set(new.token),
            status: Set(BotStatus::Stopped.as_str().to_string()),
            pid: Set(None),
            memory: Set("0MB".to_string()),
            cpu: Set("0%".to_string()),
            uptime: Set("0s".to_string()),
            last_start: Set(None),
            created_at: Set(now.into()),
            updated_at: Set(now.into()),
        }
        .insert(&self.db)
        .await
    }

    pub async fn get_bot(&self, id: &str) -> Result<Option<bots::Model>, DbErr> {
        bots::Entity::find_by_id(id).one(&self.db).await
    }

    pub async fn update_bot(&self, id: &str, patch: BotPatch) -> Result<(), DbErr> {
        let mut row = bots::ActiveModel {
            id: Unchanged(id.to_string()),
            updated_at: Set(Utc::now().into()),
            ..Default::default()
        };

        if let Some(status) = patch.status {
            row.status = Set(status.as_str().to_string());
        }
        if let Some(pid) = patch.pid {
            row.pid = Set(pid.map(|p| p as i32));
        }
        if let Some(memory) = patch.memory {
            row.memory = Set(memory);
        }
        if let Some(cpu) = patch.cpu {
            row.cpu = Set(cpu);
        }
        if let Some(uptime) = patch.uptime {
            row.uptime = Set(uptime);
        }
        if let Some(last_start) = patch.last_start {
            row.last_start = Set(Some(last_start.into()));
        }
        if let Some(main_file) = patch.main_file {
            row.main_file = Set(Some(main_file));
        }

        row.update(&self.db).await.map(|_| ())
    }

    pub async fn get_bot_files(&self, bot_id: &str) -> Result<Vec<bot_files::Model>, DbErr> {
        bot_files::Entity::find()
            .filter(bot_files::Column::BotId.eq(bot_id))
            .order_by_asc(bot_files::Column::Filename)
            .all(&self.db)
            .await
    }

    pub async fn insert_bot_file(&self, new: NewBotFile) -> Result<bot_files::Model, DbErr> {
        let now = Utc::now();
        let size = new.content.len() as i64;
        bot_files::ActiveModel {
            id: Set(Uuid::new_v4()),
            bot_id: Set(new.bot_id),
            filename: Set(new.filename),
            content: Set(new.content),
            size_bytes: Set(size),
            created_at: Set(now.into()),
            updated_at: Set(now.into()),
        }
        .insert(&self.db)
        .await
    }

    /// Updates an existing file's content. Returns `false` when the bot has
    /// no file with that name (the caller surfaces unknown-filename).
    pub async fn update_bot_file(
        &self,
        bot_id: &str,
        filename: &str,
        content: &str,
    ) -> Result<bool, DbErr> {
        let Some(existing) = bot_files::Entity::find()
            .filter(bot_files::Column::BotId.eq(bot_id))
            .filter(bot_files::Column::Filename.eq(filename))
            .one(&self.db)
            .await?
        else {
            return Ok(false);
        };

        let mut row: bot_files::ActiveModel = existing.into();
        row.content = Set(content.to_string());
        row.size_bytes = Set(content.len() as i64);
        row.updated_at = Set(Utc::now().into());
        row.update(&self.db).await?;
        Ok(true)
    }

    pub async fn get_bot_logs(
        &self,
        bot_id: &str,
        limit: u64,
    ) -> Result<Vec<bot_logs::Model>, DbErr> {
        bot_logs::Entity::find()
            .filter(bot_logs::Column::BotId.eq(bot_id))
            .order_by_desc(bot_logs::Column::CreatedAt)
            .limit(limit)
            .all(&self.db)
            .await
    }

    pub async fn create_bot_log(
        &self,
        bot_id: &str,
        level: LogLevel,
        message: &str,
    ) -> Result<(), DbErr> {
        bot_logs::ActiveModel {
            id: Set(Uuid::new_v4()),
            bot_id: Set(bot_id.to_string()),
            level: Set(level.as_str().to_string()),
            message: Set(message.to_string()),
            created_at: Set(Utc::now().into()),
        }
        .insert(&self.db)
        .await
        .map(|_| ())
    }

    /// Removes the bot's files, then its logs, then the bot row.
    pub async fn delete_bot(&self, id: &str) -> Result<(), DbErr> {
        bot_files::Entity::delete_many()
            .filter(bot_files::Column::BotId.eq(id))
            .exec(&self.db)
            .await?;
        bot_logs::Entity::delete_many()
            .filter(bot_logs::Column::BotId.eq(id))
            .exec(&self.db)
            .await?;
        bots::Entity::delete_by_id(id).exec(&self.db).await?;
        Ok(())
    }

    pub async fn count_bot_logs(&self, bot_id: &str) -> Result<u64, DbErr> {
        use sea_orm::PaginatorTrait;
        bot_logs::Entity::find()
            .filter(bot_logs::Column::BotId.eq(bot_id))
            .count(&self.db)
            .await
    }
}
