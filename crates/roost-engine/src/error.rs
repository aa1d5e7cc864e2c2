/// Failure taxonomy for engine operations.
///
/// Installer failures are intentionally absent: they are logged against the
/// bot and swallowed, never surfaced to callers.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("bot not found")]
    NotFound,

    #[error("you do not own this bot")]
    Ownership,

    #[error("{0}")]
    Validation(String),

    #[error("RADAR blocked this bot (risk score {score}): {reason}")]
    RiskVeto { score: u32, reason: String },

    #[error("workspace error: {0}")]
    Workspace(String),

    #[error("failed to launch bot process: {0}")]
    Spawn(String),

    #[error("database error: {0}")]
    Db(#[from] roost_db::sea_orm::DbErr),
}

/// Discriminated result returned by every facade operation.
#[derive(Debug, Clone, serde::Serialize)]
pub struct OpResult {
    pub ok: bool,
    pub message: String,
}

impl OpResult {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            ok: true,
            message: message.into(),
        }
    }

    pub fn err(message: impl Into<String>) -> Self {
        Self {
            ok: false,
            message: message.into(),
        }
    }
}

impl From<EngineError> for OpResult {
    fn from(err: EngineError) -> Self {
        Self::err(err.to_string())
    }
}
