//! Domain types shared between the engine, the persistence layer, and the
//! HTTP/WebSocket collaborators.

/// Stable bot identifier chosen at creation time.
///
/// NOTE: This is also the name of the bot's workspace directory, so it is
/// restricted to filesystem-safe characters by the upload collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct BotId(pub String);

impl BotId {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }
}

impl Default for BotId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for BotId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// The two user-code runtimes the host supervises.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Runtime {
    Python,
    Node,
}

impl Runtime {
    pub fn parse(tag: &str) -> Option<Self> {
        match tag.trim().to_ascii_lowercase().as_str() {
            "python" | "py" => Some(Self::Python),
            "node" | "nodejs" | "js" => Some(Self::Node),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Python => "python",
            Self::Node => "node",
        }
    }

    /// Source-file extensions that count as "program code" for this runtime.
    pub fn source_extensions(&self) -> &'static [&'static str] {
        match self {
            Self::Python => &["py"],
            Self::Node => &["js", "mjs", "cjs"],
        }
    }

    /// The dependency manifest filename the runtime's package tool consumes.
    pub fn manifest_file(&self) -> &'static str {
        match self {
            Self::Python => "requirements.txt",
            Self::Node => "package.json",
        }
    }

    pub fn has_source_extension(&self, filename: &str) -> bool {
        let ext = filename.rsplit('.').next().unwrap_or("");
        self.source_extensions().contains(&ext.to_ascii_lowercase().as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BotStatus {
    Stopped,
    Starting,
    Running,
    Error,
}

impl BotStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Stopped => "stopped",
            Self::Starting => "starting",
            Self::Running => "running",
            Self::Error => "error",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "stopped" => Some(Self::Stopped),
            "starting" => Some(Self::Starting),
            "running" => Some(Self::Running),
            "error" => Some(Self::Error),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "info" => Some(Self::Info),
            "warn" => Some(Self::Warn),
            "error" => Some(Self::Error),
            _ => None,
        }
    }
}

/// One resource-sampler observation of a supervised child.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ResourceSample {
    pub rss_bytes: u64,
    /// CPU usage in 1/100 of a percent since the previous observation.
    pub cpu_percent_x100: u32,
}

impl ResourceSample {
    pub fn memory_mb(&self) -> u64 {
        self.rss_bytes / (1024 * 1024)
    }

    pub fn cpu_percent(&self) -> f64 {
        f64::from(self.cpu_percent_x100) / 100.0
    }
}

/// Message pushed on the per-user status channel.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(tag = "type")]
pub enum StatusEvent {
    #[serde(rename = "bot_status_update")]
    BotStatusUpdate {
        #[serde(rename = "botId")]
        bot_id: String,
        status: BotStatus,
    },
    #[serde(rename = "bot_deleted")]
    BotDeleted {
        #[serde(rename = "botId")]
        bot_id: String,
    },
}

/// Message pushed on the per-bot live-console channel.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct LogEvent {
    pub level: LogLevel,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}
