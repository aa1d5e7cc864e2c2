use std::path::PathBuf;
use std::time::Duration;

use crate::radar::RadarConfig;

const DEFAULT_MEMORY_LIMIT_MB: u64 = 128;
const DEFAULT_CPU_LIMIT_PERCENT: u64 = 50;
const DEFAULT_SAMPLE_INTERVAL_MS: u64 = 3000;
const DEFAULT_STOP_GRACE_MS: u64 = 5000;
const DEFAULT_RESTART_DELAY_MS: u64 = 1000;
const DEFAULT_PIP_TIMEOUT_SECS: u64 = 180;
const DEFAULT_NPM_TIMEOUT_SECS: u64 = 240;
const DEFAULT_MAX_BOTS_PER_USER: u64 = 5;

fn env_u64(name: &str) -> Option<u64> {
    std::env::var(name).ok().and_then(|v| v.parse::<u64>().ok())
}

fn env_string(name: &str, default: &str) -> String {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| default.to_string())
}

/// Engine tuning knobs. Everything here is overridable from the
/// environment; numeric overrides are clamped to sane ranges.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Root under which per-bot workspaces are materialized.
    pub workspace_root: PathBuf,
    /// Runtime memory quota in MB (`MEMORY_MAX`).
    pub memory_limit_mb: u64,
    /// Runtime CPU quota in percent (`CPU_QUOTA`).
    pub cpu_limit_percent: u64,
    pub sample_interval: Duration,
    /// How long a graceful stop waits before escalating to SIGKILL.
    pub stop_grace: Duration,
    pub restart_delay: Duration,
    pub pip_timeout: Duration,
    pub npm_timeout: Duration,
    /// Creation-time cap (`MAX_BOTS_PER_USER`), enforced by the upload
    /// collaborator.
    pub max_bots_per_user: u64,
    pub python_bin: String,
    pub node_bin: String,
    pub pip_bin: String,
    pub pip_fallback_bin: String,
    pub npm_bin: String,
    pub radar: RadarConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            workspace_root: PathBuf::from("./data/workspaces"),
            memory_limit_mb: DEFAULT_MEMORY_LIMIT_MB,
            cpu_limit_percent: DEFAULT_CPU_LIMIT_PERCENT,
            sample_interval: Duration::from_millis(DEFAULT_SAMPLE_INTERVAL_MS),
            stop_grace: Duration::from_millis(DEFAULT_STOP_GRACE_MS),
            restart_delay: Duration::from_millis(DEFAULT_RESTART_DELAY_MS),
            pip_timeout: Duration::from_secs(DEFAULT_PIP_TIMEOUT_SECS),
            npm_timeout: Duration::from_secs(DEFAULT_NPM_TIMEOUT_SECS),
            max_bots_per_user: DEFAULT_MAX_BOTS_PER_USER,
            python_bin: "python3".to_string(),
            node_bin: "node".to_string(),
            pip_bin: "pip".to_string(),
            pip_fallback_bin: "pip3".to_string(),
            npm_bin: "npm".to_string(),
            radar: RadarConfig::default(),
        }
    }
}

impl EngineConfig {
    pub fn from_env() -> Self {
        let mut cfg = Self::default();

        if let Ok(root) = std::env::var("ROOST_WORKSPACE_ROOT") {
            let root = root.trim();
            if !root.is_empty() {
                cfg.workspace_root = PathBuf::from(root);
            }
        }

        cfg.memory_limit_mb = env_u64("MEMORY_MAX")
            .map(|v| v.clamp(16, 16_384))
            .unwrap_or(DEFAULT_MEMORY_LIMIT_MB);
        cfg.cpu_limit_percent = env_u64("CPU_QUOTA")
            .map(|v| v.clamp(1, 1000))
            .unwrap_or(DEFAULT_CPU_LIMIT_PERCENT);
        cfg.sample_interval = Duration::from_millis(
            env_u64("ROOST_SAMPLE_INTERVAL_MS")
                .map(|v| v.clamp(250, 60_000))
                .unwrap_or(DEFAULT_SAMPLE_INTERVAL_MS),
        );
        cfg.stop_grace = Duration::from_millis(
            env_u64("ROOST_STOP_GRACE_MS")
                .map(|v| v.clamp(500, 60_000))
                .unwrap_or(DEFAULT_STOP_GRACE_MS),
        );
        cfg.restart_delay = Duration::from_millis(
            env_u64("ROOST_RESTART_DELAY_MS")
                .map(|v| v.clamp(0, 10_000))
                .unwrap_or(DEFAULT_RESTART_DELAY_MS),
        );
        cfg.pip_timeout = Duration::from_secs(
            env_u64("ROOST_PIP_TIMEOUT_SECS")
                .map(|v| v.clamp(10, 3600))
                .unwrap_or(DEFAULT_PIP_TIMEOUT_SECS),
        );
        cfg.npm_timeout = Duration::from_secs(
            env_u64("ROOST_NPM_TIMEOUT_SECS")
                .map(|v| v.clamp(10, 3600))
                .unwrap_or(DEFAULT_NPM_TIMEOUT_SECS),
        );
        cfg.max_bots_per_user = env_u64("MAX_BOTS_PER_USER")
            .map(|v| v.clamp(1, 1000))
            .unwrap_or(DEFAULT_MAX_BOTS_PER_USER);

        cfg.python_bin = env_string("ROOST_PYTHON_BIN", &cfg.python_bin);
        cfg.node_bin = env_string("ROOST_NODE_BIN", &cfg.node_bin);
        cfg.pip_bin = env_string("ROOST_PIP_BIN", &cfg.pip_bin);
        cfg.pip_fallback_bin = env_string("ROOST_PIP_FALLBACK_BIN", &cfg.pip_fallback_bin);
        cfg.npm_bin = env_string("ROOST_NPM_BIN", &cfg.npm_bin);

        cfg.radar.memory_limit_mb = cfg.memory_limit_mb;
        cfg.radar.cpu_limit_percent = cfg.cpu_limit_percent;

        cfg
    }

    pub fn workspace_dir(&self, bot_id: &str) -> PathBuf {
        self.workspace_root.join(bot_id)
    }
}
