//! Process supervision: spawning, stream observation, state transitions,
//! graceful/forceful termination, and resource sampling.
//!
//! The handle map is the single source of truth for "is this bot live".
//! Lifecycle operations for one bot serialize on a per-bot lock; the exit
//! observer and the sampler only touch the map under its own lock.

use std::collections::HashMap;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use roost_bot::{BotStatus, LogEvent, LogLevel, ResourceSample, Runtime, StatusEvent};
use roost_db::entities::bots;
use roost_db::{BotPatch, BotStore};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, ChildStderr, ChildStdout, Command};
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::config::EngineConfig;
use crate::error::{EngineError, OpResult};
use crate::events::EventBus;
use crate::{deps, installer, workspace};

const MAX_LOG_LINE_BYTES: usize = 8 * 1024;

/// Stdout substrings that mean the bot finished logging in.
const READY_MARKERS: &[&str] = &["Logged in as", "Bot is ready", "Successfully logged in"];

/// Stderr substrings that mean the credential was rejected.
const AUTH_FAILURE_MARKERS: &[&str] =
    &["LoginFailure", "Improper token", "Unauthorized", "Invalid token"];

const PYTHON_MAIN_CANDIDATES: &[&str] =
    &["main.py", "bot.py", "app.py", "run.py", "__main__.py", "start.py"];
const NODE_MAIN_CANDIDATES: &[&str] =
    &["index.js", "main.js", "app.js", "bot.js", "start.js", "server.js"];

fn truncate_utf8(s: &str, max_bytes: usize) -> String {
    if s.len() <= max_bytes {
        return s.to_string();
    }

    let suffix = "…(truncated)";
    let keep = max_bytes.saturating_sub(suffix.len()).max(1);
    let mut end = keep.min(s.len());
    while end > 0 && !s.is_char_boundary(end) {
        end = end.saturating_sub(1);
    }
    let mut out = s[..end].to_string();
    out.push_str(suffix);
    out
}

/// Trims, scrubs the credential, and bounds the length of a log line
/// before it reaches the store or any subscriber.
fn sanitize_line(raw: &str, token: &str) -> String {
    let mut line = raw.trim().to_string();
    if !token.is_empty() && line.contains(token) {
        line = line.replace(token, "<redacted>");
    }
    truncate_utf8(&line, MAX_LOG_LINE_BYTES)
}

pub(crate) fn format_uptime(d: Duration) -> String {
    let secs = d.as_secs();
    let days = secs / 86_400;
    let hours = (secs % 86_400) / 3600;
    let mins = (secs % 3600) / 60;
    let s = secs % 60;

    if days > 0 {
        format!("{days}d {hours}h {mins}m")
    } else if hours > 0 {
        format!("{hours}h {mins}m {s}s")
    } else if mins > 0 {
        format!("{mins}m {s}s")
    } else {
        format!("{s}s")
    }
}

#[cfg(target_os = "linux")]
fn ticks_per_sec() -> u64 {
    static TICKS: std::sync::OnceLock<u64> = std::sync::OnceLock::new();
    *TICKS.get_or_init(|| unsafe {
        let v = libc::sysconf(libc::_SC_CLK_TCK);
        if v <= 0 { 100 } else { v as u64 }
    })
}

#[cfg(target_os = "linux")]
fn page_size() -> u64 {
    static PAGE: std::sync::OnceLock<u64> = std::sync::OnceLock::new();
    *PAGE.get_or_init(|| unsafe {
        let v = libc::sysconf(libc::_SC_PAGESIZE);
        if v <= 0 { 4096 } else { v as u64 }
    })
}

#[cfg(target_os = "linux")]
async fn read_proc_cpu_ticks(pid: u32) -> Option<u64> {
    let s = tokio::fs::read_to_string(format!("/proc/{pid}/stat")).await.ok()?;
    let end = s.rfind(')')?;
    let rest = s.get((end + 2)..)?;
    let parts: Vec<&str> = rest.split_whitespace().collect();
    let utime: u64 = parts.get(11)?.parse().ok()?;
    let stime: u64 = parts.get(12)?.parse().ok()?;
    Some(utime.saturating_add(stime))
}

#[cfg(not(target_os = "linux"))]
async fn read_proc_cpu_ticks(_pid: u32) -> Option<u64> {
    None
}

#[cfg(target_os = "linux")]
async fn read_proc_rss_bytes(pid: u32) -> Option<u64> {
    let s = tokio::fs::read_to_string(format!("/proc/{pid}/statm")).await.ok()?;
    let mut it = s.split_whitespace();
    let _size_pages = it.next()?;
    let resident_pages: u64 = it.next()?.parse().ok()?;
    Some(resident_pages.saturating_mul(page_size()))
}

#[cfg(not(target_os = "linux"))]
async fn read_proc_rss_bytes(_pid: u32) -> Option<u64> {
    None
}

#[cfg(target_os = "linux")]
fn cpu_percent_x100(prev_ticks: u64, prev_at: Instant, ticks: u64, now: Instant) -> u32 {
    let dt = now.duration_since(prev_at).as_secs_f64();
    if dt <= 0.0 {
        return 0;
    }
    let delta_ticks = ticks.saturating_sub(prev_ticks) as f64;
    let cpu = (delta_ticks / ticks_per_sec() as f64) / dt * 100.0;
    let x100 = (cpu * 100.0).round();
    if x100.is_finite() {
        x100.clamp(0.0, u32::MAX as f64) as u32
    } else {
        0
    }
}

#[cfg(not(target_os = "linux"))]
fn cpu_percent_x100(_prev_ticks: u64, _prev_at: Instant, _ticks: u64, _now: Instant) -> u32 {
    0
}

#[cfg(unix)]
fn kill_group(pgid: i32, signal: libc::c_int) {
    // pgid 0 would address our own process group.
    if pgid <= 0 {
        return;
    }
    unsafe {
        libc::kill(-pgid, signal);
    }
}

#[cfg(not(unix))]
fn kill_group(_pgid: i32, _signal: i32) {}

#[cfg(target_os = "linux")]
fn set_parent_death_signal() -> std::io::Result<()> {
    // If the agent dies, make sure the bot goes with it.
    let rc = unsafe { libc::prctl(libc::PR_SET_PDEATHSIG, libc::SIGTERM) };
    if rc == -1 {
        return Err(std::io::Error::last_os_error());
    }
    Ok(())
}

#[cfg(not(target_os = "linux"))]
fn set_parent_death_signal() -> std::io::Result<()> {
    Ok(())
}

/// Writes a bot's log stream: persist first, then push to any live
/// console subscriber. A full channel or a database hiccup never
/// propagates into the supervisor.
#[derive(Clone)]
pub struct BotLogger {
    store: BotStore,
    events: EventBus,
    bot_id: String,
    token: String,
}

impl BotLogger {
    pub async fn emit(&self, level: LogLevel, source: &str, raw: &str) {
        let line = sanitize_line(raw, &self.token);
        if line.is_empty() {
            return;
        }

        if let Err(err) = self.store.create_bot_log(&self.bot_id, level, &line).await {
            tracing::warn!(bot_id = %self.bot_id, %err, "failed to persist log record");
        }
        self.events.publish_log(
            &self.bot_id,
            LogEvent {
                level,
                message: line,
                source: Some(source.to_string()),
            },
        );
    }
}

#[derive(Debug)]
struct ProcessHandle {
    pid: u32,
    pgid: i32,
    /// Set by `stop` before signaling; tells the exit observer that the
    /// exit was requested and that `stop` owns the final status write.
    stopping: bool,
}

#[derive(Clone)]
pub struct Supervisor {
    cfg: Arc<EngineConfig>,
    store: BotStore,
    events: EventBus,
    handles: Arc<Mutex<HashMap<String, ProcessHandle>>>,
    op_locks: Arc<Mutex<HashMap<String, Arc<Mutex<()>>>>>,
}

async fn resolve_main_file(
    stored: Option<&str>,
    runtime: Runtime,
    workspace: &std::path::Path,
    files: &[(String, String)],
) -> Option<String> {
    if let Some(main) = stored {
        let main = main.trim();
        if !main.is_empty() && tokio::fs::try_exists(workspace.join(main)).await.unwrap_or(false) {
            return Some(main.to_string());
        }
    }

    let candidates = match runtime {
        Runtime::Python => PYTHON_MAIN_CANDIDATES,
        Runtime::Node => NODE_MAIN_CANDIDATES,
    };
    for cand in candidates {
        if tokio::fs::try_exists(workspace.join(cand)).await.unwrap_or(false) {
            return Some((*cand).to_string());
        }
    }

    files
        .iter()
        .find(|(name, _)| runtime.has_source_extension(name))
        .map(|(name, _)| name.clone())
}

impl Supervisor {
    pub fn new(cfg: Arc<EngineConfig>, store: BotStore, events: EventBus) -> Self {
        Self {
            cfg,
            store,
            events,
            handles: Arc::new(Mutex::new(HashMap::new())),
            op_locks: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    async fn op_lock(&self, bot_id: &str) -> Arc<Mutex<()>> {
        let mut locks = self.op_locks.lock().await;
        locks
            .entry(bot_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    pub async fn is_running(&self, bot_id: &str) -> bool {
        self.handles.lock().await.contains_key(bot_id)
    }

    pub fn logger(&self, bot: &bots::Model) -> BotLogger {
        BotLogger {
            store: self.store.clone(),
            events: self.events.clone(),
            bot_id: bot.id.clone(),
            token: bot.token.clone(),
        }
    }

    /// Persists a status patch, then broadcasts the transition. The write
    /// always precedes the push.
    async fn set_status(&self, bot_id: &str, owner_id: &str, patch: BotPatch, status: BotStatus) {
        if let Err(err) = self.store.update_bot(bot_id, patch).await {
            tracing::warn!(bot_id, %err, "failed to persist status transition");
        }
        self.events.broadcast_status(
            owner_id,
            StatusEvent::BotStatusUpdate {
                bot_id: bot_id.to_string(),
                status,
            },
        );
    }

    async fn fail_start(&self, bot: &bots::Model, logger: &BotLogger, err: EngineError) -> OpResult {
        let message = err.to_string();
        logger.emit(LogLevel::Error, "system", &message).await;
        self.set_status(
            &bot.id,
            &bot.owner_id,
            BotPatch::cleared(BotStatus::Error),
            BotStatus::Error,
        )
        .await;
        tracing::warn!(bot_id = %bot.id, %message, "start attempt failed");
        err.into()
    }

    pub async fn start(&self, bot: &bots::Model) -> OpResult {
        let lock = self.op_lock(&bot.id).await;
        let _guard = lock.lock().await;

        if self.handles.lock().await.contains_key(&bot.id) {
            return OpResult::err("Bot is already running");
        }

        let logger = self.logger(bot);
        self.set_status(
            &bot.id,
            &bot.owner_id,
            BotPatch::status(BotStatus::Starting),
            BotStatus::Starting,
        )
        .await;

        let Some(runtime) = Runtime::parse(&bot.runtime) else {
            return self
                .fail_start(
                    bot,
                    &logger,
                    EngineError::Validation(format!("unknown runtime: {}", bot.runtime)),
                )
                .await;
        };
        if bot.token.trim().is_empty() {
            return self
                .fail_start(
                    bot,
                    &logger,
                    EngineError::Validation("bot has no credential configured".to_string()),
                )
                .await;
        }

        let rows = match self.store.get_bot_files(&bot.id).await {
            Ok(rows) => rows,
            Err(err) => return self.fail_start(bot, &logger, EngineError::Db(err)).await,
        };
        let files: Vec<(String, String)> =
            rows.into_iter().map(|f| (f.filename, f.content)).collect();

        // Static RADAR runs before anything touches the disk.
        let report = self
            .cfg
            .radar
            .scan_files(files.iter().map(|(n, c)| (n.as_str(), c.as_str())));
        if self.cfg.radar.is_suspicious(&report) {
            return self
                .fail_start(
                    bot,
                    &logger,
                    EngineError::RiskVeto {
                        score: report.score,
                        reason: report.first_reason().to_string(),
                    },
                )
                .await;
        }

        let ws = match workspace::materialize(
            &self.cfg.workspace_root,
            &bot.id,
            &files,
            &bot.token,
        )
        .await
        {
            Ok(dir) => dir,
            Err(err) => return self.fail_start(bot, &logger, err).await,
        };

        match deps::ensure_manifest(&ws, runtime, &bot.name, &files).await {
            Ok(true) => {
                installer::install_dependencies(&self.cfg, runtime, &ws, &logger).await;
            }
            Ok(false) => {}
            Err(err) => {
                logger
                    .emit(
                        LogLevel::Warn,
                        "system",
                        &format!("could not write dependency manifest: {err}"),
                    )
                    .await;
            }
        }

        let Some(main_file) =
            resolve_main_file(bot.main_file.as_deref(), runtime, &ws, &files).await
        else {
            return self
                .fail_start(
                    bot,
                    &logger,
                    EngineError::Validation("no entry file found for this bot".to_string()),
                )
                .await;
        };

        let bin = match runtime {
            Runtime::Python => &self.cfg.python_bin,
            Runtime::Node => &self.cfg.node_bin,
        };
        let mut cmd = Command::new(bin);
        match runtime {
            Runtime::Python => {
                cmd.arg("-u").arg(&main_file).env("PYTHONUNBUFFERED", "1");
            }
            Runtime::Node => {
                cmd.arg(&main_file);
            }
        }
        cmd.current_dir(&ws)
            .env("DISCORD_TOKEN", &bot.token)
            .env("BOT_ID", &bot.id)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        #[cfg(unix)]
        {
            unsafe {
                cmd.pre_exec(|| {
                    // New session so signals reach the whole process tree.
                    set_parent_death_signal()?;
                    if libc::setsid() == -1 {
                        return Err(std::io::Error::last_os_error());
                    }
                    Ok(())
                });
            }
        }

        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(err) => {
                return self
                    .fail_start(bot, &logger, EngineError::Spawn(format!("{bin}: {err}")))
                    .await;
            }
        };

        let pid = child.id().unwrap_or_default();
        let started_at = Instant::now();
        {
            let mut handles = self.handles.lock().await;
            handles.insert(
                bot.id.clone(),
                ProcessHandle {
                    pid,
                    pgid: pid as i32,
                    stopping: false,
                },
            );
        }

        if let Err(err) = self
            .store
            .update_bot(
                &bot.id,
                BotPatch {
                    pid: Some(Some(pid)),
                    last_start: Some(Utc::now()),
                    ..Default::default()
                },
            )
            .await
        {
            tracing::warn!(bot_id = %bot.id, %err, "failed to record pid");
        }

        logger
            .emit(
                LogLevel::Info,
                "system",
                &format!("process started (pid {pid}, entry {main_file})"),
            )
            .await;
        tracing::info!(bot_id = %bot.id, pid, runtime = runtime.as_str(), "bot process spawned");

        self.spawn_stdout_observer(bot, pid, child.stdout.take(), logger.clone());
        self.spawn_stderr_observer(bot, pid, child.stderr.take(), logger.clone());
        self.spawn_exit_observer(bot, child, logger.clone());
        self.spawn_sampler(bot, pid, started_at, logger);

        OpResult::ok("Bot started")
    }

    fn spawn_stdout_observer(
        &self,
        bot: &bots::Model,
        pid: u32,
        stdout: Option<ChildStdout>,
        logger: BotLogger,
    ) {
        let Some(out) = stdout else { return };
        let handles = self.handles.clone();
        let store = self.store.clone();
        let events = self.events.clone();
        let bot_id = bot.id.clone();
        let owner_id = bot.owner_id.clone();

        tokio::spawn(async move {
            let mut became_ready = false;
            let mut lines = BufReader::new(out).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                logger.emit(LogLevel::Info, "stdout", &line).await;

                if !became_ready && READY_MARKERS.iter().any(|m| line.contains(m)) {
                    let still_current = {
                        let map = handles.lock().await;
                        map.get(&bot_id).is_some_and(|h| h.pid == pid && !h.stopping)
                    };
                    if still_current {
                        became_ready = true;
                        if let Err(err) = store
                            .update_bot(&bot_id, BotPatch::status(BotStatus::Running))
                            .await
                        {
                            tracing::warn!(bot_id, %err, "failed to persist running status");
                        }
                        events.broadcast_status(
                            &owner_id,
                            StatusEvent::BotStatusUpdate {
                                bot_id: bot_id.clone(),
                                status: BotStatus::Running,
                            },
                        );
                        tracing::info!(bot_id, "bot reported ready");
                    }
                }
            }
        });
    }

    fn spawn_stderr_observer(
        &self,
        bot: &bots::Model,
        pid: u32,
        stderr: Option<ChildStderr>,
        logger: BotLogger,
    ) {
        let Some(err_stream) = stderr else { return };
        let handles = self.handles.clone();
        let store = self.store.clone();
        let events = self.events.clone();
        let bot_id = bot.id.clone();
        let owner_id = bot.owner_id.clone();

        tokio::spawn(async move {
            let mut flagged = false;
            let mut lines = BufReader::new(err_stream).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                logger.emit(LogLevel::Error, "stderr", &line).await;

                if !flagged && AUTH_FAILURE_MARKERS.iter().any(|m| line.contains(m)) {
                    let still_current = {
                        let map = handles.lock().await;
                        map.get(&bot_id).is_some_and(|h| h.pid == pid && !h.stopping)
                    };
                    if still_current {
                        flagged = true;
                        if let Err(err) = store
                            .update_bot(&bot_id, BotPatch::status(BotStatus::Error))
                            .await
                        {
                            tracing::warn!(bot_id, %err, "failed to persist error status");
                        }
                        events.broadcast_status(
                            &owner_id,
                            StatusEvent::BotStatusUpdate {
                                bot_id: bot_id.clone(),
                                status: BotStatus::Error,
                            },
                        );
                        tracing::warn!(bot_id, "bot credential was rejected");
                    }
                }
            }
        });
    }

    fn spawn_exit_observer(&self, bot: &bots::Model, mut child: Child, logger: BotLogger) {
        let handles = self.handles.clone();
        let store = self.store.clone();
        let events = self.events.clone();
        let bot_id = bot.id.clone();
        let owner_id = bot.owner_id.clone();

        tokio::spawn(async move {
            let res = child.wait().await;

            // The handle comes out of the map before any status write.
            let removed = handles.lock().await.remove(&bot_id);
            let Some(handle) = removed else {
                // Sampler or stop already finalized this bot.
                return;
            };

            if handle.stopping {
                // `stop` owns the final status write on this path.
                let detail = match &res {
                    Ok(status) => format!("process exited ({status})"),
                    Err(err) => format!("process wait failed: {err}"),
                };
                logger.emit(LogLevel::Info, "system", &detail).await;
                return;
            }

            let (status, level, detail) = match res {
                Ok(exit) if exit.success() => (
                    BotStatus::Stopped,
                    LogLevel::Info,
                    "process exited with code 0".to_string(),
                ),
                Ok(exit) => {
                    let detail = match exit.code() {
                        Some(code) => format!("process exited with code {code}"),
                        None => "process was terminated by a signal".to_string(),
                    };
                    (BotStatus::Error, LogLevel::Error, detail)
                }
                Err(err) => (
                    BotStatus::Error,
                    LogLevel::Error,
                    format!("process wait failed: {err}"),
                ),
            };

            logger.emit(level, "system", &detail).await;
            if let Err(err) = store.update_bot(&bot_id, BotPatch::cleared(status)).await {
                tracing::warn!(bot_id, %err, "failed to persist exit status");
            }
            events.broadcast_status(
                &owner_id,
                StatusEvent::BotStatusUpdate {
                    bot_id: bot_id.clone(),
                    status,
                },
            );
            tracing::info!(bot_id, status = status.as_str(), "bot process exited");
        });
    }

    fn spawn_sampler(&self, bot: &bots::Model, pid: u32, started_at: Instant, logger: BotLogger) {
        let cfg = self.cfg.clone();
        let handles = self.handles.clone();
        let store = self.store.clone();
        let events = self.events.clone();
        let bot_id = bot.id.clone();
        let owner_id = bot.owner_id.clone();

        tokio::spawn(async move {
            let mut last: Option<(u64, Instant)> = None;

            loop {
                tokio::time::sleep(cfg.sample_interval).await;

                let still_current = {
                    let map = handles.lock().await;
                    map.get(&bot_id).is_some_and(|h| h.pid == pid && !h.stopping)
                };
                if !still_current {
                    break;
                }

                let now = Instant::now();
                let Some(ticks) = read_proc_cpu_ticks(pid).await else {
                    // Process vanished; the exit observer handles the rest.
                    break;
                };
                let rss_bytes = read_proc_rss_bytes(pid).await.unwrap_or(0);
                let cpu = last
                    .map(|(prev_ticks, prev_at)| cpu_percent_x100(prev_ticks, prev_at, ticks, now))
                    .unwrap_or(0);
                last = Some((ticks, now));

                let sample = ResourceSample {
                    rss_bytes,
                    cpu_percent_x100: cpu,
                };
                let patch = BotPatch {
                    memory: Some(format!("{}MB", sample.memory_mb())),
                    cpu: Some(format!("{:.1}%", sample.cpu_percent())),
                    uptime: Some(format_uptime(started_at.elapsed())),
                    ..Default::default()
                };
                if let Err(err) = store.update_bot(&bot_id, patch).await {
                    tracing::warn!(bot_id, %err, "failed to persist resource sample");
                }

                if let Some(breach) = cfg.radar.check_sample(&sample) {
                    let removed = {
                        let mut map = handles.lock().await;
                        let current =
                            map.get(&bot_id).is_some_and(|h| h.pid == pid && !h.stopping);
                        if current { map.remove(&bot_id) } else { None }
                    };
                    let Some(handle) = removed else { break };

                    kill_group(handle.pgid, libc::SIGKILL);
                    logger
                        .emit(
                            LogLevel::Error,
                            "radar",
                            &format!("RADAR: {breach}; bot terminated"),
                        )
                        .await;
                    if let Err(err) = store
                        .update_bot(&bot_id, BotPatch::cleared(BotStatus::Error))
                        .await
                    {
                        tracing::warn!(bot_id, %err, "failed to persist abuse termination");
                    }
                    events.broadcast_status(
                        &owner_id,
                        StatusEvent::BotStatusUpdate {
                            bot_id: bot_id.clone(),
                            status: BotStatus::Error,
                        },
                    );
                    tracing::warn!(bot_id, pid, breach = %breach, "runtime quota breach");
                    break;
                }
            }
        });
    }

    pub async fn stop(&self, bot: &bots::Model) -> OpResult {
        let lock = self.op_lock(&bot.id).await;
        let _guard = lock.lock().await;

        let pgid = {
            let mut handles = self.handles.lock().await;
            match handles.get_mut(&bot.id) {
                Some(handle) => {
                    handle.stopping = true;
                    Some(handle.pgid)
                }
                None => None,
            }
        };

        let logger = self.logger(bot);

        let Some(pgid) = pgid else {
            // Nothing live; make sure the persisted row agrees.
            if bot.status != BotStatus::Stopped.as_str() {
                self.set_status(
                    &bot.id,
                    &bot.owner_id,
                    BotPatch::cleared(BotStatus::Stopped),
                    BotStatus::Stopped,
                )
                .await;
            }
            self.remove_workspace(&bot.id).await;
            return OpResult::ok("Bot stopped");
        };

        logger.emit(LogLevel::Info, "system", "stop requested").await;
        kill_group(pgid, libc::SIGTERM);

        let deadline = Instant::now() + self.cfg.stop_grace;
        loop {
            if !self.is_running(&bot.id).await {
                break;
            }
            if Instant::now() >= deadline {
                logger
                    .emit(
                        LogLevel::Warn,
                        "system",
                        "graceful stop timed out; killing process",
                    )
                    .await;
                kill_group(pgid, libc::SIGKILL);

                let hard = Instant::now() + Duration::from_secs(2);
                while self.is_running(&bot.id).await && Instant::now() < hard {
                    tokio::time::sleep(Duration::from_millis(50)).await;
                }
                // Last resort: drop the handle ourselves.
                self.handles.lock().await.remove(&bot.id);
                break;
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }

        self.set_status(
            &bot.id,
            &bot.owner_id,
            BotPatch::cleared(BotStatus::Stopped),
            BotStatus::Stopped,
        )
        .await;
        logger.emit(LogLevel::Info, "system", "bot stopped").await;

        self.remove_workspace(&bot.id).await;
        OpResult::ok("Bot stopped")
    }

    pub async fn restart(&self, bot: &bots::Model) -> OpResult {
        self.stop(bot).await;
        tokio::time::sleep(self.cfg.restart_delay).await;

        let fresh = match self.store.get_bot(&bot.id).await {
            Ok(Some(fresh)) => fresh,
            Ok(None) => return EngineError::NotFound.into(),
            Err(err) => return EngineError::Db(err).into(),
        };
        self.start(&fresh).await
    }

    async fn remove_workspace(&self, bot_id: &str) {
        if let Err(err) = workspace::remove(&self.cfg.workspace_root, bot_id).await {
            tracing::warn!(bot_id, %err, "failed to remove workspace");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uptime_drops_leading_zero_components() {
        assert_eq!(format_uptime(Duration::from_secs(42)), "42s");
        assert_eq!(format_uptime(Duration::from_secs(62)), "1m 2s");
        assert_eq!(format_uptime(Duration::from_secs(3_723)), "1h 2m 3s");
        assert_eq!(format_uptime(Duration::from_secs(90_061)), "1d 1h 1m");
    }

    #[test]
    fn sanitize_scrubs_credential() {
        let line = sanitize_line("  token is tok-secret-1 here  ", "tok-secret-1");
        assert_eq!(line, "token is <redacted> here");
    }

    #[test]
    fn sanitize_handles_empty_token() {
        assert_eq!(sanitize_line(" hello ", ""), "hello");
    }

    #[test]
    fn sanitize_truncates_monster_lines() {
        let raw = "x".repeat(MAX_LOG_LINE_BYTES + 100);
        let line = sanitize_line(&raw, "t");
        assert!(line.len() <= MAX_LOG_LINE_BYTES);
        assert!(line.ends_with("…(truncated)"));
    }

    #[test]
    fn ready_markers_match_inside_lines() {
        let line = "2024-05-01 INFO discord.client: Logged in as MyBot#1234";
        assert!(READY_MARKERS.iter().any(|m| line.contains(m)));
    }

    #[tokio::test]
    async fn main_resolution_prefers_stored_then_candidates() {
        let dir = std::env::temp_dir().join(format!("roost-main-{}", std::process::id()));
        tokio::fs::create_dir_all(&dir).await.unwrap();
        tokio::fs::write(dir.join("bot.py"), "x").await.unwrap();
        tokio::fs::write(dir.join("other.py"), "x").await.unwrap();

        // Stored name wins when the file exists.
        let m = resolve_main_file(Some("other.py"), Runtime::Python, &dir, &[]).await;
        assert_eq!(m.as_deref(), Some("other.py"));

        // Missing stored name falls back to the candidate list.
        let m = resolve_main_file(Some("gone.py"), Runtime::Python, &dir, &[]).await;
        assert_eq!(m.as_deref(), Some("bot.py"));

        // No candidate on disk: first source file from the upload set.
        let files = vec![("z.py".to_string(), String::new())];
        let empty = std::env::temp_dir().join(format!("roost-main-empty-{}", std::process::id()));
        tokio::fs::create_dir_all(&empty).await.unwrap();
        let m = resolve_main_file(None, Runtime::Python, &empty, &files).await;
        assert_eq!(m.as_deref(), Some("z.py"));

        // Nothing at all.
        let m = resolve_main_file(None, Runtime::Python, &empty, &[]).await;
        assert!(m.is_none());

        tokio::fs::remove_dir_all(&dir).await.ok();
        tokio::fs::remove_dir_all(&empty).await.ok();
    }
}
