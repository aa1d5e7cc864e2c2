//! Invokes the runtime's package tool against a materialized workspace.
//! Failures here are recorded in the bot's logs but never abort a start:
//! transient registry errors must not block bots that only need
//! pre-installed libraries.

use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use roost_bot::{LogLevel, Runtime};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;

use crate::config::EngineConfig;
use crate::supervisor::BotLogger;

enum ToolOutcome {
    Success,
    Failed(Option<i32>),
    TimedOut,
    SpawnFailed(String),
}

async fn run_tool(
    bin: &str,
    args: &[&str],
    cwd: &Path,
    timeout: Duration,
    logger: &BotLogger,
) -> ToolOutcome {
    let mut cmd = Command::new(bin);
    cmd.args(args)
        .current_dir(cwd)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    let mut child = match cmd.spawn() {
        Ok(child) => child,
        Err(err) => return ToolOutcome::SpawnFailed(err.to_string()),
    };

    if let Some(out) = child.stdout.take() {
        let logger = logger.clone();
        tokio::spawn(async move {
            let mut lines = BufReader::new(out).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                logger.emit(LogLevel::Info, "installer", &line).await;
            }
        });
    }
    if let Some(err) = child.stderr.take() {
        let logger = logger.clone();
        tokio::spawn(async move {
            let mut lines = BufReader::new(err).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                logger.emit(LogLevel::Warn, "installer", &line).await;
            }
        });
    }

    match tokio::time::timeout(timeout, child.wait()).await {
        Ok(Ok(status)) if status.success() => ToolOutcome::Success,
        Ok(Ok(status)) => ToolOutcome::Failed(status.code()),
        Ok(Err(err)) => ToolOutcome::SpawnFailed(err.to_string()),
        Err(_) => {
            child.start_kill().ok();
            let _ = child.wait().await;
            ToolOutcome::TimedOut
        }
    }
}

/// Runs the package tool for `runtime` inside `workspace`. Returns whether
/// an attempt succeeded; the caller proceeds either way.
pub async fn install_dependencies(
    cfg: &EngineConfig,
    runtime: Runtime,
    workspace: &Path,
    logger: &BotLogger,
) -> bool {
    let attempts: Vec<(&str, Vec<&str>, Duration)> = match runtime {
        Runtime::Python => vec![
            (
                cfg.pip_bin.as_str(),
                vec!["install", "--user", "-r", "requirements.txt"],
                cfg.pip_timeout,
            ),
            (
                cfg.pip_bin.as_str(),
                vec!["install", "-r", "requirements.txt"],
                cfg.pip_timeout,
            ),
            (
                cfg.pip_fallback_bin.as_str(),
                vec!["install", "-r", "requirements.txt"],
                cfg.pip_timeout,
            ),
        ],
        Runtime::Node => vec![(
            cfg.npm_bin.as_str(),
            vec!["install", "--no-audit", "--no-fund", "--loglevel", "error"],
            cfg.npm_timeout,
        )],
    };

    for (bin, args, timeout) in attempts {
        logger
            .emit(
                LogLevel::Info,
                "installer",
                &format!("installing dependencies: {} {}", bin, args.join(" ")),
            )
            .await;

        match run_tool(bin, &args, workspace, timeout, logger).await {
            ToolOutcome::Success => {
                logger
                    .emit(LogLevel::Info, "installer", "dependencies installed")
                    .await;
                return true;
            }
            ToolOutcome::Failed(code) => {
                logger
                    .emit(
                        LogLevel::Warn,
                        "installer",
                        &format!("{bin} exited with code {}", code.unwrap_or(-1)),
                    )
                    .await;
            }
            ToolOutcome::TimedOut => {
                logger
                    .emit(
                        LogLevel::Warn,
                        "installer",
                        &format!("{bin} timed out after {}s", timeout.as_secs()),
                    )
                    .await;
            }
            ToolOutcome::SpawnFailed(err) => {
                logger
                    .emit(
                        LogLevel::Warn,
                        "installer",
                        &format!("could not run {bin}: {err}"),
                    )
                    .await;
            }
        }
    }

    logger
        .emit(
            LogLevel::Error,
            "installer",
            "dependency installation failed; starting anyway",
        )
        .await;
    false
}
