//! End-to-end lifecycle tests. Bot programs are small shell scripts: the
//! runtime binaries are overridden to `sh`, which happily executes a
//! `.py`/`.js` fixture, and the package tools are overridden to `true`
//! (or `false` for the failure cases).

use std::time::Duration;

use roost_bot::{BotStatus, StatusEvent};
use roost_db::{BotStore, NewBot, NewBotFile};
use roost_engine::{Engine, EngineConfig};
use sea_orm_migration::MigratorTrait;

const OWNER: &str = "u1";
const TOKEN: &str = "tok-super-secret";

async fn test_engine(tag: &str) -> Engine {
    let db_path = std::env::temp_dir().join(format!("roost-{tag}-{}.sqlite", uuid::Uuid::new_v4()));
    let url = format!("sqlite://{}?mode=rwc", db_path.display());
    let db = roost_db::connect(&url).await.unwrap();
    roost_migration::Migrator::up(&db, None).await.unwrap();

    let mut cfg = EngineConfig::default();
    cfg.workspace_root =
        std::env::temp_dir().join(format!("roost-{tag}-ws-{}", uuid::Uuid::new_v4()));
    cfg.python_bin = "sh".to_string();
    cfg.node_bin = "sh".to_string();
    cfg.pip_bin = "true".to_string();
    cfg.pip_fallback_bin = "true".to_string();
    cfg.npm_bin = "true".to_string();
    cfg.stop_grace = Duration::from_secs(1);
    cfg.restart_delay = Duration::from_millis(100);
    cfg.sample_interval = Duration::from_secs(60);

    Engine::new(cfg, BotStore::new(db))
}

async fn create_bot(engine: &Engine, id: &str, runtime: &str, files: &[(&str, &str)]) {
    engine
        .store()
        .create_bot(NewBot {
            id: id.to_string(),
            owner_id: OWNER.to_string(),
            name: format!("{id} bot"),
            runtime: runtime.to_string(),
            main_file: None,
            token: TOKEN.to_string(),
        })
        .await
        .unwrap();

    for (filename, content) in files {
        engine
            .store()
            .insert_bot_file(NewBotFile {
                bot_id: id.to_string(),
                filename: filename.to_string(),
                content: content.to_string(),
            })
            .await
            .unwrap();
    }
}

async fn wait_for_status(engine: &Engine, bot_id: &str, want: BotStatus) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
    loop {
        let bot = engine.store().get_bot(bot_id).await.unwrap().unwrap();
        if bot.status == want.as_str() {
            return;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "timed out waiting for {bot_id} to reach {}, stuck at {}",
            want.as_str(),
            bot.status
        );
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
}

/// Stream observers drain the pipes asynchronously, so a log record can
/// land shortly after the exit status does.
async fn wait_for_log(engine: &Engine, bot_id: &str, needle: &str) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
    loop {
        let logs = engine.read_logs(bot_id, OWNER, Some(500)).await.unwrap();
        if logs.iter().any(|l| l.message.contains(needle)) {
            return;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "timed out waiting for a log containing {needle:?}"
        );
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
}

async fn wait_not_running(engine: &Engine, bot_id: &str) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
    while engine.is_running(bot_id).await {
        assert!(
            tokio::time::Instant::now() < deadline,
            "timed out waiting for {bot_id} to stop"
        );
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
}

const READY_THEN_SLEEP: &str = concat!(
    "# client.run(\"YOUR_BOT_TOKEN\")\n",
    "echo \"Logged in as TestBot\"\n",
    "sleep 300\n",
);

#[tokio::test]
async fn happy_path_reaches_running_and_stops_cleanly() {
    let engine = test_engine("happy").await;
    create_bot(&engine, "b1", "python", &[("bot.py", READY_THEN_SLEEP)]).await;

    let mut status_rx = engine.subscribe_status(OWNER);

    let res = engine.start("b1", OWNER).await;
    assert!(res.ok, "{}", res.message);

    wait_for_status(&engine, "b1", BotStatus::Running).await;
    assert!(engine.is_running("b1").await);

    // The workspace copy carries the substituted credential; the stored
    // file keeps the placeholder.
    let ws_file = engine.config().workspace_dir("b1").join("bot.py");
    let on_disk = tokio::fs::read_to_string(&ws_file).await.unwrap();
    assert!(on_disk.contains(&format!("client.run(\"{TOKEN}\")")));
    let stored = &engine.store().get_bot_files("b1").await.unwrap()[0];
    assert!(stored.content.contains("YOUR_BOT_TOKEN"));

    // Inference synthesized a manifest with the baseline pin.
    let reqs = tokio::fs::read_to_string(
        engine.config().workspace_dir("b1").join("requirements.txt"),
    )
    .await
    .unwrap();
    assert!(reqs.contains("discord.py>=2.3.0"));

    let bot = engine.store().get_bot("b1").await.unwrap().unwrap();
    assert!(bot.pid.is_some());
    assert!(bot.last_start.is_some());

    let res = engine.stop("b1", OWNER).await;
    assert!(res.ok);
    wait_for_status(&engine, "b1", BotStatus::Stopped).await;
    assert!(!engine.is_running("b1").await);

    let bot = engine.store().get_bot("b1").await.unwrap().unwrap();
    assert_eq!(bot.pid, None);
    assert_eq!(bot.memory, "0MB");
    assert_eq!(bot.cpu, "0%");

    // Workspace is removed on stop.
    assert!(!engine.config().workspace_dir("b1").exists());

    // Status broadcasts arrived in transition order.
    let mut seen = Vec::new();
    while let Ok(ev) = status_rx.try_recv() {
        if let StatusEvent::BotStatusUpdate { status, .. } = ev {
            seen.push(status);
        }
    }
    assert_eq!(
        seen,
        vec![BotStatus::Starting, BotStatus::Running, BotStatus::Stopped]
    );
}

#[tokio::test]
async fn start_is_idempotent_while_running() {
    let engine = test_engine("idem").await;
    create_bot(&engine, "b1", "python", &[("bot.py", READY_THEN_SLEEP)]).await;

    assert!(engine.start("b1", OWNER).await.ok);
    let second = engine.start("b1", OWNER).await;
    assert!(!second.ok);
    assert!(second.message.contains("already running"));

    engine.stop("b1", OWNER).await;
}

#[tokio::test]
async fn concurrent_starts_leave_at_most_one_process() {
    let engine = test_engine("race").await;
    create_bot(&engine, "b1", "python", &[("bot.py", READY_THEN_SLEEP)]).await;

    let (a, b) = tokio::join!(engine.start("b1", OWNER), engine.start("b1", OWNER));
    assert!(a.ok != b.ok, "exactly one start may win: {a:?} {b:?}");
    assert!(engine.is_running("b1").await);

    engine.stop("b1", OWNER).await;
    assert!(!engine.is_running("b1").await);
}

#[tokio::test]
async fn exit_code_zero_maps_to_stopped() {
    let engine = test_engine("exit0").await;
    create_bot(&engine, "b1", "python", &[("bot.py", "echo done\nexit 0\n")]).await;

    assert!(engine.start("b1", OWNER).await.ok);
    wait_for_status(&engine, "b1", BotStatus::Stopped).await;
    wait_not_running(&engine, "b1").await;

    let bot = engine.store().get_bot("b1").await.unwrap().unwrap();
    assert_eq!(bot.pid, None);
}

#[tokio::test]
async fn nonzero_exit_maps_to_error_with_stderr_preserved() {
    let engine = test_engine("exit3").await;
    create_bot(
        &engine,
        "b1",
        "python",
        &[("bot.py", "echo \"boom\" >&2\nexit 3\n")],
    )
    .await;

    assert!(engine.start("b1", OWNER).await.ok);
    wait_for_status(&engine, "b1", BotStatus::Error).await;
    wait_not_running(&engine, "b1").await;

    wait_for_log(&engine, "b1", "boom").await;
    let logs = engine.read_logs("b1", OWNER, None).await.unwrap();
    assert!(logs.iter().any(|l| l.level == "error" && l.message == "boom"));
}

#[tokio::test]
async fn stubborn_process_is_killed_within_the_grace_window() {
    let engine = test_engine("stubborn").await;
    // Re-arms sleep after every SIGTERM, so only SIGKILL ends it.
    let script = "trap \":\" TERM\necho \"Logged in as TestBot\"\nwhile :; do sleep 1; done\n";
    create_bot(&engine, "b1", "python", &[("bot.py", script)]).await;

    assert!(engine.start("b1", OWNER).await.ok);
    wait_for_status(&engine, "b1", BotStatus::Running).await;

    let begun = tokio::time::Instant::now();
    let res = engine.stop("b1", OWNER).await;
    assert!(res.ok);
    assert!(
        begun.elapsed() < Duration::from_secs(6),
        "stop took {:?}",
        begun.elapsed()
    );

    let bot = engine.store().get_bot("b1").await.unwrap().unwrap();
    assert_eq!(bot.status, "stopped");
    assert!(!engine.is_running("b1").await);
    assert!(!engine.config().workspace_dir("b1").exists());
}

#[tokio::test]
async fn static_radar_vetoes_before_the_workspace_exists() {
    let engine = test_engine("veto").await;
    create_bot(
        &engine,
        "b1",
        "python",
        &[("miner.py", "# start mining bitcoin with gpu\nimport mining, hashrate\n")],
    )
    .await;

    let res = engine.start("b1", OWNER).await;
    assert!(!res.ok);
    assert!(res.message.contains("RADAR"), "{}", res.message);

    let bot = engine.store().get_bot("b1").await.unwrap().unwrap();
    assert_eq!(bot.status, "error");
    assert!(!engine.is_running("b1").await);
    assert!(!engine.config().workspace_dir("b1").exists());

    let logs = engine.read_logs("b1", OWNER, None).await.unwrap();
    assert!(logs.iter().any(|l| l.message.contains("RADAR")));
}

#[tokio::test]
async fn installer_failure_does_not_block_the_start() {
    let engine = test_engine("installer").await;
    {
        // Every package-tool attempt exits non-zero.
        let mut cfg = engine.config().clone();
        cfg.pip_bin = "false".to_string();
        cfg.pip_fallback_bin = "false".to_string();
        let store = engine.store().clone();
        let engine = Engine::new(cfg, store);

        create_bot(&engine, "b1", "python", &[("bot.py", READY_THEN_SLEEP)]).await;
        let res = engine.start("b1", OWNER).await;
        assert!(res.ok, "{}", res.message);
        wait_for_status(&engine, "b1", BotStatus::Running).await;

        let logs = engine.read_logs("b1", OWNER, None).await.unwrap();
        assert!(logs
            .iter()
            .any(|l| l.message.contains("dependency installation failed")));

        engine.stop("b1", OWNER).await;
    }
}

#[tokio::test]
async fn credential_never_reaches_logs_or_subscribers() {
    let engine = test_engine("leak").await;
    // The program echoes its own environment, token included.
    create_bot(
        &engine,
        "b1",
        "python",
        &[("bot.py", "echo \"my token is $DISCORD_TOKEN\"\nexit 0\n")],
    )
    .await;

    let mut log_rx = engine.subscribe_logs("b1");

    assert!(engine.start("b1", OWNER).await.ok);
    wait_for_status(&engine, "b1", BotStatus::Stopped).await;
    wait_for_log(&engine, "b1", "my token is").await;

    let logs = engine.read_logs("b1", OWNER, None).await.unwrap();
    assert!(!logs.is_empty());
    for record in &logs {
        assert!(
            !record.message.contains(TOKEN),
            "credential leaked into log store: {}",
            record.message
        );
    }
    assert!(logs
        .iter()
        .any(|l| l.message.contains("my token is <redacted>")));

    while let Ok(ev) = log_rx.try_recv() {
        assert!(
            !ev.message.contains(TOKEN),
            "credential leaked to a live subscriber: {}",
            ev.message
        );
    }
}

#[tokio::test]
async fn auth_failure_output_flags_the_bot_as_error() {
    let engine = test_engine("auth").await;
    create_bot(
        &engine,
        "b1",
        "python",
        &[(
            "bot.py",
            "echo \"discord.errors.LoginFailure: Improper token has been passed.\" >&2\nsleep 300\n",
        )],
    )
    .await;

    assert!(engine.start("b1", OWNER).await.ok);
    wait_for_status(&engine, "b1", BotStatus::Error).await;

    engine.stop("b1", OWNER).await;
}

#[tokio::test]
async fn node_runtime_spawns_via_entry_candidates() {
    let engine = test_engine("node").await;
    create_bot(
        &engine,
        "b1",
        "node",
        &[
            ("index.js", "echo \"Bot is ready\"\nsleep 300\n"),
            ("helper.js", "echo helper\n"),
        ],
    )
    .await;

    assert!(engine.start("b1", OWNER).await.ok);
    wait_for_status(&engine, "b1", BotStatus::Running).await;

    // Node inference produced a package.json manifest.
    let manifest = tokio::fs::read_to_string(
        engine.config().workspace_dir("b1").join("package.json"),
    )
    .await
    .unwrap();
    let manifest: serde_json::Value = serde_json::from_str(&manifest).unwrap();
    assert_eq!(manifest["version"], "1.0.0");
    assert!(manifest["dependencies"]["discord.js"].is_string());

    engine.stop("b1", OWNER).await;
}

#[tokio::test]
async fn restart_surfaces_the_second_start() {
    let engine = test_engine("restart").await;
    create_bot(&engine, "b1", "python", &[("bot.py", READY_THEN_SLEEP)]).await;

    assert!(engine.start("b1", OWNER).await.ok);
    wait_for_status(&engine, "b1", BotStatus::Running).await;
    let first_pid = engine.store().get_bot("b1").await.unwrap().unwrap().pid;

    let res = engine.restart("b1", OWNER).await;
    assert!(res.ok, "{}", res.message);
    wait_for_status(&engine, "b1", BotStatus::Running).await;

    let second_pid = engine.store().get_bot("b1").await.unwrap().unwrap().pid;
    assert!(second_pid.is_some());
    assert_ne!(first_pid, second_pid);

    engine.stop("b1", OWNER).await;
}

#[tokio::test]
async fn delete_stops_cascades_and_notifies() {
    let engine = test_engine("delete").await;
    create_bot(&engine, "b1", "python", &[("bot.py", READY_THEN_SLEEP)]).await;

    let mut status_rx = engine.subscribe_status(OWNER);

    assert!(engine.start("b1", OWNER).await.ok);
    wait_for_status(&engine, "b1", BotStatus::Running).await;

    let res = engine.delete("b1", OWNER).await;
    assert!(res.ok);
    assert!(!engine.is_running("b1").await);

    assert!(engine.store().get_bot("b1").await.unwrap().is_none());
    assert!(engine.store().get_bot_files("b1").await.unwrap().is_empty());
    assert_eq!(engine.store().count_bot_logs("b1").await.unwrap(), 0);

    let mut saw_deleted = false;
    while let Ok(ev) = status_rx.try_recv() {
        if let StatusEvent::BotDeleted { bot_id } = ev {
            assert_eq!(bot_id, "b1");
            saw_deleted = true;
        }
    }
    assert!(saw_deleted, "bot_deleted was not broadcast");
}

#[tokio::test]
async fn ownership_and_existence_are_enforced() {
    let engine = test_engine("owner").await;
    create_bot(&engine, "b1", "python", &[("bot.py", READY_THEN_SLEEP)]).await;

    let res = engine.start("b1", "intruder").await;
    assert!(!res.ok);
    assert!(res.message.contains("do not own"));

    let res = engine.stop("ghost", OWNER).await;
    assert!(!res.ok);
    assert!(res.message.contains("not found"));

    assert!(engine.read_logs("b1", "intruder", None).await.is_err());
}

#[tokio::test]
async fn update_file_requires_an_existing_filename() {
    let engine = test_engine("update").await;
    create_bot(&engine, "b1", "python", &[("bot.py", "echo hi\n")]).await;

    let res = engine.update_file("b1", OWNER, "bot.py", "echo bye\n").await;
    assert!(res.ok);
    let res = engine.update_file("b1", OWNER, "other.py", "x\n").await;
    assert!(!res.ok);
    assert!(res.message.contains("no such file"));
}

#[tokio::test]
async fn read_logs_defaults_to_newest_first() {
    let engine = test_engine("logs").await;
    create_bot(
        &engine,
        "b1",
        "python",
        &[("bot.py", "echo one\necho two\necho three\nexit 0\n")],
    )
    .await;

    assert!(engine.start("b1", OWNER).await.ok);
    wait_for_status(&engine, "b1", BotStatus::Stopped).await;
    wait_for_log(&engine, "b1", "three").await;

    let logs = engine.read_logs("b1", OWNER, Some(200)).await.unwrap();
    let one = logs.iter().position(|l| l.message == "one").unwrap();
    let three = logs.iter().position(|l| l.message == "three").unwrap();
    assert!(three < one, "expected newest records first");
}

#[cfg(target_os = "linux")]
#[tokio::test]
async fn runtime_radar_kills_a_cpu_hog() {
    let engine = test_engine("hog").await;
    {
        let mut cfg = engine.config().clone();
        cfg.sample_interval = Duration::from_millis(300);
        cfg.radar.cpu_limit_percent = 5;
        let store = engine.store().clone();
        let engine = Engine::new(cfg, store);

        create_bot(
            &engine,
            "b1",
            "python",
            &[("bot.py", "echo \"Logged in as Hog\"\nwhile :; do :; done\n")],
        )
        .await;

        assert!(engine.start("b1", OWNER).await.ok);
        wait_for_status(&engine, "b1", BotStatus::Error).await;
        wait_not_running(&engine, "b1").await;

        let bot = engine.store().get_bot("b1").await.unwrap().unwrap();
        assert_eq!(bot.pid, None);
        assert_eq!(bot.memory, "0MB");

        let logs = engine.read_logs("b1", OWNER, None).await.unwrap();
        assert!(logs
            .iter()
            .any(|l| l.message.contains("RADAR") && l.message.contains("CPU usage exceeded")));
    }
}
