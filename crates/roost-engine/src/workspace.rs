//! Projects a bot's persisted files onto a per-bot directory, substituting
//! the credential placeholder on the way to disk. The persisted rows keep
//! the placeholder; only the on-disk copy carries the real token.

use std::path::{Component, Path, PathBuf};

use tokio::io::AsyncWriteExt;

use crate::error::EngineError;

/// Extensions a bot file may carry. Upload enforcement happens in the HTTP
/// collaborator; this is the launch-time backstop.
pub const ALLOWED_EXTENSIONS: &[&str] = &[
    "py", "js", "mjs", "cjs", "json", "txt", "md", "env", "cfg", "ini", "yml", "yaml", "toml",
];

/// Placeholder idioms rewritten to the double-quoted credential literal.
/// Quoted variants come first so the bare form does not mangle them.
const TOKEN_IDIOMS: &[&str] = &[
    "\"YOUR_BOT_TOKEN\"",
    "'YOUR_BOT_TOKEN'",
    "YOUR_BOT_TOKEN",
    "process.env.DISCORD_TOKEN",
    "process.env.BOT_TOKEN",
    "process.env.TOKEN",
    "os.environ['DISCORD_TOKEN']",
    "os.environ[\"DISCORD_TOKEN\"]",
    "os.environ.get('DISCORD_TOKEN')",
    "os.environ.get(\"DISCORD_TOKEN\")",
    "os.getenv('DISCORD_TOKEN')",
    "os.getenv(\"DISCORD_TOKEN\")",
];

/// Rewrites every recognized placeholder idiom to `"{token}"`.
pub fn substitute_credential(content: &str, token: &str) -> String {
    let literal = format!("\"{token}\"");
    let mut out = content.to_string();
    for idiom in TOKEN_IDIOMS {
        out = out.replace(idiom, &literal);
    }
    out
}

/// Normalizes a stored filename into a workspace-relative path. Rejects
/// absolute paths, traversal, and disallowed extensions.
pub fn normalize_filename(name: &str) -> Result<PathBuf, EngineError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(EngineError::Workspace("empty filename".to_string()));
    }

    let p = Path::new(name);
    if p.is_absolute() {
        return Err(EngineError::Workspace(format!(
            "filename must be relative: {name}"
        )));
    }

    let mut out = PathBuf::new();
    for c in p.components() {
        match c {
            Component::CurDir => {}
            Component::Normal(seg) => out.push(seg),
            Component::ParentDir => {
                return Err(EngineError::Workspace(format!(
                    "path traversal is not allowed: {name}"
                )));
            }
            Component::Prefix(_) | Component::RootDir => {
                return Err(EngineError::Workspace(format!(
                    "filename must be relative: {name}"
                )));
            }
        }
    }

    let ext = out
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();
    if !ALLOWED_EXTENSIONS.contains(&ext.as_str()) {
        return Err(EngineError::Workspace(format!(
            "file type is not allowed: {name}"
        )));
    }

    Ok(out)
}

async fn write_atomic(path: &Path, data: &[u8]) -> std::io::Result<()> {
    let tmp = path.with_extension("tmp");
    let mut f = tokio::fs::File::create(&tmp).await?;
    f.write_all(data).await?;
    f.flush().await.ok();
    tokio::fs::rename(&tmp, path).await
}

/// Materializes the workspace for `bot_id` under `root` and returns its
/// path. Fails when the bot has zero files or on any I/O error.
pub async fn materialize(
    root: &Path,
    bot_id: &str,
    files: &[(String, String)],
    token: &str,
) -> Result<PathBuf, EngineError> {
    if files.is_empty() {
        return Err(EngineError::Workspace(
            "bot has no files to deploy".to_string(),
        ));
    }

    let dir = root.join(bot_id);
    tokio::fs::create_dir_all(&dir)
        .await
        .map_err(|e| EngineError::Workspace(format!("create workspace dir: {e}")))?;

    for (name, content) in files {
        let rel = normalize_filename(name)?;
        let path = dir.join(&rel);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| EngineError::Workspace(format!("create dir for {name}: {e}")))?;
        }

        let substituted = substitute_credential(content, token);
        write_atomic(&path, substituted.as_bytes())
            .await
            .map_err(|e| EngineError::Workspace(format!("write {name}: {e}")))?;
    }

    Ok(dir)
}

/// Best-effort recursive removal of a bot workspace.
pub async fn remove(root: &Path, bot_id: &str) -> std::io::Result<()> {
    let dir = root.join(bot_id);
    match tokio::fs::remove_dir_all(&dir).await {
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        other => other,
    }
}

/// Removes every workspace directory under `root`. Run at boot: no bot is
/// supervised yet, so anything on disk is left over from a previous run.
pub async fn sweep_stale(root: &Path) -> usize {
    let mut removed = 0;
    let mut rd = match tokio::fs::read_dir(root).await {
        Ok(v) => v,
        Err(_) => return 0,
    };

    while let Ok(Some(de)) = rd.next_entry().await {
        let path = de.path();
        if !path.is_dir() {
            continue;
        }
        match tokio::fs::remove_dir_all(&path).await {
            Ok(()) => removed += 1,
            Err(err) => {
                tracing::warn!(path = %path.display(), %err, "failed to remove stale workspace");
            }
        }
    }

    removed
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn substitutes_every_placeholder_form() {
        let src = concat!(
            "client.run(\"YOUR_BOT_TOKEN\")\n",
            "client.run('YOUR_BOT_TOKEN')\n",
            "client.run(YOUR_BOT_TOKEN)\n",
            "client.login(process.env.DISCORD_TOKEN)\n",
            "client.run(os.environ['DISCORD_TOKEN'])\n",
            "client.run(os.getenv('DISCORD_TOKEN'))\n",
        );
        let out = substitute_credential(src, "tok-9");
        assert!(!out.contains("YOUR_BOT_TOKEN"));
        assert!(!out.contains("DISCORD_TOKEN"));
        assert_eq!(out.matches("\"tok-9\"").count(), 6);
    }

    #[test]
    fn quoted_forms_do_not_double_quote() {
        let out = substitute_credential("run(\"YOUR_BOT_TOKEN\")", "t");
        assert_eq!(out, "run(\"t\")");
    }

    #[test]
    fn rejects_traversal_and_absolute_paths() {
        assert!(normalize_filename("../../etc/passwd.txt").is_err());
        assert!(normalize_filename("/etc/passwd.txt").is_err());
        assert!(normalize_filename("").is_err());
    }

    #[test]
    fn rejects_unknown_extensions() {
        assert!(normalize_filename("payload.exe").is_err());
        assert!(normalize_filename("script.sh").is_err());
        assert!(normalize_filename("noext").is_err());
    }

    #[test]
    fn accepts_nested_allowed_paths() {
        let p = normalize_filename("cogs/music.py").unwrap();
        assert_eq!(p, PathBuf::from("cogs/music.py"));
        assert!(normalize_filename("bot.PY").is_ok());
    }

    #[tokio::test]
    async fn materialize_writes_substituted_files() {
        let root = std::env::temp_dir().join(format!("roost-ws-{}", std::process::id()));
        let files = vec![(
            "bot.py".to_string(),
            "import discord\nclient.run(\"YOUR_BOT_TOKEN\")\n".to_string(),
        )];

        let dir = materialize(&root, "b1", &files, "secret-token")
            .await
            .unwrap();
        let on_disk = tokio::fs::read_to_string(dir.join("bot.py")).await.unwrap();
        assert!(on_disk.contains("client.run(\"secret-token\")"));

        remove(&root, "b1").await.unwrap();
        assert!(!dir.exists());
        tokio::fs::remove_dir_all(&root).await.ok();
    }

    #[tokio::test]
    async fn materialize_fails_on_zero_files() {
        let root = std::env::temp_dir().join("roost-ws-empty");
        let err = materialize(&root, "b1", &[], "t").await.unwrap_err();
        assert!(matches!(err, EngineError::Workspace(_)));
    }
}
