//! Heuristic dependency inference for workspaces uploaded without a
//! manifest. Marker tables are data; the scan is a lower-cased substring
//! match per line.

use std::path::Path;

use roost_bot::Runtime;

/// (marker substrings, requirements.txt pin)
const PYTHON_MARKERS: &[(&[&str], &str)] = &[
    (
        &["discord.py", "import discord", "from discord"],
        "discord.py>=2.3.0",
    ),
    (&["aiohttp"], "aiohttp>=3.8.0"),
    (&["requests"], "requests>=2.28.0"),
    (&["dotenv", "python-dotenv"], "python-dotenv>=0.19.0"),
    (&["pymysql", "mysql"], "pymysql>=1.0.0"),
    (&["psycopg", "postgres"], "psycopg2-binary>=2.9.0"),
];

const PYTHON_BASELINE: &str = "discord.py>=2.3.0";

/// (marker substrings, package name, version range)
const NODE_MARKERS: &[(&[&str], &str, &str)] = &[
    (&["discord.js"], "discord.js", "^14.11.0"),
    (&["@discordjs/builders"], "@discordjs/builders", "^1.6.0"),
    (&["@discordjs/rest"], "@discordjs/rest", "^1.7.0"),
    (&["@discordjs/voice"], "@discordjs/voice", "^0.16.0"),
    (&["dotenv"], "dotenv", "^16.0.0"),
    (&["axios"], "axios", "^1.4.0"),
    (&["fs-extra"], "fs-extra", "^11.1.0"),
    (&["moment"], "moment", "^2.29.0"),
    (&["lodash"], "lodash", "^4.17.0"),
    (&["sqlite3"], "sqlite3", "^5.1.0"),
    (&["mysql2", "mysql"], "mysql2", "^3.3.0"),
    (&["mongodb", "mongoose"], "mongoose", "^7.2.0"),
];

const NODE_BASELINE: (&str, &str) = ("discord.js", "^14.11.0");

fn line_has_marker(line: &str, markers: &[&str]) -> bool {
    markers.iter().any(|m| line.contains(m))
}

/// Synthesizes `requirements.txt` content, or `None` when the bot has no
/// Python source files.
pub fn infer_python_requirements(files: &[(String, String)]) -> Option<String> {
    let mut pins: Vec<&str> = Vec::new();
    let mut saw_source = false;

    for (name, content) in files {
        if !Runtime::Python.has_source_extension(name) {
            continue;
        }
        saw_source = true;

        for line in content.lines() {
            let line = line.to_lowercase();
            for &(markers, pin) in PYTHON_MARKERS {
                if line_has_marker(&line, markers) && !pins.contains(&pin) {
                    pins.push(pin);
                }
            }
        }
    }

    if !saw_source {
        return None;
    }
    if pins.is_empty() {
        pins.push(PYTHON_BASELINE);
    }

    let mut out = pins.join("\n");
    out.push('\n');
    Some(out)
}

/// Synthesizes a `package.json` manifest, or `None` when the bot has no
/// Node source files.
pub fn infer_node_manifest(bot_name: &str, files: &[(String, String)]) -> Option<serde_json::Value> {
    let mut deps: Vec<(&str, &str)> = Vec::new();
    let mut saw_source = false;

    for (name, content) in files {
        if !Runtime::Node.has_source_extension(name) {
            continue;
        }
        saw_source = true;

        for line in content.lines() {
            let line = line.to_lowercase();
            for &(markers, package, version) in NODE_MARKERS {
                if line_has_marker(&line, markers) && !deps.iter().any(|&(p, _)| p == package) {
                    deps.push((package, version));
                }
            }
        }
    }

    if !saw_source {
        return None;
    }
    if deps.is_empty() {
        deps.push(NODE_BASELINE);
    }

    let mut map = serde_json::Map::new();
    for (package, version) in deps {
        map.insert(package.to_string(), serde_json::Value::from(version));
    }

    let name: String = bot_name
        .to_lowercase()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '-' })
        .collect();

    Some(serde_json::json!({
        "name": if name.is_empty() { "bot".to_string() } else { name },
        "version": "1.0.0",
        "main": "index.js",
        "dependencies": serde_json::Value::Object(map),
    }))
}

/// Writes the runtime's manifest into the workspace when the user did not
/// supply one. Returns whether a manifest is present afterwards.
pub async fn ensure_manifest(
    workspace: &Path,
    runtime: Runtime,
    bot_name: &str,
    files: &[(String, String)],
) -> std::io::Result<bool> {
    let manifest_path = workspace.join(runtime.manifest_file());
    if tokio::fs::try_exists(&manifest_path).await.unwrap_or(false) {
        return Ok(true);
    }

    let content = match runtime {
        Runtime::Python => infer_python_requirements(files),
        Runtime::Node => infer_node_manifest(bot_name, files)
            .map(|m| serde_json::to_string_pretty(&m).unwrap_or_default()),
    };

    match content {
        Some(content) => {
            tokio::fs::write(&manifest_path, content).await?;
            Ok(true)
        }
        None => Ok(false),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file(name: &str, content: &str) -> (String, String) {
        (name.to_string(), content.to_string())
    }

    #[test]
    fn python_markers_map_to_pins() {
        let cases = [
            ("import discord", "discord.py>=2.3.0"),
            ("from discord.ext import commands", "discord.py>=2.3.0"),
            ("import aiohttp", "aiohttp>=3.8.0"),
            ("import requests", "requests>=2.28.0"),
            ("from dotenv import load_dotenv", "python-dotenv>=0.19.0"),
            ("import pymysql", "pymysql>=1.0.0"),
            ("import psycopg2", "psycopg2-binary>=2.9.0"),
        ];

        for (source, pin) in cases {
            let reqs = infer_python_requirements(&[file("bot.py", source)]).unwrap();
            assert!(reqs.contains(pin), "{source} should pin {pin}: {reqs}");
        }
    }

    #[test]
    fn python_baseline_when_no_markers() {
        let reqs = infer_python_requirements(&[file("bot.py", "print('hi')")]).unwrap();
        assert_eq!(reqs.trim(), "discord.py>=2.3.0");
    }

    #[test]
    fn python_none_without_source_files() {
        assert!(infer_python_requirements(&[file("notes.txt", "import discord")]).is_none());
        assert!(infer_python_requirements(&[]).is_none());
    }

    #[test]
    fn python_pins_are_deduplicated() {
        let reqs = infer_python_requirements(&[
            file("a.py", "import discord\nimport requests"),
            file("b.py", "from discord import Intents\nimport requests"),
        ])
        .unwrap();
        assert_eq!(reqs.matches("discord.py").count(), 1);
        assert_eq!(reqs.matches("requests").count(), 1);
    }

    #[test]
    fn node_manifest_shape() {
        let manifest = infer_node_manifest(
            "My Bot",
            &[file(
                "index.js",
                "const { Client } = require('discord.js');\nrequire('dotenv').config();",
            )],
        )
        .unwrap();

        assert_eq!(manifest["name"], "my-bot");
        assert_eq!(manifest["version"], "1.0.0");
        assert_eq!(manifest["main"], "index.js");
        assert_eq!(manifest["dependencies"]["discord.js"], "^14.11.0");
        assert_eq!(manifest["dependencies"]["dotenv"], "^16.0.0");
    }

    #[test]
    fn node_baseline_when_no_markers() {
        let manifest = infer_node_manifest("b", &[file("index.js", "console.log(1)")]).unwrap();
        assert_eq!(manifest["dependencies"]["discord.js"], "^14.11.0");
    }

    #[test]
    fn node_none_without_source_files() {
        assert!(infer_node_manifest("b", &[file("readme.md", "discord.js")]).is_none());
    }

    #[tokio::test]
    async fn ensure_manifest_respects_user_supplied_file() {
        let dir = std::env::temp_dir().join(format!("roost-deps-{}", std::process::id()));
        tokio::fs::create_dir_all(&dir).await.unwrap();
        tokio::fs::write(dir.join("requirements.txt"), "mypin==1.0\n")
            .await
            .unwrap();

        let present = ensure_manifest(
            &dir,
            Runtime::Python,
            "b",
            &[file("bot.py", "import discord")],
        )
        .await
        .unwrap();
        assert!(present);

        let reqs = tokio::fs::read_to_string(dir.join("requirements.txt"))
            .await
            .unwrap();
        assert_eq!(reqs, "mypin==1.0\n");
        tokio::fs::remove_dir_all(&dir).await.ok();
    }
}
