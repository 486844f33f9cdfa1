//! Command-line arguments and the JSON configuration file.
//!
//! The configuration file holds one `database` entry per deployment
//! flavour; the entry whose `type` matches `--launch-type` is selected
//! at startup. The file also carries the Telegram bot token used by
//! the notifier.

use std::path::{Path, PathBuf};

use clap::Parser;
use serde::Deserialize;
use zeroize::Zeroizing;

use crate::{MinderError, Result};

/// Command-line interface.
#[derive(Debug, Parser)]
#[command(name = "minder", about = "Binance account bridge")]
pub struct Cli {
    /// Port the control plane binds to.
    #[arg(short = 'p', long = "port", default_value_t = 3420)]
    pub port: u16,

    /// IP address the control plane binds to.
    #[arg(short = 'a', long = "address", default_value = "127.0.0.1")]
    pub ip_address: String,

    /// Path to the JSON configuration file.
    #[arg(short = 'd', long = "config")]
    pub config_path: PathBuf,

    /// Launch type, matched against `database[].type` in the
    /// configuration file (e.g. `production`, `development`).
    #[arg(short = 'y', long = "launch-type")]
    pub launch_type: String,
}

/// Connection parameters for one database flavour.
#[derive(Debug, Clone, Deserialize)]
pub struct DbConfig {
    pub username: String,
    pub password: String,
    /// `host[:port]/database` of the MySQL server.
    pub db_dns: String,
}

impl DbConfig {
    /// Renders the connection URL consumed by the pool.
    pub fn url(&self) -> Zeroizing<String> {
        Zeroizing::new(format!(
            "mysql://{}:{}@{}",
            self.username, self.password, self.db_dns
        ))
    }
}

#[derive(Debug, Deserialize)]
struct DatabaseEntry {
    #[serde(rename = "type")]
    launch_type: String,
    data: DbConfig,
}

/// Raw shape of the configuration file. The file is shared with the
/// external control plane; its extra fields (`jwt`, version pins) are
/// ignored here.
#[derive(Debug, Deserialize)]
struct ConfigFile {
    database: Vec<DatabaseEntry>,
    bot_token: String,
}

/// Fully resolved application configuration.
#[derive(Debug)]
pub struct AppConfig {
    pub port: u16,
    pub ip_address: String,
    pub db: DbConfig,
    pub bot_token: String,
}

/// Loads and resolves the configuration for the given CLI arguments.
///
/// # Errors
///
/// Returns [`MinderError::Config`] if the file cannot be read or
/// parsed, or if no `database` entry matches the launch type.
pub fn load(cli: &Cli) -> Result<AppConfig> {
    let file = parse_file(&cli.config_path)?;
    let db = file
        .database
        .into_iter()
        .find(|entry| entry.launch_type == cli.launch_type)
        .map(|entry| entry.data)
        .ok_or_else(|| {
            MinderError::Config(format!(
                "no database entry for launch type '{}'",
                cli.launch_type
            ))
        })?;

    Ok(AppConfig {
        port: cli.port,
        ip_address: cli.ip_address.clone(),
        db,
        bot_token: file.bot_token,
    })
}

fn parse_file(path: &Path) -> Result<ConfigFile> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| MinderError::Config(format!("cannot read {}: {e}", path.display())))?;
    serde_json::from_str(&content)
        .map_err(|e| MinderError::Config(format!("cannot parse {}: {e}", path.display())))
}

#[cfg(test)]
mod tests {
    use super::*;

    const CONFIG_JSON: &str = r#"{
        "client_version": 102,
        "server_version": 1,
        "jwt": "not-a-real-secret",
        "bot_token": "123456:bot-token",
        "database": [
            {
                "type": "development",
                "data": {
                    "username": "dev",
                    "password": "devpass",
                    "db_dns": "localhost/minder_dev"
                }
            },
            {
                "type": "production",
                "data": {
                    "username": "prod",
                    "password": "prodpass",
                    "db_dns": "db.internal:3307/minder"
                }
            }
        ]
    }"#;

    fn cli_for(launch_type: &str, path: &Path) -> Cli {
        Cli {
            port: 3420,
            ip_address: "127.0.0.1".into(),
            config_path: path.to_path_buf(),
            launch_type: launch_type.into(),
        }
    }

    #[test]
    fn selects_entry_matching_launch_type() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, CONFIG_JSON).unwrap();

        let config = load(&cli_for("production", &path)).unwrap();
        assert_eq!(config.db.username, "prod");
        assert_eq!(config.db.db_dns, "db.internal:3307/minder");
        assert_eq!(config.bot_token, "123456:bot-token");
    }

    #[test]
    fn rejects_unknown_launch_type() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, CONFIG_JSON).unwrap();

        let err = load(&cli_for("staging", &path)).unwrap_err();
        assert!(err.to_string().contains("staging"));
    }

    #[test]
    fn db_url_is_assembled_from_parts() {
        let db = DbConfig {
            username: "u".into(),
            password: "p".into(),
            db_dns: "localhost/minder".into(),
        };
        assert_eq!(db.url().as_str(), "mysql://u:p@localhost/minder");
    }
}
