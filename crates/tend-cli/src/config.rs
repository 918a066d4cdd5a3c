//! Configuration file management for tend.
//!
//! Provides a TOML-based config file at `~/.config/tend/config.toml` and a
//! resolution chain: CLI flag > env var > config file > default.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};

use tend_core::materialize::{DEFAULT_LOOK_AHEAD_HOURS, MAX_LOOK_AHEAD_HOURS, MaterializerConfig};
use tend_core::scheduler::DEFAULT_INTERVAL_MS;
use tend_db::config::DbConfig;

pub const LOOK_AHEAD_ENV: &str = "TEND_LOOK_AHEAD_HOURS";
pub const INTERVAL_ENV: &str = "TEND_RUN_INTERVAL_MS";

// -----------------------------------------------------------------------
// Config file types
// -----------------------------------------------------------------------

#[derive(Debug, Serialize, Deserialize)]
pub struct ConfigFile {
    pub database: DatabaseSection,
    #[serde(default)]
    pub scheduler: SchedulerSection,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DatabaseSection {
    pub url: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerSection {
    /// How far ahead of now each run materializes tasks.
    pub look_ahead_hours: u32,
    /// Period of the background run started by `tend serve`.
    pub interval_ms: u64,
}

impl Default for SchedulerSection {
    fn default() -> Self {
        Self {
            look_ahead_hours: DEFAULT_LOOK_AHEAD_HOURS,
            interval_ms: DEFAULT_INTERVAL_MS,
        }
    }
}

// -----------------------------------------------------------------------
// Paths
// -----------------------------------------------------------------------

/// Return the tend config directory.
///
/// Always uses XDG layout: `$XDG_CONFIG_HOME/tend` or `~/.config/tend`,
/// never the platform-specific `dirs::config_dir()`.
pub fn config_dir() -> PathBuf {
    if let Ok(xdg) = std::env::var("XDG_CONFIG_HOME") {
        return PathBuf::from(xdg).join("tend");
    }
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".config")
        .join("tend")
}

pub fn config_path() -> PathBuf {
    config_dir().join("config.toml")
}

// -----------------------------------------------------------------------
// Read / write
// -----------------------------------------------------------------------

/// Load and parse the config file. Returns an error if it does not exist.
pub fn load_config() -> Result<ConfigFile> {
    let path = config_path();
    let contents = std::fs::read_to_string(&path)
        .with_context(|| format!("failed to read config file at {}", path.display()))?;
    let config: ConfigFile = toml::from_str(&contents).context("failed to parse config file")?;
    Ok(config)
}

/// Serialize and write the config file, creating parent dirs as needed.
/// The file holds a database URL, so it is made owner-only on Unix.
pub fn save_config(config: &ConfigFile) -> Result<()> {
    let path = config_path();
    let dir = config_dir();
    std::fs::create_dir_all(&dir)
        .with_context(|| format!("failed to create config directory {}", dir.display()))?;

    let contents = toml::to_string_pretty(config).context("failed to serialize config")?;
    std::fs::write(&path, &contents)
        .with_context(|| format!("failed to write config file at {}", path.display()))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(0o600);
        std::fs::set_permissions(&path, perms)
            .with_context(|| format!("failed to set permissions on {}", path.display()))?;
    }

    Ok(())
}

// -----------------------------------------------------------------------
// Resolved config
// -----------------------------------------------------------------------

/// Values given on the command line; `None` falls through the chain.
#[derive(Debug, Default, Clone, Copy)]
pub struct CliOverrides<'a> {
    pub db_url: Option<&'a str>,
    pub look_ahead_hours: Option<u32>,
}

/// Fully resolved configuration, ready for use.
#[derive(Debug)]
pub struct TendConfig {
    pub db_config: DbConfig,
    pub materializer: MaterializerConfig,
    pub run_interval: Duration,
}

impl TendConfig {
    /// Resolve configuration from the CLI, the process environment and the
    /// config file (if one exists).
    pub fn resolve(cli: CliOverrides<'_>) -> Result<Self> {
        let file_config = load_config().ok();
        Self::resolve_with(cli, file_config.as_ref(), |key| std::env::var(key).ok())
    }

    /// Resolution chain: CLI flag > env var > config file > default.
    ///
    /// - DB URL: `--database-url` > `TEND_DATABASE_URL` > `database.url` > `DbConfig::DEFAULT_URL`
    /// - Look-ahead: `--look-ahead-hours` > `TEND_LOOK_AHEAD_HOURS` > `scheduler.look_ahead_hours` > 1
    /// - Interval: `TEND_RUN_INTERVAL_MS` > `scheduler.interval_ms` > 300000
    pub fn resolve_with(
        cli: CliOverrides<'_>,
        file_config: Option<&ConfigFile>,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Self> {
        let file_scheduler = file_config.map(|c| c.scheduler).unwrap_or_default();

        let db_url = if let Some(url) = cli.db_url {
            url.to_string()
        } else if let Some(url) = env(DbConfig::ENV_VAR) {
            url
        } else if let Some(cfg) = file_config {
            cfg.database.url.clone()
        } else {
            DbConfig::DEFAULT_URL.to_string()
        };

        let look_ahead_hours = match (cli.look_ahead_hours, env(LOOK_AHEAD_ENV)) {
            (Some(hours), _) => hours,
            (None, Some(raw)) => raw
                .trim()
                .parse()
                .with_context(|| format!("{LOOK_AHEAD_ENV} must be a whole number of hours, got {raw:?}"))?,
            (None, None) => file_scheduler.look_ahead_hours,
        };
        if look_ahead_hours > MAX_LOOK_AHEAD_HOURS {
            bail!("look-ahead must be at most {MAX_LOOK_AHEAD_HOURS} hours, got {look_ahead_hours}");
        }

        let interval_ms: u64 = match env(INTERVAL_ENV) {
            Some(raw) => raw
                .trim()
                .parse()
                .with_context(|| format!("{INTERVAL_ENV} must be a number of milliseconds, got {raw:?}"))?,
            None => file_scheduler.interval_ms,
        };
        if interval_ms == 0 {
            bail!("run interval must be greater than zero");
        }

        Ok(Self {
            db_config: DbConfig::new(db_url),
            materializer: MaterializerConfig { look_ahead_hours },
            run_interval: Duration::from_millis(interval_ms),
        })
    }
}

// -----------------------------------------------------------------------
// Tests
// -----------------------------------------------------------------------
