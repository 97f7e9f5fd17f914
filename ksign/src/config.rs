//! ksign configuration types and loading
//!
//! Two kinds of configuration exist:
//! - [`Config`] is local to the user (YAML), holding defaults and timings
//! - [`AuthorityConfig`] is published by the CA next to its team (JSON) and
//!   tells clients which bot and conversation to talk to

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use eyre::{Context, Result, eyre};
use serde::{Deserialize, Serialize};

use crate::handshake::HandshakeConfig;

/// Name of the file a CA publishes in its team folder
pub const AUTHORITY_CONFIG_FILENAME: &str = "kssh-client.config";

/// Root of the Keybase filesystem mount
pub const KBFS_ROOT: &str = "/keybase/";

/// Main ksign configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Keybase client settings
    pub keybase: KeybaseConfig,

    /// Probe and deadline timings
    pub handshake: HandshakeConfig,

    /// Defaults used when the command line leaves them out
    pub defaults: DefaultsConfig,
}

impl Config {
    /// Load configuration with fallback chain
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        if let Some(path) = config_path {
            // A named file that does not exist yet is created by the setters
            if !path.exists() {
                tracing::info!("Config file {} does not exist, using defaults", path.display());
                return Ok(Self::default());
            }
            return Self::load_from_file(path).context(format!("Failed to load config from {}", path.display()));
        }

        let local_config = PathBuf::from(".ksign.yml");
        if local_config.exists() {
            match Self::load_from_file(&local_config) {
                Ok(config) => return Ok(config),
                Err(e) => {
                    tracing::warn!("Failed to load config from {}: {}", local_config.display(), e);
                }
            }
        }

        if let Some(user_config) = Self::user_config_path()
            && user_config.exists()
        {
            match Self::load_from_file(&user_config) {
                Ok(config) => return Ok(config),
                Err(e) => {
                    tracing::warn!("Failed to load config from {}: {}", user_config.display(), e);
                }
            }
        }

        tracing::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    /// `~/.config/ksign/ksign.yml` on Linux
    pub fn user_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("ksign").join("ksign.yml"))
    }

    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read config file")?;
        let config: Self = serde_yaml::from_str(&content).context("Failed to parse config file")?;
        tracing::info!("Loaded config from: {}", path.as_ref().display());
        Ok(config)
    }

    /// Write the config, creating parent directories as needed
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).context("Failed to create config directory")?;
        }
        let content = serde_yaml::to_string(self).context("Failed to serialize config")?;
        fs::write(path, content).context(format!("Failed to write config file {}", path.display()))?;
        tracing::info!("Saved config to: {}", path.display());
        Ok(())
    }

    /// Default SSH user for certificates; rejects names that would break a command line
    pub fn set_default_ssh_user(&mut self, username: &str) -> Result<()> {
        if username.chars().any(|c| matches!(c, ' ' | '\t' | '\n' | '\r' | '\'' | '"')) {
            return Err(eyre!("invalid username: {}", username));
        }
        self.defaults.ssh_user = non_empty(username);
        Ok(())
    }

    /// Default bot and the team it serves; an empty bot clears both
    ///
    /// Without an explicit team, the team is looked up from the client
    /// configs published under `kbfs_root` and cached alongside the bot.
    pub fn set_default_bot(&mut self, bot: &str, team: Option<&str>, kbfs_root: &Path) -> Result<()> {
        if bot.is_empty() {
            self.defaults.bot = None;
            self.defaults.team = None;
            return Ok(());
        }
        let team = match team.and_then(non_empty) {
            Some(team) => team,
            None => AuthorityConfig::team_for_bot(kbfs_root, bot)?,
        };
        self.defaults.bot = Some(bot.to_string());
        self.defaults.team = Some(team);
        Ok(())
    }

    pub fn set_keybase_binary(&mut self, path: &str) {
        self.keybase.binary = if path.is_empty() {
            KeybaseConfig::default().binary
        } else {
            PathBuf::from(path)
        };
    }
}

fn non_empty(s: &str) -> Option<String> {
    if s.is_empty() { None } else { Some(s.to_string()) }
}

/// Keybase client settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct KeybaseConfig {
    /// Path to the keybase binary
    pub binary: PathBuf,

    /// Longest a single `keybase` command may run, in milliseconds
    #[serde(rename = "command-timeout-ms")]
    pub command_timeout_ms: u64,
}

impl Default for KeybaseConfig {
    fn default() -> Self {
        Self {
            binary: PathBuf::from("keybase"),
            command_timeout_ms: 10_000,
        }
    }
}

impl KeybaseConfig {
    pub fn command_timeout(&self) -> Duration {
        Duration::from_millis(self.command_timeout_ms)
    }
}

/// Defaults for `ks sign`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DefaultsConfig {
    /// CA bot username
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bot: Option<String>,

    /// Team the bot listens in
    #[serde(skip_serializing_if = "Option::is_none")]
    pub team: Option<String>,

    /// Topic within the team
    #[serde(skip_serializing_if = "Option::is_none")]
    pub channel: Option<String>,

    /// SSH user requested as certificate principal
    #[serde(rename = "ssh-user", skip_serializing_if = "Option::is_none")]
    pub ssh_user: Option<String>,
}

/// Client settings published by a CA
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorityConfig {
    #[serde(rename = "teamname")]
    pub team_name: String,

    #[serde(rename = "channelname", default)]
    pub channel_name: String,

    #[serde(rename = "botname")]
    pub bot_name: String,
}

impl AuthorityConfig {
    /// Where a CA serving `team` publishes its client config under `kbfs_root`
    pub fn published_path(kbfs_root: &Path, team: &str) -> PathBuf {
        kbfs_root.join("team").join(team).join(AUTHORITY_CONFIG_FILENAME)
    }

    /// The config a CA published for `team`, if there is one
    pub fn discover(kbfs_root: &Path, team: &str) -> Result<Option<Self>> {
        let path = Self::published_path(kbfs_root, team);
        tracing::debug!(path = %path.display(), "AuthorityConfig::discover: called");
        if !path.exists() {
            return Ok(None);
        }
        Self::load_unchecked(&path).map(Some)
    }

    /// Team whose published config names `bot`
    pub fn team_for_bot(kbfs_root: &Path, bot: &str) -> Result<String> {
        tracing::debug!(%bot, "AuthorityConfig::team_for_bot: called");
        let teams = fs::read_dir(kbfs_root.join("team")).into_iter().flatten().flatten();
        for entry in teams {
            let team = entry.file_name().to_string_lossy().into_owned();
            match Self::discover(kbfs_root, &team) {
                Ok(Some(config)) if config.bot_name == bot => return Ok(config.team_name),
                Ok(_) => {}
                Err(e) => tracing::warn!(%team, error = %e, "Skipping unusable client config"),
            }
        }
        Err(eyre!(
            "did not find a client config file matching botname={} (is the CA bot running and are you in the correct teams?)",
            bot
        ))
    }

    /// Load from the Keybase filesystem
    pub fn load(path: &Path) -> Result<Self> {
        if !path.starts_with(KBFS_ROOT) {
            return Err(eyre!("cannot load a client config from outside of KBFS: {}", path.display()));
        }
        Self::load_unchecked(path)
    }

    /// Load from any path (local copies, tests)
    pub fn load_unchecked(path: &Path) -> Result<Self> {
        let bytes = fs::read(path).context(format!(
            "found a config file at {} that could not be read",
            path.display()
        ))?;
        let config: Self = serde_json::from_slice(&bytes)
            .context(format!("failed to parse config file at {}", path.display()))?;
        if config.team_name.is_empty() || config.bot_name.is_empty() {
            return Err(eyre!(
                "found a config file at {} that is missing data: {}",
                path.display(),
                String::from_utf8_lossy(&bytes)
            ));
        }
        Ok(config)
    }

    pub fn channel(&self) -> Option<&str> {
        if self.channel_name.is_empty() {
            None
        } else {
            Some(&self.channel_name)
        }
    }
}
