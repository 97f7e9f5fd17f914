//! Signing flow behind `ks sign`
//!
//! Resolves which bot to talk to, packages the public key into a request,
//! runs the handshake and stores the certificate next to the key.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chatproto::{SignatureOutcome, SignatureParams, SignatureRequest};
use eyre::{Context, Result, eyre};
use tracing::{debug, info, warn};

use crate::channel::{ChatChannel, Destination};
use crate::config::{AuthorityConfig, Config, KBFS_ROOT};
use crate::handshake::{Handshake, HandshakeConfig};

/// The CA bot and the conversation it listens in
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    pub bot: String,
    pub destination: Destination,
}

/// Explicit choices from the command line
#[derive(Debug, Clone, Default)]
pub struct TargetOverrides<'a> {
    pub bot: Option<&'a str>,
    pub team: Option<&'a str>,
    pub channel: Option<&'a str>,
    pub authority_config: Option<&'a Path>,
}

impl Target {
    /// Resolve against the mounted Keybase filesystem
    pub fn resolve(overrides: &TargetOverrides<'_>, config: &Config) -> Result<Self> {
        Self::resolve_in(overrides, config, Path::new(KBFS_ROOT))
    }

    /// Command line first, then a published CA config, then local defaults
    ///
    /// A published config is either named explicitly or found under
    /// `kbfs_root` for the team. Discovery is skipped when a default bot is
    /// configured and no team was given on the command line.
    pub fn resolve_in(overrides: &TargetOverrides<'_>, config: &Config, kbfs_root: &Path) -> Result<Self> {
        debug!(?overrides, kbfs_root = %kbfs_root.display(), "Target::resolve_in: called");
        let mut published = match overrides.authority_config {
            Some(path) => Some(AuthorityConfig::load(path)?),
            None => None,
        };

        let team = overrides
            .team
            .map(str::to_string)
            .or_else(|| published.as_ref().map(|p| p.team_name.clone()))
            .or_else(|| config.defaults.team.clone());

        let wants_discovery = overrides.bot.is_none() && (overrides.team.is_some() || config.defaults.bot.is_none());
        if published.is_none()
            && wants_discovery
            && let Some(team) = &team
        {
            match AuthorityConfig::discover(kbfs_root, team) {
                Ok(found) => published = found,
                Err(e) => warn!(%team, error = %e, "Ignoring unusable published client config"),
            }
            if let Some(found) = &published {
                info!(%team, bot = %found.bot_name, "Using the CA published for the team");
            }
        }

        let bot = overrides
            .bot
            .map(str::to_string)
            .or_else(|| published.as_ref().map(|p| p.bot_name.clone()))
            .or_else(|| config.defaults.bot.clone());
        let channel = overrides
            .channel
            .map(str::to_string)
            .or_else(|| published.as_ref().and_then(|p| p.channel().map(str::to_string)))
            .or_else(|| config.defaults.channel.clone());

        let (Some(bot), Some(team)) = (bot, team) else {
            return Err(eyre!(
                "no CA bot configured: pass --bot and --team, --authority-config, or run `ks config set-default-bot`"
            ));
        };

        let mut destination = Destination::team(team);
        destination.channel = channel;
        Ok(Self { bot, destination })
    }
}

/// Read an OpenSSH public key, refusing anything that looks private
pub fn read_public_key(path: &Path) -> Result<String> {
    let content = fs::read_to_string(path).context(format!("Failed to read public key {}", path.display()))?;
    let key = content.trim();
    if key.contains("PRIVATE") {
        return Err(eyre!("{} looks like a private key; pass the .pub file", path.display()));
    }
    let known = ["ssh-", "ecdsa-", "sk-ssh-", "sk-ecdsa-"];
    if !known.iter().any(|prefix| key.starts_with(prefix)) {
        return Err(eyre!("{} is not an OpenSSH public key", path.display()));
    }
    Ok(key.to_string())
}

/// Name of this machine as reported to the CA
pub fn device_name() -> String {
    #[cfg(unix)]
    match nix::unistd::gethostname() {
        Ok(name) => {
            let name = name.to_string_lossy().trim().to_string();
            if !name.is_empty() {
                return name;
            }
        }
        Err(e) => warn!(error = %e, "Failed to read hostname"),
    }
    "unknown-device".to_string()
}

/// `id_ed25519.pub` -> `id_ed25519-cert.pub`, the name ssh looks for
pub fn cert_path_for(public_key: &Path) -> PathBuf {
    let name = public_key.to_string_lossy();
    let stem = name.strip_suffix(".pub").unwrap_or(&name);
    PathBuf::from(format!("{stem}-cert.pub"))
}

/// Run one handshake and return the signed certificate
pub async fn request_signed_key(
    channel: Arc<dyn ChatChannel>,
    handshake_config: &HandshakeConfig,
    target: &Target,
    params: SignatureParams,
    deadline: Duration,
) -> Result<String> {
    let request = SignatureRequest::new(params);
    info!(uuid = %request.correlation_id(), bot = %target.bot, destination = %target.destination, "Requesting signature");

    let handshake = Handshake::new(channel, handshake_config);
    let response = handshake
        .execute::<_, SignatureOutcome>(&target.destination, &target.bot, &request, deadline)
        .await?;

    let cert = response.into_outcome().into_result()?;
    Ok(cert)
}

/// Write the certificate with owner-only permissions
pub fn write_cert(path: &Path, cert: &str) -> Result<()> {
    fs::write(path, format!("{}\n", cert.trim_end())).context(format!("Failed to write {}", path.display()))?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, fs::Permissions::from_mode(0o600))
            .context(format!("Failed to set permissions on {}", path.display()))?;
    }
    Ok(())
}
