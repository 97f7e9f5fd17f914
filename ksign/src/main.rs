//! ks - signed SSH keys from a CA bot over Keybase chat
//!
//! CLI entry point.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chatproto::SignatureParams;
use clap::Parser;
use colored::*;
use eyre::{Context, Result, eyre};
use tracing::info;

use ksign::authority::{Authority, loopback_signer};
use ksign::channel::{Destination, KeybaseChannel, MemoryHub};
use ksign::cli::{Cli, Command, ConfigCommand, SignArgs};
use ksign::config::{Config, KBFS_ROOT};
use ksign::handshake::HandshakeError;
use ksign::sign::{self, Target, TargetOverrides, cert_path_for, read_public_key, request_signed_key, write_cert};

const LOOPBACK_BOT: &str = "loopback-ca";
const LOOPBACK_USER: &str = "loopback-user";

fn setup_logging(verbose: bool) -> Result<()> {
    let log_dir = dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("ksign")
        .join("logs");

    fs::create_dir_all(&log_dir).context("Failed to create log directory")?;

    // Log to a file; stdout/stderr belong to the user
    let level = if verbose { tracing::Level::DEBUG } else { tracing::Level::INFO };
    let log_file = fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_dir.join("ksign.log"))
        .context("Failed to open log file")?;

    tracing_subscriber::fmt()
        .with_writer(log_file)
        .with_ansi(false)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()))
        .init();

    info!("Logging initialized (verbose: {})", verbose);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose).context("Failed to setup logging")?;

    let config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;

    match cli.command {
        Command::Sign(args) => cmd_sign(&config, args).await,
        Command::Config { command } => cmd_config(config, cli.config, command),
    }
}

async fn cmd_sign(config: &Config, args: SignArgs) -> Result<()> {
    let public_key = read_public_key(&args.pubkey)?;
    let deadline = args
        .deadline_ms
        .map(Duration::from_millis)
        .unwrap_or_else(|| config.handshake.deadline());
    let principals = args.user.clone().or_else(|| config.defaults.ssh_user.clone());
    let device_name = args.device.clone().unwrap_or_else(sign::device_name);

    let cert = if args.loopback {
        let hub = MemoryHub::default();
        let target = Target {
            bot: LOOPBACK_BOT.to_string(),
            destination: Destination::team("loopback"),
        };
        let authority = Authority::new(
            Arc::new(hub.connect(LOOPBACK_BOT)),
            target.destination.clone(),
            loopback_signer(),
        )
        .start()
        .await
        .context("Failed to start loopback CA")?;

        let params = SignatureParams {
            ssh_public_key: public_key,
            username: LOOPBACK_USER.to_string(),
            device_name,
            principals,
        };
        println!("Waiting for a response from the loopback CA....");
        let result = request_signed_key(
            Arc::new(hub.connect(LOOPBACK_USER)),
            &config.handshake,
            &target,
            params,
            deadline,
        )
        .await;
        authority.stop().await;
        result?
    } else {
        let overrides = TargetOverrides {
            bot: args.bot.as_deref(),
            team: args.team.as_deref(),
            channel: args.channel.as_deref(),
            authority_config: args.authority_config.as_deref(),
        };
        let target = Target::resolve(&overrides, config)?;
        let channel = KeybaseChannel::connect(&config.keybase.binary, config.keybase.command_timeout())
            .await
            .map_err(HandshakeError::ChannelConnect)?;

        let params = SignatureParams {
            ssh_public_key: public_key,
            username: channel.username().to_string(),
            device_name,
            principals,
        };
        println!("Waiting for a response from the CA....");
        request_signed_key(Arc::new(channel), &config.handshake, &target, params, deadline).await?
    };

    let out = args.out.clone().unwrap_or_else(|| cert_path_for(&args.pubkey));
    write_cert(&out, &cert)?;
    println!("{} Wrote signed key to {}", "✓".green(), out.display().to_string().cyan());
    Ok(())
}

fn cmd_config(mut config: Config, config_path: Option<PathBuf>, command: ConfigCommand) -> Result<()> {
    let path = config_path
        .or_else(Config::user_config_path)
        .ok_or_else(|| eyre!("could not determine a config file location; pass --config"))?;

    match command {
        ConfigCommand::Show => {
            print!("{}", serde_yaml::to_string(&config).context("Failed to render config")?);
            return Ok(());
        }
        ConfigCommand::SetDefaultBot { bot, team } => {
            config.set_default_bot(&bot, team.as_deref(), Path::new(KBFS_ROOT))?;
        }
        ConfigCommand::SetDefaultUser { user } => {
            config.set_default_ssh_user(&user)?;
        }
        ConfigCommand::SetKeybaseBinary { path: binary } => {
            config.set_keybase_binary(&binary);
        }
    }

    config.save(&path)?;
    println!("{} Updated {}", "✓".green(), path.display());
    Ok(())
}
