//! CLI command definitions and subcommands

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// ks - signed SSH keys from a CA bot over Keybase chat
#[derive(Parser)]
#[command(
    name = "ks",
    about = "Request short-lived signed SSH keys from a CA bot over Keybase chat",
    version
)]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true, help = "Path to config file")]
    pub config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Command,
}

/// CLI subcommands
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Get a public key signed by the CA
    Sign(SignArgs),

    /// Show or change local defaults
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },
}

/// Arguments for `ks sign`
#[derive(Debug, clap::Args)]
pub struct SignArgs {
    /// OpenSSH public key to sign
    #[arg(short = 'k', long, value_name = "FILE")]
    pub pubkey: PathBuf,

    /// CA bot username
    #[arg(short, long)]
    pub bot: Option<String>,

    /// Team the CA bot listens in
    #[arg(short, long)]
    pub team: Option<String>,

    /// Channel (topic) within the team
    #[arg(long)]
    pub channel: Option<String>,

    /// Client config published by the CA (under /keybase/)
    #[arg(long, value_name = "FILE")]
    pub authority_config: Option<PathBuf>,

    /// SSH user to request as certificate principal
    #[arg(short, long)]
    pub user: Option<String>,

    /// Device name reported to the CA
    #[arg(long)]
    pub device: Option<String>,

    /// Give up after this many milliseconds
    #[arg(long)]
    pub deadline_ms: Option<u64>,

    /// Where to write the certificate (default: <key>-cert.pub)
    #[arg(short, long, value_name = "FILE")]
    pub out: Option<PathBuf>,

    /// Talk to an in-process CA instead of Keybase (smoke test)
    #[arg(long)]
    pub loopback: bool,
}

/// Config management subcommands
#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Print the effective configuration
    Show,

    /// Set the CA bot to use by default (empty name clears it)
    SetDefaultBot {
        bot: String,

        /// Team the bot listens in (looked up in KBFS when omitted)
        #[arg(short, long)]
        team: Option<String>,
    },

    /// Set the SSH user requested by default (empty name clears it)
    SetDefaultUser { user: String },

    /// Set the path to the keybase binary (empty resets to `keybase`)
    SetKeybaseBinary { path: String },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_sign() {
        let cli = Cli::try_parse_from([
            "ks", "sign", "-k", "id.pub", "--bot", "cabot", "--team", "acme.ssh", "--deadline-ms", "2000",
        ])
        .unwrap();
        match cli.command {
            Command::Sign(args) => {
                assert_eq!(args.pubkey, PathBuf::from("id.pub"));
                assert_eq!(args.bot.as_deref(), Some("cabot"));
                assert_eq!(args.deadline_ms, Some(2000));
                assert!(!args.loopback);
            }
            _ => panic!("Wrong command"),
        }
    }

    #[test]
    fn test_parse_config_global_flag_after_subcommand() {
        let cli = Cli::try_parse_from(["ks", "config", "set-default-user", "deploy", "--config", "x.yml"]).unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("x.yml")));
        match cli.command {
            Command::Config {
                command: ConfigCommand::SetDefaultUser { user },
            } => assert_eq!(user, "deploy"),
            _ => panic!("Wrong command"),
        }
    }
}
