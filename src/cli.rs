//! CLI parse: clap types for the `reflectd` daemon and the `reflect` client.

use crate::command::Command;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Reflect daemon - keeps reflections of watched directories in sync
#[derive(Parser, Debug)]
#[command(name = "reflectd")]
#[command(about = "Directory reflection daemon")]
pub struct DaemonCli {
    /// Configuration file path (merged over the global config)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Relay listen address (overrides config)
    #[arg(long)]
    pub listen: Option<String>,

    /// Log level (trace, debug, info, warn, error, off)
    #[arg(long)]
    pub log_level: Option<String>,

    /// Log format (json, text)
    #[arg(long)]
    pub log_format: Option<String>,

    /// Log output (stdout, stderr, file)
    #[arg(long)]
    pub log_output: Option<String>,

    /// Log file path (if output is "file")
    #[arg(long)]
    pub log_file: Option<PathBuf>,
}

/// Reflect client - send commands to a running daemon
#[derive(Parser, Debug)]
#[command(name = "reflect")]
#[command(about = "Send commands to the reflect daemon")]
pub struct ClientCli {
    #[command(subcommand)]
    pub command: ClientCommands,

    /// Daemon address (defaults to the configured listen address)
    #[arg(long)]
    pub addr: Option<String>,

    /// Configuration file path
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging (default: off)
    #[arg(long, default_value = "false")]
    pub verbose: bool,
}

#[derive(Subcommand, Debug)]
pub enum ClientCommands {
    /// Register a directory and its reflection, then run the first backup
    Add {
        original: PathBuf,
        reflection: PathBuf,
        /// Reflector code (diff, plain); empty uses the daemon default
        #[arg(long, default_value = "")]
        reflector: String,
        /// Change map code (blake3, sha256); empty uses the daemon default
        #[arg(long, default_value = "")]
        change_map: String,
        /// Only back up on explicit request instead of on every change
        #[arg(long)]
        manual: bool,
    },
    /// Unregister a directory
    Remove { original: PathBuf },
    /// Bring the reflection up to date
    Backup { original: PathBuf },
    /// Restore a directory from its reflection
    Recover { original: PathBuf },
    /// Send a raw command line
    Send { line: String },
}

impl ClientCommands {
    /// Wire form of the command; relative paths are made absolute against `cwd`
    pub fn to_line(&self, cwd: &std::path::Path) -> String {
        let abs = |p: &PathBuf| if p.is_absolute() { p.clone() } else { cwd.join(p) };
        let command = match self {
            ClientCommands::Add {
                original,
                reflection,
                reflector,
                change_map,
                manual,
            } => Command::NewBackup {
                original_root: abs(original),
                reflection_root: abs(reflection),
                reflector_code: reflector.clone(),
                change_map_code: change_map.clone(),
                mirrored: !manual,
            },
            ClientCommands::Remove { original } => Command::Unbackup {
                original_root: abs(original),
            },
            ClientCommands::Backup { original } => Command::Backup {
                original_root: abs(original),
            },
            ClientCommands::Recover { original } => Command::Recover {
                original_root: abs(original),
            },
            ClientCommands::Send { line } => return line.clone(),
        };
        command.to_string()
    }
}
