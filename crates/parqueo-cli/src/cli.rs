use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use parqueo_core::VehicleType;

#[derive(Parser)]
#[command(name = "parqueo")]
#[command(about = "Log visitor parking entries, online or offline")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Treat the remote store as unreachable
    #[arg(long, global = true, env = "PARQUEO_OFFLINE")]
    pub offline: bool,

    /// Optional path to local cache database file
    #[arg(long, global = true, value_name = "PATH")]
    pub db_path: Option<PathBuf>,

    /// Optional path to config file
    #[arg(long = "config", global = true, value_name = "PATH")]
    pub config_path: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Register a vehicle entry
    #[command(alias = "add")]
    Register {
        /// License plate (normalized to uppercase alphanumerics)
        plate: String,
        /// Property of the owning unit, e.g. Casa
        #[arg(long)]
        property: String,
        /// Unit label within the property, e.g. 12
        #[arg(long)]
        unit: String,
        /// Vehicle type
        #[arg(long = "vehicle", value_enum, default_value_t = VehicleArg::Car)]
        vehicle: VehicleArg,
        /// Free entry (no fee)
        #[arg(long)]
        free: bool,
        /// Free-text observation
        #[arg(long)]
        note: Option<String>,
        /// Entry time (RFC 3339); defaults to now
        #[arg(long, value_name = "TIME")]
        entered_at: Option<String>,
        /// Photo evidence file
        #[arg(long, value_name = "PATH")]
        photo: Option<PathBuf>,
        /// Audio observation file
        #[arg(long, value_name = "PATH")]
        audio: Option<PathBuf>,
    },
    /// List parking records, newest first
    List {
        /// Only records of this property
        #[arg(long)]
        property: Option<String>,
        /// Only records of this unit label
        #[arg(long)]
        unit: Option<String>,
        /// Number of records to show (0 shows all)
        #[arg(short, long, default_value = "20")]
        limit: usize,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Edit a synced record
    Edit {
        /// Record ID
        id: String,
        /// New license plate
        #[arg(long)]
        plate: Option<String>,
        /// New vehicle type
        #[arg(long = "vehicle", value_enum)]
        vehicle: Option<VehicleArg>,
        /// New entry time (RFC 3339)
        #[arg(long, value_name = "TIME")]
        entered_at: Option<String>,
        /// New observation; an empty value clears it
        #[arg(long)]
        note: Option<String>,
        /// New property of the owning unit (requires --unit)
        #[arg(long, requires = "unit")]
        property: Option<String>,
        /// New unit label (requires --property)
        #[arg(long, requires = "property")]
        unit: Option<String>,
        /// Mark the entry as free or paying
        #[arg(long, value_name = "BOOL")]
        free: Option<bool>,
        /// Mark the fee as collected or not
        #[arg(long, value_name = "BOOL")]
        collected: Option<bool>,
        /// Collection date (YYYY-MM-DD)
        #[arg(long, value_name = "DATE")]
        collected_on: Option<String>,
        /// Replace the audio observation
        #[arg(long, value_name = "PATH", conflicts_with = "remove_audio")]
        audio: Option<PathBuf>,
        /// Remove the audio observation
        #[arg(long)]
        remove_audio: bool,
    },
    /// Delete a synced record
    Delete {
        /// Record ID
        id: String,
    },
    /// List owning units
    Units,
    /// Show operations waiting to sync
    Queue {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Replay queued operations against the remote store
    Sync {
        /// Keep running and drain periodically until interrupted
        #[arg(long)]
        watch: bool,
    },
    /// Write the config file
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
    /// Generate shell completion scripts
    Completions {
        /// Target shell
        #[arg(value_enum)]
        shell: CompletionShell,
        /// Optional output path (stdout when omitted)
        #[arg(short, long, value_name = "PATH")]
        output: Option<PathBuf>,
    },
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub enum VehicleArg {
    #[value(alias = "carro")]
    Car,
    #[value(alias = "moto")]
    Motorcycle,
}

impl From<VehicleArg> for VehicleType {
    fn from(value: VehicleArg) -> Self {
        match value {
            VehicleArg::Car => Self::Car,
            VehicleArg::Motorcycle => Self::Motorcycle,
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub enum CompletionShell {
    Bash,
    Zsh,
    Fish,
    #[value(name = "powershell")]
    PowerShell,
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Initialize or update the config file
    Init {
        /// Supabase project URL
        #[arg(long, value_name = "URL")]
        supabase_url: Option<String>,
        /// Supabase anon/public key
        #[arg(long, value_name = "KEY")]
        supabase_anon_key: Option<String>,
        /// Session token of the signed-in user
        #[arg(long, value_name = "TOKEN")]
        access_token: Option<String>,
        /// ID of the submitting user
        #[arg(long, value_name = "ID")]
        user_id: Option<String>,
    },
    /// Print the config file path
    Path,
}
