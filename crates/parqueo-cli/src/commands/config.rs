use std::path::Path;

use parqueo_core::ParqueoConfig;

use crate::cli::ConfigCommands;
use crate::error::CliError;

pub fn run_config(command: ConfigCommands, config_path: &Path) -> Result<(), CliError> {
    match command {
        ConfigCommands::Init {
            supabase_url,
            supabase_anon_key,
            access_token,
            user_id,
        } => run_config_init(
            config_path,
            ConfigUpdate {
                supabase_url,
                supabase_anon_key,
                access_token,
                user_id,
            },
        ),
        ConfigCommands::Path => {
            println!("{}", config_path.display());
            Ok(())
        }
    }
}

/// Values to write; unset fields keep what the file already has
#[derive(Debug, Default)]
pub struct ConfigUpdate {
    pub supabase_url: Option<String>,
    pub supabase_anon_key: Option<String>,
    pub access_token: Option<String>,
    pub user_id: Option<String>,
}

impl ConfigUpdate {
    pub fn apply(self, config: &mut ParqueoConfig) {
        if self.supabase_url.is_some() {
            config.supabase_url = self.supabase_url;
        }
        if self.supabase_anon_key.is_some() {
            config.supabase_anon_key = self.supabase_anon_key;
        }
        if self.access_token.is_some() {
            config.access_token = self.access_token;
        }
        if self.user_id.is_some() {
            config.user_id = self.user_id;
        }
        config.normalize();
    }
}

pub fn run_config_init(config_path: &Path, update: ConfigUpdate) -> Result<(), CliError> {
    let mut config = ParqueoConfig::load_from_path(config_path)?;
    update.apply(&mut config);
    config.validate()?;
    config.save_to_path(config_path)?;

    tracing::info!("Saved config to {}", config_path.display());
    println!("{}", config_path.display());
    Ok(())
}
