//! Configuration management CLI commands.
//!
//! Provides `config init`, `config show` and `config path`.

use std::path::Path;

use clap::Subcommand;
use globetiles::config::{config_file_path, ConfigFile};

use crate::error::CliError;

/// Config subcommands.
#[derive(Debug, Subcommand)]
pub enum ConfigCommands {
    /// Write a commented configuration file with default values
    ///
    /// An existing file is left untouched.
    Init,

    /// Print the effective configuration
    Show,

    /// Show the configuration file path
    Path,
}

/// Run a config subcommand against `path`, or the default file.
pub fn run(command: ConfigCommands, path: Option<&Path>) -> Result<(), CliError> {
    let path = path.map(Path::to_path_buf).unwrap_or_else(config_file_path);

    match command {
        ConfigCommands::Init => {
            if path.exists() {
                println!("Configuration already exists at {}", path.display());
            } else {
                ConfigFile::default().save_to(&path)?;
                println!("Created {}", path.display());
            }
            Ok(())
        }
        ConfigCommands::Show => {
            let config = ConfigFile::load_from(&path)?;
            if !path.exists() {
                println!("; {} not found, showing defaults", path.display());
            }
            print!("{}", config.to_ini_string());
            Ok(())
        }
        ConfigCommands::Path => {
            println!("{}", path.display());
            Ok(())
        }
    }
}
