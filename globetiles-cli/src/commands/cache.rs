//! File store management CLI commands.

use clap::Subcommand;
use globetiles::config::{format_size, ConfigFile};
use globetiles::filestore::{FileStore, PruneReport};

use crate::error::CliError;

/// Cache action subcommands.
#[derive(Debug, Subcommand)]
pub enum CacheAction {
    /// Show the file store locations and write location usage
    List,
    /// Delete least recently used files until the configured size limit is met
    Prune,
    /// Clear the write location, removing all stored tiles
    Clear,
}

/// Run a cache subcommand.
pub fn run(config: &ConfigFile, action: CacheAction) -> Result<(), CliError> {
    let store = FileStore::new(&config.file_store_config());

    match action {
        CacheAction::List => {
            for location in store.locations() {
                let kind = if location.is_install { "read" } else { "write" };
                println!("  {:<5} {}", kind, location.path.display());
            }
            let (files, bytes) = store.write_location_usage();
            println!("  Files: {}", files);
            println!(
                "  Size:  {} of {}",
                format_size(bytes as usize),
                format_size(config.file_store.max_size)
            );
            Ok(())
        }
        CacheAction::Prune => {
            let report = store.prune_write_location(config.file_store.max_size as u64)?;
            print_report(&report);
            Ok(())
        }
        CacheAction::Clear => {
            if let Some(location) = store.write_location() {
                println!("Clearing file store at: {}", location.path.display());
            }
            let report = store.clear_write_location()?;
            print_report(&report);
            Ok(())
        }
    }
}

fn print_report(report: &PruneReport) {
    println!(
        "Deleted {} files, freed {}",
        report.files_deleted,
        format_size(report.bytes_freed as usize)
    );
    println!(
        "  Size: {} -> {}",
        format_size(report.size_before as usize),
        format_size(report.size_after as usize)
    );
}
