//! CLI for the MDM map region download manager.

mod commands;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use mdm_core::config::{self, MdmConfig};
use mdm_core::directory::{RegionCatalog, RegionDirectory};
use mdm_core::downloader::{PartDownloader, TransferEvents, TransferRequest, TransferToken};
use mdm_core::manager::DownloadManager;
use mdm_core::part::PartSet;
use mdm_core::transport::HttpDownloader;
use std::sync::Arc;

use commands::{run_delete, run_download, run_list, run_rescan, run_status};

/// Top-level CLI for the MDM download manager.
#[derive(Debug, Parser)]
#[command(name = "mdm")]
#[command(about = "MDM: map region download and storage manager", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: CliCommand,
}

#[derive(Debug, Subcommand)]
pub enum CliCommand {
    /// List catalog regions with their local status.
    List,

    /// Show status and sizes for one region.
    Status {
        /// Region name as listed in the catalog.
        region: String,
    },

    /// Download a region and wait for it to finish.
    Download {
        /// Region name as listed in the catalog.
        region: String,
        /// Also download the auxiliary part.
        #[arg(long)]
        aux: bool,
    },

    /// Delete local files of a region. Deleting the base part also deletes
    /// the auxiliary part that depends on it.
    Delete {
        /// Region name as listed in the catalog.
        region: String,
        /// Delete only the auxiliary part.
        #[arg(long)]
        aux_only: bool,
    },

    /// Re-scan the storage directory and prune obsolete versions.
    Rescan,
}

impl CliCommand {
    pub fn run_from_args() -> Result<()> {
        let cli = Cli::parse();
        let cfg = config::load_or_init()?;
        tracing::debug!("loaded config: {:?}", cfg);

        let catalog_path = cfg.catalog_path()?;
        let catalog = Arc::new(
            RegionCatalog::load(&catalog_path)
                .with_context(|| format!("no usable region catalog at {}", catalog_path.display()))?,
        );
        let manager = build_manager(&cfg, &catalog)?;
        manager.rescan();

        match cli.command {
            CliCommand::List => run_list(&manager, &catalog)?,
            CliCommand::Status { region } => run_status(&manager, &region)?,
            CliCommand::Download { region, aux } => {
                if cfg.mirror_url.is_none() {
                    bail!(
                        "mirror_url is not set; add it to {}",
                        config::config_path()?.display()
                    );
                }
                let parts = if aux { PartSet::ALL } else { PartSet::BASE };
                run_download(&manager, &region, parts)?;
            }
            CliCommand::Delete { region, aux_only } => {
                let parts = if aux_only { PartSet::AUXILIARY } else { PartSet::BASE };
                run_delete(&manager, &region, parts)?;
            }
            CliCommand::Rescan => run_rescan(&manager)?,
        }

        Ok(())
    }
}

fn build_manager(cfg: &MdmConfig, catalog: &Arc<RegionCatalog>) -> Result<DownloadManager> {
    let storage_dir = cfg.storage_dir()?;
    let downloader: Box<dyn PartDownloader> = match cfg.mirror_url.as_deref() {
        Some(mirror) => Box::new(HttpDownloader::new(mirror, cfg.retry_policy())?),
        // Commands that never start a transfer work without a mirror.
        None => Box::new(InertDownloader),
    };
    Ok(DownloadManager::new(
        Arc::clone(catalog) as Arc<dyn RegionDirectory>,
        downloader,
        storage_dir,
    ))
}

/// Placeholder used when no mirror is configured; `download` refuses to run
/// before any transfer could reach it.
struct InertDownloader;

impl PartDownloader for InertDownloader {
    fn start(&mut self, request: TransferRequest, events: TransferEvents) {
        tracing::error!(region = %request.name, "no mirror configured, failing transfer");
        (events.on_finish)(request.token, mdm_core::downloader::TransferOutcome::Failed);
    }

    fn cancel(&mut self, _token: TransferToken) {}
}
