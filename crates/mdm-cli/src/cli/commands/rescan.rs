//! `mdm rescan` – re-scan the storage root and prune obsolete versions.

use anyhow::Result;
use mdm_core::manager::DownloadManager;

pub fn run_rescan(manager: &DownloadManager) -> Result<()> {
    manager.rescan();
    println!("storage re-scanned");
    Ok(())
}
