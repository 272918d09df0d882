//! `mdm list` – show every catalog region and its local status.

use anyhow::Result;
use mdm_core::directory::{RegionCatalog, RegionDirectory};
use mdm_core::manager::DownloadManager;
use mdm_core::part::PartSet;

pub fn run_list(manager: &DownloadManager, catalog: &RegionCatalog) -> Result<()> {
    if catalog.regions().is_empty() {
        println!("No regions in catalog.");
        return Ok(());
    }
    println!(
        "{:<24} {:<20} {:<12} {:<12} {}",
        "REGION", "STATUS", "LOCAL", "REMOTE", "VERSION"
    );
    for entry in catalog.regions() {
        let region = catalog.find(&entry.name);
        let status = manager.status(region)?;
        let sizes = manager.size_in_bytes(region, PartSet::ALL)?;
        let version = manager
            .latest(region)?
            .map(|file| file.version().to_string())
            .unwrap_or_else(|| "-".to_string());
        println!(
            "{:<24} {:<20} {:<12} {:<12} {}",
            entry.name,
            status.as_str(),
            sizes.downloaded,
            entry.base_bytes + entry.aux_bytes,
            version
        );
    }
    Ok(())
}
