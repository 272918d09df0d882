//! `mdm delete` – delete local parts of a region.

use anyhow::{bail, Result};
use mdm_core::manager::DownloadManager;
use mdm_core::part::PartSet;

pub fn run_delete(manager: &DownloadManager, name: &str, parts: PartSet) -> Result<()> {
    let region = manager.find_region(name);
    if !region.is_valid() {
        bail!("unknown region: {name}");
    }
    manager.delete(region, parts)?;
    let status = manager.status(region)?;
    println!("{name}: {}", status.as_str());
    Ok(())
}
