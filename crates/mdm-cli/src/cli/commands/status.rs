//! `mdm status` – show status and sizes for one region.

use anyhow::{bail, Result};
use mdm_core::manager::DownloadManager;
use mdm_core::part::{Part, PartSet};

pub fn run_status(manager: &DownloadManager, name: &str) -> Result<()> {
    let region = manager.find_region(name);
    if !region.is_valid() {
        bail!("unknown region: {name}");
    }

    let status = manager.status(region)?;
    let sizes = manager.size_in_bytes(region, PartSet::ALL)?;
    println!("{name}: {}", status.as_str());
    println!("  downloaded: {} bytes", sizes.downloaded);
    println!("  remaining:  {} bytes", sizes.total.saturating_sub(sizes.downloaded));

    if let Some(file) = manager.latest(region)? {
        println!("  local version {} with:", file.version());
        for part in file.parts().parts() {
            let label = match part {
                Part::Base => "base",
                Part::Auxiliary => "auxiliary",
            };
            println!("    {label}: {} bytes at {}", file.size(part), file.path(part).display());
        }
    }
    Ok(())
}
