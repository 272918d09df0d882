//! `mdm download` – request a region download and wait for a terminal
//! status, printing progress as it arrives.

use anyhow::{bail, Result};
use mdm_core::manager::DownloadManager;
use mdm_core::part::PartSet;
use mdm_core::status::{Progress, Status};
use std::io::Write;
use std::sync::mpsc;

enum Event {
    Status(Status),
    Progress(Progress),
}

pub fn run_download(manager: &DownloadManager, name: &str, parts: PartSet) -> Result<()> {
    let region = manager.find_region(name);
    if !region.is_valid() {
        bail!("unknown region: {name}");
    }

    let (tx, rx) = mpsc::channel();
    let status_tx = tx.clone();
    let mgr = manager.clone();
    let slot = manager.subscribe(
        Box::new(move |r| {
            if r == region {
                if let Ok(status) = mgr.status(r) {
                    let _ = status_tx.send(Event::Status(status));
                }
            }
        }),
        Box::new(move |r, progress| {
            if r == region {
                let _ = tx.send(Event::Progress(progress));
            }
        }),
    );

    manager.request_download(region, parts)?;

    let mut last_line = 0usize;
    let outcome = loop {
        match rx.recv() {
            Ok(Event::Progress(progress)) => {
                let line = format!("\r{name}: {} / {} bytes", progress.downloaded, progress.total);
                last_line = line.len();
                print!("{line}");
                let _ = std::io::stdout().flush();
            }
            Ok(Event::Status(status)) => match status {
                Status::InQueue | Status::Downloading => {}
                terminal => break terminal,
            },
            Err(_) => bail!("download engine went away"),
        }
    };
    if last_line > 0 {
        println!();
    }
    let _ = manager.unsubscribe(slot);

    match outcome {
        Status::OnDisk | Status::OnDiskOutOfDate => {
            println!("{name}: {}", outcome.as_str());
            Ok(())
        }
        Status::DownloadFailed => bail!("download of {name} failed; see the log and retry"),
        other => bail!("download of {name} did not complete: {}", other.as_str()),
    }
}
