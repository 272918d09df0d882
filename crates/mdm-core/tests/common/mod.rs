//! Shared fixtures for the manager integration tests.
#![allow(dead_code)]

pub mod fake_downloader;

use fake_downloader::FakeDownloader;
use mdm_core::directory::{CatalogRegion, RegionCatalog, RegionDirectory, RegionId};
use mdm_core::manager::DownloadManager;
use mdm_core::part::Part;
use mdm_core::status::{Progress, Status};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex};

/// Catalog-backed directory with an adjustable active version, for
/// supersession tests.
pub struct TestDirectory {
    catalog: RegionCatalog,
    version: AtomicI64,
}

impl TestDirectory {
    pub fn new(version: i64, regions: Vec<CatalogRegion>) -> TestDirectory {
        TestDirectory {
            catalog: RegionCatalog::new(version, regions),
            version: AtomicI64::new(version),
        }
    }

    pub fn set_active_version(&self, version: i64) {
        self.version.store(version, Ordering::SeqCst);
    }
}

impl RegionDirectory for TestDirectory {
    fn find(&self, name: &str) -> RegionId {
        self.catalog.find(name)
    }

    fn name(&self, region: RegionId) -> Option<&str> {
        self.catalog.name(region)
    }

    fn remote_size(&self, region: RegionId, part: Part) -> u64 {
        self.catalog.remote_size(region, part)
    }

    fn active_version(&self) -> i64 {
        self.version.load(Ordering::SeqCst)
    }

    fn region_count(&self) -> usize {
        self.catalog.region_count()
    }
}

pub fn region(name: &str, base: u64, aux: u64) -> CatalogRegion {
    CatalogRegion {
        name: name.to_string(),
        base_bytes: base,
        aux_bytes: aux,
    }
}

/// A manager wired to a fake downloader, a test directory and a temp
/// storage root.
pub struct Harness {
    pub manager: DownloadManager,
    pub fake: FakeDownloader,
    pub directory: Arc<TestDirectory>,
    pub root: tempfile::TempDir,
}

impl Harness {
    pub fn region(&self, name: &str) -> RegionId {
        let region = self.manager.find_region(name);
        assert!(region.is_valid(), "unknown test region: {name}");
        region
    }
}

pub fn setup(version: i64, regions: Vec<CatalogRegion>) -> Harness {
    let directory = Arc::new(TestDirectory::new(version, regions));
    let fake = FakeDownloader::new();
    let root = tempfile::tempdir().unwrap();
    let manager = DownloadManager::new(
        Arc::clone(&directory) as Arc<dyn RegionDirectory>,
        Box::new(fake.clone()),
        root.path().to_path_buf(),
    );
    Harness {
        manager,
        fake,
        directory,
        root,
    }
}

/// Records the status value of `region` at every status notification for it.
pub fn record_statuses(manager: &DownloadManager, region: RegionId) -> Arc<Mutex<Vec<Status>>> {
    let log = Arc::new(Mutex::new(Vec::new()));
    let log2 = Arc::clone(&log);
    let mgr = manager.clone();
    manager.subscribe(
        Box::new(move |r| {
            if r == region {
                log2.lock().unwrap().push(mgr.status(region).unwrap());
            }
        }),
        Box::new(|_, _| {}),
    );
    log
}

/// Records every progress event for `region`.
pub fn record_progress(manager: &DownloadManager, region: RegionId) -> Arc<Mutex<Vec<Progress>>> {
    let log = Arc::new(Mutex::new(Vec::new()));
    let log2 = Arc::clone(&log);
    manager.subscribe(
        Box::new(|_| {}),
        Box::new(move |r, progress| {
            if r == region {
                log2.lock().unwrap().push(progress);
            }
        }),
    );
    log
}
