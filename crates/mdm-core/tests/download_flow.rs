//! Download queue flows: status sequences, FIFO admission, progress,
//! cancellation and failure handling, driven by the step-pumped fake
//! transport.

mod common;

use common::fake_downloader::BLOCK;
use common::{record_progress, record_statuses, region, setup};
use mdm_core::layout;
use mdm_core::part::{Part, PartSet};
use mdm_core::status::Status;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

#[test]
fn absent_region_downloads_to_completion() {
    let h = setup(10, vec![region("uruguay", 4 * BLOCK, 0)]);
    let uruguay = h.region("uruguay");
    let statuses = record_statuses(&h.manager, uruguay);

    assert_eq!(h.manager.status(uruguay).unwrap(), Status::NotDownloaded);
    h.manager.request_download(uruguay, PartSet::BASE).unwrap();
    h.fake.run();

    assert_eq!(
        *statuses.lock().unwrap(),
        vec![Status::Downloading, Status::OnDisk]
    );
    let file = h.manager.latest(uruguay).unwrap().unwrap();
    assert_eq!(file.version(), 10);
    assert_eq!(file.parts(), PartSet::BASE);
    assert!(file.path(Part::Base).exists());
    assert!(!layout::temp_path(&file.path(Part::Base)).exists());
}

#[test]
fn second_region_waits_in_queue() {
    let h = setup(
        10,
        vec![region("uruguay", 2 * BLOCK, 0), region("venezuela", 3 * BLOCK, 0)],
    );
    let uruguay = h.region("uruguay");
    let venezuela = h.region("venezuela");

    let log = Arc::new(Mutex::new(Vec::new()));
    let log2 = Arc::clone(&log);
    let mgr = h.manager.clone();
    h.manager.subscribe(
        Box::new(move |r| log2.lock().unwrap().push((r, mgr.status(r).unwrap()))),
        Box::new(|_, _| {}),
    );

    h.manager.request_download(uruguay, PartSet::BASE).unwrap();
    h.manager.request_download(venezuela, PartSet::BASE).unwrap();
    h.fake.run();

    // Strict FIFO: venezuela never reaches `Downloading` before uruguay is
    // done.
    assert_eq!(
        *log.lock().unwrap(),
        vec![
            (uruguay, Status::Downloading),
            (venezuela, Status::InQueue),
            (uruguay, Status::OnDisk),
            (venezuela, Status::Downloading),
            (venezuela, Status::OnDisk),
        ]
    );
}

#[test]
fn progress_is_strictly_increasing_up_to_the_total() {
    let base = 5 * BLOCK + 100;
    let aux = 2 * BLOCK;
    let total = base + aux;
    let h = setup(10, vec![region("peru", base, aux)]);
    let peru = h.region("peru");

    let progress = record_progress(&h.manager, peru);
    let mgr = h.manager.clone();
    h.manager.subscribe(
        Box::new(|_| {}),
        Box::new(move |r, p| {
            if r == peru {
                // The total never changes mid-request, not even between the
                // base and auxiliary part transfers.
                assert_eq!(p.total, total);
                assert_eq!(mgr.size_in_bytes(peru, PartSet::ALL).unwrap().total, total);
            }
        }),
    );

    h.manager.request_download(peru, PartSet::ALL).unwrap();
    h.fake.run();

    let events = progress.lock().unwrap();
    assert!(!events.is_empty());
    for pair in events.windows(2) {
        assert!(pair[1].downloaded > pair[0].downloaded);
    }
    assert_eq!(events.last().unwrap().downloaded, total);

    let file = h.manager.latest(peru).unwrap().unwrap();
    assert_eq!(file.parts(), PartSet::ALL);
    assert_eq!(file.size_of(PartSet::ALL), total);
}

#[test]
fn additional_part_download_keeps_existing_parts() {
    let h = setup(10, vec![region("peru", 2 * BLOCK, BLOCK)]);
    let peru = h.region("peru");

    h.manager.request_download(peru, PartSet::BASE).unwrap();
    h.fake.run();
    assert_eq!(h.manager.latest(peru).unwrap().unwrap().parts(), PartSet::BASE);

    let statuses = record_statuses(&h.manager, peru);
    h.manager.request_download(peru, PartSet::AUXILIARY).unwrap();
    h.fake.run();

    assert_eq!(
        *statuses.lock().unwrap(),
        vec![Status::Downloading, Status::OnDisk]
    );
    let file = h.manager.latest(peru).unwrap().unwrap();
    assert_eq!(file.parts(), PartSet::ALL);
    assert!(file.path(Part::Base).exists());
    assert!(file.path(Part::Auxiliary).exists());

    let idle = h.manager.size_in_bytes(peru, PartSet::ALL).unwrap();
    assert_eq!(idle.downloaded, 3 * BLOCK);
    assert_eq!(idle.total, 0);
}

#[test]
fn requesting_a_complete_region_is_a_notified_no_op() {
    let h = setup(10, vec![region("uruguay", BLOCK, 0)]);
    let uruguay = h.region("uruguay");

    h.manager.request_download(uruguay, PartSet::BASE).unwrap();
    h.fake.run();

    let statuses = record_statuses(&h.manager, uruguay);
    h.manager.request_download(uruguay, PartSet::BASE).unwrap();
    h.fake.run();
    assert_eq!(*statuses.lock().unwrap(), vec![Status::OnDisk]);
}

#[test]
fn zero_size_auxiliary_is_skipped() {
    // An island without auxiliary data: requesting everything fetches only
    // the base part.
    let h = setup(10, vec![region("south-georgia", 2 * BLOCK, 0)]);
    let island = h.region("south-georgia");
    let statuses = record_statuses(&h.manager, island);

    h.manager.request_download(island, PartSet::ALL).unwrap();
    h.fake.run();

    assert_eq!(
        *statuses.lock().unwrap(),
        vec![Status::Downloading, Status::OnDisk]
    );
    assert_eq!(h.manager.latest(island).unwrap().unwrap().parts(), PartSet::BASE);
}

#[test]
fn deleting_a_pending_download_cancels_it() {
    let h = setup(10, vec![region("azerbaijan", 4 * BLOCK, 0)]);
    let azerbaijan = h.region("azerbaijan");
    let statuses = record_statuses(&h.manager, azerbaijan);

    h.manager.request_download(azerbaijan, PartSet::BASE).unwrap();
    h.manager.delete(azerbaijan, PartSet::BASE).unwrap();
    h.fake.run();

    assert_eq!(
        *statuses.lock().unwrap(),
        vec![Status::Downloading, Status::NotDownloaded]
    );
    assert!(h.manager.latest(azerbaijan).unwrap().is_none());
    assert!(!layout::part_path(h.root.path(), 10, "azerbaijan", Part::Base).exists());
}

#[test]
fn cancelling_when_almost_done_leaves_nothing_behind() {
    let h = setup(10, vec![region("uruguay", 10 * BLOCK, 0)]);
    let uruguay = h.region("uruguay");
    let statuses = record_statuses(&h.manager, uruguay);

    // Delete from inside the progress callback, the way a UI cancel lands
    // while the transfer is nearly complete.
    let triggered = Arc::new(AtomicBool::new(false));
    let mgr = h.manager.clone();
    h.manager.subscribe(
        Box::new(|_| {}),
        Box::new(move |r, p| {
            if r == uruguay
                && p.downloaded + 2 * BLOCK >= p.total
                && !triggered.swap(true, Ordering::SeqCst)
            {
                mgr.delete(uruguay, PartSet::BASE).unwrap();
            }
        }),
    );

    h.manager.request_download(uruguay, PartSet::BASE).unwrap();
    h.fake.run();

    assert_eq!(
        *statuses.lock().unwrap(),
        vec![Status::Downloading, Status::NotDownloaded]
    );
    assert!(h.manager.latest(uruguay).unwrap().is_none());
    assert!(!layout::part_path(h.root.path(), 10, "uruguay", Part::Base).exists());
}

#[test]
fn cancelling_a_queued_entry_preserves_the_rest_of_the_queue() {
    let h = setup(
        10,
        vec![
            region("one", BLOCK, 0),
            region("two", BLOCK, 0),
            region("three", BLOCK, 0),
        ],
    );
    let one = h.region("one");
    let two = h.region("two");
    let three = h.region("three");

    h.manager.request_download(one, PartSet::BASE).unwrap();
    h.manager.request_download(two, PartSet::BASE).unwrap();
    h.manager.request_download(three, PartSet::BASE).unwrap();

    h.manager.cancel_download(two).unwrap();
    assert_eq!(h.manager.status(two).unwrap(), Status::NotDownloaded);

    h.fake.run();
    assert_eq!(h.manager.status(one).unwrap(), Status::OnDisk);
    assert_eq!(h.manager.status(three).unwrap(), Status::OnDisk);
    assert_eq!(h.manager.status(two).unwrap(), Status::NotDownloaded);
}

#[test]
fn cancelling_the_active_download_promotes_the_next_entry() {
    let h = setup(10, vec![region("one", 4 * BLOCK, 0), region("two", BLOCK, 0)]);
    let one = h.region("one");
    let two = h.region("two");

    h.manager.request_download(one, PartSet::BASE).unwrap();
    h.manager.request_download(two, PartSet::BASE).unwrap();
    assert_eq!(h.manager.status(two).unwrap(), Status::InQueue);

    h.manager.cancel_download(one).unwrap();
    assert_eq!(h.manager.status(one).unwrap(), Status::NotDownloaded);
    assert_eq!(h.manager.status(two).unwrap(), Status::Downloading);

    h.fake.run();
    assert_eq!(h.manager.status(two).unwrap(), Status::OnDisk);
}

#[test]
fn failed_download_leaves_artifacts_and_is_retryable() {
    let h = setup(10, vec![region("uruguay", 3 * BLOCK, 0)]);
    let uruguay = h.region("uruguay");
    let statuses = record_statuses(&h.manager, uruguay);

    h.fake.fail_transfers(true);
    h.manager.request_download(uruguay, PartSet::BASE).unwrap();
    h.fake.run();

    assert_eq!(
        *statuses.lock().unwrap(),
        vec![Status::Downloading, Status::DownloadFailed]
    );
    assert!(h.manager.latest(uruguay).unwrap().is_none());

    // The temp and resume marker stay for diagnostics and resume; only the
    // final path must be absent.
    let final_path = layout::part_path(h.root.path(), 10, "uruguay", Part::Base);
    assert!(!final_path.exists());
    assert!(layout::temp_path(&final_path).exists());
    assert!(layout::resume_path(&final_path).exists());

    // Re-requesting retries like a fresh request.
    h.fake.fail_transfers(false);
    h.manager.request_download(uruguay, PartSet::BASE).unwrap();
    h.fake.run();

    assert_eq!(
        *statuses.lock().unwrap(),
        vec![
            Status::Downloading,
            Status::DownloadFailed,
            Status::Downloading,
            Status::OnDisk,
        ]
    );
    assert!(final_path.exists());
    assert!(!layout::temp_path(&final_path).exists());
    assert!(!layout::resume_path(&final_path).exists());
}

#[test]
fn unknown_regions_fail_fast() {
    let h = setup(10, vec![region("uruguay", BLOCK, 0)]);
    let nowhere = h.manager.find_region("atlantis");
    assert!(!nowhere.is_valid());
    assert!(h.manager.status(nowhere).is_err());
    assert!(h.manager.request_download(nowhere, PartSet::BASE).is_err());
    assert!(h.manager.delete(nowhere, PartSet::BASE).is_err());
    assert!(h.manager.size_in_bytes(nowhere, PartSet::ALL).is_err());
}
