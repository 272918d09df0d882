//! Step-pumped fake transport.
//!
//! `start` only records the order; nothing happens until the test calls
//! `run`, which delivers block-sized progress and writes a real temp file
//! before reporting completion, mirroring how the curl transport behaves.
//! Cancelled transfers deliver no terminal callback.

use mdm_core::artifact;
use mdm_core::downloader::{
    PartDownloader, TransferEvents, TransferOutcome, TransferRequest, TransferToken,
};
use mdm_core::layout;
use std::collections::HashSet;
use std::fs;
use std::sync::{Arc, Mutex};

/// Bytes delivered per pump step.
pub const BLOCK: u64 = 1024;

#[derive(Clone, Default)]
pub struct FakeDownloader {
    inner: Arc<Mutex<Inner>>,
}

#[derive(Default)]
struct Inner {
    current: Option<Transfer>,
    cancelled: HashSet<TransferToken>,
    fail: bool,
}

struct Transfer {
    request: TransferRequest,
    events: TransferEvents,
    sent: u64,
}

impl PartDownloader for FakeDownloader {
    fn start(&mut self, request: TransferRequest, events: TransferEvents) {
        let mut inner = self.inner.lock().unwrap();
        assert!(
            inner.current.is_none(),
            "single-flight violated: a transfer is already active"
        );
        inner.current = Some(Transfer {
            request,
            events,
            sent: 0,
        });
    }

    fn cancel(&mut self, token: TransferToken) {
        let mut inner = self.inner.lock().unwrap();
        inner.cancelled.insert(token);
        if inner
            .current
            .as_ref()
            .is_some_and(|t| t.request.token == token)
        {
            // No terminal callback for a cancelled transfer.
            inner.current = None;
        }
    }
}

impl FakeDownloader {
    pub fn new() -> FakeDownloader {
        FakeDownloader::default()
    }

    /// When set, every pumped transfer fails after leaving a partial temp
    /// and resume marker behind.
    pub fn fail_transfers(&self, fail: bool) {
        self.inner.lock().unwrap().fail = fail;
    }

    /// Pumps transfers until none is left. Callbacks run with the fake's
    /// lock released, so they may freely cancel or start transfers.
    pub fn run(&self) {
        loop {
            let (mut transfer, fail) = {
                let mut inner = self.inner.lock().unwrap();
                match inner.current.take() {
                    Some(transfer) => (transfer, inner.fail),
                    None => return,
                }
            };

            if fail {
                let temp = layout::temp_path(&transfer.request.dest);
                if let Some(parent) = temp.parent() {
                    fs::create_dir_all(parent).unwrap();
                }
                fs::write(&temp, vec![0u8; transfer.sent as usize]).unwrap();
                artifact::write_resume_marker(&transfer.request.dest, transfer.sent).unwrap();
                (transfer.events.on_finish)(transfer.request.token, TransferOutcome::Failed);
                continue;
            }

            let total = transfer.request.size;
            transfer.sent = (transfer.sent + BLOCK).min(total);
            let sent = transfer.sent;
            (transfer.events.on_progress)(transfer.request.token, sent, total);

            if self
                .inner
                .lock()
                .unwrap()
                .cancelled
                .contains(&transfer.request.token)
            {
                continue;
            }

            if sent >= total {
                let temp = layout::temp_path(&transfer.request.dest);
                if let Some(parent) = temp.parent() {
                    fs::create_dir_all(parent).unwrap();
                }
                fs::write(&temp, vec![0u8; total as usize]).unwrap();
                (transfer.events.on_finish)(transfer.request.token, TransferOutcome::Success {
                    bytes: total,
                });
            } else {
                let mut inner = self.inner.lock().unwrap();
                assert!(
                    inner.current.is_none(),
                    "manager started a second transfer while one was active"
                );
                inner.current = Some(transfer);
            }
        }
    }
}
