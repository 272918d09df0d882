//! Downloader capability contract consumed by the download manager.
//!
//! A transport performs the byte transfer on its own concurrency domain and
//! reports back through `TransferEvents`. The manager tags each transfer
//! with a fresh `TransferToken` and discards callbacks carrying a stale
//! token, so late events from an aborted transfer cannot corrupt state.

use crate::directory::RegionId;
use crate::part::Part;
use std::path::PathBuf;

/// Generation token identifying one started transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TransferToken(pub u64);

/// One part transfer order.
#[derive(Debug)]
pub struct TransferRequest {
    pub token: TransferToken,
    pub region: RegionId,
    /// Region name stem; also the remote file name component.
    pub name: String,
    pub part: Part,
    /// Remote artifact size in bytes.
    pub size: u64,
    /// Data version being fetched.
    pub version: i64,
    /// Final destination path. The transport writes to the `.part` sibling;
    /// promotion to `dest` is the scheduler's job.
    pub dest: PathBuf,
}

/// Terminal outcome of a transfer. Exactly one arrives per `start`, except
/// after `cancel`, where none (or `Cancelled`) may arrive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferOutcome {
    /// All bytes received; the temp file holds `bytes` bytes.
    Success { bytes: u64 },
    /// The transfer failed after the transport's retry policy was exhausted.
    Failed,
    /// The transfer observed an abort request.
    Cancelled,
}

/// Callbacks a transport uses to report one transfer.
pub struct TransferEvents {
    /// Monotonically non-decreasing `(token, bytes_received, total)` updates.
    pub on_progress: Box<dyn Fn(TransferToken, u64, u64) + Send + Sync>,
    /// The terminal outcome.
    pub on_finish: Box<dyn FnOnce(TransferToken, TransferOutcome) + Send>,
}

/// Starts and cancels part transfers.
pub trait PartDownloader: Send {
    /// Begins a transfer. Must not block on the transfer itself.
    fn start(&mut self, request: TransferRequest, events: TransferEvents);

    /// Requests an abort of a previously started transfer. Idempotent; a
    /// token that no longer matches anything is ignored.
    fn cancel(&mut self, token: TransferToken);
}
