//! Region status and download progress types.

/// Download status of a region.
///
/// Always computed from the queue, the active transfer, the registry record
/// and the failure flag; never stored on its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    /// No local files and no pending request.
    NotDownloaded,
    /// Waiting behind another region's download.
    InQueue,
    /// The single active transfer belongs to this region.
    Downloading,
    /// Local files are present at the active data version.
    OnDisk,
    /// Local files are present but older than the active data version.
    OnDiskOutOfDate,
    /// The last download attempt failed; retryable by re-requesting.
    DownloadFailed,
}

impl Status {
    pub fn as_str(self) -> &'static str {
        match self {
            Status::NotDownloaded => "not-downloaded",
            Status::InQueue => "in-queue",
            Status::Downloading => "downloading",
            Status::OnDisk => "on-disk",
            Status::OnDiskOutOfDate => "on-disk-out-of-date",
            Status::DownloadFailed => "download-failed",
        }
    }
}

/// Bytes downloaded so far and total bytes expected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Progress {
    pub downloaded: u64,
    pub total: u64,
}
