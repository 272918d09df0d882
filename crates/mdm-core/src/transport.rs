//! curl-based transport implementing the downloader contract.
//!
//! One worker thread per transfer: GET the part file from the mirror, write
//! it into the `.part` temp at the received offset, keep the `.resume`
//! marker current and report progress through `TransferEvents`. Abort is
//! cooperative via the curl progress callback. On failure the temp and
//! marker stay on disk so a later attempt resumes with a Range request.

use crate::artifact::{self, ArtifactWriter};
use crate::downloader::{
    PartDownloader, TransferEvents, TransferOutcome, TransferRequest, TransferToken,
};
use crate::layout;
use crate::retry::{classify_curl_error, classify_http_status, ErrorKind, RetryPolicy};
use anyhow::anyhow;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use url::Url;

/// New bytes between rewrites of the resume marker.
const MARKER_INTERVAL: u64 = 1 << 20;

/// HTTP transport fetching `<mirror>/<version>/<file>` part files.
pub struct HttpDownloader {
    mirror: Url,
    policy: RetryPolicy,
    aborts: Arc<Mutex<HashMap<TransferToken, Arc<AtomicBool>>>>,
}

impl HttpDownloader {
    /// `mirror` is the base URL of the part file tree; a missing trailing
    /// slash is added so joins append instead of replacing the last segment.
    pub fn new(mirror: &str, policy: RetryPolicy) -> anyhow::Result<HttpDownloader> {
        let mut mirror: Url =
            mirror.parse().map_err(|err| anyhow!("invalid mirror url: {err}"))?;
        if !mirror.path().ends_with('/') {
            let path = format!("{}/", mirror.path());
            mirror.set_path(&path);
        }
        Ok(HttpDownloader {
            mirror,
            policy,
            aborts: Arc::new(Mutex::new(HashMap::new())),
        })
    }
}

impl PartDownloader for HttpDownloader {
    fn start(&mut self, request: TransferRequest, events: TransferEvents) {
        let abort = Arc::new(AtomicBool::new(false));
        self.aborts
            .lock()
            .unwrap()
            .insert(request.token, Arc::clone(&abort));

        let mirror = self.mirror.clone();
        let policy = self.policy;
        let aborts = Arc::clone(&self.aborts);
        std::thread::spawn(move || {
            let token = request.token;
            let result = run_transfer(&mirror, &request, &events, &abort, &policy);
            aborts.lock().unwrap().remove(&token);
            match result {
                Ok(bytes) => (events.on_finish)(token, TransferOutcome::Success { bytes }),
                // A cancelled transfer reports no terminal outcome.
                Err(TransferError::Aborted) => {}
                Err(err) => {
                    tracing::warn!(region = %request.name, part = ?request.part, %err, "part transfer failed");
                    (events.on_finish)(token, TransferOutcome::Failed);
                }
            }
        });
    }

    fn cancel(&mut self, token: TransferToken) {
        if let Some(flag) = self.aborts.lock().unwrap().get(&token) {
            flag.store(true, Ordering::Relaxed);
        }
    }
}

enum TransferError {
    Aborted,
    Curl(curl::Error),
    Http(u32),
    Partial { expected: u64, received: u64 },
    Io(anyhow::Error),
}

impl fmt::Display for TransferError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransferError::Aborted => write!(f, "aborted"),
            TransferError::Curl(e) => write!(f, "{e}"),
            TransferError::Http(code) => write!(f, "HTTP {code}"),
            TransferError::Partial { expected, received } => {
                write!(f, "partial transfer: {received} of {expected} bytes")
            }
            TransferError::Io(e) => write!(f, "{e:#}"),
        }
    }
}

fn classify(err: &TransferError) -> ErrorKind {
    match err {
        TransferError::Aborted => ErrorKind::Aborted,
        TransferError::Curl(e) => classify_curl_error(e),
        TransferError::Http(code) => classify_http_status(*code),
        // A short read resumes from the marker on the next attempt.
        TransferError::Partial { .. } => ErrorKind::Connection,
        TransferError::Io(_) => ErrorKind::Other,
    }
}

fn run_transfer(
    mirror: &Url,
    request: &TransferRequest,
    events: &TransferEvents,
    abort: &Arc<AtomicBool>,
    policy: &RetryPolicy,
) -> Result<u64, TransferError> {
    let file = layout::part_file_name(&request.name, request.part);
    let remote = mirror
        .join(&format!("{}/{}", request.version, file))
        .map_err(|err| TransferError::Io(anyhow!("invalid part url: {err}")))?;

    let mut attempt = 1u32;
    loop {
        match transfer_once(&remote, request, events, abort) {
            Ok(bytes) => return Ok(bytes),
            Err(err) => {
                let kind = classify(&err);
                match policy.decide(attempt, kind) {
                    Some(delay) => {
                        tracing::debug!(
                            region = %request.name,
                            part = ?request.part,
                            attempt,
                            ?delay,
                            error = %err,
                            "retrying part transfer"
                        );
                        std::thread::sleep(delay);
                        attempt += 1;
                    }
                    None => return Err(err),
                }
            }
        }
    }
}

fn transfer_once(
    remote: &Url,
    request: &TransferRequest,
    events: &TransferEvents,
    abort: &Arc<AtomicBool>,
) -> Result<u64, TransferError> {
    let total = request.size;

    // Resume from a previous partial when both the temp and the marker
    // survive; otherwise start from scratch.
    let offset = artifact::read_resume_marker(&request.dest)
        .filter(|_| layout::temp_path(&request.dest).exists())
        .unwrap_or(0);
    let writer = if offset > 0 {
        ArtifactWriter::open_resume(&request.dest).map_err(TransferError::Io)?
    } else {
        let mut writer = ArtifactWriter::create(&request.dest).map_err(TransferError::Io)?;
        writer.preallocate(total).map_err(TransferError::Io)?;
        artifact::write_resume_marker(&request.dest, 0).map_err(TransferError::Io)?;
        writer
    };

    let mut easy = curl::easy::Easy::new();
    easy.url(remote.as_str()).map_err(TransferError::Curl)?;
    easy.follow_location(true).map_err(TransferError::Curl)?;
    easy.connect_timeout(Duration::from_secs(30))
        .map_err(TransferError::Curl)?;
    // Abort if throughput drops below 1 KiB/s for 60s; kinder to large
    // files on slow links than a wall-clock timeout.
    easy.low_speed_limit(1024).map_err(TransferError::Curl)?;
    easy.low_speed_time(Duration::from_secs(60))
        .map_err(TransferError::Curl)?;
    easy.progress(true).map_err(TransferError::Curl)?;
    if offset > 0 {
        easy.resume_from(offset).map_err(TransferError::Curl)?;
    }

    let bytes_written = AtomicU64::new(0);
    let marker_at = AtomicU64::new(offset);
    let storage_error: Mutex<Option<anyhow::Error>> = Mutex::new(None);
    {
        let mut transfer = easy.transfer();
        transfer
            .write_function(|data| {
                let at = offset + bytes_written.fetch_add(data.len() as u64, Ordering::Relaxed);
                match writer.write_at(at, data) {
                    Ok(()) => {
                        let durable = at + data.len() as u64;
                        if durable - marker_at.load(Ordering::Relaxed) >= MARKER_INTERVAL {
                            marker_at.store(durable, Ordering::Relaxed);
                            if let Err(err) = artifact::write_resume_marker(&request.dest, durable)
                            {
                                tracing::debug!(%err, "failed to update resume marker");
                            }
                        }
                        Ok(data.len())
                    }
                    Err(err) => {
                        *storage_error.lock().unwrap() = Some(err);
                        Ok(0)
                    }
                }
            })
            .map_err(TransferError::Curl)?;
        transfer
            .progress_function(|_dltotal, dlnow, _ultotal, _ulnow| {
                if abort.load(Ordering::Relaxed) {
                    return false;
                }
                let received = offset + dlnow as u64;
                if received > 0 {
                    (events.on_progress)(request.token, received.min(total), total);
                }
                true
            })
            .map_err(TransferError::Curl)?;
        if let Err(err) = transfer.perform() {
            flush_marker(request, offset + bytes_written.load(Ordering::Relaxed));
            if err.is_aborted_by_callback() && abort.load(Ordering::Relaxed) {
                return Err(TransferError::Aborted);
            }
            if err.is_write_error() {
                if let Some(io_err) = storage_error.lock().unwrap().take() {
                    return Err(TransferError::Io(io_err));
                }
            }
            return Err(TransferError::Curl(err));
        }
    }

    let code = easy.response_code().map_err(TransferError::Curl)?;
    if !(200..300).contains(&code) {
        return Err(TransferError::Http(code));
    }

    writer.sync().map_err(TransferError::Io)?;
    let received = offset + bytes_written.load(Ordering::Relaxed);
    if received != total {
        flush_marker(request, received);
        return Err(TransferError::Partial {
            expected: total,
            received,
        });
    }
    Ok(received)
}

fn flush_marker(request: &TransferRequest, durable: u64) {
    if let Err(err) = artifact::write_resume_marker(&request.dest, durable) {
        tracing::debug!(%err, "failed to flush resume marker");
    }
}
