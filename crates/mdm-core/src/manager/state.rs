//! Serialized state of the download queue and the per-region status
//! projection.
//!
//! Everything here runs under the manager's state lock. Mutations never
//! invoke callbacks directly; they emit `Effect`s that the caller executes
//! after releasing the lock.

use crate::artifact;
use crate::directory::{RegionDirectory, RegionId};
use crate::downloader::{TransferOutcome, TransferRequest, TransferToken};
use crate::layout;
use crate::part::{Part, PartSet};
use crate::registry::{LocalFile, Registry};
use crate::status::{Progress, Status};
use std::collections::{HashSet, VecDeque};

/// Deferred side effect of a state mutation, executed with the state lock
/// released.
pub(super) enum Effect {
    Status(RegionId),
    Progress(RegionId, Progress),
    Start(TransferRequest),
    Abort(TransferToken),
}

struct QueuedRequest {
    region: RegionId,
    parts: PartSet,
}

struct ActiveRequest {
    region: RegionId,
    /// Parts still to transfer; the first entry is in flight.
    pending: Vec<Part>,
    /// Parts of this request already committed durably.
    done: PartSet,
    token: TransferToken,
    version: i64,
    done_bytes: u64,
    current_bytes: u64,
    total_bytes: u64,
    /// Highest progress value delivered, to keep updates strictly
    /// increasing.
    last_progress: u64,
}

impl ActiveRequest {
    fn recompute_total(&mut self, dir: &dyn RegionDirectory) {
        let pending: u64 = self
            .pending
            .iter()
            .map(|part| dir.remote_size(self.region, *part))
            .sum();
        self.total_bytes = self.done_bytes + pending;
    }
}

pub(super) struct State {
    pub(super) registry: Registry,
    queue: VecDeque<QueuedRequest>,
    active: Option<ActiveRequest>,
    failed: HashSet<RegionId>,
    next_token: u64,
}

impl State {
    pub(super) fn new(registry: Registry) -> State {
        State {
            registry,
            queue: VecDeque::new(),
            active: None,
            failed: HashSet::new(),
            next_token: 1,
        }
    }

    /// Status as a pure projection of the queue, the active transfer, the
    /// registry record and the failure flag.
    pub(super) fn status(&self, dir: &dyn RegionDirectory, region: RegionId) -> Status {
        if let Some(active) = &self.active {
            if active.region == region {
                return Status::Downloading;
            }
        }
        if self.queue.iter().any(|entry| entry.region == region) {
            return Status::InQueue;
        }
        if self.failed.contains(&region) {
            return Status::DownloadFailed;
        }
        match self.latest_record(dir, region) {
            Some(file) if file.version() < dir.active_version() => Status::OnDiskOutOfDate,
            Some(_) => Status::OnDisk,
            None => Status::NotDownloaded,
        }
    }

    pub(super) fn latest_record<'a>(
        &'a self,
        dir: &dyn RegionDirectory,
        region: RegionId,
    ) -> Option<&'a LocalFile> {
        dir.name(region).and_then(|name| self.registry.latest(name))
    }

    /// Progress toward a pending request, or the on-disk/still-missing split
    /// for an idle region.
    pub(super) fn size_in_bytes(
        &self,
        dir: &dyn RegionDirectory,
        region: RegionId,
        parts: PartSet,
    ) -> Progress {
        if let Some(active) = &self.active {
            if active.region == region {
                return Progress {
                    downloaded: active.done_bytes + active.current_bytes,
                    total: active.total_bytes,
                };
            }
        }
        if let Some(entry) = self.queue.iter().find(|entry| entry.region == region) {
            let total = entry
                .parts
                .parts()
                .map(|part| dir.remote_size(region, part))
                .sum();
            return Progress {
                downloaded: 0,
                total,
            };
        }
        let downloaded = self
            .latest_record(dir, region)
            .map_or(0, |file| file.size_of(parts));
        let total = self
            .missing_parts(dir, region, parts)
            .parts()
            .map(|part| dir.remote_size(region, part))
            .sum();
        Progress { downloaded, total }
    }

    pub(super) fn request_download(
        &mut self,
        dir: &dyn RegionDirectory,
        region: RegionId,
        parts: PartSet,
        effects: &mut Vec<Effect>,
    ) {
        self.failed.remove(&region);
        let parts = self.normalize_request(dir, region, parts);
        let missing = self.missing_parts(dir, region, parts);

        // A region already downloading or queued folds the widened part-set
        // into its existing request; duplicate entries never exist.
        if let Some(active) = self.active.as_mut() {
            if active.region == region {
                for part in missing.parts() {
                    if !active.done.contains(part) && !active.pending.contains(&part) {
                        active.pending.push(part);
                    }
                }
                active.recompute_total(dir);
                return;
            }
        }
        if let Some(entry) = self.queue.iter_mut().find(|entry| entry.region == region) {
            entry.parts = entry.parts.union(missing);
            return;
        }

        if missing.is_empty() {
            // Everything requested is already durable (or does not exist
            // remotely); observers still get one status event.
            effects.push(Effect::Status(region));
            return;
        }

        self.queue.push_back(QueuedRequest {
            region,
            parts: missing,
        });
        if self.active.is_none() {
            self.start_next(dir, effects);
        } else {
            effects.push(Effect::Status(region));
        }
    }

    pub(super) fn cancel_download(
        &mut self,
        dir: &dyn RegionDirectory,
        region: RegionId,
        effects: &mut Vec<Effect>,
    ) {
        if let Some(active) = &self.active {
            if active.region == region {
                let token = active.token;
                self.active = None;
                effects.push(Effect::Abort(token));
                effects.push(Effect::Status(region));
                self.start_next(dir, effects);
                return;
            }
        }
        if let Some(position) = self.queue.iter().position(|entry| entry.region == region) {
            // Relative order of the remaining entries is preserved.
            self.queue.remove(position);
            effects.push(Effect::Status(region));
        }
    }

    pub(super) fn delete(
        &mut self,
        dir: &dyn RegionDirectory,
        region: RegionId,
        parts: PartSet,
        effects: &mut Vec<Effect>,
    ) {
        let cascade = parts.with_dependents();
        let Some(name) = dir.name(region).map(str::to_owned) else {
            return;
        };
        self.failed.remove(&region);

        if let Some(mut active) = self.active.take() {
            if active.region != region {
                self.active = Some(active);
            } else {
                let current = active.pending.first().copied();
                for part in cascade.parts() {
                    if active.done.contains(part) {
                        active.done.remove(part);
                        active.done_bytes = active
                            .done_bytes
                            .saturating_sub(dir.remote_size(region, part));
                    }
                }
                active.pending.retain(|part| !cascade.contains(*part));

                let current_removed = current.is_some_and(|part| cascade.contains(part));
                if current_removed {
                    effects.push(Effect::Abort(active.token));
                    self.registry
                        .discard_transfer_artifacts(&name, active.version, cascade);
                    active.token = self.next_transfer_token();
                    active.current_bytes = 0;
                    active.last_progress = 0;
                }

                self.registry.apply_part_delete(&name, cascade);

                if active.pending.is_empty() {
                    // The whole request dissolves; the region falls back to
                    // whatever is (still) on disk.
                    effects.push(Effect::Status(region));
                    self.start_next(dir, effects);
                    return;
                }
                active.recompute_total(dir);
                if current_removed {
                    let request = self.transfer_request(dir, &active, active.pending[0]);
                    effects.push(Effect::Start(request));
                }
                self.active = Some(active);
                // Observers learn the request narrowed even though the
                // status value is still `Downloading`.
                effects.push(Effect::Status(region));
                return;
            }
        }

        if let Some(position) = self.queue.iter().position(|entry| entry.region == region) {
            let remaining = self.queue[position].parts.subtract(cascade);
            if remaining.is_empty() {
                self.queue.remove(position);
            } else {
                self.queue[position].parts = remaining;
            }
        }
        self.registry.apply_part_delete(&name, cascade);
        self.registry
            .discard_transfer_artifacts(&name, dir.active_version(), cascade);
        effects.push(Effect::Status(region));
    }

    pub(super) fn on_transfer_progress(
        &mut self,
        token: TransferToken,
        bytes: u64,
        effects: &mut Vec<Effect>,
    ) {
        let Some(active) = self.active.as_mut() else {
            return;
        };
        if active.token != token {
            return;
        }
        active.current_bytes = bytes;
        let downloaded = active.done_bytes + active.current_bytes;
        if downloaded > active.last_progress {
            active.last_progress = downloaded;
            effects.push(Effect::Progress(
                active.region,
                Progress {
                    downloaded,
                    total: active.total_bytes,
                },
            ));
        }
    }

    pub(super) fn on_transfer_finished(
        &mut self,
        dir: &dyn RegionDirectory,
        token: TransferToken,
        outcome: TransferOutcome,
        effects: &mut Vec<Effect>,
    ) {
        let Some(mut active) = self.active.take() else {
            return;
        };
        if active.token != token {
            // Late callback from an aborted transfer.
            self.active = Some(active);
            return;
        }
        let region = active.region;
        let name = dir
            .name(region)
            .expect("active region resolves in the directory")
            .to_string();
        match outcome {
            TransferOutcome::Success { bytes } => {
                let part = active.pending.remove(0);
                let final_path =
                    layout::part_path(self.registry.root(), active.version, &name, part);
                if let Err(err) = artifact::promote(&final_path) {
                    tracing::warn!(region = %name, part = ?part, %err, "failed to promote downloaded part");
                    self.failed.insert(region);
                    effects.push(Effect::Status(region));
                    self.start_next(dir, effects);
                    return;
                }
                tracing::info!(region = %name, part = ?part, bytes, "part downloaded");
                self.registry.commit(&name, active.version, part, bytes);
                active.done.insert(part);
                active.done_bytes += bytes;
                active.current_bytes = 0;
                if active.pending.is_empty() {
                    effects.push(Effect::Status(region));
                    self.start_next(dir, effects);
                } else {
                    active.token = self.next_transfer_token();
                    let request = self.transfer_request(dir, &active, active.pending[0]);
                    effects.push(Effect::Start(request));
                    self.active = Some(active);
                }
            }
            TransferOutcome::Failed => {
                tracing::warn!(region = %name, "download failed");
                self.failed.insert(region);
                effects.push(Effect::Status(region));
                self.start_next(dir, effects);
            }
            TransferOutcome::Cancelled => {
                // The manager's own cancel path already bumped the token, so
                // a matching token means the transport aborted unprompted.
                // Treated like a cancellation either way.
                tracing::warn!(region = %name, "transport cancelled an active transfer");
                effects.push(Effect::Status(region));
                self.start_next(dir, effects);
            }
        }
    }

    /// Promotes the head of the queue to the single active transfer.
    fn start_next(&mut self, dir: &dyn RegionDirectory, effects: &mut Vec<Effect>) {
        if self.active.is_some() {
            return;
        }
        while let Some(entry) = self.queue.pop_front() {
            // Recompute against the registry; parts may have appeared or
            // vanished while the entry was queued.
            let missing = self.missing_parts(dir, entry.region, entry.parts);
            let pending: Vec<Part> = missing.parts().collect();
            if pending.is_empty() {
                effects.push(Effect::Status(entry.region));
                continue;
            }
            let token = self.next_transfer_token();
            let mut active = ActiveRequest {
                region: entry.region,
                pending,
                done: PartSet::EMPTY,
                token,
                version: dir.active_version(),
                done_bytes: 0,
                current_bytes: 0,
                total_bytes: 0,
                last_progress: 0,
            };
            active.recompute_total(dir);
            let request = self.transfer_request(dir, &active, active.pending[0]);
            self.active = Some(active);
            effects.push(Effect::Status(entry.region));
            effects.push(Effect::Start(request));
            return;
        }
    }

    /// Requested parts that exist remotely but are not durable at the active
    /// version.
    fn missing_parts(
        &self,
        dir: &dyn RegionDirectory,
        region: RegionId,
        parts: PartSet,
    ) -> PartSet {
        let record = self.latest_record(dir, region);
        let mut missing = PartSet::EMPTY;
        for part in parts.parts() {
            if dir.remote_size(region, part) == 0 {
                continue;
            }
            let on_disk = record
                .is_some_and(|file| file.parts().contains(part) && file.version() == dir.active_version());
            if !on_disk {
                missing.insert(part);
            }
        }
        missing
    }

    /// The auxiliary part depends on a base part at the same version;
    /// requesting it alone pulls the base in when the base is absent or
    /// stale.
    fn normalize_request(
        &self,
        dir: &dyn RegionDirectory,
        region: RegionId,
        parts: PartSet,
    ) -> PartSet {
        if !parts.contains(Part::Auxiliary) {
            return parts;
        }
        let base_current = self.latest_record(dir, region).is_some_and(|file| {
            file.parts().contains(Part::Base) && file.version() == dir.active_version()
        });
        if base_current {
            parts
        } else {
            parts.union(PartSet::BASE)
        }
    }

    fn transfer_request(
        &self,
        dir: &dyn RegionDirectory,
        active: &ActiveRequest,
        part: Part,
    ) -> TransferRequest {
        let name = dir
            .name(active.region)
            .expect("active region resolves in the directory");
        TransferRequest {
            token: active.token,
            region: active.region,
            name: name.to_string(),
            part,
            size: dir.remote_size(active.region, part),
            version: active.version,
            dest: layout::part_path(self.registry.root(), active.version, name, part),
        }
    }

    fn next_transfer_token(&mut self) -> TransferToken {
        let token = TransferToken(self.next_token);
        self.next_token += 1;
        token
    }
}
