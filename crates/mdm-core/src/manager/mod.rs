//! Download queue and per-region state machine.
//!
//! `DownloadManager` owns the single-flight FIFO admission queue, the local
//! file registry and the notification broker. All mutations run on one
//! serialized execution context: public operations and marshalled transport
//! callbacks post tasks to a drain loop, and each task emits its observer
//! notifications and transfer commands only after the state lock is
//! released. Calls made from inside an observer callback are queued and run
//! after the current task, which gives re-entrant operations a well-defined
//! order.

mod state;

use crate::broker::{Broker, ProgressCallback, StatusCallback, SubscriptionSlot};
use crate::directory::{RegionDirectory, RegionId};
use crate::downloader::{PartDownloader, TransferEvents, TransferRequest};
use crate::error::Error;
use crate::part::PartSet;
use crate::registry::{LocalFile, Registry};
use crate::status::{Progress, Status};
use state::{Effect, State};
use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Weak};

type Task = Box<dyn FnOnce(&Arc<Shared>) + Send>;

struct Shared {
    directory: Arc<dyn RegionDirectory>,
    broker: Broker,
    state: Mutex<State>,
    downloader: Mutex<Box<dyn PartDownloader>>,
    tasks: Mutex<VecDeque<Task>>,
    draining: AtomicBool,
}

/// The download queue and local storage manager. Cheap to clone; clones
/// share one engine.
#[derive(Clone)]
pub struct DownloadManager {
    shared: Arc<Shared>,
}

impl DownloadManager {
    pub fn new(
        directory: Arc<dyn RegionDirectory>,
        downloader: Box<dyn PartDownloader>,
        storage_root: impl Into<PathBuf>,
    ) -> DownloadManager {
        DownloadManager {
            shared: Arc::new(Shared {
                directory,
                broker: Broker::new(),
                state: Mutex::new(State::new(Registry::new(storage_root.into()))),
                downloader: Mutex::new(downloader),
                tasks: Mutex::new(VecDeque::new()),
                draining: AtomicBool::new(false),
            }),
        }
    }

    /// Registers an observer for status and progress events.
    pub fn subscribe(
        &self,
        on_status: StatusCallback,
        on_progress: ProgressCallback,
    ) -> SubscriptionSlot {
        self.shared.broker.subscribe(on_status, on_progress)
    }

    /// Deregisters an observer; no callback for the slot fires after this
    /// returns.
    pub fn unsubscribe(&self, slot: SubscriptionSlot) -> Result<(), Error> {
        self.shared.broker.unsubscribe(slot)
    }

    /// Region for a name, or `RegionId::INVALID` if unknown.
    pub fn find_region(&self, name: &str) -> RegionId {
        self.shared.directory.find(name)
    }

    pub fn status(&self, region: RegionId) -> Result<Status, Error> {
        self.check_region(region)?;
        let state = self.shared.state.lock().unwrap();
        Ok(state.status(self.shared.directory.as_ref(), region))
    }

    /// Bytes downloaded and total bytes expected for the given parts; see
    /// the state machine for the exact pending/idle split.
    pub fn size_in_bytes(&self, region: RegionId, parts: PartSet) -> Result<Progress, Error> {
        self.check_region(region)?;
        let state = self.shared.state.lock().unwrap();
        Ok(state.size_in_bytes(self.shared.directory.as_ref(), region, parts))
    }

    /// The surviving local file record, or none.
    pub fn latest(&self, region: RegionId) -> Result<Option<LocalFile>, Error> {
        self.check_region(region)?;
        let state = self.shared.state.lock().unwrap();
        Ok(state.latest_record(self.shared.directory.as_ref(), region).cloned())
    }

    /// Requests a download of `parts` for a region. Folds into an existing
    /// queue entry or active request; idempotent for a region already being
    /// handled.
    pub fn request_download(&self, region: RegionId, parts: PartSet) -> Result<(), Error> {
        self.check_region(region)?;
        self.mutate(move |state, dir, effects| state.request_download(dir, region, parts, effects));
        Ok(())
    }

    /// Cancels a queued or active download without touching files already on
    /// disk. Transfer artifacts stay behind for a later resume.
    pub fn cancel_download(&self, region: RegionId) -> Result<(), Error> {
        self.check_region(region)?;
        self.mutate(move |state, dir, effects| state.cancel_download(dir, region, effects));
        Ok(())
    }

    /// Deletes local parts of a region, cancelling any in-flight or queued
    /// transfer of those parts. Deleting the base part cascades to the
    /// auxiliary part.
    pub fn delete(&self, region: RegionId, parts: PartSet) -> Result<(), Error> {
        self.check_region(region)?;
        self.mutate(move |state, dir, effects| state.delete(dir, region, parts, effects));
        Ok(())
    }

    /// Re-scans the storage root, pruning all but the newest version per
    /// region.
    pub fn rescan(&self) {
        self.mutate(|state, _dir, _effects| state.registry.scan());
    }

    fn check_region(&self, region: RegionId) -> Result<(), Error> {
        if region.is_valid() && self.shared.directory.name(region).is_some() {
            Ok(())
        } else {
            Err(Error::UnknownRegion)
        }
    }

    fn mutate<F>(&self, f: F)
    where
        F: FnOnce(&mut State, &dyn RegionDirectory, &mut Vec<Effect>) + Send + 'static,
    {
        Shared::post(
            &self.shared,
            Box::new(move |shared| {
                let effects = {
                    let mut state = shared.state.lock().unwrap();
                    let mut effects = Vec::new();
                    f(&mut state, shared.directory.as_ref(), &mut effects);
                    effects
                };
                shared.run_effects(effects);
            }),
        );
    }
}

impl Shared {
    /// Posts a task to the serialized context. Drains synchronously unless a
    /// drain is already in progress (on this thread or another), in which
    /// case the task runs after the current one.
    fn post(self: &Arc<Self>, task: Task) {
        self.tasks.lock().unwrap().push_back(task);
        self.drain();
    }

    fn drain(self: &Arc<Self>) {
        if self.draining.swap(true, Ordering::Acquire) {
            return;
        }
        loop {
            let task = self.tasks.lock().unwrap().pop_front();
            match task {
                Some(task) => task(self),
                None => {
                    self.draining.store(false, Ordering::Release);
                    // A task may have been posted between the pop and the
                    // reset; reclaim the drain if nobody else has.
                    if self.tasks.lock().unwrap().is_empty()
                        || self.draining.swap(true, Ordering::Acquire)
                    {
                        return;
                    }
                }
            }
        }
    }

    fn run_effects(self: &Arc<Self>, effects: Vec<Effect>) {
        for effect in effects {
            match effect {
                Effect::Status(region) => self.broker.notify_status(region),
                Effect::Progress(region, progress) => {
                    self.broker.notify_progress(region, progress)
                }
                Effect::Start(request) => self.start_transfer(request),
                Effect::Abort(token) => self.downloader.lock().unwrap().cancel(token),
            }
        }
    }

    fn start_transfer(self: &Arc<Self>, request: TransferRequest) {
        let events = TransferEvents {
            on_progress: {
                let weak: Weak<Shared> = Arc::downgrade(self);
                Box::new(move |token, bytes, _total| {
                    let Some(shared) = weak.upgrade() else {
                        return;
                    };
                    Shared::post(
                        &shared,
                        Box::new(move |shared| {
                            let effects = {
                                let mut state = shared.state.lock().unwrap();
                                let mut effects = Vec::new();
                                state.on_transfer_progress(token, bytes, &mut effects);
                                effects
                            };
                            shared.run_effects(effects);
                        }),
                    );
                })
            },
            on_finish: {
                let weak: Weak<Shared> = Arc::downgrade(self);
                Box::new(move |token, outcome| {
                    let Some(shared) = weak.upgrade() else {
                        return;
                    };
                    Shared::post(
                        &shared,
                        Box::new(move |shared| {
                            let effects = {
                                let mut state = shared.state.lock().unwrap();
                                let mut effects = Vec::new();
                                state.on_transfer_finished(
                                    shared.directory.as_ref(),
                                    token,
                                    outcome,
                                    &mut effects,
                                );
                                effects
                            };
                            shared.run_effects(effects);
                        }),
                    );
                })
            },
        };
        self.downloader.lock().unwrap().start(request, events);
    }
}
