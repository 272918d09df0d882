//! Notification broker: observer registration and event dispatch.
//!
//! Observers register a status callback and a progress callback and get an
//! opaque slot back. Dispatch walks subscribers in registration order.
//! `unsubscribe` may be called from inside a callback (including the slot's
//! own) and from other threads; once it returns, no further callback for
//! that slot runs.

use crate::directory::RegionId;
use crate::error::Error;
use crate::status::Progress;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, ThreadId};

/// Token identifying one subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionSlot(u64);

pub type StatusCallback = Box<dyn Fn(RegionId) + Send + Sync>;
pub type ProgressCallback = Box<dyn Fn(RegionId, Progress) + Send + Sync>;

struct Subscriber {
    slot: SubscriptionSlot,
    active: AtomicBool,
    /// Thread currently inside one of this subscriber's callbacks. Lets a
    /// re-entrant unsubscribe recognize its own frame instead of waiting on
    /// it.
    running_on: Mutex<Option<ThreadId>>,
    drained: Condvar,
    on_status: StatusCallback,
    on_progress: ProgressCallback,
}

#[derive(Default)]
struct BrokerInner {
    next_slot: u64,
    subscribers: Vec<Arc<Subscriber>>,
}

/// Observer registry with ordered, re-entrancy-safe dispatch.
#[derive(Default)]
pub struct Broker {
    inner: Mutex<BrokerInner>,
}

impl Broker {
    pub fn new() -> Broker {
        Broker::default()
    }

    /// Registers an observer; the returned slot stays valid until
    /// `unsubscribe`.
    pub fn subscribe(&self, on_status: StatusCallback, on_progress: ProgressCallback) -> SubscriptionSlot {
        let mut inner = self.inner.lock().unwrap();
        let slot = SubscriptionSlot(inner.next_slot);
        inner.next_slot += 1;
        inner.subscribers.push(Arc::new(Subscriber {
            slot,
            active: AtomicBool::new(true),
            running_on: Mutex::new(None),
            drained: Condvar::new(),
            on_status,
            on_progress,
        }));
        slot
    }

    /// Deregisters an observer. Waits for an in-flight delivery to the same
    /// slot on another thread to finish; returns immediately when called
    /// from inside that delivery itself.
    pub fn unsubscribe(&self, slot: SubscriptionSlot) -> Result<(), Error> {
        let subscriber = {
            let mut inner = self.inner.lock().unwrap();
            match inner.subscribers.iter().position(|s| s.slot == slot) {
                Some(index) => inner.subscribers.remove(index),
                None => return Err(Error::UnknownSubscription(slot)),
            }
        };
        subscriber.active.store(false, Ordering::Release);
        let mut running = subscriber.running_on.lock().unwrap();
        while let Some(tid) = *running {
            if tid == thread::current().id() {
                break;
            }
            running = subscriber.drained.wait(running).unwrap();
        }
        Ok(())
    }

    /// Delivers a status event to every current subscriber, in registration
    /// order.
    pub fn notify_status(&self, region: RegionId) {
        for subscriber in self.snapshot() {
            deliver(&subscriber, || (subscriber.on_status)(region));
        }
    }

    /// Delivers a progress event to every current subscriber, in
    /// registration order.
    pub fn notify_progress(&self, region: RegionId, progress: Progress) {
        for subscriber in self.snapshot() {
            deliver(&subscriber, || (subscriber.on_progress)(region, progress));
        }
    }

    fn snapshot(&self) -> Vec<Arc<Subscriber>> {
        self.inner.lock().unwrap().subscribers.clone()
    }
}

fn deliver(subscriber: &Subscriber, invoke: impl FnOnce()) {
    {
        let mut running = subscriber.running_on.lock().unwrap();
        if !subscriber.active.load(Ordering::Acquire) {
            return;
        }
        *running = Some(thread::current().id());
    }
    invoke();
    *subscriber.running_on.lock().unwrap() = None;
    subscriber.drained.notify_all();
}
