// src/mailbox.rs
//
// Single-writer / single-reader hand-off of the latest snapshot. The slot is
// overwritten on every publish, so a slow reader skips intermediate states
// and the writer never waits on the reader.
use crate::snapshot::BookSnapshot;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

struct Inner {
    slot: Mutex<Slot>,
    cv: Condvar,
}

#[derive(Default)]
struct Slot {
    latest: Option<BookSnapshot>,
    seq: u64,
    finished: bool,
}

impl Inner {
    #[inline]
    fn lock(&self) -> MutexGuard<'_, Slot> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

pub struct Publisher {
    inner: Arc<Inner>,
}

pub struct Subscriber {
    inner: Arc<Inner>,
    seen: u64,
}

#[derive(Debug)]
pub enum Update {
    Snapshot(BookSnapshot),
    /// The producer is done. Carries the final snapshot unless it was already
    /// delivered.
    Finished(Option<BookSnapshot>),
    Idle,
}

pub fn channel() -> (Publisher, Subscriber) {
    let inner = Arc::new(Inner { slot: Mutex::new(Slot::default()), cv: Condvar::new() });
    (Publisher { inner: inner.clone() }, Subscriber { inner, seen: 0 })
}

impl Publisher {
    /// Overwrite the slot. The caller builds the snapshot before calling, so
    /// the lock only covers the move.
    pub fn publish(&self, snap: BookSnapshot) {
        self.store(snap, false);
    }

    /// Publish the last snapshot and mark the stream complete.
    pub fn finish(self, snap: BookSnapshot) {
        self.store(snap, true);
    }

    /// Number of snapshots published so far.
    #[cfg(test)]
    pub fn published(&self) -> u64 {
        self.inner.lock().seq
    }

    fn store(&self, snap: BookSnapshot, finished: bool) {
        let mut slot = self.inner.lock();
        slot.latest = Some(snap);
        slot.seq += 1;
        slot.finished |= finished;
        drop(slot);
        self.inner.cv.notify_all();
    }
}

impl Drop for Publisher {
    fn drop(&mut self) {
        let mut slot = self.inner.lock();
        if !slot.finished {
            slot.finished = true;
            drop(slot);
            self.inner.cv.notify_all();
        }
    }
}

impl Subscriber {
    /// Copy of whatever is in the slot right now.
    pub fn latest(&self) -> Option<BookSnapshot> {
        self.inner.lock().latest.clone()
    }

    /// Wait up to `timeout` for something newer than the last delivered
    /// snapshot.
    pub fn wait(&mut self, timeout: Duration) -> Update {
        let seen = self.seen;
        let mut slot = self.inner.lock();
        if !slot.finished && slot.seq == seen {
            let (guard, _) = self
                .inner
                .cv
                .wait_timeout_while(slot, timeout, |s| !s.finished && s.seq == seen)
                .unwrap_or_else(PoisonError::into_inner);
            slot = guard;
        }
        let fresh = slot.seq > self.seen;
        self.seen = slot.seq;
        let snap = if fresh { slot.latest.clone() } else { None };
        if slot.finished {
            return Update::Finished(snap);
        }
        match snap {
            Some(s) => Update::Snapshot(s),
            None => Update::Idle,
        }
    }
}
