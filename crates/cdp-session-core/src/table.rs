//! Bucketed session table.
//!
//! Every bucket has its own lock. Looking a session up returns a
//! [`SessionGuard`] that keeps the bucket locked; the state machine entry
//! points consume the guard so the lock is released exactly once on every
//! path, including the ones that remove the session.

use crate::types::{Session, SessionEvent};
use parking_lot::{Mutex, MutexGuard};
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicU32, Ordering};
use tracing::debug;

/// Generates `<identity>;<high>;<low>` session identifiers
pub struct SessionIdGenerator {
    identity: String,
    high: u32,
    low: AtomicU32,
}

impl SessionIdGenerator {
    pub fn new(identity: impl Into<String>) -> Self {
        Self {
            identity: identity.into(),
            high: rand::random::<u32>(),
            low: AtomicU32::new(0),
        }
    }

    pub fn next_id(&self) -> String {
        let low = self.low.fetch_add(1, Ordering::Relaxed).wrapping_add(1);
        format!("{};{};{}", self.identity, self.high, low)
    }
}

pub struct SessionTable {
    buckets: Box<[Mutex<Vec<Session>>]>,
    ids: SessionIdGenerator,
}

/// Exclusive access to one session while its bucket stays locked
pub struct SessionGuard<'a> {
    bucket: MutexGuard<'a, Vec<Session>>,
    index: usize,
}

/// Borrowed position of a session inside a locked bucket
pub(crate) struct Slot<'b> {
    bucket: &'b mut Vec<Session>,
    index: usize,
    removed: bool,
}

impl<'b> Slot<'b> {
    pub(crate) fn new(bucket: &'b mut Vec<Session>, index: usize) -> Self {
        Self {
            bucket,
            index,
            removed: false,
        }
    }

    pub(crate) fn session(&mut self) -> &mut Session {
        &mut self.bucket[self.index]
    }

    pub(crate) fn is_removed(&self) -> bool {
        self.removed
    }

    /// Tell the owner, then remove the session from its bucket
    pub(crate) fn cleanup(&mut self) {
        let session = self.session();
        debug!(session_id = %session.id, "cleaning up session");
        session.notify(SessionEvent::Terminated);
        session.notify(SessionEvent::Dropped);
        self.bucket.remove(self.index);
        self.removed = true;
    }
}

impl SessionTable {
    pub fn new(hash_size: usize, identity: impl Into<String>) -> Self {
        let buckets = (0..hash_size.max(1))
            .map(|_| Mutex::new(Vec::new()))
            .collect::<Vec<_>>()
            .into_boxed_slice();
        Self {
            buckets,
            ids: SessionIdGenerator::new(identity),
        }
    }

    pub fn generate_id(&self) -> String {
        self.ids.next_id()
    }

    /// Bucket index; case-insensitive like the lookup
    fn bucket_of(&self, id: &str) -> usize {
        let mut hasher = DefaultHasher::new();
        for b in id.bytes() {
            b.to_ascii_lowercase().hash(&mut hasher);
        }
        (hasher.finish() % self.buckets.len() as u64) as usize
    }

    /// Add a session and return it locked
    pub fn insert(&self, session: Session) -> SessionGuard<'_> {
        let mut bucket = self.buckets[self.bucket_of(&session.id)].lock();
        debug!(session_id = %session.id, kind = session.kind.name(), "adding session");
        bucket.push(session);
        let index = bucket.len() - 1;
        SessionGuard { bucket, index }
    }

    /// Find a session by id (ASCII case-insensitive) and lock it
    pub fn get(&self, id: &str) -> Option<SessionGuard<'_>> {
        if id.is_empty() {
            return None;
        }
        let bucket = self.buckets[self.bucket_of(id)].lock();
        let index = bucket.iter().position(|s| s.id.eq_ignore_ascii_case(id))?;
        Some(SessionGuard { bucket, index })
    }

    pub fn contains(&self, id: &str) -> bool {
        self.get(id).is_some()
    }

    pub fn len(&self) -> usize {
        self.buckets.iter().map(|b| b.lock().len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Visit every session of every bucket, one bucket lock at a time.
    /// The visitor may remove the session it is given.
    pub(crate) fn visit<F>(&self, mut visit: F)
    where
        F: FnMut(&mut Slot<'_>),
    {
        for bucket in self.buckets.iter() {
            let mut bucket = bucket.lock();
            let mut index = 0;
            while index < bucket.len() {
                let mut slot = Slot::new(&mut bucket, index);
                visit(&mut slot);
                if !slot.is_removed() {
                    index += 1;
                }
            }
        }
    }

    /// Remove all sessions, notifying their owners
    pub fn clear(&self) {
        for bucket in self.buckets.iter() {
            let mut bucket = bucket.lock();
            for mut session in bucket.drain(..) {
                session.notify(SessionEvent::Dropped);
            }
        }
    }
}

impl<'a> SessionGuard<'a> {
    pub(crate) fn slot(&mut self) -> Slot<'_> {
        Slot::new(&mut self.bucket, self.index)
    }

    /// Remove the session without running any state machine
    pub fn drop_session(mut self) {
        let session = &mut self.bucket[self.index];
        session.notify(SessionEvent::Dropped);
        self.bucket.remove(self.index);
    }

    /// Take the session out of the table
    pub fn remove(mut self) -> Session {
        self.bucket.remove(self.index)
    }
}

impl Deref for SessionGuard<'_> {
    type Target = Session;

    fn deref(&self) -> &Session {
        &self.bucket[self.index]
    }
}

impl DerefMut for SessionGuard<'_> {
    fn deref_mut(&mut self) -> &mut Session {
        &mut self.bucket[self.index]
    }
}
