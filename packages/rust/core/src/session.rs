//! Bounded, expiring per-session conversation memory.
//!
//! [`SessionStore`] owns every [`Session`]; callers only ever receive
//! snapshots. Each session also carries a turn lock that serializes
//! requests for the same id: a second request queues behind the first
//! (see [`SessionStore::acquire`]).

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use docqa_shared::{DocQaError, Result, SessionId, Turn};
use tokio::sync::{Mutex as TurnLock, OwnedMutexGuard};
use tokio::time::Instant;
use tracing::{debug, info};

use crate::orchestrator::deadline_after;

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

/// Conversation state for one client.
#[derive(Debug, Clone)]
pub struct Session {
    pub id: SessionId,
    pub created_at: DateTime<Utc>,
    pub last_access: Instant,
    pub turns: VecDeque<Turn>,
    pub ttl: Duration,
}

impl Session {
    fn new(id: SessionId, ttl: Duration) -> Self {
        Self {
            id,
            created_at: Utc::now(),
            last_access: Instant::now(),
            turns: VecDeque::new(),
            ttl,
        }
    }

    /// Expired once strictly more than `ttl` has passed since the last access.
    pub fn is_expired(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.last_access) > self.ttl
    }

    /// Turns oldest-first.
    pub fn history(&self) -> Vec<Turn> {
        self.turns.iter().cloned().collect()
    }
}

/// Held for the duration of one request against a session.
pub type SessionGuard = OwnedMutexGuard<()>;

struct Slot {
    session: Session,
    turn_lock: Arc<TurnLock<()>>,
}

impl Slot {
    fn new(id: SessionId, ttl: Duration) -> Self {
        Self {
            session: Session::new(id, ttl),
            turn_lock: Arc::new(TurnLock::new(())),
        }
    }

    /// A request holds or is waiting on this session.
    fn in_use(&self) -> bool {
        Arc::strong_count(&self.turn_lock) > 1
    }
}

// ---------------------------------------------------------------------------
// SessionStore
// ---------------------------------------------------------------------------

/// In-memory session table.
pub struct SessionStore {
    slots: Mutex<HashMap<SessionId, Slot>>,
    max_turns: usize,
    ttl: Duration,
}

impl SessionStore {
    pub fn new(max_turns: usize, ttl: Duration) -> Self {
        Self {
            slots: Mutex::new(HashMap::new()),
            max_turns,
            ttl,
        }
    }

    pub fn max_turns(&self) -> usize {
        self.max_turns
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    fn slots(&self) -> MutexGuard<'_, HashMap<SessionId, Slot>> {
        // The table holds plain data; a panic mid-update cannot leave it torn.
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Live slot for `id`, replacing an expired session in place.
    ///
    /// The turn lock survives replacement so queued requests stay serialized.
    fn live_slot<'a>(
        slots: &'a mut HashMap<SessionId, Slot>,
        id: &SessionId,
        ttl: Duration,
        now: Instant,
    ) -> &'a mut Slot {
        let slot = slots
            .entry(id.clone())
            .or_insert_with(|| Slot::new(id.clone(), ttl));

        if slot.session.is_expired(now) {
            debug!(session = %id, "session expired, starting fresh");
            slot.session = Session::new(id.clone(), ttl);
        }
        slot
    }

    /// Snapshot of the live session for `id`, creating it if needed. Never fails.
    pub fn get_or_create(&self, id: &SessionId) -> Session {
        let now = Instant::now();
        let mut slots = self.slots();
        let slot = Self::live_slot(&mut slots, id, self.ttl, now);
        slot.session.last_access = now;
        slot.session.clone()
    }

    /// Append a turn, keeping only the most recent `max_turns`.
    ///
    /// No-op when the session no longer exists.
    pub fn append_turn(&self, id: &SessionId, turn: Turn) {
        let mut slots = self.slots();
        let Some(slot) = slots.get_mut(id) else {
            debug!(session = %id, "append to missing session ignored");
            return;
        };

        let session = &mut slot.session;
        session.turns.push_back(turn);
        while session.turns.len() > self.max_turns {
            session.turns.pop_front();
        }
        session.last_access = Instant::now();
    }

    /// Clear the history, keeping the id and creation time.
    pub fn reset(&self, id: &SessionId) {
        if let Some(slot) = self.slots().get_mut(id) {
            slot.session.turns.clear();
            slot.session.last_access = Instant::now();
            debug!(session = %id, "session reset");
        }
    }

    /// Remove expired sessions that no request is using. Returns how many were removed.
    pub fn sweep_expired(&self) -> usize {
        let now = Instant::now();
        let mut slots = self.slots();
        let before = slots.len();
        slots.retain(|_, slot| slot.in_use() || !slot.session.is_expired(now));
        let removed = before - slots.len();

        if removed > 0 {
            info!(removed, remaining = slots.len(), "expired sessions swept");
        }
        removed
    }

    /// Wait up to `wait` for exclusive use of the session `id`.
    ///
    /// Requests for the same id are served in arrival order. Fails with
    /// [`DocQaError::SessionBusy`] if the lock is not obtained in time.
    pub async fn acquire(&self, id: &SessionId, wait: Duration) -> Result<SessionGuard> {
        let deadline = deadline_after(wait);

        loop {
            let lock = {
                let mut slots = self.slots();
                Arc::clone(&Self::live_slot(&mut slots, id, self.ttl, Instant::now()).turn_lock)
            };

            let guard = tokio::time::timeout_at(deadline, Arc::clone(&lock).lock_owned())
                .await
                .map_err(|_| DocQaError::SessionBusy {
                    session_id: id.to_string(),
                })?;

            // The slot may have been swept and recreated while we waited.
            let current = self
                .slots()
                .get(id)
                .is_some_and(|slot| Arc::ptr_eq(&slot.turn_lock, &lock));
            if current {
                return Ok(guard);
            }
            debug!(session = %id, "session replaced while waiting, retrying");
        }
    }

    /// Number of sessions currently held, expired or not.
    pub fn len(&self) -> usize {
        self.slots().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Ids of the sessions currently held, sorted.
    pub fn session_ids(&self) -> Vec<SessionId> {
        let mut ids: Vec<SessionId> = self.slots().keys().cloned().collect();
        ids.sort();
        ids
    }
}
