//! # Session Registry Module
//!
//! Owns every per-user session record and the single awaiting-response slot
//! each session may hold. All mutation goes through the registry; the lock is
//! never held across an await.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::oneshot;
use tracing::debug;

use super::state::{MenuStage, SessionSnapshot, UserId};

/// How a wait for the user's next message ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// The user answered
    Message(String),
    /// Nothing arrived before the deadline
    TimedOut,
    /// A newer wait replaced this one
    Superseded,
}

/// An installed awaiting-response slot, resolved through [`SessionRegistry::wait`]
#[derive(Debug)]
pub struct ReplyWaiter {
    user: UserId,
    id: u64,
    rx: oneshot::Receiver<String>,
}

#[derive(Debug)]
struct PendingReply {
    id: u64,
    tx: oneshot::Sender<String>,
}

#[derive(Debug, Default)]
struct Session {
    login_attempts: u32,
    stage: MenuStage,
    selected_year: Option<String>,
    selected_semester: Option<String>,
    flow_active: bool,
    pending: Option<PendingReply>,
}

impl Session {
    fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            login_attempts: self.login_attempts,
            stage: self.stage,
            selected_year: self.selected_year.clone(),
            selected_semester: self.selected_semester.clone(),
            flow_active: self.flow_active,
            awaiting_reply: self.pending.is_some(),
        }
    }
}

/// Per-user session records keyed by user id
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: Mutex<HashMap<UserId, Session>>,
    next_wait_id: AtomicU64,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<UserId, Session>> {
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn with_session<R>(&self, user: &UserId, f: impl FnOnce(&mut Session) -> R) -> R {
        let mut sessions = self.lock();
        f(sessions.entry(user.clone()).or_default())
    }

    /// Mark a flow as running for `user`, creating the session lazily.
    ///
    /// Returns `false` when a flow is already active for this user.
    pub fn begin_flow(&self, user: &UserId) -> bool {
        self.with_session(user, |session| {
            if session.flow_active {
                return false;
            }
            *session = Session {
                flow_active: true,
                stage: MenuStage::LoggingIn,
                ..Session::default()
            };
            true
        })
    }

    /// Drop the session record; any pending wait is cancelled with it
    pub fn end_flow(&self, user: &UserId) {
        if self.lock().remove(user).is_some() {
            debug!(user_id = %user, "Session reset to idle");
        }
    }

    pub fn is_flow_active(&self, user: &UserId) -> bool {
        self.lock().get(user).is_some_and(|session| session.flow_active)
    }

    pub fn set_stage(&self, user: &UserId, stage: MenuStage) {
        self.with_session(user, |session| session.stage = stage);
    }

    /// Current stage; users without a session are idle
    pub fn stage(&self, user: &UserId) -> MenuStage {
        self.lock()
            .get(user)
            .map(|session| session.stage)
            .unwrap_or_default()
    }

    pub fn record_login_attempt(&self, user: &UserId, attempt: u32) {
        self.with_session(user, |session| session.login_attempts = attempt);
    }

    pub fn select_year(&self, user: &UserId, year: Option<String>) {
        self.with_session(user, |session| {
            session.selected_year = year;
            session.selected_semester = None;
        });
    }

    pub fn select_semester(&self, user: &UserId, semester: Option<String>) {
        self.with_session(user, |session| session.selected_semester = semester);
    }

    pub fn snapshot(&self, user: &UserId) -> Option<SessionSnapshot> {
        self.lock().get(user).map(Session::snapshot)
    }

    pub fn active_sessions(&self) -> usize {
        self.lock().len()
    }

    /// Install a new awaiting-response slot, cancelling any previous one.
    ///
    /// Install before sending the prompt so a fast answer is never lost.
    pub fn install_waiter(&self, user: &UserId) -> ReplyWaiter {
        let id = self.next_wait_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        let replaced = self.with_session(user, |session| {
            session.pending.replace(PendingReply { id, tx }).is_some()
        });
        if replaced {
            debug!(user_id = %user, "Replaced pending reply slot");
        }
        ReplyWaiter {
            user: user.clone(),
            id,
            rx,
        }
    }

    /// Hand an inbound message to the user's pending slot.
    ///
    /// Gives the text back when no slot is waiting, including the case where
    /// the slot timed out concurrently.
    pub fn offer(&self, user: &UserId, text: String) -> Result<(), String> {
        let pending = {
            let mut sessions = self.lock();
            match sessions.get_mut(user) {
                Some(session) => session.pending.take(),
                None => None,
            }
        };

        match pending {
            Some(pending) => pending.tx.send(text),
            None => Err(text),
        }
    }

    pub fn has_waiter(&self, user: &UserId) -> bool {
        self.lock()
            .get(user)
            .is_some_and(|session| session.pending.is_some())
    }

    /// Wait for the slot to resolve. Exactly one outcome is produced.
    pub async fn wait(&self, waiter: ReplyWaiter, timeout: Duration) -> Reply {
        let ReplyWaiter { user, id, rx } = waiter;
        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(text)) => Reply::Message(text),
            Ok(Err(_)) => Reply::Superseded,
            Err(_) => {
                self.clear_waiter(&user, id);
                Reply::TimedOut
            }
        }
    }

    /// Remove the slot only if it is still the one identified by `id`
    fn clear_waiter(&self, user: &UserId, id: u64) {
        let mut sessions = self.lock();
        if let Some(session) = sessions.get_mut(user) {
            if session.pending.as_ref().is_some_and(|pending| pending.id == id) {
                session.pending = None;
                debug!(user_id = %user, "Pending reply slot timed out");
            }
        }
    }
}
