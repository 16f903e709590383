//! Per-host session registry.
//!
//! Holds at most one session per host key. `ensure_sessions` fills in missing
//! or dead entries by consulting a readiness check and a connector; polling
//! until every host is up is layered on top in `wait_for_sessions`.

use async_trait::async_trait;
use log::{debug, info, warn};
use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;
use std::time::Duration;

use crate::error::{RemotingError, RemotingErrorKind, RemotingResult};
use crate::remote_fs::RemoteSession;

// ─── Capabilities ────────────────────────────────────────────────────────────

/// Reports whether a host can accept a session right now.
#[async_trait]
pub trait ReadinessCheck<K: Sync>: Send + Sync {
    async fn is_ready(&self, key: &K) -> bool;
}

/// Opens a new session for a host key.
#[async_trait]
pub trait Connector<K: Sync>: Send + Sync {
    type Session: RemoteSession;

    async fn connect(&self, key: &K) -> RemotingResult<Self::Session>;
}

/// Readiness check that treats every host as ready.
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysReady;

#[async_trait]
impl<K: Sync> ReadinessCheck<K> for AlwaysReady {
    async fn is_ready(&self, _key: &K) -> bool {
        true
    }
}

// ─── Outcomes ────────────────────────────────────────────────────────────────

/// What `ensure_sessions` did for one key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnsureOutcome {
    /// An `Opened` session was already registered.
    Reused,
    /// A new session was opened and registered.
    Connected,
    /// The readiness check said no; nothing was attempted.
    NotReady,
    /// The connector failed; any previous entry is untouched.
    Failed(RemotingError),
}

impl EnsureOutcome {
    pub fn is_open(&self) -> bool {
        matches!(self, Self::Reused | Self::Connected)
    }
}

/// Fixed-interval polling for `wait_for_sessions`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub interval: Duration,
    pub max_attempts: u32,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(10),
            max_attempts: 60,
        }
    }
}

// ─── Registry ────────────────────────────────────────────────────────────────

/// Map from host key to its current session.
#[derive(Debug)]
pub struct SessionRegistry<K, S> {
    sessions: HashMap<K, S>,
}

impl<K, S> Default for SessionRegistry<K, S> {
    fn default() -> Self {
        Self {
            sessions: HashMap::new(),
        }
    }
}

impl<K, S> SessionRegistry<K, S>
where
    K: Eq + Hash + Clone + fmt::Display + Send + Sync,
    S: RemoteSession,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Make sure every key in `keys` has an `Opened` session, where possible.
    ///
    /// Opened entries are reused without touching the connector. Missing or
    /// dead entries are replaced when the host is ready and the connector
    /// succeeds. A connector failure is reported for that key only.
    pub async fn ensure_sessions<R, C>(
        &mut self,
        keys: &[K],
        readiness: &R,
        connector: &C,
    ) -> Vec<(K, EnsureOutcome)>
    where
        R: ReadinessCheck<K> + ?Sized,
        C: Connector<K, Session = S> + ?Sized,
    {
        let mut report = Vec::with_capacity(keys.len());

        for key in keys {
            if self.sessions.get(key).is_some_and(|s| s.is_open()) {
                debug!("Reusing open session for {}", key);
                report.push((key.clone(), EnsureOutcome::Reused));
                continue;
            }

            if !readiness.is_ready(key).await {
                debug!("{} is not ready yet", key);
                report.push((key.clone(), EnsureOutcome::NotReady));
                continue;
            }

            match connector.connect(key).await {
                Ok(session) => {
                    if let Some(mut old) = self.sessions.insert(key.clone(), session) {
                        debug!("Replacing {:?} session for {}", old.state(), key);
                        if let Err(e) = old.close().await {
                            warn!("Could not close replaced session for {}: {}", key, e);
                        }
                    }
                    info!("Session to {} established", key);
                    report.push((key.clone(), EnsureOutcome::Connected));
                }
                Err(e) => {
                    warn!("Could not connect to {}: {}", key, e);
                    report.push((key.clone(), EnsureOutcome::Failed(e)));
                }
            }
        }

        report
    }

    /// Re-run `ensure_sessions` until every key is open or attempts run out.
    pub async fn wait_for_sessions<R, C>(
        &mut self,
        keys: &[K],
        readiness: &R,
        connector: &C,
        policy: PollPolicy,
    ) -> RemotingResult<()>
    where
        R: ReadinessCheck<K> + ?Sized,
        C: Connector<K, Session = S> + ?Sized,
    {
        let attempts = policy.max_attempts.max(1);
        for attempt in 1..=attempts {
            self.ensure_sessions(keys, readiness, connector).await;
            if self.all_open(keys) {
                return Ok(());
            }
            if attempt < attempts {
                debug!(
                    "Sessions not all open (attempt {}/{}), retrying in {:?}",
                    attempt, attempts, policy.interval
                );
                tokio::time::sleep(policy.interval).await;
            }
        }

        let pending: Vec<String> = keys
            .iter()
            .filter(|k| !self.sessions.get(*k).is_some_and(|s| s.is_open()))
            .map(|k| k.to_string())
            .collect();
        Err(RemotingError::new(
            RemotingErrorKind::Connect,
            format!(
                "No open session after {} attempts for: {}",
                attempts,
                pending.join(", ")
            ),
        ))
    }

    /// True when every key has an `Opened` session.
    pub fn all_open(&self, keys: &[K]) -> bool {
        keys.iter()
            .all(|k| self.sessions.get(k).is_some_and(|s| s.is_open()))
    }

    pub fn get(&self, key: &K) -> Option<&S> {
        self.sessions.get(key)
    }

    pub fn get_mut(&mut self, key: &K) -> Option<&mut S> {
        self.sessions.get_mut(key)
    }

    pub fn remove(&mut self, key: &K) -> Option<S> {
        self.sessions.remove(key)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Close and drop every session. Returns the number closed cleanly.
    pub async fn close_all(&mut self) -> usize {
        let mut closed = 0;
        for (key, mut session) in self.sessions.drain() {
            match session.close().await {
                Ok(()) => closed += 1,
                Err(e) => warn!("Failed to close session for {}: {}", key, e),
            }
        }
        closed
    }
}
