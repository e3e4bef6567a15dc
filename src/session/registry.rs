//! Session registry: identity to live session
//!
//! Holds one [`SessionHandle`] per connected charge point. Registering an
//! identity that is already bound supersedes the old session: it is told to
//! close and the new handle takes its place.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use serde_json::{Map, Value};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use super::connection::CloseReason;
use crate::application::commands::CommandError;
use crate::domain::OcppVersion;

/// Work handed to a session task from outside its loop.
#[derive(Debug)]
pub enum SessionCommand {
    /// Send a server-initiated Call and report its outcome on `reply`.
    Call {
        action: String,
        payload: Map<String, Value>,
        timeout: Duration,
        reply: oneshot::Sender<Result<Value, CommandError>>,
    },
    /// Close the session.
    Close(CloseReason),
}

/// Registry entry for one live session
#[derive(Debug)]
pub struct SessionHandle {
    pub connection_id: u64,
    pub charge_point_id: String,
    pub ocpp_version: OcppVersion,
    pub connected_at: DateTime<Utc>,
    commands: mpsc::UnboundedSender<SessionCommand>,
}

impl SessionHandle {
    pub fn new(
        connection_id: u64,
        charge_point_id: impl Into<String>,
        ocpp_version: OcppVersion,
        commands: mpsc::UnboundedSender<SessionCommand>,
    ) -> Self {
        Self {
            connection_id,
            charge_point_id: charge_point_id.into(),
            ocpp_version,
            connected_at: Utc::now(),
            commands,
        }
    }

    /// Queue a command for the session loop.
    pub fn send(&self, command: SessionCommand) -> Result<(), CommandError> {
        self.commands
            .send(command)
            .map_err(|_| CommandError::NotConnected(self.charge_point_id.clone()))
    }

    pub fn close(&self, reason: CloseReason) {
        if self.commands.send(SessionCommand::Close(reason)).is_err() {
            debug!(
                charge_point_id = self.charge_point_id.as_str(),
                "Session already gone"
            );
        }
    }

    pub fn info(&self) -> SessionInfo {
        SessionInfo {
            charge_point_id: self.charge_point_id.clone(),
            connection_id: self.connection_id,
            ocpp_version: self.ocpp_version.version_string().to_string(),
            connected_at: self.connected_at,
        }
    }
}

/// Snapshot of a live session for the API
#[derive(Debug, Clone, Serialize)]
pub struct SessionInfo {
    pub charge_point_id: String,
    pub connection_id: u64,
    pub ocpp_version: String,
    pub connected_at: DateTime<Utc>,
}

/// Thread-safe registry of active charge point sessions
pub struct SessionRegistry {
    sessions: DashMap<String, SessionHandle>,
    next_connection_id: AtomicU64,
}

/// Shared, reference-counted session registry
pub type SharedSessionRegistry = Arc<SessionRegistry>;

impl SessionRegistry {
    pub fn new() -> Self {
        Self {
            sessions: DashMap::new(),
            next_connection_id: AtomicU64::new(1),
        }
    }

    /// Wrap in `Arc` for shared ownership
    pub fn shared() -> SharedSessionRegistry {
        Arc::new(Self::new())
    }

    pub fn next_connection_id(&self) -> u64 {
        self.next_connection_id.fetch_add(1, Ordering::SeqCst)
    }

    /// Bind the handle's identity to it. A session previously bound to the
    /// same identity is told to close and is returned.
    pub fn register(&self, handle: SessionHandle) -> Option<SessionHandle> {
        let charge_point_id = handle.charge_point_id.clone();
        info!(
            charge_point_id = charge_point_id.as_str(),
            connection_id = handle.connection_id,
            version = %handle.ocpp_version,
            "Registering charge point session"
        );

        let previous = self.sessions.insert(charge_point_id.clone(), handle);
        if let Some(ref old) = previous {
            warn!(
                charge_point_id = charge_point_id.as_str(),
                old_connection_id = old.connection_id,
                "Identity reconnected, superseding previous session"
            );
            old.close(CloseReason::Superseded);
        }
        self.record_gauge();
        previous
    }

    /// Remove the identity, but only while it is still bound to
    /// `connection_id`. Returns whether anything was removed.
    pub fn release(&self, charge_point_id: &str, connection_id: u64) -> bool {
        let removed = self
            .sessions
            .remove_if(charge_point_id, |_, handle| {
                handle.connection_id == connection_id
            })
            .is_some();
        if removed {
            info!(charge_point_id, connection_id, "Unregistered charge point session");
            self.record_gauge();
        }
        removed
    }

    /// Queue a command for the session bound to `charge_point_id`.
    pub fn send_to(
        &self,
        charge_point_id: &str,
        command: SessionCommand,
    ) -> Result<(), CommandError> {
        match self.sessions.get(charge_point_id) {
            Some(handle) => handle.send(command),
            None => Err(CommandError::NotConnected(charge_point_id.to_string())),
        }
    }

    pub fn is_connected(&self, charge_point_id: &str) -> bool {
        self.sessions.contains_key(charge_point_id)
    }

    pub fn connection_id(&self, charge_point_id: &str) -> Option<u64> {
        self.sessions.get(charge_point_id).map(|h| h.connection_id)
    }

    /// Sessions sorted by identity
    pub fn list(&self) -> Vec<SessionInfo> {
        let mut list: Vec<SessionInfo> = self.sessions.iter().map(|h| h.info()).collect();
        list.sort_by(|a, b| a.charge_point_id.cmp(&b.charge_point_id));
        list
    }

    pub fn count(&self) -> usize {
        self.sessions.len()
    }

    /// Ask every live session to close.
    pub fn close_all(&self, reason: CloseReason) {
        for handle in self.sessions.iter() {
            handle.close(reason.clone());
        }
    }

    fn record_gauge(&self) {
        metrics::gauge!("ocpp_connected_charge_points").set(self.sessions.len() as f64);
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}
