//! Server-initiated commands
//!
//! A command is an OCPP Call sent by the central system to a connected
//! charge point. [`CommandSender`] hands the Call to the charge point's
//! session and waits for the session to report the outcome: the charge
//! point's CallResult payload, its CallError, a timeout, or cancellation
//! because the session closed first.

pub mod remote_start;
pub mod remote_stop;

use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};
use thiserror::Error;
use tokio::sync::oneshot;
use tracing::warn;

use crate::session::{SessionCommand, SharedSessionRegistry};

pub use remote_start::remote_start_transaction;
pub use remote_stop::remote_stop_transaction;

/// Command sender errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandError {
    #[error("Charge point not connected: {0}")]
    NotConnected(String),

    #[error("Response timeout")]
    Timeout,

    #[error("Session closed before a response arrived")]
    Cancelled,

    #[error("CallError {code}: {description}")]
    CallError { code: String, description: String },

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Failed to send: {0}")]
    SendFailed(String),
}

/// Outcome of a remote start/stop as reported to API callers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CommandStatus {
    Accepted,
    Rejected,
}

/// Sends OCPP Calls to connected charge points
pub struct CommandSender {
    registry: SharedSessionRegistry,
    timeout: Duration,
}

pub type SharedCommandSender = Arc<CommandSender>;

impl CommandSender {
    pub fn new(registry: SharedSessionRegistry, timeout: Duration) -> Self {
        Self { registry, timeout }
    }

    pub fn shared(registry: SharedSessionRegistry, timeout: Duration) -> SharedCommandSender {
        Arc::new(Self::new(registry, timeout))
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Send a typed request and decode the typed response.
    pub async fn send_command<Req, Resp>(
        &self,
        charge_point_id: &str,
        action: &str,
        request: &Req,
    ) -> Result<Resp, CommandError>
    where
        Req: Serialize,
        Resp: DeserializeOwned,
    {
        let payload = match serde_json::to_value(request) {
            Ok(Value::Object(map)) => map,
            Ok(other) => {
                return Err(CommandError::SendFailed(format!(
                    "{} payload is not an object: {}",
                    action, other
                )))
            }
            Err(e) => return Err(CommandError::SendFailed(e.to_string())),
        };

        let response = self.send_raw(charge_point_id, action, payload).await?;
        serde_json::from_value(response).map_err(|e| CommandError::InvalidResponse(e.to_string()))
    }

    /// Send a Call with an untyped payload and return the CallResult payload.
    pub async fn send_raw(
        &self,
        charge_point_id: &str,
        action: &str,
        payload: Map<String, Value>,
    ) -> Result<Value, CommandError> {
        let (reply, rx) = oneshot::channel();
        self.registry.send_to(
            charge_point_id,
            SessionCommand::Call {
                action: action.to_string(),
                payload,
                timeout: self.timeout,
                reply,
            },
        )?;

        // A session blocked on a stalled write cannot expire its pending Calls
        match tokio::time::timeout(self.timeout, rx).await {
            Ok(Ok(outcome)) => outcome,
            // A session that goes away without answering drops `reply`
            Ok(Err(_)) => Err(CommandError::Cancelled),
            Err(_) => Err(CommandError::Timeout),
        }
    }
}

/// Map a remote start/stop outcome onto the status the caller sees:
/// no answer counts as a rejection.
pub(crate) fn status_or_rejected(
    charge_point_id: &str,
    action: &str,
    outcome: Result<CommandStatus, CommandError>,
) -> Result<CommandStatus, CommandError> {
    match outcome {
        Err(e @ (CommandError::Timeout | CommandError::Cancelled)) => {
            warn!(charge_point_id, action, error = %e, "No response, treating as Rejected");
            Ok(CommandStatus::Rejected)
        }
        other => other,
    }
}


#[cfg(test)]
mod tests {
    use std::time::Duration;

    use serde_json::json;

    use super::test_support::fake_charge_point;
    use super::*;
    use crate::session::SessionRegistry;

    #[tokio::test]
    async fn send_raw_returns_call_result_payload() {
        let registry = SessionRegistry::shared();
        let _cp = fake_charge_point(&registry, "CP001", |_, _| Some(Ok(json!({"status": "Accepted"}))));
        let sender = CommandSender::new(registry, Duration::from_secs(1));

        let result = sender.send_raw("CP001", "Reset", Map::new()).await.unwrap();
        assert_eq!(result, json!({"status": "Accepted"}));
    }

    #[tokio::test]
    async fn not_connected() {
        let sender = CommandSender::new(SessionRegistry::shared(), Duration::from_secs(1));
        let err = sender.send_raw("CP404", "Reset", Map::new()).await.unwrap_err();
        assert_eq!(err, CommandError::NotConnected("CP404".into()));
    }

    #[tokio::test]
    async fn dropped_reply_is_cancelled() {
        let registry = SessionRegistry::shared();
        let _cp = fake_charge_point(&registry, "CP001", |_, _| None);
        let sender = CommandSender::new(registry, Duration::from_secs(1));

        let err = sender.send_raw("CP001", "Reset", Map::new()).await.unwrap_err();
        assert_eq!(err, CommandError::Cancelled);
    }

    #[tokio::test]
    async fn session_that_never_answers_times_out() {
        let registry = SessionRegistry::shared();
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        registry.register(crate::session::SessionHandle::new(
            registry.next_connection_id(),
            "CP001",
            crate::domain::OcppVersion::V16,
            tx,
        ));
        // Holds every reply sender without resolving it
        let holder = tokio::spawn(async move {
            let mut held = Vec::new();
            while let Some(command) = rx.recv().await {
                held.push(command);
            }
            held
        });
        let sender = CommandSender::new(registry, Duration::from_millis(100));

        let started = tokio::time::Instant::now();
        let err = sender.send_raw("CP001", "Reset", Map::new()).await.unwrap_err();
        assert_eq!(err, CommandError::Timeout);
        assert!(started.elapsed() < Duration::from_secs(2));
        holder.abort();
    }

    #[tokio::test]
    async fn undecodable_response_is_invalid() {
        #[derive(Debug, serde::Deserialize)]
        struct Expected {
            #[allow(dead_code)]
            status: String,
        }

        let registry = SessionRegistry::shared();
        let _cp = fake_charge_point(&registry, "CP001", |_, _| Some(Ok(json!({"state": 1}))));
        let sender = CommandSender::new(registry, Duration::from_secs(1));

        let err = sender
            .send_command::<_, Expected>("CP001", "Reset", &json!({"type": "Soft"}))
            .await
            .unwrap_err();
        assert!(matches!(err, CommandError::InvalidResponse(_)));
    }

    #[test]
    fn timeout_and_cancel_become_rejected() {
        for e in [CommandError::Timeout, CommandError::Cancelled] {
            assert_eq!(
                status_or_rejected("CP001", "RemoteStopTransaction", Err(e)),
                Ok(CommandStatus::Rejected)
            );
        }
        assert_eq!(
            status_or_rejected(
                "CP001",
                "RemoteStopTransaction",
                Err(CommandError::NotConnected("CP001".into()))
            ),
            Err(CommandError::NotConnected("CP001".into()))
        );
    }
}
