//! Charge point session
//!
//! A [`Session`] owns one charge point's WebSocket. Its loop is sequential:
//! frames from the charge point are decoded, dispatched and answered one at a
//! time, so results go out in the order the requests came in. Server-initiated
//! Calls arrive on the session's command channel and are correlated with the
//! charge point's responses through a pending map only this task touches.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::{Map, Value};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::registry::{SessionCommand, SessionHandle, SharedSessionRegistry};
use crate::application::commands::CommandError;
use crate::application::handlers::HandlerContext;
use crate::application::router::Router;
use crate::domain::OcppVersion;
use crate::support::ocpp_frame::{Call, OcppMessage};
use crate::support::shutdown::ShutdownSignal;

/// Why a session ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseReason {
    /// The charge point closed the socket
    PeerClosed,
    /// No frame in either direction for longer than the idle timeout
    IdleTimeout,
    /// The same identity connected again
    Superseded,
    /// Server shutdown
    Shutdown,
    /// Read or write failure on the socket
    Transport(String),
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PeerClosed => write!(f, "closed by charge point"),
            Self::IdleTimeout => write!(f, "idle timeout"),
            Self::Superseded => write!(f, "superseded by a newer connection"),
            Self::Shutdown => write!(f, "server shutdown"),
            Self::Transport(e) => write!(f, "transport error: {}", e),
        }
    }
}

/// Upper bound for delivering the final close frame
const CLOSE_FRAME_TIMEOUT: Duration = Duration::from_secs(5);

struct PendingCall {
    action: String,
    deadline: Instant,
    reply: oneshot::Sender<Result<Value, CommandError>>,
}

pub struct Session {
    context: HandlerContext,
    connection_id: u64,
    router: Arc<Router>,
    registry: SharedSessionRegistry,
    commands: mpsc::UnboundedReceiver<SessionCommand>,
    pending: HashMap<String, PendingCall>,
    idle_timeout: Duration,
    last_activity: Instant,
    closed: bool,
}

impl Session {
    /// Create the session and bind its identity in `registry`, superseding
    /// any session already bound to it.
    pub fn open(
        context: HandlerContext,
        ocpp_version: OcppVersion,
        router: Arc<Router>,
        registry: SharedSessionRegistry,
        idle_timeout: Duration,
    ) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let connection_id = registry.next_connection_id();
        registry.register(SessionHandle::new(
            connection_id,
            context.charge_point_id.clone(),
            ocpp_version,
            tx,
        ));

        Self {
            context,
            connection_id,
            router,
            registry,
            commands: rx,
            pending: HashMap::new(),
            idle_timeout,
            last_activity: Instant::now(),
            closed: false,
        }
    }

    pub fn charge_point_id(&self) -> &str {
        &self.context.charge_point_id
    }

    pub fn connection_id(&self) -> u64 {
        self.connection_id
    }

    /// Drive the connection until it ends, then close the session.
    pub async fn run<S>(mut self, mut ws: WebSocketStream<S>, shutdown: ShutdownSignal) -> CloseReason
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        self.last_activity = Instant::now();

        let reason = loop {
            let wake_at = self.next_deadline();

            tokio::select! {
                frame = ws.next() => {
                    match frame {
                        Some(Ok(Message::Text(text))) => {
                            self.touch();
                            if let Err(reason) = self.handle_frame(&mut ws, text.as_bytes()).await {
                                break reason;
                            }
                        }
                        Some(Ok(Message::Binary(data))) => {
                            self.touch();
                            if let Err(reason) = self.handle_frame(&mut ws, &data).await {
                                break reason;
                            }
                        }
                        Some(Ok(Message::Ping(_))) | Some(Ok(Message::Pong(_))) => self.touch(),
                        Some(Ok(Message::Close(frame))) => {
                            debug!(
                                charge_point_id = self.charge_point_id(),
                                ?frame,
                                "Close frame received"
                            );
                            break CloseReason::PeerClosed;
                        }
                        Some(Ok(Message::Frame(_))) => {}
                        Some(Err(e)) => break CloseReason::Transport(e.to_string()),
                        None => break CloseReason::PeerClosed,
                    }
                }
                command = self.commands.recv() => {
                    match command {
                        Some(SessionCommand::Call { action, payload, timeout, reply }) => {
                            if let Err(reason) = self.send_call(&mut ws, action, payload, timeout, reply).await {
                                break reason;
                            }
                        }
                        Some(SessionCommand::Close(reason)) => break reason,
                        // Every handle for this session has been dropped
                        None => break CloseReason::Superseded,
                    }
                }
                _ = tokio::time::sleep_until(wake_at) => {
                    self.expire_calls();
                    if self.last_activity.elapsed() >= self.idle_timeout {
                        break CloseReason::IdleTimeout;
                    }
                }
                _ = shutdown.wait() => break CloseReason::Shutdown,
            }
        };

        self.close(&reason);

        let code = match reason {
            CloseReason::Shutdown => CloseCode::Away,
            CloseReason::Superseded => CloseCode::Policy,
            _ => CloseCode::Normal,
        };
        if !matches!(reason, CloseReason::PeerClosed | CloseReason::Transport(_)) {
            let frame = CloseFrame {
                code,
                reason: reason.to_string().into(),
            };
            let limit = self.idle_timeout.min(CLOSE_FRAME_TIMEOUT);
            match tokio::time::timeout(limit, ws.close(Some(frame))).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => debug!(
                    charge_point_id = self.charge_point_id(),
                    error = %e,
                    "Close frame not delivered"
                ),
                Err(_) => debug!(
                    charge_point_id = self.charge_point_id(),
                    "Close frame not delivered, peer stopped reading"
                ),
            }
        }

        reason
    }

    async fn handle_frame<S>(&mut self, ws: &mut WebSocketStream<S>, raw: &[u8]) -> Result<(), CloseReason>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let reply = match OcppMessage::decode(raw) {
            Err(e) => {
                warn!(
                    charge_point_id = self.charge_point_id(),
                    message_id = e.reply_id(),
                    error = %e,
                    "Malformed frame"
                );
                metrics::counter!("ocpp_call_errors_total", "code" => "FormationViolation")
                    .increment(1);
                Some(e.to_call_error())
            }
            Ok(OcppMessage::Call(call)) => Some(self.handle_call(call).await),
            Ok(OcppMessage::CallResult(result)) => {
                self.resolve(&result.correlation_id, Ok(Value::Object(result.payload)));
                None
            }
            Ok(OcppMessage::CallError(error)) => {
                self.resolve(
                    &error.correlation_id,
                    Err(CommandError::CallError {
                        code: error.error_code,
                        description: error.error_description,
                    }),
                );
                None
            }
        };

        match reply {
            Some(reply) => self.write(ws, reply.encode()).await,
            None => Ok(()),
        }
    }

    async fn handle_call(&self, call: Call) -> OcppMessage {
        debug!(
            charge_point_id = self.charge_point_id(),
            action = call.action.as_str(),
            message_id = call.correlation_id.as_str(),
            "Call received"
        );
        let label = self.router.metric_label(&call.action);
        metrics::counter!("ocpp_messages_total", "action" => label).increment(1);

        match self
            .router
            .dispatch(&self.context, &call.action, Value::Object(call.payload))
            .await
        {
            Ok(payload) => OcppMessage::call_result(call.correlation_id, payload),
            Err(e) => {
                let code = e.error_code();
                warn!(
                    charge_point_id = self.charge_point_id(),
                    action = call.action.as_str(),
                    message_id = call.correlation_id.as_str(),
                    code = %code,
                    error = %e,
                    "Call failed"
                );
                metrics::counter!("ocpp_call_errors_total", "code" => code.as_str()).increment(1);
                OcppMessage::call_error(call.correlation_id, code, e.to_string())
            }
        }
    }

    async fn send_call<S>(
        &mut self,
        ws: &mut WebSocketStream<S>,
        action: String,
        payload: Map<String, Value>,
        timeout: Duration,
        reply: oneshot::Sender<Result<Value, CommandError>>,
    ) -> Result<(), CloseReason>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        if reply.is_closed() {
            return Ok(());
        }

        let mut correlation_id = Uuid::new_v4().to_string();
        while self.pending.contains_key(&correlation_id) {
            correlation_id = Uuid::new_v4().to_string();
        }

        let frame = OcppMessage::Call(Call {
            correlation_id: correlation_id.clone(),
            action: action.clone(),
            payload,
        })
        .encode();

        info!(
            charge_point_id = self.charge_point_id(),
            action = action.as_str(),
            message_id = correlation_id.as_str(),
            "Sending Call"
        );
        self.pending.insert(
            correlation_id.clone(),
            PendingCall {
                action,
                deadline: Instant::now() + timeout,
                reply,
            },
        );

        if let Err(reason) = self.write(ws, frame).await {
            if let Some(pending) = self.pending.remove(&correlation_id) {
                let error = match &reason {
                    CloseReason::IdleTimeout => CommandError::Timeout,
                    other => CommandError::SendFailed(other.to_string()),
                };
                let _ = pending.reply.send(Err(error));
            }
            return Err(reason);
        }
        Ok(())
    }

    /// Deliver a response to its pending Call. Unknown ids are dropped.
    fn resolve(&mut self, correlation_id: &str, outcome: Result<Value, CommandError>) {
        match self.pending.remove(correlation_id) {
            Some(pending) => {
                debug!(
                    charge_point_id = self.charge_point_id(),
                    action = pending.action.as_str(),
                    message_id = correlation_id,
                    "Response received"
                );
                if pending.reply.send(outcome).is_err() {
                    debug!(message_id = correlation_id, "Caller no longer waiting");
                }
            }
            None => debug!(
                charge_point_id = self.charge_point_id(),
                message_id = correlation_id,
                "Discarding response with no pending Call"
            ),
        }
    }

    fn expire_calls(&mut self) {
        let now = Instant::now();
        let expired: Vec<String> = self
            .pending
            .iter()
            .filter(|(_, pending)| pending.deadline <= now)
            .map(|(id, _)| id.clone())
            .collect();

        for id in expired {
            if let Some(pending) = self.pending.remove(&id) {
                warn!(
                    charge_point_id = self.charge_point_id(),
                    action = pending.action.as_str(),
                    message_id = id.as_str(),
                    "Call timed out"
                );
                let _ = pending.reply.send(Err(CommandError::Timeout));
            }
        }
    }

    /// Earliest of the idle deadline and the pending Call deadlines.
    fn next_deadline(&self) -> Instant {
        let idle = self.last_activity + self.idle_timeout;
        self.pending
            .values()
            .map(|pending| pending.deadline)
            .fold(idle, Instant::min)
    }

    /// Write one frame. A peer that accepts nothing for a whole idle
    /// period ends the session as idle.
    async fn write<S>(&mut self, ws: &mut WebSocketStream<S>, frame: String) -> Result<(), CloseReason>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        match tokio::time::timeout(self.idle_timeout, ws.send(Message::Text(frame))).await {
            Ok(Ok(())) => {
                self.touch();
                Ok(())
            }
            Ok(Err(e)) => Err(CloseReason::Transport(e.to_string())),
            Err(_) => {
                warn!(
                    charge_point_id = self.charge_point_id(),
                    "Write stalled for the idle timeout"
                );
                Err(CloseReason::IdleTimeout)
            }
        }
    }

    fn touch(&mut self) {
        self.last_activity = Instant::now();
    }

    /// Fail outstanding work and give up the identity. Runs once.
    fn close(&mut self, reason: &CloseReason) {
        if self.closed {
            return;
        }
        self.closed = true;

        let pending_error = match reason {
            CloseReason::IdleTimeout => CommandError::Timeout,
            _ => CommandError::Cancelled,
        };
        for (_, pending) in self.pending.drain() {
            let _ = pending.reply.send(Err(pending_error.clone()));
        }

        self.registry
            .release(&self.context.charge_point_id, self.connection_id);

        self.commands.close();
        while let Ok(command) = self.commands.try_recv() {
            if let SessionCommand::Call { reply, .. } = command {
                let _ = reply.send(Err(CommandError::Cancelled));
            }
        }

        info!(
            charge_point_id = self.context.charge_point_id.as_str(),
            connection_id = self.connection_id,
            reason = %reason,
            "Session closed"
        );
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.close(&CloseReason::Transport("session dropped".to_string()));
    }
}
