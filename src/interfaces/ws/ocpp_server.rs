//! OCPP WebSocket server
//!
//! Accepts charge point connections at `ws://<host>:<port>/<...>/{charge_point_id}`,
//! negotiates the sub-protocol during the handshake and runs one
//! [`Session`] task per connection.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::header::SEC_WEBSOCKET_PROTOCOL;
use tokio_tungstenite::tungstenite::http::{HeaderValue, StatusCode};
use tracing::{debug, error, info, warn};

use super::negotiator::{Negotiation, ProtocolNegotiator};
use crate::application::handlers::HandlerContext;
use crate::application::router::Router;
use crate::config::OcppConfig;
use crate::domain::{OcppVersion, RepositoryProvider};
use crate::session::{CloseReason, Session, SharedSessionRegistry};
use crate::support::shutdown::ShutdownSignal;

pub struct OcppServer {
    ocpp: OcppConfig,
    repos: Arc<dyn RepositoryProvider>,
    router: Arc<Router>,
    registry: SharedSessionRegistry,
    negotiator: ProtocolNegotiator,
    shutdown: ShutdownSignal,
}

impl OcppServer {
    pub fn new(
        ocpp: OcppConfig,
        repos: Arc<dyn RepositoryProvider>,
        registry: SharedSessionRegistry,
        shutdown: ShutdownSignal,
    ) -> Self {
        let negotiator = ProtocolNegotiator::ocpp16(ocpp.require_subprotocol);
        Self {
            ocpp,
            repos,
            router: Arc::new(Router::ocpp16()),
            registry,
            negotiator,
            shutdown,
        }
    }

    /// Replace the action table, e.g. to add vendor actions.
    pub fn with_router(mut self, router: Router) -> Self {
        self.router = Arc::new(router);
        self
    }

    pub fn session_registry(&self) -> &SharedSessionRegistry {
        &self.registry
    }

    /// Bind `addr` and serve until shutdown.
    pub async fn run(
        self: Arc<Self>,
        addr: &str,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let listener = TcpListener::bind(addr).await?;
        info!("OCPP central system listening on ws://{}", listener.local_addr()?);
        info!("Charge points should connect to ws://{}/ocpp/{{charge_point_id}}", addr);
        self.serve(listener).await
    }

    /// Accept connections on `listener` until shutdown.
    pub async fn serve(
        self: Arc<Self>,
        listener: TcpListener,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        loop {
            tokio::select! {
                accepted = listener.accept() => match accepted {
                    Ok((stream, addr)) => self.spawn_connection(stream, addr),
                    Err(e) => error!(error = %e, "Failed to accept connection"),
                },
                _ = self.shutdown.wait() => {
                    info!(
                        connected = self.registry.count(),
                        "WebSocket server received shutdown signal"
                    );
                    self.registry.close_all(CloseReason::Shutdown);
                    return Ok(());
                }
            }
        }
    }

    fn spawn_connection(self: &Arc<Self>, stream: TcpStream, addr: SocketAddr) {
        let server = Arc::clone(self);
        tokio::spawn(async move {
            if let Err(e) = server.handle_connection(stream, addr).await {
                warn!(%addr, error = %e, "Connection failed");
            }
        });
    }

    async fn handle_connection(
        &self,
        stream: TcpStream,
        addr: SocketAddr,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        debug!(%addr, "New TCP connection");

        let mut identity: Option<String> = None;
        let mut version: Option<OcppVersion> = None;
        let negotiator = &self.negotiator;

        let handshake = tokio_tungstenite::accept_hdr_async(
            stream,
            |req: &Request, mut response: Response| {
                let path = req.uri().path();
                let Some(charge_point_id) = charge_point_id_from_path(path) else {
                    warn!(%addr, path, "Rejecting handshake without charge point identity");
                    return Err(bad_request("missing charge point identity in request path"));
                };

                let offered = req
                    .headers()
                    .get_all(SEC_WEBSOCKET_PROTOCOL)
                    .iter()
                    .filter_map(|v| v.to_str().ok())
                    .collect::<Vec<_>>()
                    .join(",");

                match negotiator.negotiate(Some(&offered)) {
                    Negotiation::Selected(selected) => {
                        response.headers_mut().insert(
                            SEC_WEBSOCKET_PROTOCOL,
                            HeaderValue::from_static(selected.subprotocol()),
                        );
                        version = Some(selected);
                    }
                    Negotiation::Assumed(assumed) => {
                        warn!(
                            charge_point_id = charge_point_id.as_str(),
                            %addr,
                            "No sub-protocol offered, assuming {}",
                            assumed
                        );
                        version = Some(assumed);
                    }
                    Negotiation::Rejected(reason) => {
                        warn!(
                            charge_point_id = charge_point_id.as_str(),
                            %addr,
                            reason = reason.as_str(),
                            "Rejecting handshake"
                        );
                        return Err(bad_request(reason));
                    }
                }

                identity = Some(charge_point_id);
                Ok(response)
            },
        );
        let ws = match tokio::time::timeout(self.ocpp.handshake_timeout(), handshake).await {
            Ok(result) => result?,
            Err(_) => return Err("WebSocket handshake timed out".into()),
        };

        let (Some(charge_point_id), Some(version)) = (identity, version) else {
            return Err("handshake completed without an identity".into());
        };

        let context = HandlerContext::new(
            charge_point_id.clone(),
            Arc::clone(&self.repos),
            self.ocpp.heartbeat_interval,
        );
        let session = Session::open(
            context,
            version,
            Arc::clone(&self.router),
            Arc::clone(&self.registry),
            self.ocpp.idle_timeout(),
        );
        info!(
            charge_point_id = charge_point_id.as_str(),
            %addr,
            connection_id = session.connection_id(),
            %version,
            "Charge point connected"
        );

        let reason = session.run(ws, self.shutdown.clone()).await;
        info!(
            charge_point_id = charge_point_id.as_str(),
            %addr,
            reason = %reason,
            "Charge point disconnected"
        );
        Ok(())
    }
}

/// The charge point identity: the last non-empty segment of the request path.
pub fn charge_point_id_from_path(path: &str) -> Option<String> {
    path.trim_matches('/')
        .rsplit('/')
        .next()
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(str::to_string)
}

fn bad_request(reason: impl Into<String>) -> ErrorResponse {
    let mut response = ErrorResponse::new(Some(reason.into()));
    *response.status_mut() = StatusCode::BAD_REQUEST;
    response
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use futures_util::{SinkExt, StreamExt};
    use serde_json::{json, Value};
    use tokio_tungstenite::tungstenite::client::IntoClientRequest;
    use tokio_tungstenite::tungstenite::{Error as WsError, Message};
    use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

    use super::*;
    use crate::application::{remote_start_transaction, CommandSender, CommandStatus};
    use crate::domain::{AuthorizationRecord, IdTagStatus, TransactionRepository, TransactionStatus};
    use crate::infrastructure::{InMemoryAuthorizationStore, InMemoryRepositoryProvider};
    use crate::session::SessionRegistry;

    type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

    struct TestServer {
        addr: SocketAddr,
        registry: SharedSessionRegistry,
        repos: Arc<InMemoryRepositoryProvider>,
        shutdown: ShutdownSignal,
    }

    async fn spawn_server(ocpp: OcppConfig) -> TestServer {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let repos = Arc::new(InMemoryRepositoryProvider::new(
            InMemoryAuthorizationStore::with_records(vec![AuthorizationRecord::new(
                "TAG1",
                IdTagStatus::Accepted,
            )]),
        ));
        let registry = SessionRegistry::shared();
        let shutdown = ShutdownSignal::new();
        let server = Arc::new(OcppServer::new(
            ocpp,
            repos.clone(),
            registry.clone(),
            shutdown.clone(),
        ));
        tokio::spawn(server.serve(listener));

        TestServer {
            addr,
            registry,
            repos,
            shutdown,
        }
    }

    async fn try_connect(
        addr: SocketAddr,
        path: &str,
        protocol: Option<&'static str>,
    ) -> Result<(Client, Option<String>), WsError> {
        let mut request = format!("ws://{}{}", addr, path).into_client_request()?;
        if let Some(protocol) = protocol {
            request
                .headers_mut()
                .insert(SEC_WEBSOCKET_PROTOCOL, HeaderValue::from_static(protocol));
        }
        let (client, response) = connect_async(request).await?;
        let selected = response
            .headers()
            .get(SEC_WEBSOCKET_PROTOCOL)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        Ok((client, selected))
    }

    async fn connect(server: &TestServer, charge_point_id: &str) -> Client {
        let path = format!("/ocpp/{}", charge_point_id);
        let (client, _) = try_connect(server.addr, &path, Some("ocpp1.6")).await.unwrap();
        wait_until(|| server.registry.is_connected(charge_point_id)).await;
        client
    }

    async fn wait_until(condition: impl Fn() -> bool) {
        for _ in 0..300 {
            if condition() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("condition not reached within 3s");
    }

    async fn next_json(client: &mut Client) -> Value {
        loop {
            let message = tokio::time::timeout(Duration::from_secs(5), client.next())
                .await
                .expect("no frame within 5s")
                .expect("stream ended")
                .unwrap();
            if let Message::Text(text) = message {
                return serde_json::from_str(&text).unwrap();
            }
        }
    }

    async fn request(client: &mut Client, frame: Value) -> Value {
        client.send(Message::Text(frame.to_string())).await.unwrap();
        next_json(client).await
    }

    fn rejected_status(result: Result<(Client, Option<String>), WsError>) -> StatusCode {
        match result {
            Err(WsError::Http(response)) => response.status(),
            Err(other) => panic!("Expected HTTP rejection, got {:?}", other),
            Ok(_) => panic!("Expected HTTP rejection, handshake succeeded"),
        }
    }

    #[test]
    fn identity_is_last_path_segment() {
        assert_eq!(charge_point_id_from_path("/ocpp/CP001"), Some("CP001".into()));
        assert_eq!(charge_point_id_from_path("/ocpp/CP001/"), Some("CP001".into()));
        assert_eq!(charge_point_id_from_path("/CP001"), Some("CP001".into()));
        assert_eq!(charge_point_id_from_path("/a/b/c/CP-9"), Some("CP-9".into()));
        assert_eq!(charge_point_id_from_path("/"), None);
        assert_eq!(charge_point_id_from_path(""), None);
        assert_eq!(charge_point_id_from_path("//"), None);
    }

    #[tokio::test]
    async fn negotiates_ocpp16_and_answers_heartbeat() {
        let server = spawn_server(OcppConfig::default()).await;
        let (mut client, selected) = try_connect(server.addr, "/ocpp/CP001", Some("ocpp1.6"))
            .await
            .unwrap();
        assert_eq!(selected.as_deref(), Some("ocpp1.6"));

        let reply = request(&mut client, json!([2, "hb-1", "Heartbeat", {}])).await;
        assert_eq!(reply[0], 3);
        assert_eq!(reply[1], "hb-1");
        let current_time = reply[2]["currentTime"].as_str().unwrap();
        assert!(current_time.ends_with('Z'));
        assert_eq!(current_time.len(), "2024-01-01T00:00:00Z".len());
    }

    #[tokio::test]
    async fn boot_notification_uses_configured_interval() {
        let server = spawn_server(OcppConfig {
            heartbeat_interval: 42,
            ..OcppConfig::default()
        })
        .await;
        let mut client = connect(&server, "CP001").await;

        let reply = request(
            &mut client,
            json!([2, "b1", "BootNotification", {
                "chargePointVendor": "Acme",
                "chargePointModel": "One"
            }]),
        )
        .await;
        assert_eq!(reply[2]["status"], "Accepted");
        assert_eq!(reply[2]["interval"], 42);
    }

    #[tokio::test]
    async fn rejects_unsupported_subprotocol() {
        let server = spawn_server(OcppConfig::default()).await;
        let status = rejected_status(try_connect(server.addr, "/ocpp/CP001", Some("ocpp2.0.1")).await);
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(!server.registry.is_connected("CP001"));
    }

    #[tokio::test]
    async fn rejects_missing_identity() {
        let server = spawn_server(OcppConfig::default()).await;
        let status = rejected_status(try_connect(server.addr, "/", Some("ocpp1.6")).await);
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn missing_subprotocol_follows_policy() {
        let lenient = spawn_server(OcppConfig::default()).await;
        let (_client, selected) = try_connect(lenient.addr, "/ocpp/CP001", None).await.unwrap();
        assert_eq!(selected, None);

        let strict = spawn_server(OcppConfig {
            require_subprotocol: true,
            ..OcppConfig::default()
        })
        .await;
        let status = rejected_status(try_connect(strict.addr, "/ocpp/CP001", None).await);
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn unknown_action_then_valid_call() {
        let server = spawn_server(OcppConfig::default()).await;
        let mut client = connect(&server, "CP001").await;

        let reply = request(&mut client, json!([2, "1", "FlyToMoon", {}])).await;
        assert_eq!(reply[0], 4);
        assert_eq!(reply[2], "NotImplemented");

        let reply = request(&mut client, json!([2, "2", "Authorize", {"idTag": "TAG1"}])).await;
        assert_eq!(reply, json!([3, "2", {"idTagInfo": {"status": "Accepted"}}]));
    }

    #[tokio::test]
    async fn malformed_frame_keeps_connection() {
        let server = spawn_server(OcppConfig::default()).await;
        let mut client = connect(&server, "CP001").await;

        client.send(Message::Text("[2,".to_string())).await.unwrap();
        let reply = next_json(&mut client).await;
        assert_eq!(reply, json!([4, "-1", "FormationViolation", reply[3].clone(), {}]));

        let reply = request(&mut client, json!([2, "ok", "Heartbeat", {}])).await;
        assert_eq!(reply[0], 3);
    }

    #[tokio::test]
    async fn correlation_ids_are_per_session() {
        let server = spawn_server(OcppConfig::default()).await;
        let mut a = connect(&server, "CP-A").await;
        let mut b = connect(&server, "CP-B").await;

        a.send(Message::Text(json!([2, "1", "Authorize", {"idTag": "TAG1"}]).to_string()))
            .await
            .unwrap();
        b.send(Message::Text(json!([2, "1", "Authorize", {"idTag": "NOPE"}]).to_string()))
            .await
            .unwrap();

        let reply_a = next_json(&mut a).await;
        let reply_b = next_json(&mut b).await;
        assert_eq!(reply_a, json!([3, "1", {"idTagInfo": {"status": "Accepted"}}]));
        assert_eq!(reply_b, json!([3, "1", {"idTagInfo": {"status": "Invalid"}}]));
    }

    #[tokio::test]
    async fn start_and_stop_transaction() {
        let server = spawn_server(OcppConfig::default()).await;
        let mut client = connect(&server, "CP001").await;

        let started = request(
            &mut client,
            json!([2, "s1", "StartTransaction", {
                "connectorId": 1,
                "idTag": "TAG1",
                "meterStart": 1000,
                "timestamp": "2024-05-01T10:00:00Z"
            }]),
        )
        .await;
        assert_eq!(started[2]["idTagInfo"]["status"], "Accepted");
        let transaction_id = started[2]["transactionId"].as_i64().unwrap() as i32;

        let stopped = request(
            &mut client,
            json!([2, "s2", "StopTransaction", {
                "transactionId": transaction_id,
                "idTag": "TAG1",
                "meterStop": 4500,
                "timestamp": "2024-05-01T11:00:00Z"
            }]),
        )
        .await;
        assert_eq!(stopped[0], 3);

        let transaction = server
            .repos
            .transaction_registry()
            .find_by_id(transaction_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(transaction.status, TransactionStatus::Stopped);
        assert_eq!(transaction.energy_consumed(), Some(3500));
    }

    #[tokio::test]
    async fn reconnect_supersedes_previous_connection() {
        let server = spawn_server(OcppConfig::default()).await;
        let mut first = connect(&server, "CP001").await;
        let first_connection = server.registry.connection_id("CP001").unwrap();

        let mut second = connect(&server, "CP001").await;
        wait_until(|| server.registry.connection_id("CP001") != Some(first_connection)).await;

        // The first connection is closed by the server.
        let closed = tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                match first.next().await {
                    Some(Ok(Message::Close(_))) | None | Some(Err(_)) => break,
                    Some(Ok(_)) => continue,
                }
            }
        })
        .await;
        assert!(closed.is_ok());

        let reply = request(&mut second, json!([2, "1", "Heartbeat", {}])).await;
        assert_eq!(reply[0], 3);
        assert!(server.registry.is_connected("CP001"));
        assert_eq!(server.registry.count(), 1);
    }

    #[tokio::test]
    async fn remote_start_resolves_from_charge_point() {
        let server = spawn_server(OcppConfig::default()).await;
        let mut client = connect(&server, "CP001").await;
        let sender = CommandSender::new(server.registry.clone(), Duration::from_secs(5));

        let command = tokio::spawn(async move {
            remote_start_transaction(&sender, "CP001", "TAG1", Some(1)).await
        });

        let call = next_json(&mut client).await;
        assert_eq!(call[0], 2);
        assert_eq!(call[2], "RemoteStartTransaction");
        assert_eq!(call[3]["idTag"], "TAG1");
        client
            .send(Message::Text(json!([3, call[1], {"status": "Accepted"}]).to_string()))
            .await
            .unwrap();

        let status = command.await.unwrap().unwrap();
        assert_eq!(status, CommandStatus::Accepted);
    }

    #[tokio::test]
    async fn unanswered_remote_start_is_rejected() {
        let server = spawn_server(OcppConfig::default()).await;
        let mut client = connect(&server, "CP001").await;
        let sender = CommandSender::new(server.registry.clone(), Duration::from_millis(100));

        let command = tokio::spawn(async move {
            remote_start_transaction(&sender, "CP001", "TAG1", None).await
        });
        let _call = next_json(&mut client).await;

        let status = command.await.unwrap().unwrap();
        assert_eq!(status, CommandStatus::Rejected);
        assert!(server.registry.is_connected("CP001"));
    }

    #[tokio::test]
    async fn idle_session_is_closed() {
        let server = spawn_server(OcppConfig {
            idle_timeout_secs: 1,
            ..OcppConfig::default()
        })
        .await;
        let _client = connect(&server, "CP001").await;

        wait_until(|| !server.registry.is_connected("CP001")).await;
    }

    #[tokio::test]
    async fn silent_tcp_client_is_dropped_after_handshake_timeout() {
        use tokio::io::AsyncReadExt;

        let server = spawn_server(OcppConfig {
            handshake_timeout_secs: 1,
            ..OcppConfig::default()
        })
        .await;
        let mut socket = TcpStream::connect(server.addr).await.unwrap();

        let mut buf = [0u8; 64];
        let read = tokio::time::timeout(Duration::from_secs(3), socket.read(&mut buf))
            .await
            .expect("server did not drop the connection within 3s");
        assert!(matches!(read, Ok(0) | Err(_)));
        assert_eq!(server.registry.count(), 0);
    }

    #[tokio::test]
    async fn shutdown_closes_sessions() {
        let server = spawn_server(OcppConfig::default()).await;
        let mut client = connect(&server, "CP001").await;

        server.shutdown.trigger();

        let frame = tokio::time::timeout(Duration::from_secs(5), client.next())
            .await
            .unwrap();
        assert!(matches!(frame, Some(Ok(Message::Close(_))) | None));
        wait_until(|| server.registry.count() == 0).await;
    }
}
