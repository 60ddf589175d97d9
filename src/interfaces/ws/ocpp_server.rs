//! OCPP-J WebSocket server
//!
//! Accepts charge-point connections at
//! `ws://<host>:<port>/OCPP16/{tenant}/{chargeBoxId}` (or `/OCPP15/...`,
//! or without the tenant segment for the default tenant).
//!
//! Every connection runs three tasks:
//!
//! ```text
//!  socket ──► reader ──┬── CallResult / CallError ──► RequestCorrelator
//!                      └── Call ──► worker (one at a time) ──► ActionDispatcher
//!  socket ◄── writer ◄── Outbound channel ◄── replies, outbound calls, close
//! ```

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;
use tracing::{debug, error, info, warn};

use crate::application::handlers::ActionDispatcher;
use crate::application::session::{
    ChargeBoxIdentity, CloseReason, ConnectionHandle, Outbound, SharedConnectionRegistry,
};
use crate::config::Config;
use crate::domain::{OcppVersion, TenantResolver};
use crate::shared::{OcppFrame, ShutdownSignal};

use super::negotiator::{HandshakeError, ProtocolNegotiator};
use super::path::ConnectionPath;

/// Time the writer gets to flush the close frame
const WRITER_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Shared state handed to every connection task
#[derive(Clone)]
struct ServerContext {
    config: Arc<Config>,
    registry: SharedConnectionRegistry,
    dispatcher: Arc<ActionDispatcher>,
    tenants: Arc<dyn TenantResolver>,
    negotiator: Arc<ProtocolNegotiator>,
}

/// A Call waiting for the connection's worker
struct InboundCall {
    unique_id: String,
    action: String,
    payload: Value,
}

/// OCPP WebSocket Server
pub struct OcppServer {
    ctx: ServerContext,
    shutdown_signal: Option<ShutdownSignal>,
}

impl OcppServer {
    pub fn new(
        config: Config,
        registry: SharedConnectionRegistry,
        dispatcher: Arc<ActionDispatcher>,
        tenants: Arc<dyn TenantResolver>,
    ) -> Self {
        Self {
            ctx: ServerContext {
                config: Arc::new(config),
                registry,
                dispatcher,
                tenants,
                negotiator: Arc::new(ProtocolNegotiator::default()),
            },
            shutdown_signal: None,
        }
    }

    /// Restrict the accepted protocol versions
    pub fn with_negotiator(mut self, negotiator: ProtocolNegotiator) -> Self {
        self.ctx.negotiator = Arc::new(negotiator);
        self
    }

    /// Set the shutdown signal for graceful shutdown
    pub fn with_shutdown(mut self, signal: ShutdownSignal) -> Self {
        self.shutdown_signal = Some(signal);
        self
    }

    pub fn registry(&self) -> &SharedConnectionRegistry {
        &self.ctx.registry
    }

    /// Bind the configured address and serve until shutdown.
    pub async fn run(&self) -> std::io::Result<()> {
        let addr = self.ctx.config.address();
        let listener = TcpListener::bind(&addr).await?;
        self.serve(listener).await
    }

    /// Serve connections from an already bound listener.
    pub async fn serve(&self, listener: TcpListener) -> std::io::Result<()> {
        let local = listener.local_addr()?;
        info!("🔌 OCPP Central System started on ws://{}", local);
        info!(
            "   Charge points should connect to: ws://{}/OCPP16/{{tenant}}/{{charge_box_id}}",
            local
        );

        let shutdown = self.shutdown_signal.clone().unwrap_or_default();
        loop {
            tokio::select! {
                result = listener.accept() => {
                    match result {
                        Ok((stream, addr)) => self.spawn_connection(stream, addr, shutdown.clone()),
                        Err(e) => error!(error = %e, "Failed to accept connection"),
                    }
                }
                _ = shutdown.wait() => {
                    info!("🛑 WebSocket server received shutdown signal");
                    let closed = self.ctx.registry.close_all(CloseReason::Shutdown);
                    info!(closed, "✅ WebSocket server stopped accepting connections");
                    return Ok(());
                }
            }
        }
    }

    fn spawn_connection(&self, stream: TcpStream, addr: SocketAddr, shutdown: ShutdownSignal) {
        let ctx = self.ctx.clone();
        tokio::spawn(async move {
            let established = tokio::select! {
                established = establish(&ctx, stream, addr) => established,
                _ = shutdown.wait() => None,
            };
            let Some((mut ws, identity, version)) = established else {
                return;
            };
            if shutdown.is_triggered() {
                let _ = ws
                    .close(Some(CloseFrame {
                        code: CloseCode::Away,
                        reason: CloseReason::Shutdown.as_str().into(),
                    }))
                    .await;
                return;
            }
            run_session(ctx, ws, identity, version, addr).await;
        });
    }
}

/// Upgrade the socket and resolve the tenant. `None` if the station was refused.
async fn establish(
    ctx: &ServerContext,
    stream: TcpStream,
    addr: SocketAddr,
) -> Option<(WebSocketStream<TcpStream>, ChargeBoxIdentity, OcppVersion)> {
    debug!(%addr, "New TCP connection");

    let mut accepted: Option<ConnectionPath> = None;
    let mut rejected: Option<HandshakeError> = None;

    let upgrade = tokio_tungstenite::accept_hdr_async(
        stream,
        |req: &Request, response: Response| -> Result<Response, ErrorResponse> {
            match ctx.negotiator.accept(req, response) {
                Ok((path, response)) => {
                    accepted = Some(path);
                    Ok(response)
                }
                Err(e) => {
                    let response = e.to_response();
                    rejected = Some(e);
                    Err(response)
                }
            }
        },
    )
    .await;

    let mut ws = match upgrade {
        Ok(ws) => ws,
        Err(e) => {
            match rejected {
                Some(reason) => warn!(%addr, error = %reason, "Rejected WebSocket handshake"),
                None => warn!(%addr, error = %e, "WebSocket handshake failed"),
            }
            return None;
        }
    };
    let path = accepted?;

    // Unknown tenants are refused after the upgrade with close code 1008.
    match resolve_tenant(ctx, &path).await {
        Ok(tenant_id) => Some((
            ws,
            ChargeBoxIdentity::new(tenant_id, path.charge_box_id),
            path.version,
        )),
        Err((code, reason)) => {
            warn!(
                %addr,
                charge_point_id = path.charge_box_id.as_str(),
                tenant = ?path.tenant,
                reason,
                "Refusing connection"
            );
            let _ = ws
                .close(Some(CloseFrame {
                    code,
                    reason: reason.into(),
                }))
                .await;
            None
        }
    }
}

/// Map the URL's tenant segment to a tenant id.
async fn resolve_tenant(
    ctx: &ServerContext,
    path: &ConnectionPath,
) -> Result<String, (CloseCode, &'static str)> {
    let Some(subdomain) = path.tenant.as_deref() else {
        return Ok(ctx.config.default_tenant.clone());
    };
    match ctx.tenants.resolve(subdomain).await {
        Ok(Some(tenant_id)) => Ok(tenant_id),
        Ok(None) => Err((CloseCode::Policy, "Unknown tenant")),
        Err(e) => {
            error!(tenant = subdomain, error = %e, "Tenant lookup failed");
            Err((CloseCode::Error, "Tenant lookup failed"))
        }
    }
}

async fn run_session(
    ctx: ServerContext,
    ws: WebSocketStream<TcpStream>,
    identity: ChargeBoxIdentity,
    version: OcppVersion,
    addr: SocketAddr,
) {
    let (outbox, mut outbound) = mpsc::unbounded_channel::<Outbound>();
    let handle = ctx.registry.register(identity, version, Some(addr), outbox);
    let charge_point_id = handle.identity().charge_box_id.clone();
    let tenant_id = handle.identity().tenant_id.clone();

    info!(
        tenant_id = tenant_id.as_str(),
        charge_point_id = charge_point_id.as_str(),
        %addr,
        %version,
        "🔗 Charge point connected"
    );

    let (mut sink, mut stream) = ws.split();

    // Outgoing frames
    let writer_cp = charge_point_id.clone();
    let writer = tokio::spawn(async move {
        while let Some(out) = outbound.recv().await {
            match out {
                Outbound::Frame(text) => {
                    debug!(charge_point_id = writer_cp.as_str(), "-> {}", text);
                    if let Err(e) = sink.send(Message::Text(text)).await {
                        warn!(charge_point_id = writer_cp.as_str(), error = %e, "Send error");
                        break;
                    }
                }
                Outbound::Close(reason) => {
                    let frame = CloseFrame {
                        code: close_code(reason),
                        reason: reason.as_str().into(),
                    };
                    let _ = sink.send(Message::Close(Some(frame))).await;
                    break;
                }
            }
        }
        let _ = sink.close().await;
    });

    // Inbound Calls, handled one at a time in arrival order
    let (calls, mut queued) = mpsc::unbounded_channel::<InboundCall>();
    let worker = {
        let dispatcher = ctx.dispatcher.clone();
        let handle = handle.clone();
        tokio::spawn(async move {
            while let Some(call) = queued.recv().await {
                dispatcher
                    .dispatch_and_reply(&handle, call.unique_id, &call.action, call.payload)
                    .await;
            }
        })
    };

    loop {
        let msg = tokio::select! {
            msg = stream.next() => msg,
            _ = handle.closed() => break,
        };
        match msg {
            Some(Ok(Message::Text(text))) => {
                ctx.registry.touch(&handle);
                debug!(charge_point_id = charge_point_id.as_str(), "<- {}", text);
                if !route_frame(&ctx, &handle, &calls, &text) {
                    break;
                }
            }
            Some(Ok(Message::Ping(_))) | Some(Ok(Message::Pong(_))) => {
                ctx.registry.touch(&handle);
            }
            Some(Ok(Message::Binary(data))) => {
                metrics::counter!("ocpp_frames_rejected_total").increment(1);
                warn!(
                    charge_point_id = charge_point_id.as_str(),
                    bytes = data.len(),
                    "Binary message received, ignoring"
                );
            }
            Some(Ok(Message::Close(frame))) => {
                debug!(charge_point_id = charge_point_id.as_str(), ?frame, "Close frame received");
                break;
            }
            Some(Ok(Message::Frame(_))) => {}
            Some(Err(e)) => {
                warn!(charge_point_id = charge_point_id.as_str(), error = %e, "WebSocket error");
                break;
            }
            None => break,
        }
    }

    // No-op for the close reason if the engine already closed this connection.
    ctx.registry.unregister(&handle, CloseReason::TransportClosed);
    drop(calls);

    if let Err(e) = worker.await {
        error!(charge_point_id = charge_point_id.as_str(), error = %e, "Call worker panicked");
    }
    if tokio::time::timeout(WRITER_DRAIN_TIMEOUT, writer).await.is_err() {
        debug!(charge_point_id = charge_point_id.as_str(), "Writer did not finish in time");
    }

    info!(
        tenant_id = tenant_id.as_str(),
        charge_point_id = charge_point_id.as_str(),
        "Charge point disconnected"
    );
}

/// Decode one text frame and route it. Returns `false` once the connection
/// can no longer take Calls.
fn route_frame(
    ctx: &ServerContext,
    handle: &ConnectionHandle,
    calls: &mpsc::UnboundedSender<InboundCall>,
    text: &str,
) -> bool {
    match OcppFrame::decode(text) {
        Ok(OcppFrame::Call {
            unique_id,
            action,
            payload,
        }) => calls
            .send(InboundCall {
                unique_id,
                action,
                payload,
            })
            .is_ok(),
        Ok(frame) => {
            ctx.registry.correlator().resolve(handle, frame);
            true
        }
        Err(e) => {
            metrics::counter!("ocpp_frames_rejected_total").increment(1);
            warn!(
                tenant_id = handle.identity().tenant_id.as_str(),
                charge_point_id = handle.identity().charge_box_id.as_str(),
                error = %e,
                "Dropping malformed frame"
            );
            true
        }
    }
}

fn close_code(reason: CloseReason) -> CloseCode {
    match reason {
        CloseReason::TransportClosed | CloseReason::Superseded => CloseCode::Normal,
        CloseReason::Stale | CloseReason::Shutdown => CloseCode::Away,
    }
}
