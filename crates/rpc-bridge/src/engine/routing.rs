//! Inbound frame routing.

use crate::domain::envelope::{Inbound, RpcRequest};
use crate::domain::ids::ConnectionId;
use crate::domain::pending::PeerReply;
use crate::engine::RpcEngine;
use tracing::{debug, info};

/// What happened to an inbound frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteOutcome {
    /// Reply delivered to a waiting call
    Delivered,
    /// Reply matched nothing pending; discarded
    Unmatched,
    /// Peer-initiated request handed to the configured handler
    PeerRequest,
    /// Undecodable, unrecognized, or unhandled frame; discarded
    Discarded,
}

/// Receives calls a peer initiates toward the bridge.
pub trait PeerRequestHandler: Send + Sync {
    fn handle(&self, from: &ConnectionId, request: RpcRequest);
}

/// Logs peer-initiated requests and otherwise ignores them
#[derive(Debug, Default)]
pub struct LoggingRequestHandler;

impl PeerRequestHandler for LoggingRequestHandler {
    fn handle(&self, from: &ConnectionId, request: RpcRequest) {
        info!(
            connection_id = %from,
            request_id = %request.id,
            action = request.action,
            params = request.params.len(),
            "Peer-initiated request"
        );
    }
}

impl RpcEngine {
    /// Route one inbound text frame from connection `from`.
    ///
    /// Never fails: anything that is not a matching reply is discarded.
    pub fn route_inbound(&self, from: &ConnectionId, frame: &str) -> RouteOutcome {
        let inbound = match self.codec.decode(frame) {
            Ok(inbound) => inbound,
            Err(e) => {
                debug!(
                    connection_id = %from,
                    len = frame.len(),
                    error = %e,
                    "Discarding non-RPC frame"
                );
                return RouteOutcome::Discarded;
            }
        };

        match inbound {
            Inbound::Reply(reply) => {
                let delivered = self.table.resolve(
                    &reply.callback_id,
                    PeerReply {
                        status: reply.status,
                        result: reply.result,
                    },
                );
                if delivered {
                    RouteOutcome::Delivered
                } else {
                    RouteOutcome::Unmatched
                }
            }
            Inbound::Request(request) => match &self.request_handler {
                Some(handler) => {
                    handler.handle(from, request);
                    RouteOutcome::PeerRequest
                }
                None => {
                    debug!(
                        connection_id = %from,
                        action = request.action,
                        "No handler for peer request, discarding"
                    );
                    RouteOutcome::Discarded
                }
            },
            Inbound::Unrecognized => {
                debug!(connection_id = %from, len = frame.len(), "Discarding unrecognized frame");
                RouteOutcome::Discarded
            }
        }
    }
}
