use axum::{
    Router,
    extract::{Path, State, WebSocketUpgrade},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
};
use tracing::{info, warn};

use quickshare_transfer::{Role, SessionSupervisor};

use crate::peer_id::PeerId;
use crate::ws::AxumChannel;

#[derive(Clone)]
pub struct ListenerState {
    peer_id: PeerId,
    supervisor: SessionSupervisor,
}

impl ListenerState {
    pub fn new(peer_id: PeerId, supervisor: SessionSupervisor) -> Self {
        Self {
            peer_id,
            supervisor,
        }
    }
}

/// Serves the data channel at `/{peer_id}`. Any other id is a 404.
pub fn router(state: ListenerState) -> Router {
    Router::new()
        .route("/{peer_id}", get(ws_upgrade))
        .with_state(state)
}

async fn ws_upgrade(
    State(state): State<ListenerState>,
    Path(peer_id): Path<String>,
    ws: WebSocketUpgrade,
) -> Response {
    if peer_id != state.peer_id.as_str() {
        warn!("refusing channel for unknown peer id {}", peer_id);
        return StatusCode::NOT_FOUND.into_response();
    }
    ws.on_upgrade(move |socket| async move {
        info!("peer connected to {}", state.peer_id);
        state
            .supervisor
            .attach(AxumChannel::new(socket), Role::Responder)
            .await;
    })
}
