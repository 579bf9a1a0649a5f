/// WebSocket transport for QuickShare sessions.
///
/// - `ws`: `Channel` adapters over axum (inbound) and tokio-tungstenite (outbound) sockets
/// - `peer_id`: the short `XXXX-XXXX` identifier a listener is reachable under
/// - `routes`: the listener router that hands each upgraded socket to the supervisor

pub mod error;
pub mod peer_id;
pub mod routes;
pub mod ws;

pub use error::GatewayError;
pub use peer_id::PeerId;
pub use routes::{ListenerState, router};
pub use ws::{AxumChannel, TungsteniteChannel};
