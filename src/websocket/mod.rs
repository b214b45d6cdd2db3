//! WebSocket Push Channel
//!
//! Keeps every open client in sync with the shared list.
//!
//! ## Architecture
//!
//! - **Hub**: single worker owning the live connection set; fans each
//!   mutation out to every connection but its originator
//! - **Connection**: bounded mailbox plus inbound and outbound pumps
//! - **Handler**: WebSocket upgrade at `GET /ws?client_id=...`
//! - **Messages**: the envelope and its newline framing
//!
//! ## Example
//!
//! ```javascript
//! // Browser
//! const ws = new WebSocket(`ws://${location.host}/ws?client_id=${clientID}`);
//!
//! ws.onmessage = (event) => {
//!   for (const line of event.data.split("\n")) {
//!     const msg = JSON.parse(line);
//!     console.log(msg.type, msg.data);
//!   }
//! };
//! ```

mod connection;
mod handler;
mod hub;
mod messages;

pub use connection::{serve_connection, CloseReason, Connection, ConnectionSettings, ConnectionState};
pub use handler::{websocket_handler, WsParams};
pub use hub::{Command, ConnectionHandle, ConnectionId, Hub, HubHandle, HubStats};
pub use messages::{
    join_frames, normalize_inbound, split_frames, Envelope, EnvelopeError, EventKind, Frame,
    FRAME_SEPARATOR,
};
