//! WebSocket Topic Broadcasting
//!
//! Streams order book updates to subscribed clients via WebSocket.
//!
//! ## Architecture
//!
//! - **ConnectionHub**: Owns live connections and fans out published payloads
//! - **SubscriptionRegistry**: Topic → subscriber index
//! - **Handler**: Handles WebSocket upgrade and the per-connection read loop
//! - **Messages**: Defines the plain-text frame protocol
//!
//! ## Protocol
//!
//! Clients connect to `/` or `/ws` and send text frames:
//! - `subscribe:<topic>` - receive every payload published to `<topic>`
//! - anything else - echoed back, no side effect
//!
//! Every inbound frame is answered with `Acknowledged: <frame>`. Published
//! payloads arrive as bare text frames.
//!
//! ## Example
//!
//! ```javascript
//! // Browser
//! const ws = new WebSocket('ws://localhost:8080/ws');
//!
//! ws.onopen = () => ws.send('subscribe:BTC-PERPETUAL');
//! ws.onmessage = (event) => console.log('Received:', event.data);
//! ```

mod handler;
mod hub;
mod messages;
mod registry;

pub use handler::websocket_handler;
pub use hub::{ConnectionHandle, ConnectionHub, ConnectionId, HubError, PublishReport};
pub use messages::{ClientCommand, ServerFrame, ACK_PREFIX, SUBSCRIBE_PREFIX};
pub use registry::SubscriptionRegistry;
