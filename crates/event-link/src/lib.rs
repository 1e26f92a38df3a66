// event-link
//
// Sequenced connection to the device event stream. Tracks the highest sequence
// number seen, resumes with a sync request after every reconnect, and backs off
// exponentially while the device is unreachable.

mod error;
mod link;
mod protocol;
mod retry;
mod state;
pub mod transport;

pub use error::{LinkError, Result};
pub use link::{EventLink, EventLinkHandle};
pub use protocol::{DeviceEnvelope, DeviceEvent, OutboundMessage, SequencedEvent, SyncRequest};
pub use retry::{RetryConfig, RetryPolicy};
pub use state::{LinkSession, LinkState, SessionTracker};
pub use transport::{Connector, LinkChannel, WebSocketConnector};
