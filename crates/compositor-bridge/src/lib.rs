// compositor-bridge
//
// One-way command channel into the external compositor plus the normalizer for
// the loosely-typed events it posts back. There is no request/response pairing:
// every command is idempotent and local state is reconciled from events.

mod actor;
mod bridge;
mod command;
mod error;
mod event;
mod origin;
mod relay;
mod sources;
mod trace;

pub use actor::{BridgeActor, BridgeHandle, BridgeStatus};
pub use bridge::{CompositorBridge, CompositorTarget, Delivery};
pub use command::{CommandEnvelope, CompositorCommand, LayoutSlot, LayoutSpec};
pub use error::{BridgeError, Result};
pub use event::{decode_inbound, BridgeEvent};
pub use origin::OriginPolicy;
pub use relay::{run_relay, RelayFrame, RelayTarget};
pub use sources::{DiscoveredSource, IdentityMap, SourceDirectory};
pub use trace::{Direction, EventStats, TraceBuffer, TraceEntry};

/// Outbound seam used by the mixer. Implementations must not block.
pub trait CommandSink: Send {
	fn dispatch(&self, command: CompositorCommand) -> Result<()>;
}

impl CommandSink for BridgeHandle {
	fn dispatch(&self, command: CompositorCommand) -> Result<()> {
		self.send_command(command)
	}
}
