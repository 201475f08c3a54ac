use serde_json::Value;

use crate::types::DiscoverEvent;

/// Intent produced by the pure logic in `DiscoverState`.
///
/// Every `handle_*` / `tick_*` method returns `Vec<Effect>`; the event loop
/// then executes them against the transport and the event stream, in order.
#[derive(Debug)]
pub(crate) enum Effect {
    /// Announce the given hello payload now.
    SendHello(Value),

    /// Drop the transport's cached hello frame.
    InvalidateHelloCache,

    /// Publish a lifecycle event.
    Emit(DiscoverEvent),
}
