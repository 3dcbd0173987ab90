#![forbid(unsafe_code)]

//! Wire-level types for the Business Central Web Client WebSocket protocol:
//! the JSON-RPC envelope, the decompression codec, the handler/discriminator
//! taxonomy, and interaction builders. No networking or session state lives
//! here — see `bc-client-core` for that.

pub mod codec;
pub mod discriminator;
pub mod error;
pub mod events;
#[cfg(any(test, feature = "test-helpers"))]
pub mod fixtures;
pub mod handler;
pub mod interaction;
pub mod rpc;

pub use discriminator::CanonicalChange;
pub use error::ProtocolError;
pub use events::{parse_handlers, DialogKind, ErrorKind, HandlerEvent};
pub use handler::Handler;
pub use interaction::{Interaction, InteractionEntry, InvokeRequest, OpenSessionRequest};
pub use rpc::{CompressedPayload, InboundFrame, RequestId, RpcRequest};
