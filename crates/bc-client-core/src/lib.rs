#![forbid(unsafe_code)]

//! Session-level client for the Business Central Web Client WebSocket
//! protocol: authentication, transport, protocol adapter, event bus,
//! session manager, form-state index, filter metadata cache, Tell-Me and
//! page-metadata parsers, and a bounded session pool.
//!
//! `bc-protocol` owns the wire types; this crate owns everything that talks
//! to a real server and everything stateful built on top of it.

pub mod adapter;
pub mod auth;
pub mod config;
pub mod error;
pub mod event_bus;
pub mod filter;
pub mod form_state;
pub mod page_metadata;
pub mod pool;
pub mod session;
pub mod tellme;
pub mod timezone;
pub mod transport;

pub use adapter::ProtocolAdapter;
pub use auth::{authenticate, AuthenticatedSession};
pub use config::ClientConfig;
pub use error::{AuthError, BcClientError, ConnectionError};
pub use event_bus::EventBus;
pub use filter::FilterMetadataCache;
pub use form_state::{FormStateIndex, ResolveOptions, ResolveOutcome};
pub use page_metadata::{parse_page_metadata, PageMetadata};
pub use pool::{ConnectionPoolStats, PoolGuard, SessionPool};
pub use session::{SessionManager, SessionSnapshot};
pub use tellme::{parse_tell_me_results, PageType, TellMeMatch};
pub use transport::Transport;

/// Names of the MCP tools a dispatcher built on this crate would expose.
/// Tool schemas and dispatch are explicitly out of scope here (spec.md §6);
/// this list exists only so an external dispatcher has one source of truth
/// for naming rather than re-deriving it from the operations below.
pub const MCP_TOOL_NAMES: &[&str] = &[
    "search_pages",
    "get_page_metadata",
    "read_page_data",
    "write_page_data",
    "execute_action",
    "filter_list",
    "handle_dialog",
    "update_record",
    "create_record",
    "find_record",
];
