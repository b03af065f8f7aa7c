//! Shared protocol for the unityctl bridge: wire frames for the editor
//! peer, the unified log entry types, project identity derivation, and the
//! on-disk discovery descriptor. The CLI driver and the editor plugin both
//! build against this crate, so everything here is wire-stable.

pub mod descriptor;
pub mod messages;
pub mod project;
pub mod types;

pub use descriptor::{
    descriptor_path, editor_log_path, read_descriptor, unityctl_dir, write_descriptor,
};
pub use messages::{
    ErrorInfo, EventMessage, HelloMessage, RequestMessage, ResponseMessage, ResponseStatus,
    WireMessage,
};
pub use project::{canonical_project_path, compute_project_id};
pub use types::{LogEntry, LogLevel, LogSource, ProjectDescriptor};

/// Version of the peer wire protocol, echoed in the hello handshake.
pub const PROTOCOL_VERSION: &str = "1.0.0";

/// Stable error codes surfaced to callers. The peer may report its own
/// codes; these are the ones the bridge itself originates.
pub mod codes {
    /// No peer connected and no domain reload in progress.
    pub const PEER_UNAVAILABLE: &str = "PEER_UNAVAILABLE";
    /// Logical deadline exceeded.
    pub const TIMEOUT: &str = "TIMEOUT";
    /// Peer went away mid-request with no reload grace.
    pub const PEER_DISCONNECTED: &str = "PEER_DISCONNECTED";
    /// A compound flow observed compilation errors.
    pub const COMPILATION_ERROR: &str = "COMPILATION_ERROR";
    /// A play-mode transition bounced back or ended unexpectedly.
    pub const PLAY_MODE_FAILED: &str = "PLAY_MODE_FAILED";
    /// Malformed frame, missing/bad hello, or projectId mismatch.
    pub const PROTOCOL_ERROR: &str = "PROTOCOL_ERROR";
    /// A peer-reported command failure, passed through verbatim.
    pub const COMMAND_FAILED: &str = "COMMAND_FAILED";
}
