//! Centralized runtime constants for the monitoring core.
//!
//! Tunable limits, channel sizes and well-known identifiers are collected here
//! so they can be found and adjusted in a single place.

/// Notification id of the "application blocked" notification posted by the
/// capture service. Cancelled when an application gets unblocked.
pub const NOTIFY_ID_APP_BLOCKED: i32 = 3;

/// Name of the field carrying the application to unblock in an action request.
pub const EXTRA_UNBLOCK_APP: &str = "unblock_app";

/// Largest HTTP header block accepted before a stream degrades to RAW chunks (bytes).
pub const MAX_HTTP_HEADER_SIZE: usize = 64 * 1024;

/// Maximum number of HTTP headers parsed per message.
pub const MAX_HTTP_HEADERS: usize = 64;

/// Bytes held back for one incomplete HTTP message or WebSocket frame. Past
/// this the headers are emitted on their own and the body is streamed.
pub const MAX_BUFFERED_UNIT_BYTES: usize = 256 * 1024;

/// Payload bytes retained per connection before its history is truncated.
pub const MAX_PAYLOAD_BYTES: usize = 512 * 1024;

/// Capacity of the capture event and unblock request channels.
pub const EVENT_CHANNEL_CAPACITY: usize = 1024;

/// File name of the blocklist database inside the service data directory.
pub const BLOCKLIST_DB_FILE: &str = "blocklist.db";

/// Default tracing filter when `RUST_LOG` is unset.
pub const DEFAULT_LOG_FILTER: &str = "netguard_core=info";
