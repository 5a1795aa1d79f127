//! Core logic: connection filtering, per-app accounting, payload chunking.
//!
//! - [`FilterDescriptor`]: connection list filter evaluated against a
//!   [`VisibilityMask`] and an [`InterfaceResolver`]
//! - [`AppStatsTracker`]: per-application traffic counters
//! - [`PayloadChunker`]: HTTP/WebSocket aware stream chunking
//! - [`PayloadChunk`]: immutable unit of captured payload

pub mod app_stats;
pub mod chunker;
pub mod connection;
pub mod filter;
pub mod mask;
pub mod payload;

pub use app_stats::{AppStats, AppStatsDelta, AppStatsTracker};
pub use chunker::{strip_chunked_encoding, ChunkerConfig, ConnectionPayload, PayloadChunker};
pub use connection::{
    ConnStatus, ConnectionRecord, DecryptionStatus, FilteringStatus, InterfaceResolver,
    InterfaceTable, Uid,
};
pub use filter::{ActiveFilter, FilterContext, FilterDescriptor};
pub use mask::{MaskRule, MatchList, VisibilityMask};
pub use payload::{ChunkType, PayloadChunk};
