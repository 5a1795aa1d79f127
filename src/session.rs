//! Consumer side of the capture pipeline.
//!
//! The capture thread produces [`CaptureEvent`]s; a [`CaptureSession`] folds
//! them into per-app stats, per-connection payload history and the
//! connection table queried by the UI.

use std::sync::Arc;

use bytes::Bytes;
use dashmap::DashMap;
use tokio::sync::mpsc;

use crate::config::MAX_PAYLOAD_BYTES;
use crate::core::app_stats::{AppStatsDelta, AppStatsTracker};
use crate::core::chunker::{ChunkerConfig, ConnectionPayload};
use crate::core::connection::{ConnStatus, ConnectionRecord, Uid};
use crate::core::filter::{FilterContext, FilterDescriptor};
use crate::core::payload::PayloadChunk;

#[derive(Debug, Clone)]
pub enum CaptureEvent {
    ConnectionOpened(ConnectionRecord),
    BytesObserved {
        conn_id: u64,
        uid: i32,
        is_sent: bool,
        timestamp: u64,
        data: Bytes,
    },
    ConnectionClosed {
        conn_id: u64,
    },
    Reset,
}

struct TrackedConnection {
    record: ConnectionRecord,
    payload: ConnectionPayload,
}

pub struct CaptureSession {
    stats: Arc<AppStatsTracker>,
    connections: DashMap<u64, TrackedConnection>,
    chunker_config: ChunkerConfig,
    max_payload_bytes: usize,
}

impl CaptureSession {
    pub fn new(stats: Arc<AppStatsTracker>) -> Self {
        Self::with_config(stats, ChunkerConfig::default(), MAX_PAYLOAD_BYTES)
    }

    pub fn with_config(
        stats: Arc<AppStatsTracker>,
        chunker_config: ChunkerConfig,
        max_payload_bytes: usize,
    ) -> Self {
        Self {
            stats,
            connections: DashMap::new(),
            chunker_config,
            max_payload_bytes,
        }
    }

    pub fn stats(&self) -> &Arc<AppStatsTracker> {
        &self.stats
    }

    pub fn apply(&self, event: CaptureEvent) {
        match event {
            CaptureEvent::ConnectionOpened(record) => self.open(record),
            CaptureEvent::BytesObserved {
                conn_id,
                uid,
                is_sent,
                timestamp,
                data,
            } => self.observe(conn_id, uid, is_sent, timestamp, &data),
            CaptureEvent::ConnectionClosed { conn_id } => self.close(conn_id),
            CaptureEvent::Reset => self.reset(),
        }
    }

    fn open(&self, record: ConnectionRecord) {
        if let Some(uid) = stats_uid(record.uid) {
            self.stats.record(
                uid,
                AppStatsDelta {
                    connections: 1,
                    blocked_connections: u32::from(record.is_blocked),
                    ..Default::default()
                },
            );
        }

        let payload = ConnectionPayload::new(self.chunker_config.clone(), self.max_payload_bytes);
        let conn_id = record.incr_id;
        if self
            .connections
            .insert(conn_id, TrackedConnection { record, payload })
            .is_some()
        {
            tracing::warn!(conn_id, "Connection reopened, previous state discarded");
        }
    }

    fn observe(&self, conn_id: u64, uid: i32, is_sent: bool, timestamp: u64, data: &[u8]) {
        let len = data.len() as u64;
        if let Some(uid) = stats_uid(uid) {
            if is_sent {
                self.stats.record_bytes(uid, len, 0);
            } else {
                self.stats.record_bytes(uid, 0, len);
            }
        }

        let Some(mut conn) = self.connections.get_mut(&conn_id) else {
            tracing::debug!(conn_id, "Bytes for unknown connection");
            return;
        };
        let record = &mut conn.record;
        if is_sent {
            record.sent_bytes = record.sent_bytes.saturating_add(len);
        } else {
            record.rcvd_bytes = record.rcvd_bytes.saturating_add(len);
        }
        if record.status == ConnStatus::New {
            record.status = ConnStatus::Active;
        }
        conn.payload.observe(is_sent, timestamp, data);
    }

    fn close(&self, conn_id: u64) {
        let Some(mut conn) = self.connections.get_mut(&conn_id) else {
            tracing::debug!(conn_id, "Close for unknown connection");
            return;
        };
        conn.record.status = ConnStatus::Closed;
        conn.payload.close();
    }

    pub fn connection(&self, conn_id: u64) -> Option<ConnectionRecord> {
        self.connections.get(&conn_id).map(|c| c.record.clone())
    }

    /// Connections accepted by `filter`, oldest first.
    pub fn matching_connections(
        &self,
        filter: &FilterDescriptor,
        ctx: &FilterContext<'_>,
    ) -> Vec<ConnectionRecord> {
        let mut matched: Vec<ConnectionRecord> = self
            .connections
            .iter()
            .filter(|c| filter.matches(&c.record, ctx))
            .map(|c| c.record.clone())
            .collect();
        matched.sort_by_key(|c| c.incr_id);
        matched
    }

    /// Completed chunks of a connection, `None` if the connection is unknown.
    pub fn payload_chunks(&self, conn_id: u64) -> Option<Vec<PayloadChunk>> {
        self.connections
            .get(&conn_id)
            .map(|c| c.payload.chunks().to_vec())
    }

    pub fn is_payload_truncated(&self, conn_id: u64) -> bool {
        self.connections
            .get(&conn_id)
            .is_some_and(|c| c.payload.is_truncated())
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    /// Discard all stats and connection state.
    pub fn reset(&self) {
        let dropped = self.connections.len();
        self.connections.clear();
        self.stats.reset();
        tracing::info!("Capture session reset ({dropped} connections)");
    }

    /// Apply events from `rx` until all producers are dropped.
    pub fn spawn(self: &Arc<Self>, mut rx: mpsc::Receiver<CaptureEvent>) -> tokio::task::JoinHandle<()> {
        let session = Arc::clone(self);
        tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                session.apply(event);
            }
            tracing::debug!("Capture event channel closed");
        })
    }
}

fn stats_uid(raw: i32) -> Option<Uid> {
    match Uid::new(raw) {
        Ok(uid) => Some(uid),
        Err(_) => {
            tracing::debug!(uid = raw, "Skipping stats for unknown uid");
            None
        }
    }
}
