//! Connection records as produced by the capture pipeline.
//!
//! The core only reads these; the pipeline owns their lifecycle.

use std::collections::HashMap;
use std::net::IpAddr;

use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// Lifecycle status of a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnStatus {
    New,
    Active,
    Closed,
    Unreachable,
    Error,
}

impl ConnStatus {
    pub fn label(&self) -> &'static str {
        match self {
            ConnStatus::New => "new",
            ConnStatus::Active => "active",
            ConnStatus::Closed => "closed",
            ConnStatus::Unreachable => "unreachable",
            ConnStatus::Error => "error",
        }
    }
}

/// TLS decryption state of a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecryptionStatus {
    NotDecryptable,
    WaitingData,
    Decrypted,
    Cleartext,
    Error,
}

impl DecryptionStatus {
    pub fn label(&self) -> &'static str {
        match self {
            DecryptionStatus::NotDecryptable => "not decryptable",
            DecryptionStatus::WaitingData => "waiting data",
            DecryptionStatus::Decrypted => "decrypted",
            DecryptionStatus::Cleartext => "cleartext",
            DecryptionStatus::Error => "error",
        }
    }
}

/// Firewall verdict applied to a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilteringStatus {
    Allowed,
    Blocked,
}

impl FilteringStatus {
    pub fn label(&self) -> &'static str {
        match self {
            FilteringStatus::Allowed => "allowed",
            FilteringStatus::Blocked => "blocked",
        }
    }
}

/// Validated application identity.
///
/// Raw uids coming from the pipeline may be negative when the owner is
/// unknown; those cannot be used as a stats key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct Uid(i32);

impl Uid {
    pub fn new(raw: i32) -> Result<Self, AppError> {
        if raw < 0 {
            return Err(AppError::InvalidInput(format!("invalid uid {raw}")));
        }
        Ok(Self(raw))
    }

    pub fn get(&self) -> i32 {
        self.0
    }
}

impl TryFrom<i32> for Uid {
    type Error = AppError;

    fn try_from(raw: i32) -> Result<Self, Self::Error> {
        Uid::new(raw)
    }
}

/// A single observed flow.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionRecord {
    pub incr_id: u64,
    pub proto: String,
    pub src_ip: IpAddr,
    pub src_port: u16,
    pub dst_ip: IpAddr,
    pub dst_port: u16,
    /// Host name or SNI, when known.
    pub info: Option<String>,
    /// Owning application, -1 when unknown.
    pub uid: i32,
    pub ifidx: i32,
    pub status: ConnStatus,
    pub decryption_status: DecryptionStatus,
    pub is_blocked: bool,
    pub sent_bytes: u64,
    pub rcvd_bytes: u64,
    pub blacklisted_ip: bool,
    pub blacklisted_host: bool,
    pub encrypted_l7: bool,
    pub encrypted_payload: bool,
}

impl ConnectionRecord {
    pub fn is_blacklisted(&self) -> bool {
        self.blacklisted_ip || self.blacklisted_host
    }

    pub fn is_cleartext(&self) -> bool {
        !self.encrypted_l7 && !self.encrypted_payload
    }

    pub fn total_bytes(&self) -> u64 {
        self.sent_bytes.saturating_add(self.rcvd_bytes)
    }
}

/// Maps capture interface indexes to interface names.
pub trait InterfaceResolver: Send + Sync {
    fn interface_name(&self, ifidx: i32) -> Option<&str>;
}

/// Interface names known to the current capture session.
#[derive(Debug, Clone, Default)]
pub struct InterfaceTable {
    names: HashMap<i32, String>,
}

impl InterfaceTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, ifidx: i32, name: impl Into<String>) {
        self.names.insert(ifidx, name.into());
    }
}

impl<S: Into<String>> FromIterator<(i32, S)> for InterfaceTable {
    fn from_iter<T: IntoIterator<Item = (i32, S)>>(iter: T) -> Self {
        Self {
            names: iter.into_iter().map(|(idx, name)| (idx, name.into())).collect(),
        }
    }
}

impl InterfaceResolver for InterfaceTable {
    fn interface_name(&self, ifidx: i32) -> Option<&str> {
        self.names.get(&ifidx).map(String::as_str)
    }
}
