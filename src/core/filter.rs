//! Connection filter criteria used by connection listings.
//!
//! A [`FilterDescriptor`] is a conjunction of independent predicates. Every
//! criterion is optional: an unset criterion never excludes a connection.
//! The global visibility mask and the interface table are not owned by the
//! filter; they are passed in through a [`FilterContext`] so that matching
//! stays a pure function of its inputs.

use std::num::NonZeroU64;

use serde::{Deserialize, Serialize};

use crate::core::connection::{
    ConnStatus, ConnectionRecord, DecryptionStatus, FilteringStatus, InterfaceResolver,
};
use crate::core::mask::VisibilityMask;

/// External state consulted while matching.
#[derive(Clone, Copy)]
pub struct FilterContext<'a> {
    pub mask: &'a dyn VisibilityMask,
    pub interfaces: &'a dyn InterfaceResolver,
}

impl<'a> FilterContext<'a> {
    pub fn new(mask: &'a dyn VisibilityMask, interfaces: &'a dyn InterfaceResolver) -> Self {
        Self { mask, interfaces }
    }
}

/// Filter criteria edited by a connection list view.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterDescriptor {
    pub status: Option<ConnStatus>,
    pub decryption_status: Option<DecryptionStatus>,
    pub filtering_status: Option<FilteringStatus>,
    pub show_masked: bool,
    pub only_blacklisted: bool,
    pub only_cleartext: bool,
    pub iface: Option<String>,
    /// Survives [`FilterDescriptor::clear`]; set by per-application views.
    pub uid: Option<i32>,
    /// Minimum `sent + rcvd` byte count.
    pub min_size: Option<NonZeroU64>,
}

impl Default for FilterDescriptor {
    fn default() -> Self {
        Self {
            status: None,
            decryption_status: None,
            filtering_status: None,
            show_masked: true,
            only_blacklisted: false,
            only_cleartext: false,
            iface: None,
            uid: None,
            min_size: None,
        }
    }
}

/// One active criterion of a filter, for "filters active" affordances.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum ActiveFilter {
    NotHidden,
    Blacklisted,
    Cleartext,
    Status(ConnStatus),
    Decryption(DecryptionStatus),
    Firewall(FilteringStatus),
    Interface(String),
    App(i32),
    MinSize(NonZeroU64),
}

impl ActiveFilter {
    pub fn label(&self) -> String {
        match self {
            ActiveFilter::NotHidden => "not hidden".to_string(),
            ActiveFilter::Blacklisted => "malicious".to_string(),
            ActiveFilter::Cleartext => "cleartext".to_string(),
            ActiveFilter::Status(s) => format!("status: {}", s.label()),
            ActiveFilter::Decryption(d) => format!("decryption: {}", d.label()),
            ActiveFilter::Firewall(f) => format!("firewall: {}", f.label()),
            ActiveFilter::Interface(name) => format!("interface: {name}"),
            ActiveFilter::App(uid) => format!("app: {uid}"),
            ActiveFilter::MinSize(n) => format!("size >= {n} B"),
        }
    }
}

impl FilterDescriptor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Filter restricted to a single application.
    pub fn for_app(uid: i32) -> Self {
        Self {
            uid: Some(uid),
            ..Self::default()
        }
    }

    /// Set the minimum size; zero removes the constraint.
    pub fn set_min_size(&mut self, bytes: u64) {
        self.min_size = NonZeroU64::new(bytes);
    }

    /// Whether any criterion would hide a connection.
    pub fn is_set(&self, mask: &dyn VisibilityMask) -> bool {
        self.status.is_some()
            || self.decryption_status.is_some()
            || self.filtering_status.is_some()
            || self.iface.is_some()
            || self.only_blacklisted
            || self.only_cleartext
            || self.uid.is_some()
            || self.min_size.is_some()
            || (!self.show_masked && !mask.is_empty())
    }

    pub fn matches(&self, conn: &ConnectionRecord, ctx: &FilterContext<'_>) -> bool {
        (self.show_masked || !ctx.mask.matches(conn))
            && (!self.only_blacklisted || conn.is_blacklisted())
            && (!self.only_cleartext || conn.is_cleartext())
            && self.status.map_or(true, |s| conn.status == s)
            && self
                .decryption_status
                .map_or(true, |d| conn.decryption_status == d)
            && self
                .filtering_status
                .map_or(true, |f| (f == FilteringStatus::Blocked) == conn.is_blocked)
            && self.iface.as_deref().map_or(true, |iface| {
                ctx.interfaces.interface_name(conn.ifidx) == Some(iface)
            })
            && self.uid.map_or(true, |uid| uid == conn.uid)
            && self
                .min_size
                .map_or(true, |min| conn.total_bytes() >= min.get())
    }

    /// Active criteria in display order. Empty iff `!self.is_set(mask)`.
    pub fn active_filters(&self, mask: &dyn VisibilityMask) -> Vec<ActiveFilter> {
        let mut active = Vec::new();

        if !self.show_masked && !mask.is_empty() {
            active.push(ActiveFilter::NotHidden);
        }
        if self.only_blacklisted {
            active.push(ActiveFilter::Blacklisted);
        }
        if self.only_cleartext {
            active.push(ActiveFilter::Cleartext);
        }
        if let Some(s) = self.status {
            active.push(ActiveFilter::Status(s));
        }
        if let Some(d) = self.decryption_status {
            active.push(ActiveFilter::Decryption(d));
        }
        if let Some(f) = self.filtering_status {
            active.push(ActiveFilter::Firewall(f));
        }
        if let Some(iface) = &self.iface {
            active.push(ActiveFilter::Interface(iface.clone()));
        }
        if let Some(uid) = self.uid {
            active.push(ActiveFilter::App(uid));
        }
        if let Some(min) = self.min_size {
            active.push(ActiveFilter::MinSize(min));
        }
        active
    }

    /// Reset the single criterion represented by `filter`.
    pub fn clear_filter(&mut self, filter: &ActiveFilter) {
        match filter {
            ActiveFilter::NotHidden => self.show_masked = true,
            ActiveFilter::Blacklisted => self.only_blacklisted = false,
            ActiveFilter::Cleartext => self.only_cleartext = false,
            ActiveFilter::Status(_) => self.status = None,
            ActiveFilter::Decryption(_) => self.decryption_status = None,
            ActiveFilter::Firewall(_) => self.filtering_status = None,
            ActiveFilter::Interface(_) => self.iface = None,
            ActiveFilter::App(_) => self.uid = None,
            ActiveFilter::MinSize(_) => self.min_size = None,
        }
    }

    /// Reset all criteria except `uid`.
    pub fn clear(&mut self) {
        *self = Self {
            uid: self.uid,
            ..Self::default()
        };
    }
}
