//! The tracking rule and its store.
//!
//! Submissions are matched against a single active [`FilterRule`]. The rule
//! is read on every I/O submission but replaced only by rare administrative
//! action, so the store is copy-on-write: [`RuleStore::install`] builds the
//! new rule completely and publishes it with one atomic pointer swap, while
//! [`RuleStore::current`] is wait-free and never observes a torn rule. A
//! superseded rule stays valid for readers that already hold it and is
//! released by its reference count once the last of them drops out.

use std::sync::Arc;

use arc_swap::{ArcSwapOption, Guard};

use crate::device::DeviceId;

/// The active tracking selection. Immutable once published; replaced as a
/// whole through [`RuleStore::install`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FilterRule {
    pub device: DeviceId,
    pub track_read: bool,
    pub track_write: bool,
}

/// Holds the single active [`FilterRule`].
#[derive(Default)]
pub struct RuleStore {
    active: ArcSwapOption<FilterRule>,
}

impl RuleStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publishes `rule`, retiring the previously active one. Visible to
    /// every read that starts after this returns; reads already in flight
    /// may still apply the retired rule.
    pub fn install(&self, rule: FilterRule) {
        self.active.store(Some(Arc::new(rule)));
    }

    /// The rule visible at this instant, if any. Wait-free; the guard keeps
    /// the rule alive even if an install retires it mid-read.
    pub fn current(&self) -> Guard<Option<Arc<FilterRule>>> {
        self.active.load()
    }

    /// Retires the active rule without publishing a replacement.
    pub fn clear(&self) {
        self.active.store(None);
    }
}
