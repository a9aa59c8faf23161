//! The interception point on the I/O submission path.
//!
//! The host I/O subsystem owns a single chokepoint every submission passes
//! through and invokes the registered [`IoObserver`] there, synchronously,
//! on the issuing execution context. The observer therefore must not block
//! and must not fail in any way that reaches the I/O itself: a submission
//! the hook cannot account for is an undercount, never an error.

use std::sync::Arc;

use nix::unistd::Pid;
use thiserror::Error;

use crate::{
    device::DeviceId,
    filter::RuleStore,
    stats::{GlobalCounters, ProcessTable},
};

/// Transfer direction of a block I/O submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Read,
    Write,
}

/// One I/O submission as seen at the chokepoint.
#[derive(Debug, Clone, Copy)]
pub struct IoEvent {
    pub device: DeviceId,
    pub direction: Direction,
    pub bytes: u64,
    pub pid: Pid,
}

/// Callback contract of the chokepoint. The host delivers each submission
/// exactly once; the observer does not deduplicate.
pub trait IoObserver: Send + Sync {
    fn on_submission(&self, event: &IoEvent);
}

#[derive(Error, Debug)]
pub enum HookError {
    #[error("I/O chokepoint unavailable")]
    ChokepointUnavailable,
    #[error("an observer is already registered")]
    AlreadyRegistered,
}

/// Registration seam towards the host I/O subsystem.
///
/// `unregister` is synchronous: it must not return while any
/// [`IoObserver::on_submission`] invocation can still be executing. The
/// lifecycle manager relies on this before draining shared state.
pub trait IoSubsystem: Send + Sync {
    fn register(&mut self, observer: Arc<dyn IoObserver>) -> Result<(), HookError>;
    fn unregister(&mut self);
}

/// Credits matching submissions to the global counters and to the issuing
/// process.
pub struct AttributionHook {
    rules: Arc<RuleStore>,
    table: Arc<ProcessTable>,
    globals: Arc<GlobalCounters>,
}

impl AttributionHook {
    pub(crate) fn new(
        rules: Arc<RuleStore>,
        table: Arc<ProcessTable>,
        globals: Arc<GlobalCounters>,
    ) -> Self {
        Self {
            rules,
            table,
            globals,
        }
    }
}

impl IoObserver for AttributionHook {
    fn on_submission(&self, event: &IoEvent) {
        let guard = self.rules.current();
        let Some(rule) = guard.as_deref() else {
            return;
        };
        if rule.device != event.device {
            return;
        }

        // The global add comes first: a failed entry creation loses only
        // the per-process half of the attribution.
        match event.direction {
            Direction::Read if rule.track_read => {
                self.globals.add_read(event.bytes);
                if let Some(entry) = self.table.get_or_create(event.pid) {
                    entry.add_read(event.bytes);
                }
            }
            Direction::Write if rule.track_write => {
                self.globals.add_write(event.bytes);
                if let Some(entry) = self.table.get_or_create(event.pid) {
                    entry.add_write(event.bytes);
                }
            }
            _ => {}
        }
    }
}
