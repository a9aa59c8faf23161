//! Lifecycle of a monitoring session.
//!
//! All subsystem state lives in the [`IoMonitor`] context object; there are
//! no ambient globals. The session moves through
//! `Uninitialized → Installed → Active → Draining → Uninitialized`:
//! [`IoMonitor::install`] resolves the device and allocates zeroed state,
//! [`IoMonitor::activate`] registers the interception hook, and
//! [`IoMonitor::shutdown`] deregisters it before draining, so no submission
//! can race the teardown.

use std::sync::Arc;

use thiserror::Error;

use crate::{
    config::MonitorConfig,
    device::{DeviceError, DeviceId, ResolveDevice},
    filter::{FilterRule, RuleStore},
    hook::{AttributionHook, HookError, IoSubsystem},
    report,
    stats::{CommSource, GlobalCounters, ProcessTable, ProcfsCommSource},
};

const MODULE_NAME: &str = "block-io-monitor";

#[derive(Error, Debug)]
pub enum MonitorError {
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),
    #[error("device {name} not found")]
    DeviceNotFound {
        name: String,
        #[source]
        source: DeviceError,
    },
    #[error("hook registration failed")]
    HookRegistrationFailed(#[from] HookError),
}

/// A monitoring session.
pub struct IoMonitor {
    device: DeviceId,
    rules: Arc<RuleStore>,
    table: Arc<ProcessTable>,
    globals: Arc<GlobalCounters>,
    host: Box<dyn IoSubsystem>,
    active: bool,
}

impl std::fmt::Debug for IoMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IoMonitor")
            .field("device", &self.device)
            .field("active", &self.active)
            .finish_non_exhaustive()
    }
}

impl IoMonitor {
    /// `Uninitialized → Installed`: validates and resolves the configured
    /// device name, allocates zeroed counters and an empty table, and
    /// installs the initial filter rule.
    pub fn install(
        config: &MonitorConfig,
        resolver: &dyn ResolveDevice,
        host: Box<dyn IoSubsystem>,
    ) -> Result<IoMonitor, MonitorError> {
        Self::install_with(config, resolver, host, Box::new(ProcfsCommSource))
    }

    /// Same as [`IoMonitor::install`] with a custom process-name source.
    pub fn install_with(
        config: &MonitorConfig,
        resolver: &dyn ResolveDevice,
        host: Box<dyn IoSubsystem>,
        comms: Box<dyn CommSource>,
    ) -> Result<IoMonitor, MonitorError> {
        let name = &config.device;
        if name.is_empty() || name.contains(|c: char| c.is_whitespace() || c == '/') {
            return Err(MonitorError::InvalidConfiguration(format!(
                "{name:?} is not a device name"
            )));
        }
        let device = resolver
            .resolve(name)
            .map_err(|source| MonitorError::DeviceNotFound {
                name: name.clone(),
                source,
            })?;

        let rules = Arc::new(RuleStore::new());
        rules.install(FilterRule {
            device,
            track_read: config.track_read,
            track_write: config.track_write,
        });

        log::info!(target: MODULE_NAME, "installed for device {name} ({device})");
        Ok(IoMonitor {
            device,
            rules,
            table: Arc::new(ProcessTable::new(comms)),
            globals: Arc::new(GlobalCounters::default()),
            host,
            active: false,
        })
    }

    /// `Installed → Active`: registers the interception hook with the host
    /// I/O subsystem. On refusal the session is consumed — nothing is left
    /// registered and all allocated state is released.
    pub fn activate(mut self) -> Result<IoMonitor, MonitorError> {
        let hook = Arc::new(AttributionHook::new(
            self.rules.clone(),
            self.table.clone(),
            self.globals.clone(),
        ));
        self.host.register(hook)?;
        self.active = true;
        log::info!(target: MODULE_NAME, "hook registered");
        Ok(self)
    }

    /// Device the session was installed for.
    pub fn device(&self) -> DeviceId {
        self.device
    }

    /// Replaces the active filter rule. Takes effect for every submission
    /// that starts after the swap; submissions already in flight may still
    /// be matched against the retired rule.
    pub fn set_filter_rule(&self, device: DeviceId, track_read: bool, track_write: bool) {
        self.rules.install(FilterRule {
            device,
            track_read,
            track_write,
        });
        log::debug!(target: MODULE_NAME, "rule replaced: {device} read={track_read} write={track_write}");
    }

    /// Point-in-time report of the tracked device, the global totals and
    /// one line per known process.
    pub fn snapshot(&self) -> String {
        let device = self
            .rules
            .current()
            .as_deref()
            .map(|rule| rule.device)
            .unwrap_or(self.device);
        report::render(device, &self.globals, &self.table)
    }

    /// `Active → Draining → Uninitialized`: deregisters the hook — the call
    /// returns only once no submission can still be inside it — then drains
    /// the table and retires the rule. A fresh [`IoMonitor::install`] may
    /// start a new session from zero.
    pub fn shutdown(mut self) {
        self.teardown();
    }

    fn teardown(&mut self) {
        if self.active {
            self.host.unregister();
            self.active = false;
            log::info!(target: MODULE_NAME, "hook deregistered");
        }
        self.rules.clear();
        self.table.drain();
    }
}

impl Drop for IoMonitor {
    fn drop(&mut self) {
        self.teardown();
    }
}
