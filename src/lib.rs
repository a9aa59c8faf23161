//! Per-process accounting of block-device I/O submissions.
//!
//! The host I/O subsystem owns a chokepoint every submission passes through
//! and invokes the registered observer there, once per submission, on the
//! issuing execution context. This crate supplies that observer: it matches
//! each submission against a single hot-swappable [`filter::FilterRule`]
//! (device plus tracked directions) and credits the byte count to global
//! totals and to the issuing process in a concurrent table, from which
//! [`IoMonitor::snapshot`] renders a live textual report.
//!
//! The submission path is parallel and latency-sensitive, so the observer
//! never blocks: rule reads and table lookups are wait-free, counter
//! updates are atomic adds, and only the first sight of a new process takes
//! the table's insertion lock. Replacing the rule or shutting the session
//! down is an administrative action that may wait; the hot path never does.
//!
//! Everything lives in an [`IoMonitor`] session object:
//!
//! ```
//! use std::sync::{Arc, RwLock};
//!
//! use block_io_monitor::{
//!     DeviceId, Direction, IoEvent, IoMonitor, IoObserver, IoSubsystem, Pid,
//!     config::MonitorConfig,
//!     device::{DeviceError, ResolveDevice},
//!     hook::HookError,
//! };
//!
//! // Stand-ins for the host I/O subsystem and the device-name resolver.
//! #[derive(Clone, Default)]
//! struct Host(Arc<RwLock<Option<Arc<dyn IoObserver>>>>);
//!
//! impl IoSubsystem for Host {
//!     fn register(&mut self, observer: Arc<dyn IoObserver>) -> Result<(), HookError> {
//!         *self.0.write().unwrap() = Some(observer);
//!         Ok(())
//!     }
//!     fn unregister(&mut self) {
//!         *self.0.write().unwrap() = None;
//!     }
//! }
//!
//! struct Fixed(DeviceId);
//!
//! impl ResolveDevice for Fixed {
//!     fn resolve(&self, _name: &str) -> Result<DeviceId, DeviceError> {
//!         Ok(self.0)
//!     }
//! }
//!
//! let host = Host::default();
//! let feed = host.clone();
//!
//! let monitor = IoMonitor::install(
//!     &MonitorConfig::new("sda"),
//!     &Fixed(DeviceId::new(8, 0)),
//!     Box::new(host),
//! )
//! .unwrap();
//! let monitor = monitor.activate().unwrap();
//!
//! // The host delivers submissions to the registered observer.
//! if let Some(observer) = feed.0.read().unwrap().as_ref() {
//!     observer.on_submission(&IoEvent {
//!         device: DeviceId::new(8, 0),
//!         direction: Direction::Read,
//!         bytes: 4096,
//!         pid: Pid::from_raw(42),
//!     });
//! }
//!
//! let report = monitor.snapshot();
//! assert!(report.contains("Global Read: 4096 bytes"));
//! monitor.shutdown();
//! ```

pub mod config;
pub mod device;
pub mod filter;
pub mod hook;
pub mod monitor;
mod report;
pub mod stats;

pub use config::{ModuleConfig, MonitorConfig};
pub use device::{DeviceId, PartitionTable, ResolveDevice};
pub use hook::{Direction, IoEvent, IoObserver, IoSubsystem};
pub use monitor::{IoMonitor, MonitorError};

pub use nix::unistd::Pid;
