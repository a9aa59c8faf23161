//! Full-lifecycle tests: a simulated host I/O subsystem delivers
//! submissions to the registered observer from truly parallel threads while
//! the session is installed, reconfigured and torn down.

use std::sync::{Arc, RwLock};

use block_io_monitor::{
    DeviceId, Direction, IoEvent, IoMonitor, IoObserver, IoSubsystem, MonitorConfig, MonitorError,
    Pid, ResolveDevice,
    device::DeviceError,
    hook::HookError,
    stats::CommSource,
};

const SDA: DeviceId = DeviceId::new(8, 0);
const SDB: DeviceId = DeviceId::new(8, 16);

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Host I/O subsystem double. Dispatch takes the lock shared; `unregister`
/// takes it exclusive and therefore cannot return while a callback is still
/// running — the synchronous-deregistration guarantee of the real host.
#[derive(Clone, Default)]
struct SimulatedHost {
    observer: Arc<RwLock<Option<Arc<dyn IoObserver>>>>,
}

impl SimulatedHost {
    fn submit(&self, pid: i32, direction: Direction, bytes: u64, device: DeviceId) {
        if let Some(observer) = self.observer.read().unwrap().as_ref() {
            observer.on_submission(&IoEvent {
                device,
                direction,
                bytes,
                pid: Pid::from_raw(pid),
            });
        }
    }
}

impl IoSubsystem for SimulatedHost {
    fn register(&mut self, observer: Arc<dyn IoObserver>) -> Result<(), HookError> {
        let mut slot = self.observer.write().unwrap();
        if slot.is_some() {
            return Err(HookError::AlreadyRegistered);
        }
        *slot = Some(observer);
        Ok(())
    }

    fn unregister(&mut self) {
        *self.observer.write().unwrap() = None;
    }
}

struct StaticResolver;

impl ResolveDevice for StaticResolver {
    fn resolve(&self, name: &str) -> Result<DeviceId, DeviceError> {
        match name {
            "sda" => Ok(SDA),
            "sdb" => Ok(SDB),
            other => Err(DeviceError::NotFound(other.to_string())),
        }
    }
}

struct TestComms;

impl CommSource for TestComms {
    fn comm(&self, pid: Pid) -> Option<String> {
        Some(format!("proc-{pid}"))
    }
}

fn start(host: &SimulatedHost, config: &MonitorConfig) -> IoMonitor {
    IoMonitor::install_with(
        config,
        &StaticResolver,
        Box::new(host.clone()),
        Box::new(TestComms),
    )
    .unwrap()
    .activate()
    .unwrap()
}

#[test]
fn accounts_the_reference_scenario() {
    init_logging();
    let host = SimulatedHost::default();
    let monitor = start(&host, &MonitorConfig::new("sda"));

    host.submit(10, Direction::Read, 4096, SDA);
    host.submit(10, Direction::Write, 8192, SDA);
    host.submit(20, Direction::Read, 100, SDA);
    host.submit(99, Direction::Read, 500, SDB);

    let report = monitor.snapshot();
    assert!(report.starts_with("Target Device: 8:0\n"));
    assert!(report.contains("Global Read: 4196 bytes"));
    assert!(report.contains("Global Write: 8192 bytes"));
    assert!(report.contains("PID: 10, Comm: proc-10, Read: 4096 bytes, Write: 8192 bytes"));
    assert!(report.contains("PID: 20, Comm: proc-20, Read: 100 bytes, Write: 0 bytes"));
    assert!(!report.contains("PID: 99"));

    monitor.shutdown();
}

#[test]
fn parallel_submitters_never_lose_an_event() {
    const THREADS: u64 = 8;
    const EVENTS: u64 = 10_000;

    init_logging();
    let host = SimulatedHost::default();
    let monitor = start(&host, &MonitorConfig::new("sda"));

    std::thread::scope(|scope| {
        for t in 0..THREADS {
            let host = &host;
            scope.spawn(move || {
                // Even threads share pid 1; odd threads get their own pid.
                let pid = if t % 2 == 0 { 1 } else { 100 + t as i32 };
                for _ in 0..EVENTS {
                    host.submit(pid, Direction::Read, 512, SDA);
                    host.submit(pid, Direction::Write, 256, SDA);
                }
            });
        }
    });

    let report = monitor.snapshot();
    let read_total = THREADS * EVENTS * 512;
    let write_total = THREADS * EVENTS * 256;
    assert!(report.contains(&format!("Global Read: {read_total} bytes")));
    assert!(report.contains(&format!("Global Write: {write_total} bytes")));
    // pid 1 carries the even threads' share
    assert!(report.contains(&format!(
        "PID: 1, Comm: proc-1, Read: {} bytes, Write: {} bytes",
        (THREADS / 2) * EVENTS * 512,
        (THREADS / 2) * EVENTS * 256,
    )));

    monitor.shutdown();
}

#[test]
fn reporting_runs_concurrently_with_submission() {
    init_logging();
    let host = SimulatedHost::default();
    let monitor = start(&host, &MonitorConfig::new("sda"));

    std::thread::scope(|scope| {
        for t in 0..4 {
            let host = &host;
            scope.spawn(move || {
                for i in 0..5_000 {
                    host.submit(1 + ((t * 5_000 + i) % 100), Direction::Read, 512, SDA);
                }
            });
        }
        let monitor = &monitor;
        scope.spawn(move || {
            for _ in 0..200 {
                // A snapshot taken mid-stream must be internally sane even
                // if it is not a transactional cut.
                let report = monitor.snapshot();
                assert!(report.starts_with("Target Device: 8:0\n"));
                for line in report.lines().filter(|l| l.starts_with("PID:")) {
                    assert!(line.contains("Comm: proc-"));
                }
            }
        });
    });

    let report = monitor.snapshot();
    assert!(report.contains(&format!("Global Read: {} bytes", 4 * 5_000 * 512)));
    assert_eq!(report.lines().filter(|l| l.starts_with("PID:")).count(), 100);

    monitor.shutdown();
}

#[test]
fn rule_switch_redirects_tracking_to_the_new_device() {
    init_logging();
    let host = SimulatedHost::default();
    let monitor = start(&host, &MonitorConfig::new("sda"));

    host.submit(10, Direction::Read, 1000, SDA);

    monitor.set_filter_rule(SDB, true, true);

    // post-switch: the old device no longer accrues, the new one does
    host.submit(10, Direction::Read, 1000, SDA);
    host.submit(10, Direction::Read, 300, SDB);

    let report = monitor.snapshot();
    assert!(report.starts_with("Target Device: 8:16\n"));
    assert!(report.contains("Global Read: 1300 bytes"));
    assert!(report.contains("PID: 10, Comm: proc-10, Read: 1300 bytes, Write: 0 bytes"));

    monitor.shutdown();
}

#[test]
fn direction_flags_limit_what_accrues() {
    init_logging();
    let host = SimulatedHost::default();
    let mut config = MonitorConfig::new("sda");
    config.track_write = false;
    let monitor = start(&host, &config);

    host.submit(10, Direction::Read, 4096, SDA);
    host.submit(10, Direction::Write, 8192, SDA);

    let report = monitor.snapshot();
    assert!(report.contains("Global Read: 4096 bytes"));
    assert!(report.contains("Global Write: 0 bytes"));
    assert!(report.contains("PID: 10, Comm: proc-10, Read: 4096 bytes, Write: 0 bytes"));

    monitor.shutdown();
}

#[test]
fn shutdown_then_fresh_session_starts_from_zero() {
    init_logging();
    let host = SimulatedHost::default();
    let monitor = start(&host, &MonitorConfig::new("sda"));

    host.submit(10, Direction::Read, 4096, SDA);
    monitor.shutdown();

    // the chokepoint is free again and the old counters are gone
    host.submit(10, Direction::Read, 4096, SDA);
    let monitor = start(&host, &MonitorConfig::new("sda"));
    let report = monitor.snapshot();
    assert!(report.contains("Global Read: 0 bytes"));
    assert!(!report.contains("PID:"));

    monitor.shutdown();
}

#[test]
fn unknown_device_never_activates() {
    init_logging();
    let host = SimulatedHost::default();
    let err = IoMonitor::install_with(
        &MonitorConfig::new("sdq"),
        &StaticResolver,
        Box::new(host.clone()),
        Box::new(TestComms),
    )
    .unwrap_err();
    assert!(matches!(err, MonitorError::DeviceNotFound { .. }));
    assert!(host.observer.read().unwrap().is_none());
}
