//! Concurrent per-process byte accounting.
//!
//! The table is shaped for the submission hot path: lookups and traversals
//! never take a lock, counter updates are single atomic adds, and only the
//! insertion of a never-before-seen process serializes. Each of the fixed
//! buckets holds an immutable entry list republished copy-on-write under a
//! table-wide mutex, so a traversal either sees a bucket before an insertion
//! or after it — never a partially-linked entry.

use std::sync::{
    Arc, Mutex, PoisonError,
    atomic::{AtomicU64, Ordering},
};

use arc_swap::ArcSwap;
use nix::unistd::Pid;

/// Number of pid buckets.
const BUCKET_COUNT: usize = 1024;

/// Source of process names, consulted once per process when its entry is
/// created. Never called on the per-event fast path.
pub trait CommSource: Send + Sync {
    /// The command name of `pid`, if it can still be determined.
    fn comm(&self, pid: Pid) -> Option<String>;
}

/// [`CommSource`] backed by `/proc/<pid>/comm`.
pub struct ProcfsCommSource;

impl CommSource for ProcfsCommSource {
    fn comm(&self, pid: Pid) -> Option<String> {
        std::fs::read_to_string(format!("/proc/{pid}/comm"))
            .ok()
            .map(|comm| comm.trim().to_owned())
    }
}

/// Statistics for one observed process. Counters only ever grow, through
/// atomic adds; the identity fields are fixed at creation.
#[derive(Debug)]
pub struct ProcessEntry {
    pid: Pid,
    comm: String,
    read_bytes: AtomicU64,
    write_bytes: AtomicU64,
}

impl ProcessEntry {
    fn new(pid: Pid, comm: String) -> Self {
        Self {
            pid,
            comm,
            read_bytes: AtomicU64::new(0),
            write_bytes: AtomicU64::new(0),
        }
    }

    pub fn pid(&self) -> Pid {
        self.pid
    }

    /// Command name captured when the process was first observed.
    pub fn comm(&self) -> &str {
        &self.comm
    }

    pub fn read_bytes(&self) -> u64 {
        self.read_bytes.load(Ordering::Relaxed)
    }

    pub fn write_bytes(&self) -> u64 {
        self.write_bytes.load(Ordering::Relaxed)
    }

    pub fn add_read(&self, bytes: u64) {
        self.read_bytes.fetch_add(bytes, Ordering::Relaxed);
    }

    pub fn add_write(&self, bytes: u64) {
        self.write_bytes.fetch_add(bytes, Ordering::Relaxed);
    }
}

/// Aggregate totals across all matched submissions, independent of any
/// per-process entry. The global and per-process adds for one event are not
/// a unit: an observer may see one land before the other.
#[derive(Debug, Default)]
pub struct GlobalCounters {
    read_bytes: AtomicU64,
    write_bytes: AtomicU64,
}

impl GlobalCounters {
    pub fn read_bytes(&self) -> u64 {
        self.read_bytes.load(Ordering::Relaxed)
    }

    pub fn write_bytes(&self) -> u64 {
        self.write_bytes.load(Ordering::Relaxed)
    }

    pub fn add_read(&self, bytes: u64) {
        self.read_bytes.fetch_add(bytes, Ordering::Relaxed);
    }

    pub fn add_write(&self, bytes: u64) {
        self.write_bytes.fetch_add(bytes, Ordering::Relaxed);
    }
}

type Bucket = Vec<Arc<ProcessEntry>>;

/// Map from pid to [`ProcessEntry`], `bucket = pid mod BUCKET_COUNT`.
pub struct ProcessTable {
    buckets: Vec<ArcSwap<Bucket>>,
    /// Serializes bucket republication. Lookup and traversal never take it.
    insert_lock: Mutex<()>,
    comms: Box<dyn CommSource>,
}

impl ProcessTable {
    pub fn new(comms: Box<dyn CommSource>) -> Self {
        Self {
            buckets: (0..BUCKET_COUNT)
                .map(|_| ArcSwap::from_pointee(Vec::new()))
                .collect(),
            insert_lock: Mutex::new(()),
            comms,
        }
    }

    fn bucket(&self, pid: Pid) -> &ArcSwap<Bucket> {
        &self.buckets[pid.as_raw().unsigned_abs() as usize % BUCKET_COUNT]
    }

    /// The entry for `pid`, created with zero counters and a captured
    /// command name if absent.
    ///
    /// The lookup is wait-free. A miss takes the insertion lock and
    /// re-checks the bucket before linking: two first-touches of the same
    /// pid can race up to the lock, but only one of them publishes an
    /// entry, the other finds it on re-check. Returns `None` when growing
    /// the bucket fails, dropping this one attribution.
    pub fn get_or_create(&self, pid: Pid) -> Option<Arc<ProcessEntry>> {
        if let Some(entry) = find(self.bucket(pid).load().as_slice(), pid) {
            return Some(entry);
        }

        let _guard = self.insert_lock.lock().unwrap_or_else(PoisonError::into_inner);
        let current = self.bucket(pid).load_full();
        if let Some(entry) = find(&current, pid) {
            return Some(entry);
        }

        let mut next = Vec::new();
        if next.try_reserve_exact(current.len() + 1).is_err() {
            log::warn!("no memory to grow pid bucket, attribution for {pid} dropped");
            return None;
        }
        let comm = self.comms.comm(pid).unwrap_or_default();
        let entry = Arc::new(ProcessEntry::new(pid, comm));
        next.push(entry.clone());
        next.extend(current.iter().cloned());
        self.bucket(pid).store(Arc::new(next));
        Some(entry)
    }

    /// Visits every entry. Runs lock-free against concurrent insertion;
    /// entries linked during the walk may or may not be visited, but each
    /// visited entry is whole.
    pub fn for_each(&self, mut visitor: impl FnMut(&ProcessEntry)) {
        for slot in &self.buckets {
            let bucket = slot.load();
            for entry in bucket.iter() {
                visitor(entry);
            }
        }
    }

    /// Number of known processes.
    pub fn len(&self) -> usize {
        self.buckets.iter().map(|slot| slot.load().len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Removes and releases every entry. Callers must guarantee no
    /// concurrent [`ProcessTable::get_or_create`]; the lifecycle manager
    /// deregisters the hook before draining.
    pub fn drain(&self) {
        let _guard = self.insert_lock.lock().unwrap_or_else(PoisonError::into_inner);
        for slot in &self.buckets {
            slot.store(Arc::new(Vec::new()));
        }
    }
}

fn find(bucket: &[Arc<ProcessEntry>], pid: Pid) -> Option<Arc<ProcessEntry>> {
    bucket.iter().find(|entry| entry.pid() == pid).cloned()
}
