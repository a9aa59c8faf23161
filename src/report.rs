//! Textual snapshot of the current counters.

use std::fmt::Write;

use crate::{
    device::DeviceId,
    stats::{GlobalCounters, ProcessTable},
};

/// Renders a point-in-time report: tracked device, global totals, one line
/// per known process. Entries inserted while the walk is in progress may be
/// missing; everything present at call time appears exactly once, in no
/// particular order.
pub(crate) fn render(device: DeviceId, globals: &GlobalCounters, table: &ProcessTable) -> String {
    let mut out = String::with_capacity(96 + 64 * table.len());
    let _ = writeln!(out, "Target Device: {device}");
    let _ = writeln!(out, "Global Read: {} bytes", globals.read_bytes());
    let _ = writeln!(out, "Global Write: {} bytes", globals.write_bytes());
    let _ = writeln!(out);
    let _ = writeln!(out, "Per-Process Statistics:");
    table.for_each(|entry| {
        let _ = writeln!(
            out,
            "PID: {}, Comm: {}, Read: {} bytes, Write: {} bytes",
            entry.pid(),
            entry.comm(),
            entry.read_bytes(),
            entry.write_bytes(),
        );
    });
    out
}
