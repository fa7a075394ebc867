//! Standalone queries over mounted filesystems and network interfaces.

use super::platform::PlatformAccessor;
use super::snapshot::{FilesystemEntry, NetworkInterfaceCounters};

/// Mounted filesystems with usable capacity, ordered by mount point.
pub fn filesystems(accessor: &dyn PlatformAccessor) -> Vec<FilesystemEntry> {
    let mut entries = accessor.acquire_filesystems();
    retain_real_filesystems(&mut entries);
    entries.sort_by(|a, b| a.mount_point.cmp(&b.mount_point));
    entries
}

/// Drop entries that report no capacity.
pub fn retain_real_filesystems(entries: &mut Vec<FilesystemEntry>) {
    entries.retain(|entry| entry.total_bytes > 0);
}

pub fn filesystem_type_mounted(accessor: &dyn PlatformAccessor, fs_type: &str) -> bool {
    has_filesystem_type(&filesystems(accessor), fs_type)
}

pub fn has_filesystem_type(entries: &[FilesystemEntry], fs_type: &str) -> bool {
    entries
        .iter()
        .any(|entry| entry.fs_type.eq_ignore_ascii_case(fs_type))
}

pub fn usage_percent(entry: &FilesystemEntry) -> f32 {
    if entry.total_bytes == 0 {
        return 0.0;
    }
    (100.0 * entry.used_bytes as f64 / entry.total_bytes as f64) as f32
}

pub fn interface_by_name<'a>(
    interfaces: &'a [NetworkInterfaceCounters],
    name: &str,
) -> Option<&'a NetworkInterfaceCounters> {
    interfaces.iter().find(|iface| iface.name == name)
}

/// Sum of the last-interval deltas over all interfaces, `(in, out)`.
pub fn network_totals(interfaces: &[NetworkInterfaceCounters]) -> (u64, u64) {
    interfaces.iter().fold((0, 0), |(rx, tx), iface| {
        (rx.saturating_add(iface.delta_in), tx.saturating_add(iface.delta_out))
    })
}
