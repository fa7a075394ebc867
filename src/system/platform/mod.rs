use std::sync::{Arc, OnceLock};

use super::error::AccessError;
use super::process::{ProcessFilter, ProcessRecord};
use super::snapshot::{
    BatteryReading, CoreSample, FilesystemEntry, MemorySummary, NetworkInterfaceCounters,
    SensorReading,
};

pub mod bsd;
pub mod darwin;
pub mod statfs;

#[cfg(target_os = "linux")]
pub mod linux;
#[cfg(not(any(target_os = "linux", target_os = "macos", target_os = "freebsd")))]
mod unsupported;

/// Uniform view over one operating system family's kernel interfaces.
///
/// Sequence acquisitions never fail: entities that vanish mid-read are
/// skipped, and a discovery method that is unavailable falls back to a
/// slower one or yields an empty sequence. Every returned record is owned by
/// the caller and never touched by the accessor again.
pub trait PlatformAccessor: Send + Sync {
    fn name(&self) -> &'static str;

    /// All live processes admitted by `filter`. Threads are not listed.
    fn acquire_processes(&self, filter: &ProcessFilter) -> Vec<ProcessRecord>;

    /// One process with its thread list attached.
    fn acquire_process(&self, pid: u32) -> Result<ProcessRecord, AccessError>;

    /// The threads of `pid`, excluding the main thread.
    fn acquire_threads(&self, pid: u32) -> Result<Vec<ProcessRecord>, AccessError>;

    fn acquire_cpu_cores(&self) -> Vec<CoreSample>;

    fn acquire_memory(&self) -> Result<MemorySummary, AccessError>;

    fn acquire_sensors(&self) -> Vec<SensorReading>;

    fn acquire_batteries(&self) -> Vec<BatteryReading>;

    fn acquire_network_interfaces(&self) -> Vec<NetworkInterfaceCounters>;

    fn acquire_filesystems(&self) -> Vec<FilesystemEntry>;
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct AccessorOptions {
    /// Keep `nodev` mounts that still report blocks.
    pub include_pseudo_filesystems: bool,
}

#[cfg(target_os = "linux")]
pub fn native(options: AccessorOptions) -> Arc<dyn PlatformAccessor> {
    Arc::new(linux::ProcFs::new().with_pseudo_filesystems(options.include_pseudo_filesystems))
}

#[cfg(target_os = "macos")]
pub fn native(options: AccessorOptions) -> Arc<dyn PlatformAccessor> {
    Arc::new(darwin::DarwinAccessor::new().with_pseudo_filesystems(options.include_pseudo_filesystems))
}

#[cfg(target_os = "freebsd")]
pub fn native(options: AccessorOptions) -> Arc<dyn PlatformAccessor> {
    Arc::new(bsd::BsdAccessor::new().with_pseudo_filesystems(options.include_pseudo_filesystems))
}

#[cfg(not(any(target_os = "linux", target_os = "macos", target_os = "freebsd")))]
pub fn native(_options: AccessorOptions) -> Arc<dyn PlatformAccessor> {
    Arc::new(unsupported::UnsupportedAccessor)
}

/// Bytes per memory page, queried once per process lifetime.
pub fn page_size() -> u64 {
    static PAGE_SIZE: OnceLock<u64> = OnceLock::new();
    *PAGE_SIZE.get_or_init(|| sysconf_or(SysconfName::PageSize, 4096))
}

/// Clock ticks per second (`USER_HZ` on Linux), queried once.
pub fn clock_ticks() -> u64 {
    static CLOCK_TICKS: OnceLock<u64> = OnceLock::new();
    *CLOCK_TICKS.get_or_init(|| sysconf_or(SysconfName::ClockTicks, 100))
}

enum SysconfName {
    PageSize,
    ClockTicks,
}

#[cfg(unix)]
fn sysconf_or(name: SysconfName, fallback: u64) -> u64 {
    let name = match name {
        SysconfName::PageSize => libc::_SC_PAGESIZE,
        SysconfName::ClockTicks => libc::_SC_CLK_TCK,
    };
    // SAFETY: sysconf has no preconditions and only reads a constant.
    let value = unsafe { libc::sysconf(name) };
    if value > 0 { value as u64 } else { fallback }
}

#[cfg(not(unix))]
fn sysconf_or(_name: SysconfName, fallback: u64) -> u64 {
    fallback
}

/// Convert platform ticks to microseconds without overflowing on large
/// cumulative counters.
pub fn ticks_to_micros(ticks: u64, ticks_per_second: u64) -> u64 {
    if ticks_per_second == 0 {
        return 0;
    }
    let micros = u128::from(ticks) * 1_000_000 / u128::from(ticks_per_second);
    u64::try_from(micros).unwrap_or(u64::MAX)
}

/// Walk a raw argument region as NUL-terminated strings.
///
/// At most `max_args` strings are produced and decoding never reads past the
/// end of `region`, even when the final string is missing its terminator.
/// Trailing empty strings (NUL padding) are dropped.
pub fn decode_argv(region: &[u8], max_args: usize) -> Vec<String> {
    let mut args = Vec::new();
    let mut rest = region;
    while args.len() < max_args && !rest.is_empty() {
        match rest.iter().position(|&b| b == 0) {
            Some(end) => {
                args.push(String::from_utf8_lossy(&rest[..end]).into_owned());
                rest = &rest[end + 1..];
            }
            None => {
                args.push(String::from_utf8_lossy(rest).into_owned());
                break;
            }
        }
    }
    while args.last().is_some_and(String::is_empty) {
        args.pop();
    }
    args
}

/// Read a NUL-terminated C string out of a fixed-size kernel buffer.
pub fn fixed_cstr(bytes: &[u8]) -> String {
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    String::from_utf8_lossy(&bytes[..end]).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn units_are_positive_and_stable() {
        let page = page_size();
        assert!(page >= 1024);
        assert_eq!(page, page_size());
        assert!(clock_ticks() > 0);
    }

    #[test]
    fn ticks_convert_without_overflow() {
        assert_eq!(ticks_to_micros(250, 100), 2_500_000);
        assert_eq!(ticks_to_micros(u64::MAX, 1), u64::MAX);
        assert_eq!(ticks_to_micros(5, 0), 0);
    }

    #[test]
    fn argv_stops_at_reported_count() {
        let region = b"ls\0-la\0/tmp\0HOME=/root\0";
        assert_eq!(decode_argv(region, 3), vec!["ls", "-la", "/tmp"]);
    }

    #[test]
    fn argv_tolerates_missing_terminator() {
        assert_eq!(decode_argv(b"vim\0notes.t", 5), vec!["vim", "notes.t"]);
        assert_eq!(decode_argv(b"", 5), Vec::<String>::new());
    }

    #[test]
    fn argv_drops_nul_padding() {
        assert_eq!(
            decode_argv(b"nginx: worker process\0\0\0\0", usize::MAX),
            vec!["nginx: worker process"]
        );
    }

    #[test]
    fn fixed_cstr_stops_at_nul() {
        assert_eq!(fixed_cstr(b"sshd\0\0garbage"), "sshd");
        assert_eq!(fixed_cstr(b"full"), "full");
    }
}
