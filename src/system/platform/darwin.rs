//! macOS decoder built on libproc, Mach host statistics and `sysctl`.
//!
//! Buffer layouts (`KERN_PROCARGS2`, per-CPU load ticks, `pmset` output) are
//! decoded by free functions so they can be tested off-target.

use crate::system::process::{MemoryUsage, ProcessRecord, ProcessState};
use crate::system::snapshot::{BatteryReading, CoreSample, MemorySummary};

use super::decode_argv;

/// `CPU_STATE_MAX` ticks per processor: user, system, idle, nice.
pub const CPU_STATE_MAX: usize = 4;
const CPU_STATE_IDLE: usize = 2;

const STATE_CODES: &[(u32, ProcessState)] = &[
    (1, ProcessState::Idle),     // SIDL
    (2, ProcessState::Running),  // SRUN
    (3, ProcessState::Sleeping), // SSLEEP
    (4, ProcessState::Stopped),  // SSTOP
    (5, ProcessState::Zombie),   // SZOMB
];

const THREAD_STATE_CODES: &[(i32, ProcessState)] = &[
    (1, ProcessState::Running),  // TH_STATE_RUNNING
    (2, ProcessState::Stopped),  // TH_STATE_STOPPED
    (3, ProcessState::Sleeping), // TH_STATE_WAITING
    (4, ProcessState::Waiting),  // TH_STATE_UNINTERRUPTIBLE
    (5, ProcessState::Dead),     // TH_STATE_HALTED
];

pub fn state_from_code(code: u32) -> ProcessState {
    ProcessState::from_table(STATE_CODES, code)
}

pub fn thread_state_from_code(code: i32) -> ProcessState {
    ProcessState::from_table(THREAD_STATE_CODES, code)
}

/// Argument strings from a `KERN_PROCARGS2` buffer: a native-endian `argc`,
/// the executable path, NUL padding, then `argc` strings followed by the
/// environment. Only the first `argc` strings are returned.
pub fn decode_procargs2(buf: &[u8]) -> Option<Vec<String>> {
    let header: [u8; 4] = buf.get(..4)?.try_into().ok()?;
    let argc = i32::from_ne_bytes(header);
    if argc < 0 {
        return None;
    }
    let rest = &buf[4..];
    let path_end = rest.iter().position(|&b| b == 0).unwrap_or(rest.len());
    let rest = &rest[path_end..];
    let args_start = rest.iter().position(|&b| b != 0).unwrap_or(rest.len());
    Some(decode_argv(&rest[args_start..], argc as usize))
}

/// Split `host_processor_info` load ticks into per-core samples.
pub fn decode_cpu_load(ticks: &[u32]) -> Vec<CoreSample> {
    ticks
        .chunks_exact(CPU_STATE_MAX)
        .enumerate()
        .map(|(core, row)| {
            let total = row.iter().fold(0u64, |acc, t| acc.saturating_add(u64::from(*t)));
            CoreSample::new(core as u32, total, u64::from(row[CPU_STATE_IDLE]))
        })
        .collect()
}

/// Mach absolute time to microseconds for a given timebase.
pub fn mach_to_micros(ticks: u64, numer: u32, denom: u32) -> u64 {
    if denom == 0 {
        return 0;
    }
    let nanos = u128::from(ticks) * u128::from(numer) / u128::from(denom);
    u64::try_from(nanos / 1_000).unwrap_or(u64::MAX)
}

/// Page counts from `host_statistics64(HOST_VM_INFO64)`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VmPages {
    pub page_size: u64,
    pub active: u64,
    pub inactive: u64,
    pub wired: u64,
    pub compressed: u64,
    pub purgeable: u64,
    pub file_backed: u64,
}

pub fn decode_vm_pages(
    total_bytes: u64,
    pages: &VmPages,
    swap_total: u64,
    swap_used: u64,
) -> MemorySummary {
    let bytes = |n: u64| n.saturating_mul(pages.page_size);
    MemorySummary {
        total_bytes,
        used_bytes: bytes(
            pages
                .active
                .saturating_add(pages.wired)
                .saturating_add(pages.compressed),
        )
        .min(total_bytes),
        cached_bytes: bytes(pages.file_backed.saturating_add(pages.purgeable)),
        buffered_bytes: 0,
        shared_bytes: 0,
        swap_total_bytes: swap_total,
        swap_used_bytes: swap_used,
        fs_cache_bytes: None,
        gpu_pools: Vec::new(),
    }
}

/// What a record is built from: `proc_bsdinfo` plus `proc_taskinfo`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TaskFields {
    pub pid: u32,
    pub ppid: u32,
    pub uid: u32,
    pub nice: i32,
    pub priority: i32,
    pub status: u32,
    pub start_secs: u64,
    pub comm: String,
    pub virtual_bytes: u64,
    pub resident_bytes: u64,
    pub cpu_time_us: u64,
    pub num_threads: u32,
    pub open_files: u32,
}

pub fn decode_task(fields: &TaskFields, now_secs: u64) -> ProcessRecord {
    ProcessRecord {
        pid: fields.pid,
        ppid: fields.ppid,
        uid: fields.uid,
        nice: fields.nice,
        priority: fields.priority,
        num_threads: fields.num_threads,
        open_files: fields.open_files,
        cpu_time_us: fields.cpu_time_us,
        start_time: fields.start_secs,
        run_time_secs: now_secs.saturating_sub(fields.start_secs),
        memory: MemoryUsage::new(fields.virtual_bytes, fields.resident_bytes, 0),
        command: fields.comm.clone(),
        state: state_from_code(fields.status),
        // kernel_task is the only kernel-side entry in the process table.
        is_kernel: fields.pid == 0,
        ..Default::default()
    }
}

/// Battery rows from `pmset -g batt`, e.g.
/// ` -InternalBattery-0 (id=4653155)\t87%; discharging; 4:12 remaining present: true`.
pub fn parse_pmset_batt(output: &str) -> Vec<BatteryReading> {
    output
        .lines()
        .filter_map(|line| {
            let line = line.trim().strip_prefix('-')?;
            let name = line.split(" (").next()?.trim().to_string();
            let percent = line
                .split_whitespace()
                .find_map(|tok| tok.trim_end_matches(';').strip_suffix('%'))
                .and_then(|pct| pct.parse::<f32>().ok());
            let present = !line.contains("present: false");
            Some(BatteryReading {
                name,
                percent: percent.filter(|_| present).unwrap_or(0.0),
                present,
                vendor: "Apple".to_string(),
                ..Default::default()
            })
        })
        .collect()
}

#[cfg(target_os = "macos")]
pub use glue::DarwinAccessor;

#[cfg(target_os = "macos")]
mod glue {
    use std::ptr;
    use std::sync::OnceLock;
    use std::time::{SystemTime, UNIX_EPOCH};

    use libproc::libproc::file_info::ListFDs;
    use libproc::libproc::proc_pid::{self, ListThreads, ProcType};
    use libproc::libproc::task_info::TaskAllInfo;
    use libproc::libproc::thread_info::ThreadInfo;
    use libproc::processes::{ProcFilter as LibprocFilter, pids_by_type};
    use sysinfo::{Components, Networks, System};

    use super::*;
    use crate::system::error::AccessError;
    use crate::system::platform::statfs::mounted_filesystems;
    use crate::system::platform::{PlatformAccessor, fixed_cstr, page_size};
    use crate::system::process::ProcessFilter;
    use crate::system::snapshot::{FilesystemEntry, NetworkInterfaceCounters, SensorReading};

    const KERN_PROCARGS2: libc::c_int = 49;

    pub struct DarwinAccessor {
        include_pseudo: bool,
    }

    impl Default for DarwinAccessor {
        fn default() -> Self {
            Self::new()
        }
    }

    impl DarwinAccessor {
        pub fn new() -> Self {
            DarwinAccessor {
                include_pseudo: false,
            }
        }

        pub fn with_pseudo_filesystems(mut self, include: bool) -> Self {
            self.include_pseudo = include;
            self
        }
    }

    fn now_secs() -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0)
    }

    fn text(chars: &[libc::c_char]) -> String {
        let bytes: Vec<u8> = chars.iter().map(|&c| c as u8).collect();
        fixed_cstr(&bytes)
    }

    #[allow(deprecated)]
    fn timebase() -> (u32, u32) {
        static TIMEBASE: OnceLock<(u32, u32)> = OnceLock::new();
        *TIMEBASE.get_or_init(|| {
            let mut info = libc::mach_timebase_info_data_t { numer: 0, denom: 0 };
            // SAFETY: `info` is a valid out-parameter.
            let rc = unsafe { libc::mach_timebase_info(&mut info) };
            if rc == 0 && info.denom != 0 {
                (info.numer, info.denom)
            } else {
                (1, 1)
            }
        })
    }

    fn procargs(pid: u32) -> Option<Vec<String>> {
        let mut mib = [libc::CTL_KERN, KERN_PROCARGS2, pid as libc::c_int];
        let mut size = 0usize;
        // SAFETY: a null buffer asks only for the required size.
        let rc = unsafe {
            libc::sysctl(mib.as_mut_ptr(), 3, ptr::null_mut(), &mut size, ptr::null_mut(), 0)
        };
        if rc != 0 || size == 0 {
            return None;
        }
        let mut buf = vec![0u8; size];
        // SAFETY: `buf` holds `size` writable bytes.
        let rc = unsafe {
            libc::sysctl(mib.as_mut_ptr(), 3, buf.as_mut_ptr().cast(), &mut size, ptr::null_mut(), 0)
        };
        if rc != 0 {
            return None;
        }
        buf.truncate(size);
        decode_procargs2(&buf)
    }

    fn sysctl_u64(name: &str) -> Option<u64> {
        let cname = std::ffi::CString::new(name).ok()?;
        let mut value = 0u64;
        let mut size = std::mem::size_of::<u64>();
        // SAFETY: `value` is a writable u64 and `size` matches it.
        let rc = unsafe {
            libc::sysctlbyname(cname.as_ptr(), (&mut value as *mut u64).cast(), &mut size, ptr::null_mut(), 0)
        };
        (rc == 0).then_some(value)
    }

    fn list_pids() -> Vec<u32> {
        match pids_by_type(LibprocFilter::All) {
            Ok(pids) => pids,
            Err(err) => {
                tracing::warn!(%err, "pid listing failed, falling back to listpids");
                proc_pid::listpids(ProcType::ProcAllPIDS).unwrap_or_default()
            }
        }
    }

    fn read_task(pid: u32, now: u64) -> Result<ProcessRecord, AccessError> {
        let info = proc_pid::pidinfo::<TaskAllInfo>(pid as i32, 0)
            .map_err(|_| AccessError::NotFound { pid })?;
        let (numer, denom) = timebase();
        let bsd = &info.pbsd;
        let task = &info.ptinfo;
        let open_files = proc_pid::listpidinfo::<ListFDs>(pid as i32, bsd.pbi_nfiles as usize)
            .map(|fds| fds.len() as u32)
            .unwrap_or(0);
        let fields = TaskFields {
            pid: bsd.pbi_pid,
            ppid: bsd.pbi_ppid,
            uid: bsd.pbi_uid,
            nice: bsd.pbi_nice,
            priority: task.pti_priority,
            status: bsd.pbi_status,
            start_secs: bsd.pbi_start_tvsec,
            comm: text(&bsd.pbi_comm),
            virtual_bytes: task.pti_virtual_size,
            resident_bytes: task.pti_resident_size,
            cpu_time_us: mach_to_micros(
                task.pti_total_user.saturating_add(task.pti_total_system),
                numer,
                denom,
            ),
            num_threads: task.pti_threadnum.max(0) as u32,
            open_files,
        };
        let mut record = decode_task(&fields, now);
        record.args = procargs(pid).map(|a| a.join(" ")).unwrap_or_default();
        Ok(record)
    }

    fn read_threads(pid: u32, parent: &ProcessRecord) -> Result<Vec<ProcessRecord>, AccessError> {
        let handles = proc_pid::listpidinfo::<ListThreads>(pid as i32, parent.num_threads.max(1) as usize)
            .map_err(|_| AccessError::NotFound { pid })?;
        let threads = handles
            .iter()
            .skip(1)
            .filter_map(|&handle| {
                let info = proc_pid::pidinfo::<ThreadInfo>(pid as i32, handle).ok()?;
                let name = text(&info.pth_name);
                Some(ProcessRecord {
                    pid,
                    ppid: parent.ppid,
                    uid: parent.uid,
                    tid: (handle & 0xffff_ffff) as u32,
                    priority: info.pth_curpri,
                    nice: parent.nice,
                    num_threads: 1,
                    cpu_time_us: info.pth_user_time.saturating_add(info.pth_system_time) / 1_000,
                    start_time: parent.start_time,
                    run_time_secs: parent.run_time_secs,
                    state: thread_state_from_code(info.pth_run_state),
                    command: if name.is_empty() { parent.command.clone() } else { name },
                    ..Default::default()
                })
            })
            .collect();
        Ok(threads)
    }

    impl PlatformAccessor for DarwinAccessor {
        fn name(&self) -> &'static str {
            "darwin-libproc"
        }

        fn acquire_processes(&self, filter: &ProcessFilter) -> Vec<ProcessRecord> {
            #[cfg(feature = "perf-tracing")]
            let _span = tracing::debug_span!("platform.acquire_processes").entered();

            let now = now_secs();
            list_pids()
                .into_iter()
                .filter_map(|pid| match read_task(pid, now) {
                    Ok(record) => Some(record),
                    Err(err) => {
                        tracing::trace!(pid, %err, "skipping process");
                        None
                    }
                })
                .filter(|record| filter.admits(record))
                .collect()
        }

        fn acquire_process(&self, pid: u32) -> Result<ProcessRecord, AccessError> {
            let mut record = read_task(pid, now_secs())?;
            record.threads = read_threads(pid, &record).unwrap_or_default();
            Ok(record)
        }

        fn acquire_threads(&self, pid: u32) -> Result<Vec<ProcessRecord>, AccessError> {
            let record = read_task(pid, now_secs())?;
            read_threads(pid, &record)
        }

        #[allow(deprecated)]
        fn acquire_cpu_cores(&self) -> Vec<CoreSample> {
            let mut cpu_count: libc::natural_t = 0;
            let mut info: libc::processor_info_array_t = ptr::null_mut();
            let mut info_count: libc::mach_msg_type_number_t = 0;
            // SAFETY: all three out-parameters are valid; the kernel allocates
            // `info` which is released below.
            let rc = unsafe {
                libc::host_processor_info(
                    libc::mach_host_self(),
                    libc::PROCESSOR_CPU_LOAD_INFO,
                    &mut cpu_count,
                    &mut info,
                    &mut info_count,
                )
            };
            if rc != libc::KERN_SUCCESS || info.is_null() {
                tracing::warn!(rc, "host_processor_info failed");
                return Vec::new();
            }
            // SAFETY: the kernel returned `info_count` integers at `info`.
            let ticks: Vec<u32> = unsafe { std::slice::from_raw_parts(info, info_count as usize) }
                .iter()
                .map(|&t| t as u32)
                .collect();
            // SAFETY: releasing the region allocated by host_processor_info.
            unsafe {
                libc::vm_deallocate(
                    libc::mach_task_self(),
                    info as libc::vm_address_t,
                    info_count as usize * std::mem::size_of::<libc::integer_t>(),
                );
            }
            decode_cpu_load(&ticks)
        }

        #[allow(deprecated)]
        fn acquire_memory(&self) -> Result<MemorySummary, AccessError> {
            let total = sysctl_u64("hw.memsize").ok_or(AccessError::parse("memory", "hw.memsize"))?;
            // SAFETY: vm_statistics64 is plain data.
            let mut stats: libc::vm_statistics64 = unsafe { std::mem::zeroed() };
            let mut count = libc::HOST_VM_INFO64_COUNT;
            // SAFETY: `stats` is large enough for HOST_VM_INFO64_COUNT integers.
            let rc = unsafe {
                libc::host_statistics64(
                    libc::mach_host_self(),
                    libc::HOST_VM_INFO64,
                    (&mut stats as *mut libc::vm_statistics64).cast(),
                    &mut count,
                )
            };
            if rc != libc::KERN_SUCCESS {
                return Err(AccessError::parse("memory", format!("host_statistics64 returned {rc}")));
            }
            let pages = VmPages {
                page_size: page_size(),
                active: u64::from(stats.active_count),
                inactive: u64::from(stats.inactive_count),
                wired: u64::from(stats.wire_count),
                compressed: u64::from(stats.compressor_page_count),
                purgeable: u64::from(stats.purgeable_count),
                file_backed: u64::from(stats.external_page_count),
            };
            let mut system = System::new();
            system.refresh_memory();
            Ok(decode_vm_pages(total, &pages, system.total_swap(), system.used_swap()))
        }

        fn acquire_sensors(&self) -> Vec<SensorReading> {
            let components = Components::new_with_refreshed_list();
            let mut readings: Vec<SensorReading> = components
                .iter()
                .map(|component| {
                    let temperature = component.temperature();
                    SensorReading {
                        name: component.label().to_string(),
                        channel: None,
                        value: temperature.map(|t| (t * 100.0) as i64).unwrap_or(0),
                        valid: temperature.is_some(),
                    }
                })
                .collect();
            readings.sort_by(|a, b| a.name.cmp(&b.name));
            readings
        }

        fn acquire_batteries(&self) -> Vec<BatteryReading> {
            match std::process::Command::new("/usr/bin/pmset").args(["-g", "batt"]).output() {
                Ok(output) if output.status.success() => {
                    parse_pmset_batt(&String::from_utf8_lossy(&output.stdout))
                }
                Ok(output) => {
                    tracing::debug!(status = ?output.status, "pmset reported failure");
                    Vec::new()
                }
                Err(err) => {
                    tracing::debug!(%err, "pmset unavailable");
                    Vec::new()
                }
            }
        }

        fn acquire_network_interfaces(&self) -> Vec<NetworkInterfaceCounters> {
            let networks = Networks::new_with_refreshed_list();
            let mut counters: Vec<NetworkInterfaceCounters> = networks
                .iter()
                .map(|(name, data)| {
                    NetworkInterfaceCounters::new(name.as_str(), data.total_received(), data.total_transmitted())
                })
                .collect();
            counters.sort_by(|a, b| a.name.cmp(&b.name));
            counters
        }

        fn acquire_filesystems(&self) -> Vec<FilesystemEntry> {
            mounted_filesystems(self.include_pseudo)
        }
    }
}
