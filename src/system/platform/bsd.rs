//! FreeBSD `sysctl` decoder.
//!
//! The `kinfo_proc`, `kern.cp_times` and VM counter decoding is kept free of
//! syscalls so it can be exercised on any host; the `sysctl` glue is only
//! compiled on FreeBSD.

use crate::system::process::{MemoryUsage, ProcessRecord, ProcessState};
use crate::system::snapshot::{BatteryReading, CoreSample, MemorySummary};

/// `P_SYSTEM` from `sys/proc.h`.
pub const P_SYSTEM: i64 = 0x0000_0200;

/// `CPUSTATES` rows per core in `kern.cp_times`: user, nice, sys, intr, idle.
pub const CPU_STATES: usize = 5;
const CP_IDLE: usize = 4;

const STATE_CODES: &[(u8, ProcessState)] = &[
    (1, ProcessState::Idle),     // SIDL
    (2, ProcessState::Running),  // SRUN
    (3, ProcessState::Sleeping), // SSLEEP
    (4, ProcessState::Stopped),  // SSTOP
    (5, ProcessState::Zombie),   // SZOMB
    (6, ProcessState::Waiting),  // SWAIT
    (7, ProcessState::Locked),   // SLOCK
];

pub fn state_from_code(code: u8) -> ProcessState {
    ProcessState::from_table(STATE_CODES, code)
}

/// The parts of a `kinfo_proc` a record is built from.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct KinfoFields {
    pub pid: u32,
    pub ppid: u32,
    pub tid: u32,
    pub uid: u32,
    pub nice: i32,
    pub priority: i32,
    pub state: u8,
    pub flags: i64,
    /// Microseconds of CPU time.
    pub runtime_us: u64,
    pub start_secs: u64,
    pub rss_pages: u64,
    pub virtual_bytes: u64,
    pub num_threads: u32,
    pub last_cpu: u32,
    pub comm: String,
    pub wait_message: String,
}

pub fn decode_kinfo(fields: &KinfoFields, now_secs: u64, page_size: u64) -> ProcessRecord {
    ProcessRecord {
        pid: fields.pid,
        ppid: fields.ppid,
        uid: fields.uid,
        nice: fields.nice,
        priority: fields.priority,
        processor: fields.last_cpu,
        num_threads: fields.num_threads,
        cpu_time_us: fields.runtime_us,
        start_time: fields.start_secs,
        run_time_secs: now_secs.saturating_sub(fields.start_secs),
        memory: MemoryUsage::new(
            fields.virtual_bytes,
            fields.rss_pages.saturating_mul(page_size),
            0,
        ),
        command: fields.comm.clone(),
        state: state_from_code(fields.state),
        wchan: Some(fields.wait_message.clone()).filter(|w| !w.is_empty()),
        is_kernel: fields.flags & P_SYSTEM != 0,
        ..Default::default()
    }
}

/// Thread records for one process. The kernel lists the main thread first
/// and it carries no distinguished id, so it is the one left out.
pub fn decode_threads(
    owner: u32,
    rows: &[KinfoFields],
    now_secs: u64,
    page_size: u64,
) -> Vec<ProcessRecord> {
    rows.iter()
        .skip(1)
        .map(|row| {
            let mut thread = decode_kinfo(row, now_secs, page_size);
            thread.pid = owner;
            thread.tid = row.tid;
            thread
        })
        .collect()
}

/// Split the flat `kern.cp_times` array into per-core samples.
pub fn decode_cp_times(ticks: &[u64]) -> Vec<CoreSample> {
    ticks
        .chunks_exact(CPU_STATES)
        .enumerate()
        .map(|(core, row)| {
            let total = row.iter().fold(0u64, |acc, t| acc.saturating_add(*t));
            CoreSample::new(core as u32, total, row[CP_IDLE])
        })
        .collect()
}

/// `vm.stats.vm.*` page counters plus `vfs.bufspace`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VmCounters {
    pub page_size: u64,
    pub page_count: u64,
    pub free_count: u64,
    pub active_count: u64,
    pub inactive_count: u64,
    pub wire_count: u64,
    pub buffer_bytes: u64,
}

pub fn decode_vm_counters(vm: &VmCounters, swap_total: u64, swap_used: u64) -> MemorySummary {
    let pages = |n: u64| n.saturating_mul(vm.page_size);
    MemorySummary {
        total_bytes: pages(vm.page_count),
        used_bytes: pages(vm.active_count.saturating_add(vm.wire_count)),
        cached_bytes: pages(vm.inactive_count),
        buffered_bytes: vm.buffer_bytes,
        shared_bytes: 0,
        swap_total_bytes: swap_total,
        swap_used_bytes: swap_used,
        fs_cache_bytes: None,
        gpu_pools: Vec::new(),
    }
}

/// `IK` sysctl temperatures are decikelvin; readings carry hundredths of a
/// degree Celsius.
pub fn decikelvin_to_centi_celsius(decikelvin: i64) -> i64 {
    (decikelvin - 2731) * 10
}

/// `hw.acpi.battery.life` is -1 when no battery is attached; the slot is
/// still reported so consumers see a stable list.
pub fn acpi_battery(life: i32, units: i32) -> Option<BatteryReading> {
    if units <= 0 && life < 0 {
        return None;
    }
    let present = life >= 0;
    Some(BatteryReading {
        name: "acpi".to_string(),
        percent: if present { life.min(100) as f32 } else { 0.0 },
        present,
        ..Default::default()
    })
}

#[cfg(target_os = "freebsd")]
pub use glue::BsdAccessor;

#[cfg(target_os = "freebsd")]
mod glue {
    use std::io;
    use std::mem;
    use std::ptr;
    use std::time::{SystemTime, UNIX_EPOCH};

    use sysinfo::{Networks, System};

    use super::*;
    use crate::system::error::AccessError;
    use crate::system::platform::statfs::mounted_filesystems;
    use crate::system::platform::{PlatformAccessor, decode_argv, fixed_cstr, page_size};
    use crate::system::process::ProcessFilter;
    use crate::system::snapshot::{FilesystemEntry, NetworkInterfaceCounters, SensorReading};

    const PROBE_LIMIT: u32 = 32_768;

    pub struct BsdAccessor {
        include_pseudo: bool,
    }

    impl Default for BsdAccessor {
        fn default() -> Self {
            Self::new()
        }
    }

    impl BsdAccessor {
        pub fn new() -> Self {
            BsdAccessor {
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

    fn fields(kp: &libc::kinfo_proc) -> KinfoFields {
        KinfoFields {
            pid: kp.ki_pid as u32,
            ppid: kp.ki_ppid as u32,
            tid: kp.ki_tid as u32,
            uid: kp.ki_uid,
            nice: i32::from(kp.ki_nice),
            priority: i32::from(kp.ki_pri.pri_level),
            state: kp.ki_stat as u8,
            flags: kp.ki_flag as i64,
            runtime_us: kp.ki_runtime,
            start_secs: kp.ki_start.tv_sec.max(0) as u64,
            rss_pages: kp.ki_rssize.max(0) as u64,
            virtual_bytes: kp.ki_size as u64,
            num_threads: kp.ki_numthreads.max(0) as u32,
            last_cpu: kp.ki_lastcpu.max(0) as u32,
            comm: text(&kp.ki_comm),
            wait_message: text(&kp.ki_wmesg),
        }
    }

    /// Read a sysctl into a vector of `T`, sizing the buffer first.
    fn sysctl_vec<T: Copy>(mib: &[libc::c_int]) -> io::Result<Vec<T>> {
        let mut size = 0usize;
        // SAFETY: a null old pointer asks only for the required size.
        let rc = unsafe {
            libc::sysctl(mib.as_ptr(), mib.len() as u32, ptr::null_mut(), &mut size, ptr::null(), 0)
        };
        if rc != 0 {
            return Err(io::Error::last_os_error());
        }
        // Leave headroom for entries created between the two calls.
        let capacity = size / mem::size_of::<T>() + 16;
        let mut buf: Vec<T> = Vec::with_capacity(capacity);
        let mut size = capacity * mem::size_of::<T>();
        // SAFETY: `buf` has room for `size` bytes; the kernel reports how
        // many it wrote.
        let rc = unsafe {
            libc::sysctl(
                mib.as_ptr(),
                mib.len() as u32,
                buf.as_mut_ptr().cast(),
                &mut size,
                ptr::null(),
                0,
            )
        };
        if rc != 0 {
            return Err(io::Error::last_os_error());
        }
        // SAFETY: the kernel initialised `size` bytes of whole `T` values.
        unsafe { buf.set_len(size / mem::size_of::<T>()) };
        Ok(buf)
    }

    fn sysctl_by_name<T: Copy + Default>(name: &str) -> Option<T> {
        sysctl_vec_by_name::<T>(name)?.first().copied()
    }

    fn sysctl_vec_by_name<T: Copy + Default>(name: &str) -> Option<Vec<T>> {
        let cname = std::ffi::CString::new(name).ok()?;
        let mut size = 0usize;
        // SAFETY: size probe with a null buffer.
        let rc = unsafe {
            libc::sysctlbyname(cname.as_ptr(), ptr::null_mut(), &mut size, ptr::null(), 0)
        };
        if rc != 0 || size == 0 {
            return None;
        }
        let mut buf = vec![T::default(); size.div_ceil(mem::size_of::<T>())];
        let mut size = buf.len() * mem::size_of::<T>();
        // SAFETY: `buf` is a writable region of `size` bytes.
        let rc = unsafe {
            libc::sysctlbyname(cname.as_ptr(), buf.as_mut_ptr().cast(), &mut size, ptr::null(), 0)
        };
        if rc != 0 {
            return None;
        }
        buf.truncate(size / mem::size_of::<T>());
        Some(buf)
    }

    fn kinfo_for_pid(pid: u32, with_threads: bool) -> io::Result<Vec<libc::kinfo_proc>> {
        let op = if with_threads {
            libc::KERN_PROC_PID | libc::KERN_PROC_INC_THREAD
        } else {
            libc::KERN_PROC_PID
        };
        sysctl_vec(&[libc::CTL_KERN, libc::KERN_PROC, op, pid as libc::c_int])
    }

    fn process_args(pid: u32) -> String {
        sysctl_vec::<u8>(&[libc::CTL_KERN, libc::KERN_PROC, libc::KERN_PROC_ARGS, pid as libc::c_int])
            .map(|raw| decode_argv(&raw, usize::MAX).join(" "))
            .unwrap_or_default()
    }

    fn all_kinfo() -> Vec<libc::kinfo_proc> {
        match sysctl_vec(&[libc::CTL_KERN, libc::KERN_PROC, libc::KERN_PROC_PROC, 0]) {
            Ok(table) => table,
            Err(err) => {
                tracing::warn!(%err, "process table sysctl failed, probing pid range");
                let limit = sysctl_by_name::<libc::c_int>("kern.pid_max")
                    .map(|max| (max.max(0) as u32).min(PROBE_LIMIT))
                    .unwrap_or(PROBE_LIMIT);
                (1..=limit)
                    .filter_map(|pid| kinfo_for_pid(pid, false).ok())
                    .flatten()
                    .collect()
            }
        }
    }

    impl PlatformAccessor for BsdAccessor {
        fn name(&self) -> &'static str {
            "freebsd-sysctl"
        }

        fn acquire_processes(&self, filter: &ProcessFilter) -> Vec<ProcessRecord> {
            #[cfg(feature = "perf-tracing")]
            let _span = tracing::debug_span!("platform.acquire_processes").entered();

            let now = now_secs();
            let page = page_size();
            all_kinfo()
                .iter()
                .map(|kp| {
                    let mut record = decode_kinfo(&fields(kp), now, page);
                    record.args = process_args(record.pid);
                    record
                })
                .filter(|record| filter.admits(record))
                .collect()
        }

        fn acquire_process(&self, pid: u32) -> Result<ProcessRecord, AccessError> {
            let rows = kinfo_for_pid(pid, false).map_err(|_| AccessError::NotFound { pid })?;
            let kp = rows.first().ok_or(AccessError::NotFound { pid })?;
            let mut record = decode_kinfo(&fields(kp), now_secs(), page_size());
            record.args = process_args(pid);
            record.threads = self.acquire_threads(pid).unwrap_or_default();
            Ok(record)
        }

        fn acquire_threads(&self, pid: u32) -> Result<Vec<ProcessRecord>, AccessError> {
            let rows = kinfo_for_pid(pid, true).map_err(|_| AccessError::NotFound { pid })?;
            if rows.is_empty() {
                return Err(AccessError::NotFound { pid });
            }
            let rows: Vec<KinfoFields> = rows.iter().map(fields).collect();
            Ok(decode_threads(pid, &rows, now_secs(), page_size()))
        }

        fn acquire_cpu_cores(&self) -> Vec<CoreSample> {
            match sysctl_vec_by_name::<libc::c_long>("kern.cp_times") {
                Some(raw) => {
                    let ticks: Vec<u64> = raw.iter().map(|&t| t.max(0) as u64).collect();
                    decode_cp_times(&ticks)
                }
                None => {
                    tracing::warn!("kern.cp_times unavailable");
                    Vec::new()
                }
            }
        }

        fn acquire_memory(&self) -> Result<MemorySummary, AccessError> {
            let counter = |name: &'static str| {
                sysctl_by_name::<libc::c_uint>(name)
                    .map(u64::from)
                    .ok_or(AccessError::parse("vm counters", name))
            };
            let vm = VmCounters {
                page_size: page_size(),
                page_count: counter("vm.stats.vm.v_page_count")?,
                free_count: counter("vm.stats.vm.v_free_count")?,
                active_count: counter("vm.stats.vm.v_active_count")?,
                inactive_count: counter("vm.stats.vm.v_inactive_count")?,
                wire_count: counter("vm.stats.vm.v_wire_count")?,
                buffer_bytes: sysctl_by_name::<libc::c_long>("vfs.bufspace")
                    .map(|b| b.max(0) as u64)
                    .unwrap_or(0),
            };
            let mut system = System::new();
            system.refresh_memory();
            let mut summary = decode_vm_counters(&vm, system.total_swap(), system.used_swap());
            summary.fs_cache_bytes = sysctl_by_name::<u64>("kstat.zfs.misc.arcstats.size");
            Ok(summary)
        }

        fn acquire_sensors(&self) -> Vec<SensorReading> {
            let cores = sysctl_by_name::<libc::c_int>("hw.ncpu").unwrap_or(0).max(0);
            let mut readings: Vec<SensorReading> = (0..cores)
                .map(|n| {
                    let raw = sysctl_by_name::<libc::c_int>(&format!("dev.cpu.{n}.temperature"));
                    SensorReading {
                        name: format!("cpu{n}"),
                        channel: None,
                        value: raw.map(|v| decikelvin_to_centi_celsius(i64::from(v))).unwrap_or(0),
                        valid: raw.is_some(),
                    }
                })
                .filter(|r| r.valid)
                .collect();
            for zone in 0.. {
                let Some(raw) =
                    sysctl_by_name::<libc::c_int>(&format!("hw.acpi.thermal.tz{zone}.temperature"))
                else {
                    break;
                };
                readings.push(SensorReading {
                    name: format!("tz{zone}"),
                    channel: None,
                    value: decikelvin_to_centi_celsius(i64::from(raw)),
                    valid: true,
                });
            }
            readings
        }

        fn acquire_batteries(&self) -> Vec<BatteryReading> {
            let life = sysctl_by_name::<libc::c_int>("hw.acpi.battery.life").unwrap_or(-1);
            let units = sysctl_by_name::<libc::c_int>("hw.acpi.battery.units").unwrap_or(0);
            acpi_battery(life, units).into_iter().collect()
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

#[cfg(test)]
mod tests {
    use super::*;

    fn kinfo(pid: u32) -> KinfoFields {
        KinfoFields {
            pid,
            ppid: 1,
            uid: 1001,
            nice: 5,
            priority: 120,
            state: 3,
            runtime_us: 2_500_000,
            start_secs: 1_000,
            rss_pages: 10,
            virtual_bytes: 1 << 20,
            num_threads: 3,
            last_cpu: 2,
            comm: "sshd".into(),
            wait_message: "select".into(),
            ..Default::default()
        }
    }

    #[test]
    fn kinfo_decodes_units() {
        let record = decode_kinfo(&kinfo(500), 1_600, 4096);
        assert_eq!(record.pid, 500);
        assert_eq!(record.cpu_time_us, 2_500_000);
        assert_eq!(record.run_time_secs, 600);
        assert_eq!(record.memory.resident_bytes, 40_960);
        assert_eq!(record.state, ProcessState::Sleeping);
        assert_eq!(record.wchan.as_deref(), Some("select"));
        assert!(!record.is_kernel);
    }

    #[test]
    fn system_flag_marks_kernel_process() {
        let mut fields = kinfo(0);
        fields.flags = P_SYSTEM | 0x4;
        assert!(decode_kinfo(&fields, 0, 4096).is_kernel);
    }

    #[test]
    fn state_table_covers_lock_and_wait() {
        assert_eq!(state_from_code(6), ProcessState::Waiting);
        assert_eq!(state_from_code(7), ProcessState::Locked);
        assert_eq!(state_from_code(0), ProcessState::Unknown);
    }

    #[test]
    fn threads_skip_main_thread() {
        let mut rows = vec![kinfo(42), kinfo(42), kinfo(42)];
        rows[0].tid = 100_001;
        rows[1].tid = 100_002;
        rows[2].tid = 100_003;
        let threads = decode_threads(42, &rows, 2_000, 4096);
        let tids: Vec<u32> = threads.iter().map(|t| t.tid).collect();
        assert_eq!(tids, vec![100_002, 100_003]);
        assert!(threads.iter().all(|t| t.pid == 42));
    }

    #[test]
    fn cp_times_split_per_core() {
        let ticks = [10, 0, 5, 0, 85, 20, 0, 10, 0, 70];
        let cores = decode_cp_times(&ticks);
        assert_eq!(cores, vec![CoreSample::new(0, 100, 85), CoreSample::new(1, 100, 70)]);
    }

    #[test]
    fn cp_times_ignores_partial_row() {
        assert_eq!(decode_cp_times(&[1, 2, 3]).len(), 0);
    }

    #[test]
    fn vm_counters_to_bytes() {
        let vm = VmCounters {
            page_size: 4096,
            page_count: 1000,
            free_count: 100,
            active_count: 300,
            inactive_count: 200,
            wire_count: 150,
            buffer_bytes: 8192,
        };
        let summary = decode_vm_counters(&vm, 1 << 30, 1 << 20);
        assert_eq!(summary.total_bytes, 4_096_000);
        assert_eq!(summary.used_bytes, 450 * 4096);
        assert_eq!(summary.cached_bytes, 200 * 4096);
        assert_eq!(summary.buffered_bytes, 8192);
        assert_eq!(summary.swap_used_bytes, 1 << 20);
    }

    #[test]
    fn decikelvin_conversion() {
        assert_eq!(decikelvin_to_centi_celsius(3231), 5000);
        assert_eq!(decikelvin_to_centi_celsius(2731), 0);
    }

    #[test]
    fn absent_battery_keeps_a_slot() {
        let reading = acpi_battery(-1, 1).unwrap();
        assert!(!reading.present);
        assert_eq!(acpi_battery(87, 1).unwrap().percent, 87.0);
        assert!(acpi_battery(-1, 0).is_none());
    }
}
