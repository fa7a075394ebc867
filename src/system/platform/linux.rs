//! `/proc` and `/sys` decoder.
//!
//! All text parsing lives in free functions that take file contents, so the
//! accessor itself only decides which files to read. Roots are configurable
//! so the same code runs against fixture trees.

use std::collections::{HashMap, HashSet};
use std::ffi::CString;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use super::statfs::{StatfsFields, usage_entry};
use super::{AccessorOptions, PlatformAccessor, clock_ticks, decode_argv, page_size, ticks_to_micros};
use crate::system::error::AccessError;
use crate::system::process::{MemoryUsage, ProcessFilter, ProcessRecord, ProcessState};
use crate::system::snapshot::{
    BatteryReading, CoreSample, FilesystemEntry, GpuMemoryPool, MemorySummary,
    NetworkInterfaceCounters, SensorReading,
};

/// `PF_KTHREAD` from `include/linux/sched.h`.
const PF_KTHREAD: u64 = 0x0020_0000;

const DEFAULT_PROBE_LIMIT: u32 = 32_768;

const STATE_CODES: &[(u8, ProcessState)] = &[
    (b'R', ProcessState::Running),
    (b'S', ProcessState::Sleeping),
    (b'D', ProcessState::Waiting),
    (b'W', ProcessState::Waiting),
    (b'T', ProcessState::Stopped),
    (b't', ProcessState::Stopped),
    (b'Z', ProcessState::Zombie),
    (b'X', ProcessState::Dead),
    (b'x', ProcessState::Dead),
    (b'K', ProcessState::Dead),
    (b'I', ProcessState::Idle),
    (b'P', ProcessState::Idle),
];

pub fn state_from_code(code: u8) -> ProcessState {
    ProcessState::from_table(STATE_CODES, code)
}

pub struct ProcFs {
    proc_root: PathBuf,
    sys_root: PathBuf,
    page_size: u64,
    ticks_per_second: u64,
    include_pseudo: bool,
    probe_limit: u32,
}

impl Default for ProcFs {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcFs {
    pub fn new() -> Self {
        Self::with_roots("/proc", "/sys")
    }

    pub fn with_roots(proc_root: impl Into<PathBuf>, sys_root: impl Into<PathBuf>) -> Self {
        ProcFs {
            proc_root: proc_root.into(),
            sys_root: sys_root.into(),
            page_size: page_size(),
            ticks_per_second: clock_ticks(),
            include_pseudo: AccessorOptions::default().include_pseudo_filesystems,
            probe_limit: DEFAULT_PROBE_LIMIT,
        }
    }

    /// Override the page size and tick rate, mainly for fixture trees.
    pub fn with_units(mut self, page_size: u64, ticks_per_second: u64) -> Self {
        self.page_size = page_size;
        self.ticks_per_second = ticks_per_second;
        self
    }

    pub fn with_pseudo_filesystems(mut self, include: bool) -> Self {
        self.include_pseudo = include;
        self
    }

    pub fn with_probe_limit(mut self, limit: u32) -> Self {
        self.probe_limit = limit;
        self
    }

    fn clock(&self) -> BootClock {
        let boot_time = fs::read_to_string(self.proc_root.join("stat"))
            .ok()
            .and_then(|s| parse_boot_time(&s))
            .unwrap_or(0);
        let uptime_secs = fs::read_to_string(self.proc_root.join("uptime"))
            .ok()
            .and_then(|s| parse_uptime(&s))
            .unwrap_or(0.0);
        BootClock {
            boot_time,
            uptime_secs,
        }
    }

    fn list_pids(&self) -> io::Result<Vec<u32>> {
        let mut pids: Vec<u32> = fs::read_dir(&self.proc_root)?
            .flatten()
            .filter_map(|entry| entry.file_name().to_str()?.parse().ok())
            .collect();
        pids.sort_unstable();
        Ok(pids)
    }

    /// Fallback discovery: probe each pid up to `kernel.pid_max`.
    fn probe_pids(&self) -> Vec<u32> {
        let pid_max = fs::read_to_string(self.proc_root.join("sys/kernel/pid_max"))
            .ok()
            .and_then(|s| s.trim().parse::<u32>().ok())
            .unwrap_or(self.probe_limit);
        let limit = pid_max.min(self.probe_limit);
        (1..=limit)
            .filter(|pid| self.proc_root.join(pid.to_string()).join("stat").is_file())
            .collect()
    }

    fn read_task(&self, dir: &Path, owner: u32, tid: u32, clock: &BootClock) -> Result<ProcessRecord, AccessError> {
        let stat_path = dir.join("stat");
        let content = read_entity(&stat_path, owner)?;
        let stat = parse_stat(&content).ok_or_else(|| AccessError::parse("stat", stat_path.display().to_string()))?;

        let statm = fs::read_to_string(dir.join("statm"))
            .ok()
            .and_then(|s| parse_statm(&s));
        let uid = fs::read_to_string(dir.join("status"))
            .ok()
            .and_then(|s| parse_status_uid(&s))
            .unwrap_or(0);
        let args = fs::read(dir.join("cmdline"))
            .map(|raw| decode_argv(&raw, usize::MAX).join(" "))
            .unwrap_or_default();
        let wchan = fs::read_to_string(dir.join("wchan"))
            .ok()
            .map(|w| w.trim().to_string())
            .filter(|w| !w.is_empty() && w != "0");
        let open_files = count_entries(&dir.join("fd"));

        let mut record = decode_record(
            &stat,
            statm.as_ref(),
            clock,
            self.page_size,
            self.ticks_per_second,
        );
        record.uid = uid;
        record.args = args;
        record.wchan = wchan;
        record.open_files = open_files;
        if tid != 0 {
            record.pid = owner;
            record.tid = tid;
        }
        Ok(record)
    }

    fn read_threads(&self, pid: u32, clock: &BootClock) -> Result<Vec<ProcessRecord>, AccessError> {
        let task_dir = self.proc_root.join(pid.to_string()).join("task");
        let entries = fs::read_dir(&task_dir).map_err(|err| match err.kind() {
            io::ErrorKind::NotFound => AccessError::NotFound { pid },
            _ => AccessError::io(&task_dir, err),
        })?;

        let mut tids: Vec<u32> = entries
            .flatten()
            .filter_map(|e| e.file_name().to_str()?.parse().ok())
            .filter(|tid| *tid != pid)
            .collect();
        tids.sort_unstable();

        let mut threads = Vec::with_capacity(tids.len());
        for tid in tids {
            match self.read_task(&task_dir.join(tid.to_string()), pid, tid, clock) {
                Ok(thread) => threads.push(thread),
                Err(err) => tracing::trace!(pid, tid, %err, "skipping thread"),
            }
        }
        Ok(threads)
    }

    fn gpu_pools(&self) -> Vec<GpuMemoryPool> {
        let drm = self.sys_root.join("class/drm");
        let Ok(entries) = fs::read_dir(&drm) else {
            return Vec::new();
        };
        let mut pools: Vec<GpuMemoryPool> = entries
            .flatten()
            .filter_map(|entry| {
                let name = entry.file_name().to_str()?.to_string();
                let index = name.strip_prefix("card")?;
                if index.is_empty() || !index.bytes().all(|b| b.is_ascii_digit()) {
                    return None;
                }
                let device = entry.path().join("device");
                let total = read_u64(&device.join("mem_info_vram_total"))?;
                let used = read_u64(&device.join("mem_info_vram_used")).unwrap_or(0);
                Some(GpuMemoryPool {
                    name,
                    total_bytes: total,
                    used_bytes: used,
                })
            })
            .collect();
        pools.sort_by(|a, b| a.name.cmp(&b.name));
        pools
    }

    fn hwmon_readings(&self, chip_dir: &Path) -> Vec<SensorReading> {
        let chip = fs::read_to_string(chip_dir.join("name"))
            .map(|s| s.trim().to_string())
            .unwrap_or_else(|_| {
                chip_dir
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default()
            });
        let Ok(entries) = fs::read_dir(chip_dir) else {
            return Vec::new();
        };
        let mut inputs: Vec<String> = entries
            .flatten()
            .filter_map(|e| e.file_name().to_str().map(str::to_string))
            .filter(|name| {
                name.ends_with("_input") && (name.starts_with("temp") || name.starts_with("fan"))
            })
            .collect();
        inputs.sort();

        inputs
            .into_iter()
            .map(|input| {
                let channel_id = input.trim_end_matches("_input");
                let label = fs::read_to_string(chip_dir.join(format!("{channel_id}_label")))
                    .map(|s| s.trim().to_string())
                    .unwrap_or_else(|_| channel_id.to_string());
                let raw = fs::read_to_string(chip_dir.join(&input))
                    .ok()
                    .and_then(|s| s.trim().parse::<i64>().ok());
                let is_thermal = channel_id.starts_with("temp");
                SensorReading {
                    name: chip.clone(),
                    channel: Some(label),
                    // hwmon reports millidegrees; readings carry hundredths.
                    value: raw.map(|v| if is_thermal { v / 10 } else { v }).unwrap_or(0),
                    valid: raw.is_some(),
                }
            })
            .collect()
    }

    fn statfs(&self, mount_point: &str) -> Option<StatfsFields> {
        let path = CString::new(mount_point).ok()?;
        // SAFETY: `buf` is a plain-old-data struct the kernel fills in;
        // `path` is a valid NUL-terminated string for the duration of the call.
        let mut buf: libc::statfs = unsafe { std::mem::zeroed() };
        let rc = unsafe { libc::statfs(path.as_ptr(), &mut buf) };
        if rc != 0 {
            return None;
        }
        let block_size = if buf.f_frsize > 0 {
            buf.f_frsize as u64
        } else {
            buf.f_bsize as u64
        };
        Some(StatfsFields {
            type_code: buf.f_type as u64,
            blocks: buf.f_blocks as u64,
            free_blocks: buf.f_bfree as u64,
            block_size,
        })
    }
}

impl PlatformAccessor for ProcFs {
    fn name(&self) -> &'static str {
        "linux-procfs"
    }

    fn acquire_processes(&self, filter: &ProcessFilter) -> Vec<ProcessRecord> {
        #[cfg(feature = "perf-tracing")]
        let _span = tracing::debug_span!("platform.acquire_processes").entered();

        let clock = self.clock();
        let pids = match self.list_pids() {
            Ok(pids) => pids,
            Err(err) => {
                tracing::warn!(root = %self.proc_root.display(), %err, "pid listing failed, probing pid range");
                self.probe_pids()
            }
        };

        let mut records = Vec::with_capacity(pids.len());
        for pid in pids {
            match self.read_task(&self.proc_root.join(pid.to_string()), pid, 0, &clock) {
                Ok(record) if filter.admits(&record) => records.push(record),
                Ok(_) => {}
                Err(err) => tracing::trace!(pid, %err, "skipping process"),
            }
        }
        records
    }

    fn acquire_process(&self, pid: u32) -> Result<ProcessRecord, AccessError> {
        let clock = self.clock();
        let mut record = self.read_task(&self.proc_root.join(pid.to_string()), pid, 0, &clock)?;
        record.threads = self.read_threads(pid, &clock).unwrap_or_default();
        Ok(record)
    }

    fn acquire_threads(&self, pid: u32) -> Result<Vec<ProcessRecord>, AccessError> {
        self.read_threads(pid, &self.clock())
    }

    fn acquire_cpu_cores(&self) -> Vec<CoreSample> {
        match fs::read_to_string(self.proc_root.join("stat")) {
            Ok(content) => parse_cpu_lines(&content),
            Err(err) => {
                tracing::warn!(%err, "cannot read cpu counters");
                Vec::new()
            }
        }
    }

    fn acquire_memory(&self) -> Result<MemorySummary, AccessError> {
        let path = self.proc_root.join("meminfo");
        let content = fs::read_to_string(&path).map_err(|err| AccessError::io(&path, err))?;
        let mut summary = parse_meminfo(&content)?;
        summary.fs_cache_bytes = fs::read_to_string(self.proc_root.join("spl/kstat/zfs/arcstats"))
            .ok()
            .and_then(|s| parse_arc_size(&s));
        summary.gpu_pools = self.gpu_pools();
        Ok(summary)
    }

    fn acquire_sensors(&self) -> Vec<SensorReading> {
        let hwmon = self.sys_root.join("class/hwmon");
        let Ok(entries) = fs::read_dir(&hwmon) else {
            return Vec::new();
        };
        let mut chips: Vec<PathBuf> = entries.flatten().map(|e| e.path()).collect();
        chips.sort();
        chips.iter().flat_map(|chip| self.hwmon_readings(chip)).collect()
    }

    fn acquire_batteries(&self) -> Vec<BatteryReading> {
        let supplies = self.sys_root.join("class/power_supply");
        let Ok(entries) = fs::read_dir(&supplies) else {
            return Vec::new();
        };
        let mut batteries: Vec<BatteryReading> = entries
            .flatten()
            .filter_map(|entry| {
                let dir = entry.path();
                let kind = fs::read_to_string(dir.join("type")).ok()?;
                if kind.trim() != "Battery" {
                    return None;
                }
                Some(read_battery(&entry.file_name().to_string_lossy(), &dir))
            })
            .collect();
        batteries.sort_by(|a, b| a.name.cmp(&b.name));
        batteries
    }

    fn acquire_network_interfaces(&self) -> Vec<NetworkInterfaceCounters> {
        match fs::read_to_string(self.proc_root.join("net/dev")) {
            Ok(content) => parse_net_dev(&content),
            Err(err) => {
                tracing::warn!(%err, "cannot read interface counters");
                Vec::new()
            }
        }
    }

    fn acquire_filesystems(&self) -> Vec<FilesystemEntry> {
        let mounts = match fs::read_to_string(self.proc_root.join("mounts")) {
            Ok(content) => parse_mounts(&content),
            Err(err) => {
                tracing::warn!(%err, "cannot read mount table");
                return Vec::new();
            }
        };
        let nodev = fs::read_to_string(self.proc_root.join("filesystems"))
            .map(|s| parse_nodev_types(&s))
            .unwrap_or_default();

        visible_mounts(mounts)
            .into_iter()
            .filter(|m| self.include_pseudo || !nodev.contains(&m.fs_type))
            .filter_map(|m| {
                let fields = self.statfs(&m.mount_point)?;
                usage_entry(m.mount_point, m.source, m.fs_type, fields)
            })
            .collect()
    }
}

fn read_battery(name: &str, dir: &Path) -> BatteryReading {
    let text = |file: &str| {
        fs::read_to_string(dir.join(file))
            .map(|s| s.trim().to_string())
            .unwrap_or_default()
    };
    let number = |a: &str, b: &str| read_u64(&dir.join(a)).or_else(|| read_u64(&dir.join(b)));

    let present = read_u64(&dir.join("present")).map(|v| v != 0).unwrap_or(true);
    let full_capacity = number("energy_full", "charge_full").unwrap_or(0);
    let current_charge = number("energy_now", "charge_now").unwrap_or(0);
    let percent = match read_u64(&dir.join("capacity")) {
        Some(pct) => pct as f32,
        None if full_capacity > 0 => (100.0 * current_charge as f64 / full_capacity as f64) as f32,
        None => 0.0,
    };
    BatteryReading {
        name: name.to_string(),
        vendor: text("manufacturer"),
        model: text("model_name"),
        full_capacity,
        current_charge,
        percent,
        present,
    }
}

/// Read a per-process file, reporting a vanished process as `NotFound`.
fn read_entity(path: &Path, pid: u32) -> Result<String, AccessError> {
    fs::read_to_string(path).map_err(|err| match err.kind() {
        io::ErrorKind::NotFound => AccessError::NotFound { pid },
        _ if err.raw_os_error() == Some(libc::ESRCH) => AccessError::NotFound { pid },
        _ => AccessError::io(path, err),
    })
}

fn read_u64(path: &Path) -> Option<u64> {
    fs::read_to_string(path).ok()?.trim().parse().ok()
}

fn count_entries(dir: &Path) -> u32 {
    fs::read_dir(dir)
        .map(|entries| entries.flatten().count() as u32)
        .unwrap_or(0)
}

#[derive(Debug, Clone, Copy, Default)]
pub struct BootClock {
    /// Seconds since the epoch at boot.
    pub boot_time: u64,
    pub uptime_secs: f64,
}

/// Fields of `/proc/<pid>/stat` the record needs.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StatLine {
    pub pid: u32,
    pub comm: String,
    pub state: u8,
    pub ppid: u32,
    pub flags: u64,
    pub utime: u64,
    pub stime: u64,
    pub priority: i64,
    pub nice: i64,
    pub num_threads: u32,
    pub starttime: u64,
    pub vsize: u64,
    pub rss_pages: u64,
    pub processor: u32,
}

pub fn parse_stat(content: &str) -> Option<StatLine> {
    // comm may contain spaces and parentheses; it ends at the last ')'.
    let open = content.find('(')?;
    let close = content.rfind(')')?;
    if close < open {
        return None;
    }
    let pid = content[..open].trim().parse().ok()?;
    let comm = content[open + 1..close].to_string();
    let fields: Vec<&str> = content[close + 1..].split_whitespace().collect();
    let num = |i: usize| -> Option<u64> { fields.get(i)?.parse().ok() };
    let signed = |i: usize| -> Option<i64> { fields.get(i)?.parse().ok() };

    Some(StatLine {
        pid,
        comm,
        state: *fields.first()?.as_bytes().first()?,
        ppid: num(1)? as u32,
        flags: num(6)?,
        utime: num(11)?,
        stime: num(12)?,
        priority: signed(15)?,
        nice: signed(16)?,
        num_threads: num(17)? as u32,
        starttime: num(19)?,
        vsize: num(20)?,
        rss_pages: signed(21)?.max(0) as u64,
        processor: num(36).unwrap_or(0) as u32,
    })
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Statm {
    pub size: u64,
    pub resident: u64,
    pub shared: u64,
}

pub fn parse_statm(content: &str) -> Option<Statm> {
    let mut it = content.split_whitespace().map(|f| f.parse::<u64>());
    Some(Statm {
        size: it.next()?.ok()?,
        resident: it.next()?.ok()?,
        shared: it.next()?.ok()?,
    })
}

/// Real uid from the `Uid:` row of `/proc/<pid>/status`.
pub fn parse_status_uid(content: &str) -> Option<u32> {
    content
        .lines()
        .find_map(|line| line.strip_prefix("Uid:"))
        .and_then(|rest| rest.split_whitespace().next())
        .and_then(|uid| uid.parse().ok())
}

pub fn decode_record(
    stat: &StatLine,
    statm: Option<&Statm>,
    clock: &BootClock,
    page_size: u64,
    ticks_per_second: u64,
) -> ProcessRecord {
    let started_after_boot = if ticks_per_second == 0 {
        0
    } else {
        stat.starttime / ticks_per_second
    };
    let memory = match statm {
        Some(m) => MemoryUsage::new(
            stat.vsize,
            m.resident.saturating_mul(page_size),
            m.shared.saturating_mul(page_size),
        ),
        None => MemoryUsage::new(stat.vsize, stat.rss_pages.saturating_mul(page_size), 0),
    };

    ProcessRecord {
        pid: stat.pid,
        ppid: stat.ppid,
        nice: stat.nice as i32,
        priority: stat.priority as i32,
        processor: stat.processor,
        num_threads: stat.num_threads,
        cpu_time_us: ticks_to_micros(stat.utime.saturating_add(stat.stime), ticks_per_second),
        start_time: clock.boot_time.saturating_add(started_after_boot),
        run_time_secs: (clock.uptime_secs as u64).saturating_sub(started_after_boot),
        memory,
        command: stat.comm.clone(),
        state: state_from_code(stat.state),
        is_kernel: stat.flags & PF_KTHREAD != 0,
        ..Default::default()
    }
}

/// Per-core rows of `/proc/stat`; the aggregate `cpu` row is skipped.
pub fn parse_cpu_lines(content: &str) -> Vec<CoreSample> {
    content
        .lines()
        .filter_map(|line| {
            let mut fields = line.split_whitespace();
            let label = fields.next()?;
            let core_id: u32 = label.strip_prefix("cpu")?.parse().ok()?;
            let ticks: Vec<u64> = fields.take(8).filter_map(|f| f.parse().ok()).collect();
            if ticks.len() < 4 {
                return None;
            }
            let total = ticks.iter().fold(0u64, |acc, t| acc.saturating_add(*t));
            let idle = ticks[3].saturating_add(ticks.get(4).copied().unwrap_or(0));
            Some(CoreSample::new(core_id, total, idle))
        })
        .collect()
}

pub fn parse_boot_time(content: &str) -> Option<u64> {
    content
        .lines()
        .find_map(|line| line.strip_prefix("btime"))
        .and_then(|v| v.trim().parse().ok())
}

pub fn parse_uptime(content: &str) -> Option<f64> {
    content.split_whitespace().next()?.parse().ok()
}

pub fn parse_meminfo(content: &str) -> Result<MemorySummary, AccessError> {
    let kb: HashMap<&str, u64> = content
        .lines()
        .filter_map(|line| {
            let (key, rest) = line.split_once(':')?;
            let value = rest.split_whitespace().next()?.parse().ok()?;
            Some((key.trim(), value))
        })
        .collect();
    let get = |key: &str| kb.get(key).copied().unwrap_or(0).saturating_mul(1024);

    let total = kb
        .get("MemTotal")
        .copied()
        .ok_or_else(|| AccessError::parse("meminfo", "missing MemTotal"))?
        .saturating_mul(1024);
    let free = get("MemFree");
    let buffers = get("Buffers");
    let shared = get("Shmem");
    let cached = get("Cached")
        .saturating_add(get("SReclaimable"))
        .saturating_sub(shared);
    let swap_total = get("SwapTotal");

    Ok(MemorySummary {
        total_bytes: total,
        used_bytes: total
            .saturating_sub(free)
            .saturating_sub(buffers)
            .saturating_sub(cached),
        cached_bytes: cached,
        buffered_bytes: buffers,
        shared_bytes: shared,
        swap_total_bytes: swap_total,
        swap_used_bytes: swap_total.saturating_sub(get("SwapFree")),
        fs_cache_bytes: None,
        gpu_pools: Vec::new(),
    })
}

/// ARC size from `/proc/spl/kstat/zfs/arcstats` (`name type data` rows).
pub fn parse_arc_size(content: &str) -> Option<u64> {
    content.lines().find_map(|line| {
        let mut fields = line.split_whitespace();
        if fields.next()? != "size" {
            return None;
        }
        fields.nth(1)?.parse().ok()
    })
}

pub fn parse_net_dev(content: &str) -> Vec<NetworkInterfaceCounters> {
    content
        .lines()
        .filter_map(|line| {
            let (name, rest) = line.split_once(':')?;
            let fields: Vec<u64> = rest
                .split_whitespace()
                .map(|f| f.parse().ok())
                .collect::<Option<Vec<u64>>>()?;
            if fields.len() < 9 {
                return None;
            }
            Some(NetworkInterfaceCounters::new(name.trim(), fields[0], fields[8]))
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountLine {
    pub source: String,
    pub mount_point: String,
    pub fs_type: String,
}

pub fn parse_mounts(content: &str) -> Vec<MountLine> {
    content
        .lines()
        .filter_map(|line| {
            let mut fields = line.split_whitespace();
            Some(MountLine {
                source: unescape_mount_field(fields.next()?),
                mount_point: unescape_mount_field(fields.next()?),
                fs_type: fields.next()?.to_string(),
            })
        })
        .collect()
}

/// One row per mount point: the last one listed, which is the filesystem
/// `statfs` actually sees when mounts are stacked.
pub fn visible_mounts(mounts: Vec<MountLine>) -> Vec<MountLine> {
    let mut seen = HashSet::new();
    let mut visible: Vec<MountLine> = mounts
        .into_iter()
        .rev()
        .filter(|m| seen.insert(m.mount_point.clone()))
        .collect();
    visible.reverse();
    visible
}

/// The kernel escapes space, tab, newline and backslash as `\ooo`.
fn unescape_mount_field(field: &str) -> String {
    let bytes = field.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'\\'
            && i + 3 < bytes.len()
            && bytes[i + 1..i + 4].iter().all(|b| (b'0'..=b'7').contains(b))
        {
            let value = bytes[i + 1..i + 4]
                .iter()
                .fold(0u32, |acc, b| acc * 8 + u32::from(b - b'0'));
            out.push(value as u8);
            i += 4;
        } else {
            out.push(bytes[i]);
            i += 1;
        }
    }
    String::from_utf8_lossy(&out).into_owned()
}

pub fn parse_nodev_types(content: &str) -> HashSet<String> {
    content
        .lines()
        .filter_map(|line| line.strip_prefix("nodev"))
        .map(|rest| rest.trim().to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const SYSTEMD_STAT: &str = "1 (systemd) S 0 1 1 0 -1 4194560 12345 678 90 12 150 250 10 20 20 0 1 0 500 170000000 3000 18446744073709551615 1 1 0 0 0 0 671173123 4096 1260 0 0 0 17 3 0 0 0 0 0";

    #[test]
    fn stat_fields_by_position() {
        let stat = parse_stat(SYSTEMD_STAT).unwrap();
        assert_eq!(stat.pid, 1);
        assert_eq!(stat.comm, "systemd");
        assert_eq!(stat.state, b'S');
        assert_eq!(stat.ppid, 0);
        assert_eq!(stat.utime, 150);
        assert_eq!(stat.stime, 250);
        assert_eq!(stat.priority, 20);
        assert_eq!(stat.nice, 0);
        assert_eq!(stat.num_threads, 1);
        assert_eq!(stat.starttime, 500);
        assert_eq!(stat.vsize, 170_000_000);
        assert_eq!(stat.rss_pages, 3000);
        assert_eq!(stat.processor, 3);
    }

    #[test]
    fn stat_comm_with_parens_and_spaces() {
        let line = "77 (tmux: server) (x)) R 1 77 77 0 -1 0 0 0 0 0 5 5 0 0 20 0 1 0 100 1000 10";
        let stat = parse_stat(line).unwrap();
        assert_eq!(stat.comm, "tmux: server) (x)");
        assert_eq!(stat.state, b'R');
        assert_eq!(stat.processor, 0);
    }

    #[test]
    fn truncated_stat_is_rejected() {
        assert!(parse_stat("12 (sh) S 1 12").is_none());
        assert!(parse_stat("garbage").is_none());
    }

    #[test]
    fn decode_converts_units() {
        let stat = parse_stat(SYSTEMD_STAT).unwrap();
        let statm = Statm {
            size: 41_504,
            resident: 3000,
            shared: 1000,
        };
        let clock = BootClock {
            boot_time: 1_700_000_000,
            uptime_secs: 3600.5,
        };
        let record = decode_record(&stat, Some(&statm), &clock, 4096, 100);
        assert_eq!(record.cpu_time_us, 4_000_000);
        assert_eq!(record.start_time, 1_700_000_005);
        assert_eq!(record.run_time_secs, 3595);
        assert_eq!(record.memory.resident_bytes, 3000 * 4096);
        assert_eq!(record.memory.shared_bytes, 1000 * 4096);
        assert_eq!(record.memory.private_bytes, 2000 * 4096);
        assert_eq!(record.state, ProcessState::Sleeping);
        assert!(!record.is_kernel);
    }

    #[test]
    fn kthread_flag_marks_kernel_threads() {
        let line = "2 (kthreadd) S 0 0 0 0 -1 2129984 0 0 0 0 0 0 0 0 20 0 1 0 2 0 0";
        let record = decode_record(&parse_stat(line).unwrap(), None, &BootClock::default(), 4096, 100);
        assert!(record.is_kernel);
    }

    #[test]
    fn state_codes_map_to_vocabulary() {
        assert_eq!(state_from_code(b'D'), ProcessState::Waiting);
        assert_eq!(state_from_code(b'I'), ProcessState::Idle);
        assert_eq!(state_from_code(b'Z'), ProcessState::Zombie);
        assert_eq!(state_from_code(b'?'), ProcessState::Unknown);
    }

    #[test]
    fn status_uid_is_real_uid() {
        let status = "Name:\tbash\nUmask:\t0022\nUid:\t1000\t1001\t1002\t1003\nGid:\t100\n";
        assert_eq!(parse_status_uid(status), Some(1000));
        assert_eq!(parse_status_uid("Name:\tbash\n"), None);
    }

    #[test]
    fn cpu_lines_keep_kernel_core_ids() {
        let content = "cpu  10 0 10 80 0 0 0 0 0 0\n\
                       cpu0 5 0 5 40 0 0 0 0 0 0\n\
                       cpu2 5 0 5 30 10 0 0 0 0 0\n\
                       intr 12345\n\
                       btime 1700000000\n";
        let cores = parse_cpu_lines(content);
        assert_eq!(cores.len(), 2);
        assert_eq!(cores[0], CoreSample::new(0, 50, 40));
        assert_eq!(cores[1], CoreSample::new(2, 50, 40));
        assert_eq!(parse_boot_time(content), Some(1_700_000_000));
    }

    #[test]
    fn meminfo_derives_used_and_cached() {
        let content = "MemTotal:       16000 kB\n\
                       MemFree:         4000 kB\n\
                       Buffers:         1000 kB\n\
                       Cached:          3000 kB\n\
                       SReclaimable:     500 kB\n\
                       Shmem:            200 kB\n\
                       SwapTotal:       2000 kB\n\
                       SwapFree:        1500 kB\n";
        let mem = parse_meminfo(content).unwrap();
        assert_eq!(mem.total_bytes, 16000 * 1024);
        assert_eq!(mem.cached_bytes, 3300 * 1024);
        assert_eq!(mem.used_bytes, (16000 - 4000 - 1000 - 3300) * 1024);
        assert_eq!(mem.shared_bytes, 200 * 1024);
        assert_eq!(mem.swap_used_bytes, 500 * 1024);
        assert!(parse_meminfo("MemFree: 1 kB\n").is_err());
    }

    #[test]
    fn arc_size_row() {
        let content = "13 1 0x01 96 26112 1\nname type data\nhits 4 100\nsize 4 8589934592\n";
        assert_eq!(parse_arc_size(content), Some(8_589_934_592));
    }

    #[test]
    fn net_dev_rows() {
        let content = "Inter-|   Receive                                                |  Transmit\n \
                       face |bytes    packets errs drop fifo frame compressed multicast|bytes    packets errs drop fifo colls carrier compressed\n    \
                       lo: 1000 10 0 0 0 0 0 0 1000 10 0 0 0 0 0 0\n  \
                       eth0: 123456 99 0 0 0 0 0 0 654321 88 0 0 0 0 0 0\n";
        let ifaces = parse_net_dev(content);
        assert_eq!(ifaces.len(), 2);
        assert_eq!(ifaces[1].name, "eth0");
        assert_eq!(ifaces[1].bytes_in, 123_456);
        assert_eq!(ifaces[1].bytes_out, 654_321);
    }

    #[test]
    fn mounts_unescape_octal() {
        let content = "/dev/sda1 / ext4 rw,relatime 0 0\n\
                       /dev/sdb1 /media/usb\\040stick vfat rw 0 0\n";
        let mounts = parse_mounts(content);
        assert_eq!(mounts[1].mount_point, "/media/usb stick");
        assert_eq!(mounts[1].fs_type, "vfat");
    }

    #[test]
    fn stacked_mount_reports_the_top_filesystem() {
        let content = "/dev/sda1 / ext4 rw 0 0\n\
                       /dev/sda2 /data ext4 rw 0 0\n\
                       tmpfs /tmp tmpfs rw 0 0\n\
                       /dev/sdc1 /data xfs rw 0 0\n";
        let visible = visible_mounts(parse_mounts(content));
        let points: Vec<&str> = visible.iter().map(|m| m.mount_point.as_str()).collect();
        assert_eq!(points, vec!["/", "/tmp", "/data"]);
        assert_eq!(visible[2].source, "/dev/sdc1");
        assert_eq!(visible[2].fs_type, "xfs");
    }

    #[test]
    fn nodev_types() {
        let types = parse_nodev_types("nodev\tsysfs\nnodev\tproc\n\text4\n\tvfat\n");
        assert!(types.contains("sysfs"));
        assert!(types.contains("proc"));
        assert!(!types.contains("ext4"));
    }
}
