use std::fmt;

use serde::Serialize;

/// Shared process-state vocabulary. Every platform maps its native state
/// codes onto these variants; codes without a mapping become `Unknown`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessState {
    Running,
    Sleeping,
    Stopped,
    Zombie,
    Idle,
    Dead,
    Waiting,
    Locked,
    #[default]
    Unknown,
}

impl ProcessState {
    pub fn name(self) -> &'static str {
        match self {
            ProcessState::Running => "running",
            ProcessState::Sleeping => "sleeping",
            ProcessState::Stopped => "stopped",
            ProcessState::Zombie => "zombie",
            ProcessState::Idle => "idle",
            ProcessState::Dead => "dead",
            ProcessState::Waiting => "waiting",
            ProcessState::Locked => "locked",
            ProcessState::Unknown => "unknown",
        }
    }

    /// `ps`-style one-letter state.
    pub fn code(self) -> char {
        match self {
            ProcessState::Running => 'R',
            ProcessState::Sleeping => 'S',
            ProcessState::Stopped => 'T',
            ProcessState::Zombie => 'Z',
            ProcessState::Idle => 'I',
            ProcessState::Dead => 'X',
            ProcessState::Waiting => 'D',
            ProcessState::Locked => 'L',
            ProcessState::Unknown => '?',
        }
    }

    /// Look a native code up in a platform's fixed mapping table.
    pub fn from_table<C: PartialEq + Copy>(table: &[(C, ProcessState)], code: C) -> Self {
        table
            .iter()
            .find(|(native, _)| *native == code)
            .map(|(_, state)| *state)
            .unwrap_or(ProcessState::Unknown)
    }
}

impl fmt::Display for ProcessState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Memory figures for one process, all in bytes.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct MemoryUsage {
    pub virtual_bytes: u64,
    pub resident_bytes: u64,
    pub shared_bytes: u64,
    /// Resident minus shared. Saturates at zero when a platform reports more
    /// shared than resident memory.
    pub private_bytes: u64,
}

impl MemoryUsage {
    pub fn new(virtual_bytes: u64, resident_bytes: u64, shared_bytes: u64) -> Self {
        MemoryUsage {
            virtual_bytes,
            resident_bytes,
            shared_bytes,
            private_bytes: resident_bytes.saturating_sub(shared_bytes),
        }
    }
}

/// One OS process, or one thread of a process when `tid != 0`.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct ProcessRecord {
    pub pid: u32,
    pub ppid: u32,
    pub uid: u32,
    pub nice: i32,
    pub priority: i32,
    /// Core the process last ran on.
    pub processor: u32,
    pub num_threads: u32,
    pub open_files: u32,
    /// Cumulative user + system CPU time in microseconds.
    pub cpu_time_us: u64,
    /// Derived from two consecutive samples; zero until a baseline exists.
    pub cpu_percent: f32,
    /// Seconds since the Unix epoch.
    pub start_time: u64,
    /// Wall-clock seconds the process has been alive.
    pub run_time_secs: u64,
    pub memory: MemoryUsage,
    pub command: String,
    pub args: String,
    pub state: ProcessState,
    pub wchan: Option<String>,
    pub is_kernel: bool,
    pub is_new: bool,
    pub tid: u32,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub threads: Vec<ProcessRecord>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<ProcessRecord>,
}

impl ProcessRecord {
    /// Args when the kernel exposed them, otherwise the short command name.
    pub fn display_command(&self) -> &str {
        if self.args.is_empty() {
            &self.command
        } else {
            &self.args
        }
    }

    pub fn is_thread(&self) -> bool {
        self.tid != 0
    }

    /// Number of records in this subtree, including `self` but not threads.
    pub fn subtree_len(&self) -> usize {
        1 + self.children.iter().map(ProcessRecord::subtree_len).sum::<usize>()
    }
}

/// Selection applied by accessors while enumerating the process table.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ProcessFilter {
    pub show_kernel_threads: bool,
}

impl ProcessFilter {
    pub fn admits(&self, record: &ProcessRecord) -> bool {
        self.show_kernel_threads || !record.is_kernel
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TABLE: &[(u8, ProcessState)] = &[(b'R', ProcessState::Running), (b'Z', ProcessState::Zombie)];

    #[test]
    fn unmapped_code_is_unknown() {
        assert_eq!(ProcessState::from_table(TABLE, b'R'), ProcessState::Running);
        assert_eq!(ProcessState::from_table(TABLE, b'?'), ProcessState::Unknown);
    }

    #[test]
    fn private_memory_saturates() {
        let mem = MemoryUsage::new(4096, 100, 300);
        assert_eq!(mem.private_bytes, 0);
        let mem = MemoryUsage::new(4096, 300, 100);
        assert_eq!(mem.private_bytes, 200);
    }

    #[test]
    fn filter_hides_kernel_threads_by_default() {
        let kthread = ProcessRecord {
            pid: 2,
            is_kernel: true,
            ..Default::default()
        };
        assert!(!ProcessFilter::default().admits(&kthread));
        assert!(
            ProcessFilter {
                show_kernel_threads: true
            }
            .admits(&kthread)
        );
    }

    #[test]
    fn display_command_falls_back_to_name() {
        let mut record = ProcessRecord {
            command: "kworker/0:1".into(),
            ..Default::default()
        };
        assert_eq!(record.display_command(), "kworker/0:1");
        record.args = "/usr/bin/bash -l".into();
        assert_eq!(record.display_command(), "/usr/bin/bash -l");
    }
}
