use std::time::Instant;

use crate::action::Action;
use crate::config::Config;
use crate::system::collector::Collector;
use crate::system::process::{ProcessFilter, ProcessRecord};
use crate::system::snapshot::SystemSnapshot;
use crate::system::sort::{SortKey, sort_forest, sort_records};
use crate::system::tree::{ProcessForest, build_forest};

const STATUS_TTL_SECS: u64 = 3;

/// Consumer state over one collector: the sorted forest, the zoom stack and
/// the display toggles.
pub struct App {
    pub running: bool,
    pub collector: Collector,
    /// Last refresh with `processes` moved out into `forest`.
    pub snapshot: SystemSnapshot,
    pub forest: ProcessForest,
    pub sort_key: SortKey,
    pub sort_descending: bool,
    pub show_kernel_threads: bool,
    pub show_threads: bool,
    pub zoom_stack: Vec<u32>,
    pub status_message: Option<(String, Instant)>,
}

impl App {
    pub fn new(config: &Config, mut collector: Collector) -> Self {
        let show_kernel_threads = config.general.show_kernel_threads;
        let show_threads = config.general.show_threads;
        collector.set_filter(ProcessFilter {
            show_kernel_threads,
        });
        collector.set_include_threads(show_threads);

        let mut app = App {
            running: true,
            collector,
            snapshot: SystemSnapshot::default(),
            forest: ProcessForest::default(),
            sort_key: config.general.sort_key(),
            sort_descending: config.general.sort_descending,
            show_kernel_threads,
            show_threads,
            zoom_stack: Vec::new(),
            status_message: None,
        };
        app.refresh_data();
        app
    }

    pub fn refresh_data(&mut self) {
        let mut snapshot = self.collector.refresh();
        let processes = std::mem::take(&mut snapshot.processes);
        self.snapshot = snapshot;
        self.forest = build_forest(processes);
        self.resort();

        while let Some(&pid) = self.zoom_stack.last() {
            if self.forest.find(pid).is_some() {
                break;
            }
            self.zoom_stack.pop();
            self.set_status(format!("process {pid} exited, zoomed out"));
        }

        if let Some((_, created)) = &self.status_message
            && created.elapsed().as_secs() >= STATUS_TTL_SECS
        {
            self.status_message = None;
        }
    }

    fn resort(&mut self) {
        #[cfg(feature = "perf-tracing")]
        let _sort_span = tracing::debug_span!("app.resort").entered();

        sort_forest(&mut self.forest, self.sort_key, self.sort_descending);
    }

    pub fn dispatch(&mut self, action: Action) {
        match action {
            Action::Quit => self.running = false,
            Action::Refresh => self.refresh_data(),
            Action::CycleSort => {
                self.sort_key = self.sort_key.next();
                self.resort();
            }
            Action::SetSort(key) => {
                self.sort_key = key;
                self.resort();
            }
            Action::ToggleSortDirection => {
                self.sort_descending = !self.sort_descending;
                self.resort();
            }
            Action::ToggleKernelThreads => {
                self.show_kernel_threads = !self.show_kernel_threads;
                self.collector.set_filter(ProcessFilter {
                    show_kernel_threads: self.show_kernel_threads,
                });
                self.refresh_data();
            }
            Action::ToggleThreads => {
                self.show_threads = !self.show_threads;
                self.collector.set_include_threads(self.show_threads);
                self.refresh_data();
            }
            Action::ZoomIn(pid) => self.zoom_in(pid),
            Action::ZoomOut => {
                self.zoom_stack.pop();
            }
            Action::None => {}
        }
    }

    fn zoom_in(&mut self, pid: u32) {
        if self.forest.find(pid).is_some() {
            self.zoom_stack.push(pid);
        } else {
            self.set_status(format!("no process {pid}"));
        }
    }

    fn set_status(&mut self, message: String) {
        tracing::debug!(%message, "status");
        self.status_message = Some((message, Instant::now()));
    }

    pub fn zoom_pid(&self) -> Option<u32> {
        self.zoom_stack.last().copied()
    }

    /// Roots to display: the whole forest, or the zoomed process alone.
    pub fn visible_roots(&self) -> &[ProcessRecord] {
        match self.zoom_pid() {
            Some(pid) => self
                .forest
                .find(pid)
                .map(std::slice::from_ref)
                .unwrap_or_default(),
            None => self.forest.roots(),
        }
    }

    pub fn visible_forest(&self) -> ProcessForest {
        ProcessForest::from_roots(self.visible_roots().to_vec())
    }

    /// Every visible process as one sorted list. Threads stay attached to
    /// their owner.
    pub fn sorted_processes(&self) -> Vec<ProcessRecord> {
        let mut flat = self.visible_forest().into_flat();
        sort_records(&mut flat, self.sort_key, self.sort_descending);
        flat
    }

    pub fn zoom_breadcrumbs(&self) -> Vec<(u32, String)> {
        self.zoom_stack
            .iter()
            .filter_map(|&pid| {
                self.forest
                    .find(pid)
                    .map(|p| (pid, p.display_command().to_string()))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::system::testing::ScriptedAccessor;

    fn proc(pid: u32, ppid: u32, rss: u64) -> ProcessRecord {
        let mut record = ProcessRecord {
            pid,
            ppid,
            command: format!("p{pid}"),
            ..Default::default()
        };
        record.memory.resident_bytes = rss;
        record
    }

    fn app_with(processes: Vec<ProcessRecord>) -> (App, Arc<ScriptedAccessor>) {
        let accessor = Arc::new(ScriptedAccessor::default());
        accessor.set_processes(processes);
        let mut config = Config::default();
        config.general.default_sort = "rss".to_string();
        let app = App::new(&config, Collector::new(accessor.clone()));
        (app, accessor)
    }

    fn root_pids(app: &App) -> Vec<u32> {
        app.visible_roots().iter().map(|p| p.pid).collect()
    }

    #[test]
    fn roots_sorted_by_configured_key() {
        let (app, _) = app_with(vec![proc(1, 0, 10), proc(2, 0, 30), proc(3, 0, 20)]);
        assert_eq!(root_pids(&app), vec![2, 3, 1]);
    }

    #[test]
    fn toggling_direction_reverses_order() {
        let (mut app, _) = app_with(vec![proc(1, 0, 10), proc(2, 0, 30), proc(3, 0, 20)]);
        app.dispatch(Action::ToggleSortDirection);
        assert_eq!(root_pids(&app), vec![1, 3, 2]);
    }

    #[test]
    fn set_sort_by_pid() {
        let (mut app, _) = app_with(vec![proc(3, 0, 10), proc(1, 0, 30), proc(2, 0, 20)]);
        app.dispatch(Action::SetSort(SortKey::Pid));
        app.dispatch(Action::ToggleSortDirection);
        assert_eq!(root_pids(&app), vec![1, 2, 3]);
    }

    #[test]
    fn zoom_shows_only_subtree() {
        let (mut app, _) = app_with(vec![proc(1, 0, 1), proc(10, 1, 1), proc(11, 10, 1), proc(20, 1, 1)]);
        app.dispatch(Action::ZoomIn(10));
        assert_eq!(root_pids(&app), vec![10]);
        let flat: Vec<u32> = app.sorted_processes().iter().map(|p| p.pid).collect();
        assert_eq!(flat.len(), 2);
        assert!(flat.contains(&11));
        assert_eq!(app.zoom_breadcrumbs(), vec![(10, "p10".to_string())]);

        app.dispatch(Action::ZoomOut);
        assert_eq!(root_pids(&app), vec![1]);
    }

    #[test]
    fn zoom_into_unknown_pid_is_ignored() {
        let (mut app, _) = app_with(vec![proc(1, 0, 1)]);
        app.dispatch(Action::ZoomIn(99));
        assert!(app.zoom_stack.is_empty());
        assert!(app.status_message.is_some());
    }

    #[test]
    fn vanished_zoom_target_pops_stack() {
        let (mut app, accessor) = app_with(vec![proc(1, 0, 1), proc(10, 1, 1)]);
        app.dispatch(Action::ZoomIn(10));
        accessor.set_processes(vec![proc(1, 0, 1)]);
        app.dispatch(Action::Refresh);
        assert_eq!(app.zoom_pid(), None);
        assert_eq!(root_pids(&app), vec![1]);
    }

    #[test]
    fn kernel_thread_toggle_refilters() {
        let mut kthread = proc(2, 0, 0);
        kthread.is_kernel = true;
        let (mut app, _) = app_with(vec![proc(1, 0, 5), kthread]);
        assert_eq!(app.forest.len(), 1);
        app.dispatch(Action::ToggleKernelThreads);
        assert_eq!(app.forest.len(), 2);
    }

    #[test]
    fn quit_stops_running() {
        let (mut app, _) = app_with(Vec::new());
        app.dispatch(Action::Quit);
        assert!(!app.running);
    }
}
