use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, ValueEnum};
use color_eyre::Result;
use color_eyre::eyre::eyre;
use procsight::action::Action;
use procsight::app::App;
use procsight::config::{self, Config, load_config, load_config_from_path};
use procsight::event::{Event, EventHandler};
use procsight::logging::{LogFormat, init_logging};
use procsight::render;
use procsight::system::enumerate;
use procsight::system::sampler::{SampleCycle, Sampler};
use procsight::system::sort::SortKey;
use procsight::system::{Collector, PlatformAccessor};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
enum View {
    #[default]
    Tree,
    Table,
    Cores,
    Memory,
    Sensors,
    Batteries,
    Network,
    Filesystems,
}

#[derive(Parser)]
#[command(
    name = "procsight",
    about = "Process, CPU, memory, sensor and network telemetry"
)]
struct Cli {
    /// Path to config file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Refresh rate in milliseconds
    #[arg(long)]
    refresh_rate: Option<u64>,

    /// What to show.
    #[arg(long, value_enum, default_value_t = View::Tree)]
    view: View,

    /// Sort key: pid, uid, nice, priority, cpu_id, threads, files, private,
    /// resident, virtual, shared, time, cpu, command, state, age
    #[arg(long)]
    sort: Option<String>,

    /// Sort ascending instead of descending.
    #[arg(long, default_value_t = false)]
    ascending: bool,

    /// Include kernel threads.
    #[arg(long, default_value_t = false)]
    kernel_threads: bool,

    /// Attach each process's threads.
    #[arg(long, default_value_t = false)]
    threads: bool,

    /// Show one process (with threads) instead of a view.
    #[arg(long, conflicts_with = "zoom")]
    pid: Option<u32>,

    /// Limit the tree or table to one process subtree.
    #[arg(long)]
    zoom: Option<u32>,

    /// Emit JSON instead of text.
    #[arg(long, default_value_t = false)]
    json: bool,

    /// Keep refreshing; stop after this many refreshes (0 runs until Ctrl-C
    /// or `q`). Single-letter commands are read from stdin.
    #[arg(long)]
    watch: Option<u64>,

    /// Log level for diagnostics on stderr (overrides RUST_LOG).
    #[arg(long)]
    log_level: Option<String>,

    /// Diagnostic log format.
    #[arg(long, value_enum, default_value_t = LogFormat::Human)]
    log_format: LogFormat,

    /// Run headless performance capture.
    #[arg(long, default_value_t = false)]
    perf_capture: bool,

    /// Number of capture iterations for perf mode.
    #[arg(long, default_value_t = 120)]
    perf_iterations: usize,

    /// Perf tracing output file (JSON lines).
    #[arg(long, default_value = "target/perf/perf_spans.jsonl")]
    perf_output: PathBuf,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    color_eyre::install()?;

    let cli = Cli::parse();
    if !cli.perf_capture {
        init_logging(cli.log_level.as_deref(), cli.log_format)
            .map_err(|e| eyre!("failed to initialise logging: {e}"))?;
    }
    let config = load_config_for_cli(&cli)?;

    if cli.perf_capture {
        return run_perf_capture(&config, &cli);
    }

    let collector = Collector::native(config.accessor_options());
    tracing::debug!(accessor = collector.accessor().name(), "platform accessor ready");

    if let Some(pid) = cli.pid {
        return show_process(&collector, pid, cli.json);
    }

    match cli.view {
        View::Tree | View::Table => run_process_view(&config, collector, &cli).await,
        View::Cores | View::Network | View::Sensors => {
            run_sampler_view(&config, collector.accessor(), &cli).await
        }
        View::Memory => {
            let memory = collector.accessor().acquire_memory()?;
            emit(cli.json, &memory, || render::memory_view(&memory))
        }
        View::Batteries => {
            let batteries = collector.accessor().acquire_batteries();
            emit(cli.json, &batteries, || render::batteries_view(&batteries))
        }
        View::Filesystems => {
            let accessor = collector.accessor();
            let entries = enumerate::filesystems(accessor.as_ref());
            emit(cli.json, &entries, || render::filesystems_view(&entries))
        }
    }
}

fn load_config_for_cli(cli: &Cli) -> Result<Config> {
    let mut config = match &cli.config {
        Some(path) => load_config_from_path(path),
        None => load_config(),
    };
    tracing::debug!(path = ?config::config_path(), "configuration loaded");

    if let Some(rate) = cli.refresh_rate {
        config.general.refresh_rate_ms = rate;
    }
    if let Some(sort) = &cli.sort {
        let key = SortKey::parse(sort).ok_or_else(|| eyre!("unknown sort key `{sort}`"))?;
        config.general.default_sort = key.label().to_string();
    }
    if cli.ascending {
        config.general.sort_descending = false;
    }
    if cli.kernel_threads {
        config.general.show_kernel_threads = true;
    }
    if cli.threads {
        config.general.show_threads = true;
    }

    Ok(config)
}

fn emit<T: serde::Serialize + ?Sized>(
    json: bool,
    value: &T,
    text: impl FnOnce() -> String,
) -> Result<()> {
    if json {
        println!("{}", render::to_json(value)?);
    } else {
        print!("{}", text());
    }
    Ok(())
}

fn show_process(collector: &Collector, pid: u32, json: bool) -> Result<()> {
    let record = collector.process_detail(pid)?;
    emit(json, &record, || render::process_table(std::slice::from_ref(&record)))
}

fn print_process_view(app: &App, view: View, json: bool) -> Result<()> {
    if let Some((message, _)) = &app.status_message {
        eprintln!("{message}");
    }
    if view == View::Table {
        let records = app.sorted_processes();
        return emit(json, &records, || render::process_table(&records));
    }
    let forest = app.visible_forest();
    emit(json, &forest, || {
        let uptime = forest.roots().iter().map(|p| p.run_time_secs).max();
        format!(
            "{}\n{}",
            render::summary_line(forest.len(), uptime, app.sort_key.label()),
            render::process_tree(&forest)
        )
    })
}

async fn run_process_view(config: &Config, collector: Collector, cli: &Cli) -> Result<()> {
    let mut app = App::new(config, collector);
    if let Some(pid) = cli.zoom {
        app.dispatch(Action::ZoomIn(pid));
    }

    let Some(limit) = cli.watch else {
        // Per-process CPU needs two samples some time apart.
        tokio::time::sleep(config.sampler.sampler_config().interval).await;
        app.refresh_data();
        return print_process_view(&app, cli.view, cli.json);
    };

    let mut events = EventHandler::with_stdin(config.general.refresh_interval());
    let mut refreshes = 0u64;
    while app.running {
        let Some(event) = events.next().await else {
            break;
        };
        match event {
            Event::Tick => {
                app.refresh_data();
                refreshes += 1;
            }
            Event::Key(key) => app.dispatch(Action::from_key(key)),
            Event::Quit => app.dispatch(Action::Quit),
        }
        if app.running {
            print_process_view(&app, cli.view, cli.json)?;
        }
        if limit != 0 && refreshes >= limit {
            break;
        }
    }
    Ok(())
}

fn print_cycle(view: View, cycle: &SampleCycle, json: bool) -> Result<()> {
    let interval_secs = cycle.interval.as_secs_f64();
    match view {
        View::Network => emit(json, &cycle.network, || {
            render::network_view(&cycle.network, interval_secs)
        }),
        View::Sensors => emit(json, &cycle.sensors, || render::sensors_view(&cycle.sensors)),
        _ => emit(json, cycle, || {
            render::cores_view(&cycle.cores, cycle.cpu_total.as_ref())
        }),
    }
}

async fn run_sampler_view(
    config: &Config,
    accessor: Arc<dyn PlatformAccessor>,
    cli: &Cli,
) -> Result<()> {
    let mut sampler_config = config.sampler.sampler_config();
    if let Some(rate) = cli.refresh_rate {
        sampler_config.interval = std::time::Duration::from_millis(rate.max(1));
    }
    let mut handle = Sampler::new(accessor, sampler_config).start();

    // Rates need a previous cycle, so a one-shot view prints the second.
    let (limit, skip) = match cli.watch {
        Some(limit) => (limit, 0),
        None => (1, 1),
    };
    let mut printed = 0u64;
    let mut seen = 0u64;
    let mut ctrl_c = std::pin::pin!(tokio::signal::ctrl_c());

    loop {
        let cycle = tokio::select! {
            _ = &mut ctrl_c => break,
            cycle = handle.next_cycle() => cycle,
        };
        let Some(cycle) = cycle else {
            break;
        };
        seen += 1;
        if seen <= skip {
            continue;
        }
        print_cycle(cli.view, &cycle, cli.json)?;
        printed += 1;
        if limit != 0 && printed >= limit {
            break;
        }
    }

    handle.shutdown(config.sampler.join_timeout()).await?;
    Ok(())
}

fn run_perf_capture(config: &Config, cli: &Cli) -> Result<()> {
    #[cfg(not(feature = "perf-tracing"))]
    {
        let _ = (config, cli);
        Err(eyre!(
            "--perf-capture requires the `perf-tracing` feature; run with `cargo run --features perf-tracing -- --perf-capture`"
        ))
    }

    #[cfg(feature = "perf-tracing")]
    {
        use procsight::perf;
        use procsight::system::ProcessFilter;

        if cli.perf_output.exists() {
            std::fs::remove_file(&cli.perf_output)?;
        }
        perf::init_tracing_json(&cli.perf_output)?;

        let interval = cli
            .refresh_rate
            .map(|ms| std::time::Duration::from_millis(ms.max(1)))
            .unwrap_or_else(|| config.sampler.sampler_config().interval);
        let filter = ProcessFilter {
            show_kernel_threads: config.general.show_kernel_threads,
        };
        let accessor = procsight::system::platform::native(config.accessor_options());
        let report = perf::capture(accessor, filter, cli.perf_iterations, interval)?;
        let (json, markdown) = perf::write_report(&report, std::path::Path::new("docs"))?;

        println!("Acquisition profile written:");
        println!(" - {}", json.display());
        println!(" - {}", markdown.display());
        println!(" - {}", cli.perf_output.display());
        Ok(())
    }
}
