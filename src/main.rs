//! grid-sim entry point: CLI wiring, episode runs and offline study.

use std::path::{Path, PathBuf};
use std::process;

use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use grid_sim::config::ScenarioConfig;
use grid_sim::io::EpisodeData;
use grid_sim::io::export::export_csv;
use grid_sim::plot::{Layout, PlotQuantity, render_layout, render_snapshot};
use grid_sim::runner::EpisodeResult;
use grid_sim::sim::AgentKind;

/// Parsed CLI arguments.
struct CliArgs {
    scenario_path: Option<String>,
    preset: Option<String>,
    seed_override: Option<u64>,
    episodes: Option<usize>,
    workers: Option<usize>,
    agent: Option<AgentKind>,
    log_dir: Option<PathBuf>,
    max_iter: Option<usize>,
    telemetry_out: Option<String>,
    replay: Option<PathBuf>,
    plot: Option<String>,
    plot_step: Option<usize>,
    #[cfg(feature = "api")]
    serve: bool,
    #[cfg(feature = "api")]
    port: u16,
    #[cfg(feature = "tui")]
    tui: Option<PathBuf>,
}

fn print_help() {
    eprintln!("grid-sim: power-grid environment, episode runner and episode study");
    eprintln!();
    eprintln!("Usage: grid-sim [OPTIONS]");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  --scenario <path>        Load scenario from TOML config file");
    eprintln!(
        "  --preset <name>          Use a built-in preset ({})",
        ScenarioConfig::PRESETS.join(", ")
    );
    eprintln!("  --seed <u64>             Override the environment seed");
    eprintln!("  --episodes <n>           Override the number of episodes");
    eprintln!("  --workers <n>            Override the number of worker threads");
    eprintln!(
        "  --agent <name>           Override the agent ({})",
        AgentKind::ALL.join(", ")
    );
    eprintln!("  --log-dir <path>         Log every episode under this directory");
    eprintln!("  --max-iter <n>           Stop every episode after n steps");
    eprintln!("  --telemetry-out <path>   Export the steps of the first episode to CSV");
    eprintln!("  --replay <dir>           Study a logged episode instead of running");
    eprintln!(
        "  --plot <what>            Print the grid: layout, or one of {}",
        PlotQuantity::ALL.join(", ")
    );
    eprintln!("  --plot-step <n>          Step plotted with --replay (default: last)");
    #[cfg(feature = "api")]
    {
        eprintln!("  --serve                  Serve the episode over HTTP afterwards");
        eprintln!("  --port <u16>             API server port (default: 3000)");
    }
    #[cfg(feature = "tui")]
    eprintln!("  --tui <dir>              Replay a logged episode in the terminal");
    eprintln!("  --help                   Show this help message");
    eprintln!();
    eprintln!("If no --scenario or --preset is given, the case14 preset is used.");
    eprintln!("Set RUST_LOG to change the log level (default: info).");
}

fn fail(message: impl std::fmt::Display) -> ! {
    eprintln!("error: {message}");
    process::exit(1);
}

/// Value following a flag, parsed.
fn value<T: std::str::FromStr>(args: &[String], i: &mut usize, flag: &str, kind: &str) -> T {
    *i += 1;
    let Some(raw) = args.get(*i) else {
        fail(format!("{flag} requires a {kind} argument"));
    };
    raw.parse()
        .unwrap_or_else(|_| fail(format!("{flag} value \"{raw}\" is not a valid {kind}")))
}

fn parse_args() -> CliArgs {
    let args: Vec<String> = std::env::args().collect();
    let mut cli = CliArgs {
        scenario_path: None,
        preset: None,
        seed_override: None,
        episodes: None,
        workers: None,
        agent: None,
        log_dir: None,
        max_iter: None,
        telemetry_out: None,
        replay: None,
        plot: None,
        plot_step: None,
        #[cfg(feature = "api")]
        serve: false,
        #[cfg(feature = "api")]
        port: 3000,
        #[cfg(feature = "tui")]
        tui: None,
    };

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--help" | "-h" => {
                print_help();
                process::exit(0);
            }
            "--scenario" => cli.scenario_path = Some(value(&args, &mut i, "--scenario", "path")),
            "--preset" => cli.preset = Some(value(&args, &mut i, "--preset", "name")),
            "--seed" => cli.seed_override = Some(value(&args, &mut i, "--seed", "u64")),
            "--episodes" => cli.episodes = Some(value(&args, &mut i, "--episodes", "count")),
            "--workers" => cli.workers = Some(value(&args, &mut i, "--workers", "count")),
            "--agent" => {
                let name: String = value(&args, &mut i, "--agent", "name");
                cli.agent = Some(AgentKind::from_name(&name).unwrap_or_else(|e| fail(e)));
            }
            "--log-dir" => cli.log_dir = Some(value(&args, &mut i, "--log-dir", "path")),
            "--max-iter" => cli.max_iter = Some(value(&args, &mut i, "--max-iter", "count")),
            "--telemetry-out" => {
                cli.telemetry_out = Some(value(&args, &mut i, "--telemetry-out", "path"));
            }
            "--replay" => cli.replay = Some(value(&args, &mut i, "--replay", "path")),
            "--plot" => cli.plot = Some(value(&args, &mut i, "--plot", "quantity")),
            "--plot-step" => cli.plot_step = Some(value(&args, &mut i, "--plot-step", "step")),
            #[cfg(feature = "api")]
            "--serve" => cli.serve = true,
            #[cfg(feature = "api")]
            "--port" => cli.port = value(&args, &mut i, "--port", "u16"),
            #[cfg(feature = "tui")]
            "--tui" => cli.tui = Some(value(&args, &mut i, "--tui", "path")),
            other => {
                eprintln!("error: unknown argument \"{other}\"");
                print_help();
                process::exit(1);
            }
        }
        i += 1;
    }

    cli
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .compact()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();
}

fn load_scenario(cli: &CliArgs) -> ScenarioConfig {
    let mut scenario = if let Some(ref path) = cli.scenario_path {
        ScenarioConfig::from_toml_file(Path::new(path)).unwrap_or_else(|e| fail(e))
    } else if let Some(ref name) = cli.preset {
        ScenarioConfig::from_preset(name).unwrap_or_else(|e| fail(e))
    } else {
        ScenarioConfig::case14()
    };

    if let Some(seed) = cli.seed_override {
        scenario.environment.seed = seed;
    }
    if let Some(n) = cli.episodes {
        scenario.runner.episodes = n;
    }
    if let Some(n) = cli.workers {
        scenario.runner.workers = n;
    }
    if let Some(agent) = &cli.agent {
        scenario.agent = agent.clone();
    }
    if let Some(dir) = &cli.log_dir {
        scenario.runner.log_dir = Some(dir.clone());
    }
    if cli.max_iter.is_some() {
        scenario.runner.max_iter = cli.max_iter;
    }

    let errors = scenario.validate();
    if !errors.is_empty() {
        for e in &errors {
            eprintln!("{e}");
        }
        process::exit(1);
    }
    scenario
}

/// Prints what `--plot` asks for, on the grid of `data` or of the scenario.
fn plot(what: &str, cli: &CliArgs, data: Option<&EpisodeData>, scenario: Option<&ScenarioConfig>) {
    let grid = match (data, scenario) {
        (Some(d), _) => d.grid().clone(),
        (None, Some(s)) => s.load_grid().unwrap_or_else(|e| fail(e)),
        (None, None) => fail("nothing to plot"),
    };
    let layout = Layout::from_grid(&grid);
    if what == "layout" {
        print!("{}", render_layout(&grid, &layout));
        return;
    }
    let quantity: PlotQuantity = what.parse().unwrap_or_else(|e| fail(e));
    let observation = match (data, scenario) {
        (Some(d), _) => {
            let step = cli.plot_step.unwrap_or(d.len());
            d.observations()
                .get(step)
                .cloned()
                .unwrap_or_else(|| fail(format!("the episode has no step {step}")))
        }
        (None, Some(s)) => {
            let builder = s.env_builder().unwrap_or_else(|e| fail(e));
            let env = builder.build().unwrap_or_else(|e| fail(e));
            env.current_observation().clone()
        }
        (None, None) => fail("nothing to plot"),
    };
    match render_snapshot(&grid, &layout, &observation, quantity) {
        Ok(text) => print!("{text}"),
        Err(e) => fail(e),
    }
}

fn replay(dir: &Path, cli: &CliArgs) -> EpisodeData {
    let data = EpisodeData::from_disk(dir).unwrap_or_else(|e| fail(e));
    let meta = data.meta();
    println!(
        "Episode {} of {} on {} by {} (seed {})",
        meta.chronics_id, meta.episode, meta.grid, meta.agent, meta.seed
    );
    if cli.plot.is_none() {
        for r in data.records() {
            println!("{r}");
        }
    }
    let counts = data.action_counts();
    println!(
        "\nActions: {} do-nothing, {} redispatch, {} storage, {} line status, {} bus",
        counts.do_nothing,
        counts.redispatch,
        counts.storage,
        counts.set_line_status + counts.change_line_status,
        counts.set_bus + counts.change_bus,
    );
    for event in data.line_disconnections() {
        println!(
            "line {} disconnected at step {} ({:?})",
            event.line, event.step, event.cause
        );
    }
    println!("\n{}", data.summary());
    data
}

fn run(scenario: &ScenarioConfig, cli: &CliArgs) -> Vec<EpisodeResult> {
    let runner = scenario.runner().unwrap_or_else(|e| fail(e));
    let r = &scenario.runner;
    info!(
        grid = %scenario.grid.name,
        agent = %scenario.agent,
        episodes = r.episodes,
        workers = r.workers,
        "running scenario"
    );
    let results = runner
        .run(r.episodes, r.workers, r.log_dir.as_deref())
        .unwrap_or_else(|e| fail(e));

    for result in &results {
        println!(
            "\nEpisode {} (chronics {})\n{}",
            result.episode, result.chronics_id, result.summary
        );
    }

    if let Some(ref path) = cli.telemetry_out {
        match results.first() {
            Some(first) => {
                if let Err(e) = export_csv(&first.records, Path::new(path)) {
                    fail(format!("failed to write CSV: {e}"));
                }
                info!(path = %path, "telemetry written");
            }
            None => warn!("no episode played, no telemetry written"),
        }
    }
    results
}

fn main() {
    let cli = parse_args();
    init_logging();

    #[cfg(feature = "tui")]
    if let Some(ref dir) = cli.tui {
        let data = EpisodeData::from_disk(dir).unwrap_or_else(|e| fail(e));
        if let Err(e) = grid_sim::tui::run(data) {
            fail(format!("TUI crashed: {e}"));
        }
        return;
    }

    #[cfg_attr(not(feature = "api"), allow(unused_variables))]
    let served: Option<EpisodeData> = if let Some(ref dir) = cli.replay {
        let data = replay(dir, &cli);
        if let Some(ref what) = cli.plot {
            plot(what, &cli, Some(&data), None);
        }
        Some(data)
    } else {
        let scenario = load_scenario(&cli);
        if let Some(ref what) = cli.plot {
            plot(what, &cli, None, Some(&scenario));
            return;
        }
        let results = run(&scenario, &cli);
        results
            .first()
            .and_then(|r| r.log_dir.as_deref())
            .and_then(|dir| match EpisodeData::from_disk(dir) {
                Ok(data) => Some(data),
                Err(e) => {
                    warn!(error = %e, "could not reload the first episode");
                    None
                }
            })
    };

    #[cfg(feature = "api")]
    if cli.serve {
        use std::net::SocketAddr;
        use std::sync::Arc;

        let Some(data) = served else {
            fail("--serve needs --replay or a --log-dir run");
        };
        let state = Arc::new(grid_sim::api::AppState::from_episode(&data));
        let addr = SocketAddr::from(([0, 0, 0, 0], cli.port));
        let rt = tokio::runtime::Runtime::new()
            .unwrap_or_else(|e| fail(format!("failed to create tokio runtime: {e}")));
        if let Err(e) = rt.block_on(grid_sim::api::serve(state, addr)) {
            fail(format!("server error on {addr}: {e}"));
        }
    }
}
