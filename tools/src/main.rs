mod scenario;

use std::path::{Path, PathBuf};

use character_motor_rigid::settings::{load_movement_settings, MovementSettings};
use character_motor_rigid::MovementConfig;
use clap::{Parser, Subcommand};
use engine_core::logging::{self, LogLevel};
use engine_core::observability;
use scenario::{run_simulation, ScenarioKind, SimulationOptions, SimulationSummary};

const EXIT_SUCCESS: i32 = 0;
const EXIT_USAGE: i32 = 2;
const EXIT_SETTINGS: i32 = 10;
const EXIT_SIMULATION: i32 = 11;

#[derive(Parser)]
#[command(name = "tools", version, about = "Character movement tools CLI")]
struct Cli {
    /// error, warn, info or debug.
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    Simulate(SimulateArgs),
    SettingsTemplate,
    SettingsCheck {
        #[arg(value_name = "PATH")]
        path: PathBuf,
    },
}

#[derive(Parser)]
struct SimulateArgs {
    #[arg(long, value_enum)]
    scenario: ScenarioKind,

    #[arg(long, default_value_t = 240)]
    ticks: u32,

    #[arg(long, value_name = "PATH")]
    settings: Option<PathBuf>,

    #[arg(long, default_value_t = 0.0, allow_negative_numbers = true)]
    move_x: f32,

    #[arg(long, default_value_t = 0.0, allow_negative_numbers = true)]
    move_y: f32,

    /// Tick at which a jump is requested.
    #[arg(long)]
    jump_at: Option<u32>,

    /// Print every Nth tick; 0 prints only the summary.
    #[arg(long, default_value_t = 10)]
    trace_every: u32,

    #[arg(long, default_value_t = 60)]
    tick_rate: u32,
}

fn main() {
    let cli = Cli::parse();
    let Some(level) = LogLevel::parse(&cli.log_level) else {
        eprintln!("unknown log level: {}", cli.log_level);
        std::process::exit(EXIT_USAGE);
    };
    logging::set_max_level(level);
    observability::install_panic_hook();

    let exit_code = match cli.command {
        Commands::Simulate(args) => run_simulate(args),
        Commands::SettingsTemplate => settings_template(),
        Commands::SettingsCheck { path } => settings_check(&path),
    };
    std::process::exit(exit_code);
}

fn run_simulate(args: SimulateArgs) -> i32 {
    if args.tick_rate == 0 {
        eprintln!("--tick-rate must be positive");
        return EXIT_USAGE;
    }
    let config = match args.settings.as_deref() {
        Some(path) => match load_movement_settings(path) {
            Ok(settings) => settings.to_config(),
            Err(err) => {
                eprintln!("{}", err);
                return EXIT_SETTINGS;
            }
        },
        None => MovementConfig::default(),
    };

    let options = SimulationOptions {
        scenario: args.scenario,
        ticks: args.ticks,
        dt: 1.0 / args.tick_rate as f32,
        move_axis: [args.move_x, args.move_y],
        jump_at: args.jump_at,
    };
    let trace_every = args.trace_every;
    let result = run_simulation(options, config, |tick, frame| {
        if trace_every == 0 || tick % trace_every != 0 {
            return;
        }
        println!(
            "tick {:>5} {:<8} pos ({:>7.3}, {:>7.3}, {:>7.3}) vel ({:>7.3}, {:>7.3}, {:>7.3}) contacts {}{}{}",
            tick,
            frame.state.as_str(),
            frame.position.x,
            frame.position.y,
            frame.position.z,
            frame.velocity.x,
            frame.velocity.y,
            frame.velocity.z,
            frame.contact_count,
            if frame.report.jumped { " jump" } else { "" },
            if frame.report.snapped { " snap" } else { "" },
        );
    });
    match result {
        Ok(summary) => {
            print_summary(args.scenario, &summary);
            match observability::take_sticky_error() {
                Some(err) => {
                    eprintln!("simulation fault: {}", err);
                    EXIT_SIMULATION
                }
                None => EXIT_SUCCESS,
            }
        }
        Err(err) => {
            eprintln!("simulation failed: {}", err);
            EXIT_SIMULATION
        }
    }
}

fn print_summary(scenario: ScenarioKind, summary: &SimulationSummary) {
    let travelled = summary.end - summary.start;
    println!("scenario {:?} finished after {} ticks", scenario, summary.ticks);
    println!(
        "states: ground {} steep {} climbing {} airborne {}",
        summary.ground_ticks, summary.steep_ticks, summary.climbing_ticks, summary.airborne_ticks
    );
    println!("jumps {} snaps {}", summary.jumps, summary.snaps);
    println!(
        "end ({:.3}, {:.3}, {:.3}) travelled {:.3} max height {:.3}",
        summary.end.x,
        summary.end.y,
        summary.end.z,
        travelled.norm(),
        summary.max_height
    );
    if let Some(state) = summary.final_state {
        println!("final state {}", state.as_str());
    }
}

fn settings_template() -> i32 {
    match MovementSettings::default().to_toml() {
        Ok(text) => {
            print!("{}", text);
            EXIT_SUCCESS
        }
        Err(err) => {
            eprintln!("settings template failed: {}", err);
            EXIT_SETTINGS
        }
    }
}

fn settings_check(path: &Path) -> i32 {
    let settings = match load_movement_settings(path) {
        Ok(settings) => settings,
        Err(err) => {
            eprintln!("{}", err);
            return EXIT_SETTINGS;
        }
    };
    let validation = settings.validate();
    for warning in &validation.warnings {
        println!("warning: {}", warning);
    }
    println!(
        "settings ok: {} (version {}, {} warnings)",
        path.display(),
        settings.version,
        validation.warnings.len()
    );
    EXIT_SUCCESS
}
