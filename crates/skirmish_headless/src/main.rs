//! Headless runner binary.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use rayon::prelude::*;
use tracing_subscriber::EnvFilter;

use skirmish_headless::runner::{self, RunnerConfig};
use skirmish_headless::scenario::Scenario;

#[derive(Parser, Debug)]
#[command(name = "skirmish_headless", about = "Headless cave-skirmish runner")]
struct Args {
    /// Scenario file (RON). Defaults to the built-in skirmish.
    #[arg(long)]
    scenario: Option<PathBuf>,

    /// Override the scenario's tick budget.
    #[arg(long)]
    ticks: Option<u64>,

    /// Override the scenario's seed.
    #[arg(long)]
    seed: Option<u64>,

    /// Emit a JSON summary line per tick on stdout.
    #[arg(long)]
    emit_state: bool,

    /// Print an ASCII frame every N ticks.
    #[arg(long)]
    ascii_every: Option<u64>,

    /// Run the scenario twice and compare final state hashes.
    #[arg(long)]
    verify: bool,

    /// Run N copies of the scenario on seeds seed..seed+N in parallel and
    /// summarize the outcomes.
    #[arg(long)]
    batch: Option<u64>,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let mut scenario = match &args.scenario {
        Some(path) => match Scenario::load(path) {
            Ok(s) => s,
            Err(e) => {
                eprintln!("{e}");
                return ExitCode::FAILURE;
            }
        },
        None => Scenario::default(),
    };
    if let Some(ticks) = args.ticks {
        scenario.ticks = ticks;
    }
    if let Some(seed) = args.seed {
        scenario.seed = seed;
    }

    let stdout = std::io::stdout();

    if let Some(batch) = args.batch {
        let base = scenario.seed;
        let reports: Vec<_> = (0..batch)
            .into_par_iter()
            .map(|i| {
                let mut s = scenario.clone();
                s.seed = base + i;
                let mut sink = std::io::sink();
                runner::run(&s, &RunnerConfig::default(), &mut sink)
                    .map(|r| (s.seed, r))
                    .expect("sink write cannot fail")
            })
            .collect();
        for (seed, report) in &reports {
            println!(
                "seed {seed}: {} after {} ticks, {} units",
                report.outcome.as_deref().unwrap_or("undecided"),
                report.ticks_run,
                report.units_alive
            );
        }
        let decided = reports.iter().filter(|(_, r)| r.outcome.is_some()).count();
        println!("{decided}/{batch} games reached an outcome");
        return ExitCode::SUCCESS;
    }

    if args.verify {
        let ok = runner::verify(&scenario, &mut stdout.lock()).expect("stdout write");
        return if ok { ExitCode::SUCCESS } else { ExitCode::FAILURE };
    }

    let config = RunnerConfig {
        emit_state: args.emit_state,
        ascii_every: args.ascii_every,
    };
    match runner::run(&scenario, &config, &mut stdout.lock()) {
        Ok(report) => {
            println!(
                "{}",
                serde_json::to_string(&report).expect("report serializes")
            );
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("run failed: {e}");
            ExitCode::FAILURE
        }
    }
}
