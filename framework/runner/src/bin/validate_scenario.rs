use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use ingest_bench_runner::prelude::{benchmark_dir, discover_scenarios, read_scenario_static};

/// Check that the system benchmark scenarios of a package load.
#[derive(Parser, Debug)]
#[command(about, long_about = None)]
struct Args {
    /// Root directory of the package
    #[clap(long, default_value = ".")]
    package_root: PathBuf,

    /// Only check this scenario, every scenario of the package otherwise
    #[clap(long)]
    benchmark: Option<String>,
}

fn main() -> anyhow::Result<()> {
    env_logger::init();

    let args = Args::parse();

    match args.benchmark {
        Some(name) => {
            let scenario = read_scenario_static(&benchmark_dir(&args.package_root), &name)
                .with_context(|| format!("Invalid scenario '{name}'"))?;
            println!("{name}: ok ({})", scenario.data_stream.name);
        }
        None => {
            let scenarios = discover_scenarios(&args.package_root)?;
            if scenarios.is_empty() {
                println!("No scenarios found in {}", args.package_root.display());
            }
            for (name, scenario) in scenarios {
                println!("{name}: ok ({})", scenario.data_stream.name);
            }
        }
    }

    Ok(())
}
