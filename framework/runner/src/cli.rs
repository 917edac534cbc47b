use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser, Debug, Clone)]
#[command(about, long_about = None)]
pub struct BenchCli {
    /// Root directory of the package to benchmark
    #[clap(long, default_value = ".")]
    pub package_root: PathBuf,

    /// Name of the benchmark scenario to run, the file name under `_dev/benchmark/system` without
    /// its `.yml` extension
    #[clap(long)]
    pub benchmark: String,

    /// Time between two metrics samples, for example `1s` or `500ms`
    #[clap(long, default_value = "1s", value_parser = humantime::parse_duration)]
    pub metrics_interval: Duration,

    /// Wait this long before tearing down the benchmark resources.
    ///
    /// Useful to inspect a live environment once the benchmark has finished. The wait is cut
    /// short by Ctrl-C.
    #[clap(long, default_value = "0s", value_parser = humantime::parse_duration)]
    pub defer_cleanup: Duration,

    /// Number of processors listed in each of the top processor rankings
    #[clap(long, default_value = "10")]
    pub num_top_procs: usize,

    /// Directory the JSON report is written to, under `system/<run id>/report.json`
    #[clap(long)]
    pub report_output_dir: Option<PathBuf>,

    /// Do not show a progress bar on the CLI.
    ///
    /// This is recommended for CI/CD environments where the progress bar isn't being looked at by anyone and is just adding noise to the logs.
    #[clap(long, default_value = "false")]
    pub no_progress: bool,
}
