extern crate env_logger;

use clap::Parser;

use std::io;
use std::process;

mod cluster;
mod fallback;
mod gpu;
mod gpuapi;
mod hostname;
mod output;
mod probe;
mod report;
mod topology;
mod types;
mod util;

#[cfg(test)]
mod mockgpu;
#[cfg(test)]
mod topology_test;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Print the report as a JSON object
    #[arg(long, default_value_t = false)]
    json: bool,

    /// Skip NVLink discovery and only probe pairwise peer access
    #[arg(long, default_value_t = false)]
    peer_access_only: bool,

    /// Load NVML from this shared library [default: libnvidia-ml.so.1]
    #[arg(long)]
    nvml_library: Option<String>,

    /// Log progress and per-link details to stderr
    #[arg(long, default_value_t = false)]
    verbose: bool,
}

fn main() {
    let cli = Cli::parse();

    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(if cli.verbose { "debug" } else { "warn" }),
    )
    .init();

    let opts = probe::ProbeOptions {
        json: cli.json,
        peer_access_only: cli.peer_access_only,
        nvml_library: cli.nvml_library,
    };

    if let Err(msg) = command_probe(&opts) {
        log::error!("{msg}");
        process::exit(1);
    }
}

fn command_probe(opts: &probe::ProbeOptions) -> Result<(), String> {
    let gpus = gpu::realgpu::RealGpu::new(opts.nvml_library.clone());
    let outcome = probe::run(&gpus, opts)?;
    let hostname = hostname::get();
    let mut stdout = io::stdout().lock();
    let written = if opts.json {
        report::write_json(&mut stdout, &hostname, &outcome)
    } else {
        report::write_text(&mut stdout, &hostname, &outcome)
    };
    written.map_err(|e| format!("Could not write the report: {e}"))
}
