use clap::Parser;
use segment_tool::{run_with_cli, Cli};

fn main() {
    if let Err(err) = run_with_cli(Cli::parse()) {
        eprintln!("segment-tool: {err:#}");
        std::process::exit(1);
    }
}
