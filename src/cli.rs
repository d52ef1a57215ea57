use clap::Parser;
use std::ffi::OsString;
use std::path::PathBuf;

#[derive(Debug, Clone, Parser)]
#[command(
    name = "image-launcher",
    version,
    about = "Load a kernel image segment and hand it to an execution engine"
)]
pub struct LauncherCli {
    /// Engine executable that runs the loaded segment [env: IMAGE_LAUNCHER_ENGINE].
    #[arg(short, long, value_name = "PROGRAM")]
    pub engine: Option<PathBuf>,
    /// TOML configuration file [env: IMAGE_LAUNCHER_CONFIG].
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,
    /// Only report errors.
    #[arg(short, long, conflicts_with = "verbose")]
    pub quiet: bool,
    /// Report every bootstrap step.
    #[arg(short, long)]
    pub verbose: bool,
    /// Kernel image segment to load.
    #[arg(value_name = "SEGMENT")]
    pub segment: PathBuf,
    /// Arguments handed to the engine untouched.
    #[arg(value_name = "ARGS", trailing_var_arg = true, allow_hyphen_values = true)]
    pub args: Vec<OsString>,
}
