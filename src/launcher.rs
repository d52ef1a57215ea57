//! The bootstrap sequence: arguments, segment, engine, exit status.

use clap::Parser;
use clap::error::ErrorKind;
use log::LevelFilter;
use std::ffi::OsString;
use std::fmt;

use crate::cli::LauncherCli;
use crate::config::{self, ConfigError, EnvLookup, LaunchRequest};
use crate::engine::{CommandEngine, Engine};
use crate::logging;
use crate::segment::{AcquireError, FileSource, SegmentSource};
use crate::status;

#[derive(Debug)]
pub enum LaunchError {
    InvalidArguments(String),
    Config(ConfigError),
    ImageUnavailable(AcquireError),
}

impl LaunchError {
    pub fn status(&self) -> i32 {
        match self {
            Self::InvalidArguments(_) | Self::Config(_) => status::INVALID_ARGUMENTS,
            Self::ImageUnavailable(_) => status::IMAGE_UNAVAILABLE,
        }
    }
}

impl fmt::Display for LaunchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidArguments(msg) => f.write_str(msg),
            Self::Config(err) => write!(f, "{err}"),
            Self::ImageUnavailable(err) => write!(f, "{err}"),
        }
    }
}

impl std::error::Error for LaunchError {}

impl From<ConfigError> for LaunchError {
    fn from(value: ConfigError) -> Self {
        Self::Config(value)
    }
}

impl From<AcquireError> for LaunchError {
    fn from(value: AcquireError) -> Self {
        Self::ImageUnavailable(value)
    }
}

pub struct Launcher<S, E> {
    source: S,
    engine: E,
    env: EnvLookup,
}

impl Launcher<FileSource, CommandEngine> {
    /// Segments from files, run by an external engine executable.
    pub fn native() -> Self {
        Self::new(FileSource, CommandEngine)
    }
}

impl<S, E> Launcher<S, E>
where
    S: SegmentSource,
    E: Engine<S::Segment>,
{
    pub fn new(source: S, engine: E) -> Self {
        Self {
            source,
            engine,
            env: config::process_env,
        }
    }

    /// Replace the process environment as the source of
    /// `IMAGE_LAUNCHER_*` fallbacks.
    pub fn with_env(mut self, env: EnvLookup) -> Self {
        self.env = env;
        self
    }

    /// Process entry: returns the exit status for the OS.
    pub fn main<I, T>(&mut self, argv: I) -> i32
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString>,
    {
        let argv: Vec<OsString> = argv.into_iter().map(Into::into).collect();
        logging::init(LevelFilter::Warn);

        match self.bootstrap(&argv) {
            Ok(code) => code,
            Err(err) => {
                log::error!("{err}");
                err.status()
            }
        }
    }

    fn bootstrap(&mut self, argv: &[OsString]) -> Result<i32, LaunchError> {
        let Some(request) = parse_request(argv, self.env)? else {
            return Ok(status::SUCCESS);
        };
        logging::init(request.log_level);

        let kernel = self.source.acquire(&request.segment)?;
        // An engine rejection drops `kernel` on the way out.
        self.engine
            .prepare(&request)
            .map_err(LaunchError::InvalidArguments)?;

        Ok(self.launch(kernel, &request, argv))
    }

    /// Consumes `kernel`: the segment is released when the engine returns.
    fn launch(&mut self, kernel: S::Segment, request: &LaunchRequest, argv: &[OsString]) -> i32 {
        log::debug!("launching {} with {} argument(s)", request.segment.display(), argv.len());

        let code = match self.engine.run(&kernel, request, argv) {
            Ok(code) => code,
            Err(err) => {
                log::error!("{err}");
                status::LAUNCH_FAILURE
            }
        };
        drop(kernel);

        log::debug!("engine finished with status {code}");
        code
    }
}

/// `Ok(None)` when the invocation only asked for help or version output.
fn parse_request(argv: &[OsString], env: EnvLookup) -> Result<Option<LaunchRequest>, LaunchError> {
    if argv.is_empty() {
        return Err(LaunchError::InvalidArguments("empty argument vector".to_string()));
    }

    let cli = match LauncherCli::try_parse_from(argv) {
        Ok(cli) => cli,
        Err(err) if matches!(err.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) => {
            let _ = err.print();
            return Ok(None);
        }
        Err(err) => {
            let rendered = err.render().to_string();
            let msg = rendered.strip_prefix("error: ").unwrap_or(&rendered).trim_end();
            return Err(LaunchError::InvalidArguments(msg.to_string()));
        }
    };

    LaunchRequest::resolve(cli, env).map(Some).map_err(LaunchError::from)
}
