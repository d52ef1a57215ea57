//! Launch configuration: command line merged with an optional TOML file.
//!
//! ```toml
//! [engine]
//! program = "/opt/vm/bin/engine"
//! args = ["--jit"]
//!
//! [log]
//! level = "info"
//! ```

use log::LevelFilter;
use serde::Deserialize;
use std::ffi::OsString;
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};

use crate::cli::LauncherCli;
use crate::logging;

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LauncherConfig {
    #[serde(default)]
    pub engine: EngineSection,
    #[serde(default)]
    pub log: LogSection,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EngineSection {
    pub program: Option<PathBuf>,
    #[serde(default)]
    pub args: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LogSection {
    pub level: Option<String>,
}

#[derive(Debug)]
pub enum ConfigError {
    Read { path: PathBuf, source: io::Error },
    Parse { path: PathBuf, source: toml::de::Error },
    InvalidLevel(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Read { path, source } => write!(f, "read config {}: {source}", path.display()),
            Self::Parse { path, source } => write!(f, "parse config {}: {source}", path.display()),
            Self::InvalidLevel(level) => write!(f, "unknown log level {level:?}"),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Read { source, .. } => Some(source),
            Self::Parse { source, .. } => Some(source),
            Self::InvalidLevel(_) => None,
        }
    }
}

impl LauncherConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(path, &content)
    }

    pub fn parse(path: &Path, content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn log_level(&self) -> Result<Option<LevelFilter>, ConfigError> {
        self.log
            .level
            .as_deref()
            .map(|level| {
                level
                    .parse::<LevelFilter>()
                    .map_err(|_| ConfigError::InvalidLevel(level.to_string()))
            })
            .transpose()
    }
}

pub const ENGINE_VAR: &str = "IMAGE_LAUNCHER_ENGINE";
pub const CONFIG_VAR: &str = "IMAGE_LAUNCHER_CONFIG";

/// Variable lookup used to fill options missing from the command line.
pub type EnvLookup = fn(&str) -> Option<OsString>;

pub fn process_env(key: &str) -> Option<OsString> {
    std::env::var_os(key)
}

pub fn empty_env(_key: &str) -> Option<OsString> {
    None
}

/// External engine invocation: `program args... <segment> <pass-through...>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineCommand {
    pub program: PathBuf,
    pub args: Vec<OsString>,
}

/// Everything derived from the invocation before any image is touched.
#[derive(Debug, Clone)]
pub struct LaunchRequest {
    pub segment: PathBuf,
    pub passthrough: Vec<OsString>,
    pub engine: Option<EngineCommand>,
    pub log_level: LevelFilter,
}

impl LaunchRequest {
    /// Command line first, then `env`, then the config file it names.
    pub fn resolve(mut cli: LauncherCli, env: EnvLookup) -> Result<Self, ConfigError> {
        let lookup = |key: &str| env(key).filter(|value| !value.is_empty()).map(PathBuf::from);
        cli.engine = cli.engine.or_else(|| lookup(ENGINE_VAR));
        cli.config = cli.config.or_else(|| lookup(CONFIG_VAR));

        let config = match &cli.config {
            Some(path) => LauncherConfig::load(path)?,
            None => LauncherConfig::default(),
        };
        Self::from_parts(cli, config)
    }

    pub fn from_parts(cli: LauncherCli, config: LauncherConfig) -> Result<Self, ConfigError> {
        let log_level = logging::level_for(cli.quiet, cli.verbose, config.log_level()?);

        // Engine args in the config belong to the config's program only.
        let engine = match (cli.engine, config.engine.program) {
            (Some(program), _) => Some(EngineCommand {
                program,
                args: Vec::new(),
            }),
            (None, Some(program)) => Some(EngineCommand {
                program,
                args: config.engine.args.into_iter().map(OsString::from).collect(),
            }),
            (None, None) => None,
        };

        Ok(Self {
            segment: cli.segment,
            passthrough: cli.args,
            engine,
            log_level,
        })
    }
}
