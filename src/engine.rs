//! Execution engines a loaded segment is handed to.

use std::ffi::OsString;
use std::fmt;
use std::io::{self, Write};
use std::path::PathBuf;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread;

use crate::config::LaunchRequest;
use crate::segment::ImageSegment;

pub trait Engine<S> {
    /// Checked before control is transferred; a rejection here means the
    /// invocation was unusable and `run` is never called.
    fn prepare(&mut self, request: &LaunchRequest) -> Result<(), String> {
        let _ = request;
        Ok(())
    }

    /// Run the segment to completion and return the engine's exit status.
    fn run(&mut self, kernel: &S, request: &LaunchRequest, args: &[OsString]) -> Result<i32, EngineError>;
}

#[derive(Debug)]
pub enum EngineError {
    NotConfigured,
    Spawn { program: PathBuf, source: io::Error },
    Wait(io::Error),
    NoStatus,
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotConfigured => f.write_str("no engine configured"),
            Self::Spawn { program, source } => write!(f, "failed to execute {}: {source}", program.display()),
            Self::Wait(err) => write!(f, "failed to wait for engine: {err}"),
            Self::NoStatus => f.write_str("engine exited without a status"),
        }
    }
}

impl std::error::Error for EngineError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Spawn { source, .. } | Self::Wait(source) => Some(source),
            _ => None,
        }
    }
}

/// Runs an external engine executable:
/// `program [engine args...] <segment> [pass-through args...]`.
///
/// The loaded segment bytes, header included, are written to the engine's
/// stdin; the path argument only names the image. The geometry is exported
/// as `IMAGE_SEGMENT_*` variables so the engine can map the bytes without
/// re-parsing the header.
#[derive(Debug, Default)]
pub struct CommandEngine;

impl Engine<ImageSegment> for CommandEngine {
    fn prepare(&mut self, request: &LaunchRequest) -> Result<(), String> {
        if request.engine.is_none() {
            return Err(
                "no engine configured (use --engine, IMAGE_LAUNCHER_ENGINE or [engine] program)".to_string(),
            );
        }
        Ok(())
    }

    fn run(&mut self, kernel: &ImageSegment, request: &LaunchRequest, _args: &[OsString]) -> Result<i32, EngineError> {
        let engine = request.engine.as_ref().ok_or(EngineError::NotConfigured)?;
        let header = kernel.header();

        let mut command = Command::new(&engine.program);
        command
            .args(&engine.args)
            .arg(&request.segment)
            .args(&request.passthrough)
            .env("IMAGE_SEGMENT_BASE", format!("{:#x}", header.base_address))
            .env("IMAGE_SEGMENT_SIZE", format!("{:#x}", header.size))
            .env("IMAGE_SEGMENT_RESERVED", format!("{:#x}", header.reservation()))
            .env("IMAGE_SEGMENT_MODULE", format!("{:#x}", header.module));
        log::debug!("handing off to {:?}", command);

        let mut child = command
            .stdin(Stdio::piped())
            .spawn()
            .map_err(|source| EngineError::Spawn {
                program: engine.program.clone(),
                source,
            })?;
        let status = feed_and_wait(&mut child, kernel.contents()).map_err(EngineError::Wait)?;
        exit_code(status)
    }
}

/// Write `contents` to the child's stdin while waiting for it to exit.
/// An engine that stops reading early is not an error.
fn feed_and_wait(child: &mut Child, contents: &[u8]) -> io::Result<ExitStatus> {
    let stdin = child.stdin.take();
    thread::scope(|scope| {
        let writer = scope.spawn(move || {
            let Some(mut stdin) = stdin else {
                return;
            };
            match stdin.write_all(contents) {
                Ok(()) => {}
                Err(err) if err.kind() == io::ErrorKind::BrokenPipe => {
                    log::debug!("engine closed stdin before reading the whole segment");
                }
                Err(err) => log::warn!("failed to hand segment to engine: {err}"),
            }
        });
        let status = child.wait();
        let _ = writer.join();
        status
    })
}

fn exit_code(status: ExitStatus) -> Result<i32, EngineError> {
    if let Some(code) = status.code() {
        return Ok(code);
    }

    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;

        if let Some(signal) = status.signal() {
            log::warn!("engine terminated by signal {signal}");
            return Ok(128 + signal);
        }
    }

    Err(EngineError::NoStatus)
}
