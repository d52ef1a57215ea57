//! End-to-end launch scenarios driven through `Launcher::main` with
//! recording doubles for the segment source and the engine.

use image_launcher::config::{empty_env, ENGINE_VAR};
use image_launcher::status;
use image_launcher::{AcquireError, Engine, EngineError, FileSource, LaunchRequest, Launcher, SegmentSource};
use segment_tool::{build_segment, DEFAULT_BASE};
use std::cell::{Cell, RefCell};
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::time::{SystemTime, UNIX_EPOCH};

fn temp_path(name: &str) -> PathBuf {
    let mut path = std::env::temp_dir();
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("clock")
        .as_nanos();
    path.push(format!("image-launcher-it-{name}-{nanos}"));
    path
}

fn valid_segment(name: &str) -> PathBuf {
    let path = temp_path(name);
    let image = build_segment(b"kernel module bytes", DEFAULT_BASE, Some(64 * 1024), None).expect("build");
    fs::write(&path, image).expect("write segment");
    path
}

/// A launcher that ignores `IMAGE_LAUNCHER_*` variables from the caller's shell.
fn isolated<S, E>(source: S, engine: E) -> Launcher<S, E>
where
    S: SegmentSource,
    E: Engine<S::Segment>,
{
    Launcher::new(source, engine).with_env(empty_env)
}

fn argv(args: &[&str]) -> Vec<OsString> {
    args.iter().map(OsString::from).collect()
}

/// Records every `run` call and answers with a fixed status.
#[derive(Default)]
struct RecordingEngine {
    status: i32,
    reject: Option<String>,
    fail: bool,
    calls: Rc<RefCell<Vec<Vec<OsString>>>>,
    released: Option<Rc<Cell<usize>>>,
    released_during_run: Rc<Cell<Option<usize>>>,
}

impl RecordingEngine {
    fn returning(status: i32) -> Self {
        Self {
            status,
            ..Self::default()
        }
    }
}

impl<S> Engine<S> for RecordingEngine {
    fn prepare(&mut self, _request: &LaunchRequest) -> Result<(), String> {
        match &self.reject {
            Some(reason) => Err(reason.clone()),
            None => Ok(()),
        }
    }

    fn run(&mut self, _kernel: &S, _request: &LaunchRequest, args: &[OsString]) -> Result<i32, EngineError> {
        self.calls.borrow_mut().push(args.to_vec());
        if let Some(released) = &self.released {
            self.released_during_run.set(Some(released.get()));
        }
        if self.fail {
            return Err(EngineError::NoStatus);
        }
        Ok(self.status)
    }
}

/// Segment double that counts its own release.
struct TrackedSegment {
    released: Rc<Cell<usize>>,
}

impl Drop for TrackedSegment {
    fn drop(&mut self) {
        self.released.set(self.released.get() + 1);
    }
}

#[derive(Default)]
struct TrackingSource {
    acquired: Rc<Cell<usize>>,
    released: Rc<Cell<usize>>,
    missing: bool,
}

impl SegmentSource for TrackingSource {
    type Segment = TrackedSegment;

    fn acquire(&mut self, path: &Path) -> Result<TrackedSegment, AcquireError> {
        if self.missing {
            return Err(AcquireError::NotFound(path.to_path_buf()));
        }
        self.acquired.set(self.acquired.get() + 1);
        Ok(TrackedSegment {
            released: Rc::clone(&self.released),
        })
    }
}

#[test]
fn scenario_a_missing_image_argument() {
    let engine = RecordingEngine::returning(0);
    let calls = Rc::clone(&engine.calls);
    let mut launcher = isolated(FileSource, engine);

    assert_eq!(launcher.main(["prog"]), status::INVALID_ARGUMENTS);
    assert!(calls.borrow().is_empty());
}

#[test]
fn scenario_b_missing_image_file() {
    let engine = RecordingEngine::returning(0);
    let calls = Rc::clone(&engine.calls);
    let mut launcher = isolated(FileSource, engine);
    let missing = temp_path("missing.image");

    let code = launcher.main(vec![OsString::from("prog"), missing.into_os_string()]);
    assert_eq!(code, status::IMAGE_UNAVAILABLE);
    assert_ne!(code, status::INVALID_ARGUMENTS);
    assert!(calls.borrow().is_empty());
}

#[test]
fn scenario_c_engine_success() {
    let segment = valid_segment("valid-c.image");
    let mut launcher = isolated(FileSource, RecordingEngine::returning(0));

    assert_eq!(launcher.main(vec![OsString::from("prog"), segment.clone().into_os_string()]), 0);

    let _ = fs::remove_file(segment);
}

#[test]
fn scenario_d_engine_status_passes_through() {
    let segment = valid_segment("valid-d.image");
    let mut launcher = isolated(FileSource, RecordingEngine::returning(42));

    assert_eq!(launcher.main(vec![OsString::from("prog"), segment.clone().into_os_string()]), 42);

    let _ = fs::remove_file(segment);
}

#[test]
fn launches_once_with_the_received_arguments() {
    let segment = valid_segment("argv.image");
    let engine = RecordingEngine::returning(3);
    let calls = Rc::clone(&engine.calls);
    let mut launcher = isolated(FileSource, engine);

    let segment_arg = segment.to_str().expect("segment str");
    let args = argv(&["prog", "-v", segment_arg, "script.st", "--heap", "64m"]);
    assert_eq!(launcher.main(args.clone()), 3);

    let calls = calls.borrow();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0], args);

    let _ = fs::remove_file(segment);
}

#[test]
fn corrupt_image_is_unavailable() {
    let path = temp_path("corrupt.image");
    fs::write(&path, vec![0x5A_u8; 512]).expect("write");
    let engine = RecordingEngine::returning(0);
    let calls = Rc::clone(&engine.calls);
    let mut launcher = isolated(FileSource, engine);

    let code = launcher.main(vec![OsString::from("prog"), path.clone().into_os_string()]);
    assert_eq!(code, status::IMAGE_UNAVAILABLE);
    assert!(calls.borrow().is_empty());

    let _ = fs::remove_file(path);
}

#[test]
fn repeated_invalid_invocations_fail_identically() {
    let mut launcher = isolated(FileSource, RecordingEngine::returning(0));
    let first = launcher.main(["prog", "--no-such-flag"]);
    let second = launcher.main(["prog", "--no-such-flag"]);
    assert_eq!(first, status::INVALID_ARGUMENTS);
    assert_eq!(first, second);
}

#[test]
fn segment_is_held_during_launch_and_released_after() {
    let source = TrackingSource::default();
    let acquired = Rc::clone(&source.acquired);
    let released = Rc::clone(&source.released);
    let engine = RecordingEngine {
        status: 9,
        released: Some(Rc::clone(&source.released)),
        ..RecordingEngine::default()
    };
    let during_run = Rc::clone(&engine.released_during_run);
    let mut launcher = isolated(source, engine);

    assert_eq!(launcher.main(["prog", "kernel.seg"]), 9);
    assert_eq!(acquired.get(), 1);
    assert_eq!(during_run.get(), Some(0));
    assert_eq!(released.get(), 1);
}

#[test]
fn engine_rejection_releases_segment_without_launch() {
    let source = TrackingSource::default();
    let released = Rc::clone(&source.released);
    let engine = RecordingEngine {
        reject: Some("no engine configured".to_string()),
        ..RecordingEngine::default()
    };
    let calls = Rc::clone(&engine.calls);
    let mut launcher = isolated(source, engine);

    assert_eq!(launcher.main(["prog", "kernel.seg"]), status::INVALID_ARGUMENTS);
    assert_eq!(released.get(), 1);
    assert!(calls.borrow().is_empty());
}

#[test]
fn help_exits_cleanly_without_acquiring() {
    let source = TrackingSource::default();
    let acquired = Rc::clone(&source.acquired);
    let mut launcher = isolated(source, RecordingEngine::returning(1));

    assert_eq!(launcher.main(["prog", "--help"]), status::SUCCESS);
    assert_eq!(acquired.get(), 0);
}

#[test]
fn unavailable_source_never_launches() {
    let source = TrackingSource {
        missing: true,
        ..TrackingSource::default()
    };
    let released = Rc::clone(&source.released);
    let engine = RecordingEngine::returning(0);
    let calls = Rc::clone(&engine.calls);
    let mut launcher = isolated(source, engine);

    assert_eq!(launcher.main(["prog", "kernel.seg"]), status::IMAGE_UNAVAILABLE);
    assert_eq!(released.get(), 0);
    assert!(calls.borrow().is_empty());
}

#[test]
fn native_launcher_reports_missing_image_before_engine_setup() {
    let missing = temp_path("native-missing.image");
    let code = Launcher::native()
        .with_env(empty_env)
        .main(vec![OsString::from("prog"), missing.into_os_string()]);
    assert_eq!(code, status::IMAGE_UNAVAILABLE);
}

#[cfg(unix)]
#[test]
fn native_launcher_runs_configured_engine() {
    let segment = valid_segment("native.image");
    let config = temp_path("launcher.toml");
    fs::write(
        &config,
        r#"
        [engine]
        program = "sh"
        args = ["-c", "test \"$2\" = hello && exit 7", "engine"]
        "#,
    )
    .expect("write config");

    let code = Launcher::native().with_env(empty_env).main(vec![
        OsString::from("prog"),
        OsString::from("--config"),
        config.clone().into_os_string(),
        segment.clone().into_os_string(),
        OsString::from("hello"),
    ]);
    assert_eq!(code, 7);

    let _ = fs::remove_file(segment);
    let _ = fs::remove_file(config);
}

#[test]
fn engine_failure_is_launch_failure_and_releases_segment() {
    let source = TrackingSource::default();
    let released = Rc::clone(&source.released);
    let engine = RecordingEngine {
        fail: true,
        ..RecordingEngine::default()
    };
    let calls = Rc::clone(&engine.calls);
    let mut launcher = isolated(source, engine);

    assert_eq!(launcher.main(["prog", "kernel.seg"]), status::LAUNCH_FAILURE);
    assert_eq!(calls.borrow().len(), 1);
    assert_eq!(released.get(), 1);
}

#[test]
fn native_launcher_reports_unstartable_engine() {
    let segment = valid_segment("unstartable.image");
    let code = Launcher::native().with_env(empty_env).main(vec![
        OsString::from("prog"),
        OsString::from("--engine"),
        OsString::from("/nonexistent/engine"),
        segment.clone().into_os_string(),
    ]);
    assert_eq!(code, status::LAUNCH_FAILURE);

    let _ = fs::remove_file(segment);
}

fn unstartable_engine_env(key: &str) -> Option<OsString> {
    (key == ENGINE_VAR).then(|| OsString::from("/nonexistent/engine"))
}

#[test]
fn engine_from_environment_is_used_when_flag_is_absent() {
    let segment = valid_segment("env-engine.image");
    let code = Launcher::native()
        .with_env(unstartable_engine_env)
        .main(vec![OsString::from("prog"), segment.clone().into_os_string()]);
    assert_eq!(code, status::LAUNCH_FAILURE);

    let _ = fs::remove_file(segment);
}

#[test]
fn native_launcher_without_engine_is_invalid() {
    let segment = valid_segment("no-engine.image");
    let code = Launcher::native()
        .with_env(empty_env)
        .main(vec![OsString::from("prog"), segment.clone().into_os_string()]);
    assert_eq!(code, status::INVALID_ARGUMENTS);

    let _ = fs::remove_file(segment);
}
