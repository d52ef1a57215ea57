//! Process entry for the launcher.
//!
//! The engine's status is handed to the OS as-is, so this exits through
//! `process::exit` rather than `ExitCode`, which only carries a `u8`.

use std::env;
use std::process;

use image_launcher::Launcher;

fn main() {
    let status = Launcher::native().main(env::args_os());
    process::exit(status);
}
