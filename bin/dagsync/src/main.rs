#![deny(unsafe_code)]

use std::{env, process::ExitCode};

fn main() -> ExitCode {
    let code = dagsync_cli::main_with_args(env::args_os());
    ExitCode::from(code.clamp(0, u8::MAX as i32) as u8)
}
