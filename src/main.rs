mod command;
mod compositor;
mod error;
mod thread;

use colored::Colorize;
use std::process::ExitCode;

fn main() -> ExitCode {
    match command::args_handle() {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("{} {}", "error:".red().bold(), err);
            ExitCode::FAILURE
        }
    }
}
