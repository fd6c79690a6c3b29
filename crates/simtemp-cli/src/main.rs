mod infra;
mod output;
mod runtime;

use std::process::ExitCode;

fn main() -> ExitCode {
    runtime::run_from_args()
}
