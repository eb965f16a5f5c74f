use std::process::ExitCode;

fn main() -> ExitCode {
    chokepoint_cli::run()
}
