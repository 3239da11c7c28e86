use std::process::ExitCode;

fn main() -> ExitCode {
    toolgate_cli::run()
}
