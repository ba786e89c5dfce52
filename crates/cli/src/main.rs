use std::process::ExitCode;

fn main() -> ExitCode {
    stageflow_cli::run()
}
