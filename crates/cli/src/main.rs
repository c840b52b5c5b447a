use std::process::ExitCode;

fn main() -> ExitCode {
    priceye_cli::run()
}
