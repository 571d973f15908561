pub mod cli;
pub mod config;
pub mod dockerfile;
pub mod mode;
pub mod package;
pub mod process;
pub mod runner;

/// Run the command line interface and return an exit code.
pub fn run_cli() -> i32 {
    cli::run()
}
