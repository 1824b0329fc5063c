use brrtserve::cli::{run_cli, Cli};
use clap::Parser;

fn main() -> anyhow::Result<()> {
    run_cli(Cli::parse())
}
