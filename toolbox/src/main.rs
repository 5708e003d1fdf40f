use clap::Parser;
use toolbox::Cli;
use tracing_subscriber::EnvFilter;

fn main() -> anyhow::Result<()> {
    let mut cmd: Cli = Cli::parse();

    // RUST_LOG 优先于子命令的 --verbose。
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| match cmd.verbosity() {
        0 => EnvFilter::new("warn"),
        1 => EnvFilter::new("info"),
        2 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"),
    });
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    cmd.run_program()
}
