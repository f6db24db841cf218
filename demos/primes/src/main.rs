use anyhow::Context;
use clap::Parser;

use feather_execution::GroupConfig;
use feather_primes::run_pipeline;

/// feather-primes - prime-number producer/consumer on cooperative threads
#[derive(Debug, Parser)]
#[command(name = "feather-primes", version, about, long_about = None)]
struct Cli {
    /// Capacity of the buffer between producer and consumer.
    #[arg(
        value_name = "CAPACITY",
        default_value_t = 10,
        value_parser = clap::value_parser!(u16).range(1..)
    )]
    capacity: u16,

    /// Produce every prime below this number.
    #[arg(short, long, default_value_t = 30)]
    limit: i32,

    /// Size of each worker stack in bytes.
    #[arg(long, env = "FEATHER_STACK_SIZE", default_value_t = GroupConfig::ROOMY_STACK_SIZE)]
    stack_size: usize,

    /// Enable verbose (debug-level) logging output.
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // info+ on stderr, --verbose enables debug; FEATHER_LOG overrides
    let level = if cli.verbose {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Info
    };
    env_logger::Builder::new()
        .filter_level(level)
        .parse_env("FEATHER_LOG")
        .target(env_logger::Target::Stderr)
        .format_timestamp(None)
        .init();

    let config = GroupConfig::new()
        .with_stack_size(cli.stack_size)
        .with_name("primes");
    let primes = run_pipeline(config, cli.capacity.into(), cli.limit)
        .context("cannot set up producer and consumer threads")?;

    for prime in primes {
        println!("New prime number: {}", prime);
    }
    Ok(())
}
