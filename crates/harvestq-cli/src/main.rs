//! CLI for harvestq — drive the entropy harvest queue end to end.

mod commands;
mod live;
mod mixer;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "harvestq")]
#[command(about = "harvestq — bounded entropy harvesting into a SHA-256 mixing sink")]
#[command(version = harvestq_core::VERSION)]
struct Cli {
    /// Log queue lifecycle events (repeat for more detail)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run producers against the queue for a while and report what was mixed
    Run {
        /// Event slots in the pool
        #[arg(long, default_value_t = harvestq_core::DEFAULT_CAPACITY)]
        capacity: usize,

        /// Number of producer threads harvesting timing jitter
        #[arg(long, default_value = "4")]
        producers: usize,

        /// How long to run (e.g. "500ms", "5s", "1m")
        #[arg(long, default_value = "2s")]
        duration: String,

        /// Pause between harvests on each producer, in microseconds (0 = flat out)
        #[arg(long, default_value = "100")]
        interval_us: u64,

        /// Consumer poll interval in milliseconds
        #[arg(long, default_value = "100")]
        poll_ms: u64,

        /// Entropy cache file to ingest before producers start (repeatable)
        #[arg(long = "seed-file")]
        seed_files: Vec<String>,

        /// Register live sources polled by the consumer: os_random, clock_jitter
        #[arg(long = "live", value_parser = ["os_random", "clock_jitter"])]
        live: Vec<String>,

        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Ingest entropy cache files and report what was accepted
    Seed {
        /// Cache files to read (default: the standard cache locations)
        files: Vec<String>,

        /// Event slots in the pool
        #[arg(long, default_value_t = harvestq_core::DEFAULT_CAPACITY)]
        capacity: usize,

        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },

    /// List entropy origin tags
    Sources,
}

fn main() {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    match cli.command {
        Commands::Run {
            capacity,
            producers,
            duration,
            interval_us,
            poll_ms,
            seed_files,
            live,
            json,
        } => commands::run::run(commands::run::RunCommandConfig {
            capacity,
            producers,
            duration: &duration,
            interval_us,
            poll_ms,
            seed_files: &seed_files,
            live: &live,
            json,
        }),
        Commands::Seed {
            files,
            capacity,
            json,
        } => commands::seed::run(&files, capacity, json),
        Commands::Sources => commands::sources::run(),
    }
}
