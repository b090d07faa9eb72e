use clap::{Parser, Subcommand};
use log::{error, info, LevelFilter};

use hrec::configuration::config::RecordArgs;
use hrec::configuration::RecordConfig;
use hrec::recording::Recorder;
use hrec::redo::{self, RedoArgs};
use hrec::server;

/// Records HTTP traffic to JSON files, directly or while proxying it, and
/// replays recorded requests.
#[derive(Parser, Debug)]
#[command(name = "hrec", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Listen for HTTP requests and record them.
    Record(RecordArgs),
    /// Replay a recorded request and print the response.
    Redo(RedoArgs),
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let verbose = match &cli.command {
        Command::Record(args) => args.verbose,
        Command::Redo(args) => args.verbose,
    };
    env_logger::Builder::from_default_env()
        .filter_level(if verbose {
            LevelFilter::Debug
        } else {
            LevelFilter::Info
        })
        .format_target(false)
        .init();

    match cli.command {
        Command::Record(args) => {
            let config = match RecordConfig::from_args(args) {
                Ok(config) => config,
                Err(e) => {
                    error!("{}", e);
                    std::process::exit(1);
                }
            };
            info!("hrec record settings:");
            config.log_settings();

            let recorder = match Recorder::new(&config, ".") {
                Ok(recorder) => recorder,
                Err(e) => {
                    error!("{}", e);
                    std::process::exit(1);
                }
            };
            if let Err(e) = server::serve(config, recorder).await {
                error!("{}", e);
                std::process::exit(1);
            }
        }
        Command::Redo(args) => {
            if let Err(e) = redo::run(args).await {
                error!("{}", e);
                std::process::exit(1);
            }
        }
    }
}
