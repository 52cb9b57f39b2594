mod config;
mod professor;
mod runtime;
mod speech;

use anyhow::Context;
use clap::{Parser, Subcommand};
use config::Config;
use pitch_core::api::ApiClient;
use professor::ProfessorCommand;
use runtime::PresentOptions;
use tracing_subscriber::fmt::time::ChronoLocal;

#[derive(Parser, Debug)]
#[command(version, about = "Rehearse a pitch deck with questions at locked slides")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Present a deck: record, navigate and answer questions
    Present {
        /// Assignment the deck was uploaded for
        #[arg(long)]
        assignment: String,
        /// Number of slides in the deck; defaults to the last uploaded deck
        #[arg(long)]
        slides: Option<u32>,
        /// Create a backend session for this student
        #[arg(long)]
        student: Option<String>,
    },
    /// Review sessions from the professor side
    Professor {
        #[command(subcommand)]
        command: ProfessorCommand,
    },
    /// List available microphones
    Devices,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = Config::from_env().context("Failed to load configuration")?;

    tracing_subscriber::fmt()
        .with_max_level(config.log_level)
        .with_timer(ChronoLocal::rfc_3339())
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Present {
            assignment,
            slides,
            student,
        } => {
            tracing::info!("Starting presentation for assignment {}", assignment);
            runtime::run_presentation(
                &config,
                PresentOptions {
                    assignment,
                    slides,
                    student,
                },
            )
            .await?;
        }
        Commands::Professor { command } => {
            let api = ApiClient::new(config.api_base_url.clone(), config.request_timeout)
                .context("Failed to build API client")?;
            professor::run(&api, command).await?;
        }
        Commands::Devices => {
            let devices = pitch_native_utils::device::get_available_inputs()?;
            println!("Input devices:\n{devices}");
        }
    }
    Ok(())
}
