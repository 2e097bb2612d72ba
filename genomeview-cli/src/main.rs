mod commands;

use clap::{ArgGroup, Parser, Subcommand};
use commands::RangeInput;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "genomeview")]
#[command(about = "Convert genome selections and inspect shared viewer state")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show a location or segment selection in every unit
    #[command(group(ArgGroup::new("input").required(true).args(["locations", "segments"])))]
    Convert {
        #[arg(long, short)]
        config: PathBuf,

        /// Location ranges, e.g. "2001-3000,4500"
        #[arg(long)]
        locations: Option<String>,

        /// Segment ranges, e.g. "3-4,9"
        #[arg(long)]
        segments: Option<String>,
    },
    /// Resolve comma-separated gene names to segments and locations
    Genes {
        #[arg(long, short)]
        config: PathBuf,

        names: String,
    },
    /// Decode a controller state token and print it as JSON
    Inspect { token: String },
}

async fn run(command: Commands) -> anyhow::Result<String> {
    match command {
        Commands::Convert {
            config,
            locations,
            segments,
        } => {
            let config = shared::load_config(&config)?;
            let input = match (locations, segments) {
                (Some(locations), _) => RangeInput::Locations(locations),
                (None, Some(segments)) => RangeInput::Segments(segments),
                (None, None) => anyhow::bail!("Either --locations or --segments is required"),
            };
            commands::convert(&config, input).await
        }
        Commands::Genes { config, names } => {
            let config = shared::load_config(&config)?;
            commands::genes(&config, &names).await
        }
        Commands::Inspect { token } => commands::inspect(&token),
    }
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp(None)
        .init();

    let cli = Cli::parse();

    match run(cli.command).await {
        Ok(output) => {
            print!("{}", output);
            if !output.ends_with('\n') {
                println!();
            }
        }
        Err(e) => {
            eprintln!("Error: {:#}", e);
            std::process::exit(2);
        }
    }
}
