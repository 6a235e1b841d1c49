use clap::Parser;

use rhizome::api::{run_server, ApiState};
use rhizome::config::SimConfig;
use rhizome::error::Result;
use rhizome::simulation::Simulation;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Port for the headless API server
    #[arg(long, default_value_t = 8080)]
    port: u16,

    /// Configuration file path (YAML or JSON). If not specified, searches
    /// for config.yaml, config.yml, or config.json in current directory.
    #[arg(short, long)]
    config: Option<String>,

    /// RNG seed for a deterministic run; random otherwise
    #[arg(long)]
    seed: Option<u64>,

    /// Grid width in cells (overrides config)
    #[arg(long)]
    width: Option<usize>,

    /// Grid height in cells (overrides config)
    #[arg(long)]
    height: Option<usize>,

    /// Number of sources (overrides config)
    #[arg(long)]
    sources: Option<usize>,
}

#[tokio::main]
async fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "rhizome=info".into()),
        )
        .init();

    let args = Args::parse();
    let config = load_config(&args)?;

    // Configuration errors are fatal: the simulation does not start.
    let mut rng = match args.seed {
        Some(seed) => {
            use rand::SeedableRng;
            rand_chacha::ChaCha8Rng::seed_from_u64(seed)
        }
        None => {
            use rand::SeedableRng;
            rand_chacha::ChaCha8Rng::from_entropy()
        }
    };
    let sim = Simulation::with_config(&mut rng, config)?;

    run_server(ApiState::new(sim, args.seed), args.port).await
}

/// Load configuration from file or defaults, then apply CLI overrides.
fn load_config(args: &Args) -> Result<SimConfig> {
    let mut config = match args.config.as_deref() {
        Some(path) => SimConfig::from_file(path)?,
        None => SimConfig::from_default_paths(),
    };
    if let Some(width) = args.width {
        config.grid_width = width;
    }
    if let Some(height) = args.height {
        config.grid_height = height;
    }
    if let Some(sources) = args.sources {
        config.source_count = sources;
    }
    config.validate()?;
    Ok(config)
}
