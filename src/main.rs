use clap::{Parser, Subcommand};
use imgcache::cache;
use imgcache::config::{self, DEFAULT_CONFIG_FILE};
use imgcache::image_cache::ImageCache;
use imgcache::imaging::RustBackend;
use imgcache::output;
use imgcache::params::RequestParams;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "imgcache")]
#[command(about = "On-demand image derivative cache")]
#[command(long_about = "\
On-demand image derivative cache

Derivatives (resized or cropped copies of originals) are generated on first
request and served from disk until they expire.

Templates:

  crop       Crop to --coords, then constrain to --max-width/--max-height
  large      Fit within 1600x900 (or the given bounds)
  small      Fit within 800x450 (or the given bounds)
  thumbnail  Fill and center-crop to a 300px square (or --max-width)

Cache layout:

  <cache_path>/<template>/<stem>-<key>.<ext>

Run 'imgcache gen-config' to generate a documented imgcache.toml.")]
#[command(version)]
struct Cli {
    /// Config file
    #[arg(long, default_value = DEFAULT_CONFIG_FILE, global = true)]
    config: PathBuf,

    /// Increase log verbosity (-v info, -vv debug). RUST_LOG overrides.
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

/// Per-request parameters shared by `get` and `warm`.
#[derive(clap::Args, Clone)]
struct ParamArgs {
    /// Override the template's width bound
    #[arg(long, allow_negative_numbers = true)]
    max_width: Option<i64>,

    /// Override the template's height bound
    #[arg(long, allow_negative_numbers = true)]
    max_height: Option<i64>,

    /// Crop rectangle as x,y,width,height
    #[arg(long)]
    coords: Option<String>,
}

impl ParamArgs {
    fn request_params(&self) -> RequestParams {
        RequestParams {
            max_width: self.max_width,
            max_height: self.max_height,
            coords: self.coords.clone(),
        }
    }
}

#[derive(Subcommand)]
enum Command {
    /// Print the path of a cached derivative, generating it if needed
    Get {
        template: String,
        filename: String,
        #[command(flatten)]
        params: ParamArgs,
        /// Print path, key and cache status as JSON
        #[arg(long)]
        json: bool,
    },
    /// Generate derivatives for many originals in parallel
    Warm {
        template: String,
        #[arg(required = true)]
        filenames: Vec<String>,
        #[command(flatten)]
        params: ParamArgs,
    },
    /// Delete every cached derivative
    Purge,
    /// Show per-template disk usage
    Stats,
    /// List registered templates
    Templates,
    /// Validate the config file
    Check,
    /// Print a stock imgcache.toml with all options documented
    GenConfig,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Command::Get {
            template,
            filename,
            params,
            json,
        } => {
            let config = config::load_config(&cli.config)?;
            let cache = ImageCache::new(&config, RustBackend::new());
            let outcome = cache.fetch(&template, &filename, &params.request_params())?;
            if json {
                println!("{}", serde_json::to_string_pretty(&outcome)?);
            } else {
                output::print_get_output(&outcome);
            }
        }
        Command::Warm {
            template,
            filenames,
            params,
        } => {
            let config = config::load_config(&cli.config)?;
            init_thread_pool(&config.processing);
            let cache = ImageCache::new(&config, RustBackend::new());
            let results = cache.fetch_many(&template, &filenames, &params.request_params());
            output::print_warm_output(&filenames, &results, &config.cache_path);
            if results.iter().any(Result::is_err) {
                return Err("some derivatives could not be generated".into());
            }
        }
        Command::Purge => {
            let config = config::load_config(&cli.config)?;
            let stats = cache::purge(&config.cache_path)?;
            output::print_purge_output(&stats, &config.cache_path);
        }
        Command::Stats => {
            let config = config::load_config(&cli.config)?;
            let usage = cache::usage(&config.cache_path)?;
            output::print_usage_output(&usage);
        }
        Command::Templates => {
            let config = config::load_config(&cli.config)?;
            output::print_templates_output(&config.template_registry());
        }
        Command::Check => {
            println!("==> Checking {}", cli.config.display());
            let config = config::load_config(&cli.config)?;
            for dir in &config.paths {
                if !dir.is_dir() {
                    println!("    warning: search path {} does not exist", dir.display());
                }
            }
            println!("==> Config is valid");
        }
        Command::GenConfig => {
            print!("{}", config::stock_config_toml());
        }
    }

    Ok(())
}

/// Install the stderr log subscriber. `RUST_LOG` wins over `-v`.
fn init_tracing(verbose: u8) {
    let default_level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

/// Initialize the rayon thread pool based on processing config.
///
/// Caps at the number of available CPU cores. Users can constrain down, not up.
fn init_thread_pool(processing: &config::ProcessingConfig) {
    let threads = config::effective_threads(processing);
    rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .build_global()
        .ok();
}
