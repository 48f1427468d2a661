use bananashop_core::credentials::{CredentialStore, API_KEY_NAME};
use bananashop_core::export::{export_file_name, ExportFormat, ExportOptions};
use bananashop_core::renderer::Compositor;
use bananashop_core::scene::{CanvasConfig, DEFAULT_CANVAS_HEIGHT, DEFAULT_CANVAS_WIDTH};
use bananashop_core::tool::Tool;
use bananashop_core::EditorStore;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;

mod config;
use config::AppConfig;

/// Bananashop - layered image compositing with AI-assisted edits
#[derive(Parser, Debug)]
#[command(name = "bananashop")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Use this config file instead of the platform default
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Stack images as layers (first at the bottom) and export the result
    Compose {
        /// Images to place, bottom to top
        #[arg(required = true)]
        images: Vec<PathBuf>,

        /// Canvas width
        #[arg(long, default_value_t = DEFAULT_CANVAS_WIDTH)]
        width: u32,

        /// Canvas height
        #[arg(long, default_value_t = DEFAULT_CANVAS_HEIGHT)]
        height: u32,

        /// Integer output scale
        #[arg(long, default_value_t = 1)]
        scale: u32,

        /// Output format: png, jpeg or webp
        #[arg(long, default_value = "png")]
        format: ExportFormat,

        /// Encoder quality in [0, 1] (JPEG only)
        #[arg(long, default_value_t = 0.92)]
        quality: f64,

        /// Output file (defaults to a timestamped name)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Inspect or change stored settings
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// List tools and their keyboard shortcuts
    Tools,
}

#[derive(Subcommand, Debug)]
enum ConfigAction {
    /// Print the config location and current settings
    Show,
    /// Store the generation API key
    SetApiKey { key: String },
    /// Remove the stored API key
    ClearApiKey,
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let config = match &args.config {
        Some(path) => AppConfig::load_from(path),
        None => AppConfig::load(),
    };

    match run(args.command, config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(command: Command, mut config: AppConfig) -> Result<(), Box<dyn std::error::Error>> {
    match command {
        Command::Compose {
            images,
            width,
            height,
            scale,
            format,
            quality,
            output,
        } => {
            let options = ExportOptions {
                format,
                quality,
                scale,
            };
            compose(config, &images, CanvasConfig::new(width, height), &options, output)?;
        }
        Command::Config { action } => match action {
            ConfigAction::Show => {
                match config.path() {
                    Some(path) => println!("Config file: {}", path.display()),
                    None => println!("Config file: (none)"),
                }
                let key_state = if config.get(API_KEY_NAME).is_some() { "set" } else { "not set" };
                println!("API key: {}", key_state);
            }
            ConfigAction::SetApiKey { key } => {
                config.set(API_KEY_NAME, key.trim());
                log::info!("API key saved");
            }
            ConfigAction::ClearApiKey => {
                config.set(API_KEY_NAME, "");
                log::info!("API key removed");
            }
        },
        Command::Tools => {
            for tool in Tool::all() {
                println!("{:<8} {}", tool.display_name(), tool.shortcut_hint());
            }
        }
    }
    Ok(())
}

/// Editor store reading and writing credentials through the app config
fn new_store(config: AppConfig, canvas: CanvasConfig) -> EditorStore {
    let mut store = EditorStore::with_credentials(Box::new(config));
    store.set_canvas_config(canvas);
    store
}

fn compose(
    config: AppConfig,
    images: &[PathBuf],
    canvas: CanvasConfig,
    options: &ExportOptions,
    output: Option<PathBuf>,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut store = new_store(config, canvas);

    for path in images {
        let bytes = std::fs::read(path)?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        store.add_image_layer(&bytes, &name)?;
    }

    let mut compositor = Compositor::new();
    let encoded = store.export(&mut compositor, options)?;

    let output = output
        .unwrap_or_else(|| PathBuf::from(export_file_name(options.format, chrono::Utc::now())));
    std::fs::write(&output, &encoded)?;
    log::info!(
        "Wrote {} ({} layers, {} bytes)",
        output.display(),
        store.scene().len(),
        encoded.len()
    );
    Ok(())
}
