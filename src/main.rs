//! Webcam Classifier - Main Entry Point

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};

use webcam_classifier::camera::list_cameras;
use webcam_classifier::manifest::fix_model_file;
use webcam_classifier::model::{resolve_model_url, ModelLoader, OnnxRuntime};
use webcam_classifier::telemetry::{init_logging, LogConfig};
use webcam_classifier::{ClassifierSettings, Session};

#[derive(Parser, Debug)]
#[command(name = "webcam-classifier", version, about = "Classify webcam frames with a pre-trained model")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,

    /// Settings file (defaults to the user config directory)
    #[arg(long, global = true)]
    settings: Option<PathBuf>,

    /// Base URL that relative model URLs are resolved against
    #[arg(long, global = true)]
    origin: Option<String>,

    /// Model manifest URL
    #[arg(long, global = true)]
    model_url: Option<String>,

    /// Camera index
    #[arg(long, global = true)]
    camera: Option<u32>,

    /// Prediction ticks per second
    #[arg(long, global = true)]
    fps: Option<u32>,

    /// Also write logs to this file
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,

    /// Log as JSON
    #[arg(long, global = true)]
    json_logs: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Load the model, open the camera and classify until Ctrl-C (default)
    Run,
    /// Fetch and validate a model manifest
    Validate {
        /// Manifest URL (defaults to the configured model URL)
        url: Option<String>,
    },
    /// Copy batch_shape to batch_input_shape on InputLayers of a model.json
    FixInputShapes {
        #[arg(default_value = "tfjs_model/model.json")]
        path: PathBuf,
    },
    /// List available cameras
    Cameras,
}

impl Cli {
    fn load_settings(&self) -> anyhow::Result<ClassifierSettings> {
        let mut settings = match &self.settings {
            Some(path) => ClassifierSettings::load_from_file(path)
                .with_context(|| format!("Failed to load settings from {}", path.display()))?,
            None => ClassifierSettings::load(),
        };

        if let Some(origin) = &self.origin {
            settings.origin = origin.clone();
        }
        if let Some(model_url) = &self.model_url {
            settings.model_url = model_url.clone();
        }
        if let Some(camera) = self.camera {
            settings.camera_index = camera;
        }
        if let Some(fps) = self.fps {
            settings.target_fps = fps;
        }
        settings.clamp();
        Ok(settings)
    }
}

async fn run(settings: ClassifierSettings) -> anyhow::Result<()> {
    let session = Session::native(settings)?;
    session.start().await;

    if !session.is_predicting() {
        bail!("{}", session.labels().status());
    }

    tracing::info!("Press Ctrl-C to stop");
    tokio::signal::ctrl_c().await.context("Failed to listen for Ctrl-C")?;

    session.stop().await;
    tracing::info!(prediction = %session.labels().prediction(), "Last prediction");
    Ok(())
}

async fn validate(settings: ClassifierSettings, url: Option<String>) -> anyhow::Result<()> {
    let loader = ModelLoader::new(&settings.origin, Arc::new(OnnxRuntime::new(&settings)?))?;
    let url = resolve_model_url(loader.origin(), url.as_deref().unwrap_or(&settings.model_url))?;

    let manifest = loader.fetch_manifest(&url).await?;
    let groups = manifest.weight_groups();
    let shards: usize = groups.iter().map(|g| g.paths.len()).sum();

    println!("{}: OK", url);
    println!("  weight groups: {} ({} shards)", groups.len(), shards);
    match manifest.input_size() {
        Some((width, height)) => println!("  input size: {}x{}", width, height),
        None => println!("  input size: not declared"),
    }
    Ok(())
}

fn cameras() -> anyhow::Result<()> {
    let cameras = list_cameras()?;
    if cameras.is_empty() {
        println!("No cameras found");
    }
    for camera in cameras {
        println!("{}: {}", camera.index, camera.name);
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let log_config = LogConfig {
        file_path: cli.log_file.clone(),
        json_format: cli.json_logs,
        ..LogConfig::default()
    };
    let _log_guard = init_logging(&log_config).map_err(|e| anyhow::anyhow!(e))?;

    let settings = cli.load_settings()?;

    match cli.command.unwrap_or(Command::Run) {
        Command::Run => run(settings).await,
        Command::Validate { url } => validate(settings, url).await,
        Command::FixInputShapes { path } => {
            let patched = fix_model_file(&path)?;
            println!("Patched {} InputLayer shape(s) in {}", patched, path.display());
            Ok(())
        }
        Command::Cameras => cameras(),
    }
}
