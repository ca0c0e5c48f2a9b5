//! camwatchd - webcam watch daemon
//!
//! Long-running modes (`watch`, `motion`) run until Ctrl-C, then stop the capture session,
//! write out pending frames and stop the upload watcher. The other subcommands are one-shot.

use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::mpsc;
use std::time::Duration;

use camwatch::{CamwatchConfig, Webcam};

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Camera device; overrides the configured one (e.g. 0, /dev/video2, stub://porch).
    #[arg(long, env = "CAMWATCH_DEVICE")]
    device: Option<String>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Record a sequence whenever a body is in view.
    Watch,
    /// Record while motion is detected.
    Motion {
        /// Stop after this many seconds instead of waiting for Ctrl-C.
        #[arg(long)]
        seconds: Option<u64>,
    },
    /// Authenticate the person in front of the camera.
    Authenticate {
        /// Use a single still instead of a voting session.
        #[arg(long)]
        once: bool,
    },
    /// Train the face model from the samples directory.
    Learn,
    /// Save one still frame as PNG.
    Snapshot {
        #[arg(long, default_value = ".")]
        out: PathBuf,
    },
    /// Save the first face in view as a new sample for NAME.
    CaptureFace { name: String },
    /// Save every face in view into the samples directory.
    CaptureFaces,
    /// Identify the faces in an image file, or in a still when no file is given.
    Predict { image: Option<PathBuf> },
    /// Identify the loose images in the samples directory.
    PredictSamples,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let mut config = CamwatchConfig::load()?;
    if let Some(device) = args.device {
        config.camera.device = device;
    }
    let webcam = Webcam::new(config)?;

    match args.command {
        Command::Watch => {
            webcam.start_watching()?;
            wait_for_shutdown("watch");
            if let Some(path) = webcam.stop_watching()? {
                log::info!("last sequence written to {}", path.display());
            }
        }
        Command::Motion { seconds: Some(seconds) } => {
            match webcam.record_motion(Duration::from_secs(seconds))? {
                Some(path) => println!("{}", path.display()),
                None => log::info!("no motion recorded"),
            }
        }
        Command::Motion { seconds: None } => {
            webcam.start_motion_detection()?;
            wait_for_shutdown("motion");
            if let Some(path) = webcam.stop_motion_detection()? {
                log::info!("last recording written to {}", path.display());
            }
        }
        Command::Authenticate { once } => {
            let identity = if once {
                webcam.authenticate_snapshot()?
            } else {
                webcam.authenticate()?
            };
            match identity {
                Some(user) => println!("{}", serde_json::to_string(&user)?),
                None => return Err(anyhow!("authentication failed")),
            }
        }
        Command::Learn => {
            webcam.learn_faces()?;
            log::info!("face model trained");
        }
        Command::Snapshot { out } => {
            let path = webcam.snapshot()?.save_png(&out)?;
            println!("{}", path.display());
        }
        Command::CaptureFace { name } => match webcam.capture_face(&name)? {
            Some(path) => println!("{}", path.display()),
            None => return Err(anyhow!("no face found")),
        },
        Command::CaptureFaces => {
            for path in webcam.capture_faces()? {
                println!("{}", path.display());
            }
        }
        Command::Predict { image } => {
            let identities = match image {
                Some(path) => webcam.predict_image(&std::fs::read(&path)?)?,
                None => webcam.predict_snapshot()?,
            };
            println!("{}", serde_json::to_string(&identities)?);
        }
        Command::PredictSamples => {
            for (path, identities) in webcam.predict_samples()? {
                println!("{}\t{}", path.display(), serde_json::to_string(&identities)?);
            }
        }
    }
    Ok(())
}

fn wait_for_shutdown(mode: &str) {
    let (tx, rx) = mpsc::channel();
    ctrlc::set_handler(move || {
        let _ = tx.send(());
    })
    .expect("error setting Ctrl-C handler");

    log::info!("camwatchd {} running; waiting for shutdown signal (Ctrl-C)...", mode);
    let _ = rx.recv();
    log::info!("shutdown signal received, stopping {}...", mode);
}
