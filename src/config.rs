use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

const DEFAULT_DEVICE: &str = "0";
const DEFAULT_WIDTH: u32 = 640;
const DEFAULT_HEIGHT: u32 = 480;
const DEFAULT_CAMERA_FPS: u32 = 10;
const DEFAULT_FACES_PATH: &str = "data/faces";
const DEFAULT_PREDICTED_FACES_PATH: &str = "data/predicted/faces";
const DEFAULT_PREDICTED_IMAGES_PATH: &str = "data/predicted/images";
const DEFAULT_VIDEOS_PATH: &str = "data/videos";
const DEFAULT_FACE_CLASSIFIER: &str = "models/face.onnx";
const DEFAULT_BODY_CLASSIFIER: &str = "models/body.onnx";
const DEFAULT_VOTE_THRESHOLD: u32 = 3;
const DEFAULT_POLL_LOOPS: u32 = 50;
const DEFAULT_POLL_INTERVAL_MS: u64 = 200;
const DEFAULT_MAX_FRAMES: usize = 300;
const DEFAULT_SEQUENCE_SECS: u64 = 10;
const DEFAULT_RECORDING_FPS: u32 = 10;
const DEFAULT_UPLOAD_POLL_SECS: u64 = 60;

#[derive(Debug, Deserialize, Default)]
struct CamwatchConfigFile {
    camera: Option<CameraConfigFile>,
    paths: Option<PathsConfigFile>,
    classifiers: Option<ClassifiersConfigFile>,
    authentication: Option<AuthenticationConfigFile>,
    recording: Option<RecordingConfigFile>,
    upload: Option<UploadConfigFile>,
    users_path: Option<PathBuf>,
    reinforce_samples: Option<bool>,
}

#[derive(Debug, Deserialize, Default)]
struct CameraConfigFile {
    device: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    target_fps: Option<u32>,
}

#[derive(Debug, Deserialize, Default)]
struct PathsConfigFile {
    faces: Option<PathBuf>,
    predicted_faces: Option<PathBuf>,
    predicted_images: Option<PathBuf>,
    videos: Option<PathBuf>,
    motion_snapshots: Option<PathBuf>,
}

#[derive(Debug, Deserialize, Default)]
struct ClassifiersConfigFile {
    face: Option<String>,
    body: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct AuthenticationConfigFile {
    vote_threshold: Option<u32>,
    poll_loops: Option<u32>,
    poll_interval_ms: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
struct RecordingConfigFile {
    max_frames: Option<usize>,
    sequence_secs: Option<u64>,
    fps: Option<u32>,
}

#[derive(Debug, Deserialize, Default)]
struct UploadConfigFile {
    target_dir: Option<PathBuf>,
    url: Option<String>,
    poll_secs: Option<u64>,
}

/// Settings for one camera session. Immutable once a session starts.
#[derive(Debug, Clone)]
pub struct CamwatchConfig {
    pub camera: CameraSettings,
    pub paths: PathSettings,
    pub classifiers: ClassifierSettings,
    pub authentication: AuthenticationSettings,
    pub recording: RecordingSettings,
    pub upload: UploadSettings,
    pub users_path: Option<PathBuf>,
    /// Save recognized faces back as training samples for their label.
    pub reinforce_samples: bool,
}

#[derive(Debug, Clone)]
pub struct CameraSettings {
    pub device: String,
    pub width: u32,
    pub height: u32,
    pub target_fps: u32,
}

/// Output locations. The optional ones are disabled when unset or empty.
#[derive(Debug, Clone)]
pub struct PathSettings {
    pub faces: PathBuf,
    pub predicted_faces: Option<PathBuf>,
    pub predicted_images: Option<PathBuf>,
    pub videos: PathBuf,
    pub motion_snapshots: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct ClassifierSettings {
    pub face: String,
    pub body: String,
}

#[derive(Debug, Clone)]
pub struct AuthenticationSettings {
    pub vote_threshold: u32,
    pub poll_loops: u32,
    pub poll_interval: Duration,
}

#[derive(Debug, Clone)]
pub struct RecordingSettings {
    pub max_frames: usize,
    pub sequence: Duration,
    pub fps: u32,
}

#[derive(Debug, Clone)]
pub struct UploadSettings {
    /// Directory finished videos are copied to.
    pub target_dir: Option<PathBuf>,
    /// HTTP endpoint finished videos are PUT to. Takes precedence over `target_dir`.
    pub url: Option<String>,
    pub poll_interval: Duration,
}

impl Default for CamwatchConfig {
    fn default() -> Self {
        Self::from_file(CamwatchConfigFile::default())
    }
}

impl CamwatchConfig {
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("CAMWATCH_CONFIG").ok();
        let file_cfg = match config_path.as_deref() {
            Some(path) if !path.trim().is_empty() => Some(read_config_file(Path::new(path))?),
            _ => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default());
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: CamwatchConfigFile) -> Self {
        let camera = file.camera.unwrap_or_default();
        let paths = file.paths.unwrap_or_default();
        let classifiers = file.classifiers.unwrap_or_default();
        let authentication = file.authentication.unwrap_or_default();
        let recording = file.recording.unwrap_or_default();
        let upload = file.upload.unwrap_or_default();

        Self {
            camera: CameraSettings {
                device: camera.device.unwrap_or_else(|| DEFAULT_DEVICE.to_string()),
                width: camera.width.unwrap_or(DEFAULT_WIDTH),
                height: camera.height.unwrap_or(DEFAULT_HEIGHT),
                target_fps: camera.target_fps.unwrap_or(DEFAULT_CAMERA_FPS),
            },
            paths: PathSettings {
                faces: paths
                    .faces
                    .unwrap_or_else(|| PathBuf::from(DEFAULT_FACES_PATH)),
                predicted_faces: optional_path(
                    paths.predicted_faces,
                    Some(DEFAULT_PREDICTED_FACES_PATH),
                ),
                predicted_images: optional_path(
                    paths.predicted_images,
                    Some(DEFAULT_PREDICTED_IMAGES_PATH),
                ),
                videos: paths
                    .videos
                    .unwrap_or_else(|| PathBuf::from(DEFAULT_VIDEOS_PATH)),
                motion_snapshots: optional_path(paths.motion_snapshots, None),
            },
            classifiers: ClassifierSettings {
                face: classifiers
                    .face
                    .unwrap_or_else(|| DEFAULT_FACE_CLASSIFIER.to_string()),
                body: classifiers
                    .body
                    .unwrap_or_else(|| DEFAULT_BODY_CLASSIFIER.to_string()),
            },
            authentication: AuthenticationSettings {
                vote_threshold: authentication
                    .vote_threshold
                    .unwrap_or(DEFAULT_VOTE_THRESHOLD),
                poll_loops: authentication.poll_loops.unwrap_or(DEFAULT_POLL_LOOPS),
                poll_interval: Duration::from_millis(
                    authentication
                        .poll_interval_ms
                        .unwrap_or(DEFAULT_POLL_INTERVAL_MS),
                ),
            },
            recording: RecordingSettings {
                max_frames: recording.max_frames.unwrap_or(DEFAULT_MAX_FRAMES),
                sequence: Duration::from_secs(
                    recording.sequence_secs.unwrap_or(DEFAULT_SEQUENCE_SECS),
                ),
                fps: recording.fps.unwrap_or(DEFAULT_RECORDING_FPS),
            },
            upload: UploadSettings {
                target_dir: optional_path(upload.target_dir, None),
                url: upload.url.filter(|url| !url.trim().is_empty()),
                poll_interval: Duration::from_secs(
                    upload.poll_secs.unwrap_or(DEFAULT_UPLOAD_POLL_SECS),
                ),
            },
            users_path: optional_path(file.users_path, None),
            reinforce_samples: file.reinforce_samples.unwrap_or(false),
        }
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(device) = std::env::var("CAMWATCH_DEVICE") {
            if !device.trim().is_empty() {
                self.camera.device = device.trim().to_string();
            }
        }
        if let Ok(path) = std::env::var("CAMWATCH_VIDEOS_PATH") {
            if !path.trim().is_empty() {
                self.paths.videos = PathBuf::from(path);
            }
        }
        if let Ok(path) = std::env::var("CAMWATCH_FACES_PATH") {
            if !path.trim().is_empty() {
                self.paths.faces = PathBuf::from(path);
            }
        }
        if let Ok(path) = std::env::var("CAMWATCH_UPLOAD_DIR") {
            if !path.trim().is_empty() {
                self.upload.target_dir = Some(PathBuf::from(path));
            }
        }
        if let Ok(url) = std::env::var("CAMWATCH_UPLOAD_URL") {
            if !url.trim().is_empty() {
                self.upload.url = Some(url.trim().to_string());
            }
        }
        if let Ok(threshold) = std::env::var("CAMWATCH_VOTE_THRESHOLD") {
            self.authentication.vote_threshold = threshold
                .trim()
                .parse()
                .map_err(|_| anyhow!("CAMWATCH_VOTE_THRESHOLD must be a positive integer"))?;
        }
        if let Ok(max_frames) = std::env::var("CAMWATCH_MAX_FRAMES") {
            self.recording.max_frames = max_frames
                .trim()
                .parse()
                .map_err(|_| anyhow!("CAMWATCH_MAX_FRAMES must be a positive integer"))?;
        }
        if let Ok(sequence) = std::env::var("CAMWATCH_SEQUENCE_SECS") {
            let seconds: u64 = sequence.trim().parse().map_err(|_| {
                anyhow!("CAMWATCH_SEQUENCE_SECS must be an integer number of seconds")
            })?;
            self.recording.sequence = Duration::from_secs(seconds);
        }
        if let Ok(fps) = std::env::var("CAMWATCH_FPS") {
            self.recording.fps = fps
                .trim()
                .parse()
                .map_err(|_| anyhow!("CAMWATCH_FPS must be a positive integer"))?;
        }
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        if self.camera.device.trim().is_empty() {
            return Err(anyhow!("camera device must not be empty"));
        }
        if self.camera.width == 0 || self.camera.height == 0 {
            return Err(anyhow!("camera frame dimensions must be greater than zero"));
        }
        if self.authentication.vote_threshold == 0 {
            return Err(anyhow!("vote threshold must be greater than zero"));
        }
        if self.recording.max_frames == 0 {
            return Err(anyhow!("max buffered frames must be greater than zero"));
        }
        if self.recording.fps == 0 {
            return Err(anyhow!("recording fps must be greater than zero"));
        }
        if self.recording.sequence.is_zero() {
            return Err(anyhow!("sequence length must be greater than zero"));
        }
        if self.upload.poll_interval.is_zero() {
            return Err(anyhow!("upload poll interval must be greater than zero"));
        }
        Ok(())
    }
}

fn read_config_file(path: &Path) -> Result<CamwatchConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let is_toml = path
        .extension()
        .map(|ext| ext.eq_ignore_ascii_case("toml"))
        .unwrap_or(false);
    let cfg = if is_toml {
        toml::from_str(&raw).map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    } else {
        serde_json::from_str(&raw)
            .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    };
    Ok(cfg)
}

/// A configured empty path disables the output; an absent one falls back to `default`.
fn optional_path(value: Option<PathBuf>, default: Option<&str>) -> Option<PathBuf> {
    match value {
        Some(path) if path.as_os_str().is_empty() => None,
        Some(path) => Some(path),
        None => default.map(PathBuf::from),
    }
}
