use emotion_detector::camera::CameraManager;
use emotion_detector::config::DetectorConfig;
use emotion_detector::emotion::{CascadeFaceLocator, OnnxEmotionClassifier};
use emotion_detector::error::{EmotionDetectorError, Result};
use emotion_detector::pipeline::CaptureLoop;
use emotion_detector::ui::HighGuiRenderer;
use std::path::Path;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Initializes the logging system (file only, no console output)
fn init_logging(path: &Path) -> Result<()> {
    let log_file = std::fs::File::create(path).map_err(EmotionDetectorError::Io)?;

    let file_layer = fmt::layer()
        .with_writer(Arc::new(log_file))
        .with_ansi(false);

    tracing_subscriber::registry().with(file_layer).init();

    Ok(())
}

fn run(config: &DetectorConfig) -> Result<()> {
    let locator = CascadeFaceLocator::new(&config.cascade_path)?;
    let classifier = OnnxEmotionClassifier::new(&config.classifier_path)?;
    let camera = CameraManager::new(config.camera_index)?;
    let renderer = HighGuiRenderer::new(&config.window_title, config.quit_key)?;

    let mut capture = CaptureLoop::new(config, camera, locator, classifier, renderer)?;
    capture.run()
}

fn main() -> Result<()> {
    let config = DetectorConfig::default();
    init_logging(&config.log_file)?;
    info!("Starting with {:?}", config);

    if let Err(e) = run(&config) {
        error!("Emotion detector failed: {}", e);
        return Err(e);
    }

    info!("Emotion detector exited cleanly");
    Ok(())
}
