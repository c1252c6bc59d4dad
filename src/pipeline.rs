// Per-frame capture, detection, classification and overlay loop

use crate::camera::FrameSource;
use crate::config::DetectorConfig;
use crate::emotion::{validate_classifier, EmotionClassifier, FaceLocator};
use crate::error::{EmotionDetectorError, Result};
use crate::models::{Annotation, Frame, Prediction};
use crate::preprocess;
use crate::ui::Renderer;
use tracing::{debug, error, info, warn};

/// Drives the read-detect-crop-classify-draw cycle until the user quits
pub struct CaptureLoop<'a, S, L, C, R>
where
    S: FrameSource,
    L: FaceLocator,
    C: EmotionClassifier,
    R: Renderer,
{
    config: &'a DetectorConfig,
    source: S,
    locator: L,
    classifier: C,
    renderer: R,
    consecutive_read_failures: u32,
}

impl<'a, S, L, C, R> CaptureLoop<'a, S, L, C, R>
where
    S: FrameSource,
    L: FaceLocator,
    C: EmotionClassifier,
    R: Renderer,
{
    /// Assembles the loop, failing fast if the classifier's shapes are wrong
    pub fn new(
        config: &'a DetectorConfig,
        mut source: S,
        locator: L,
        mut classifier: C,
        renderer: R,
    ) -> Result<Self> {
        if let Err(e) = validate_classifier(&mut classifier, config.input_size) {
            source.release();
            return Err(e);
        }

        Ok(Self {
            config,
            source,
            locator,
            classifier,
            renderer,
            consecutive_read_failures: 0,
        })
    }

    /// Computes the overlay for one frame, in detector order
    pub fn annotate(&mut self, frame: &Frame) -> Result<Vec<Annotation>> {
        let gray = frame.to_gray()?;

        let regions = self.locator.locate(&gray, self.config.detection)?;
        debug!("Detected {} face(s)", regions.len());

        let mut annotations = Vec::with_capacity(regions.len() * 2);
        for region in regions {
            let crop = preprocess::crop(&gray, region)?;
            let patch =
                preprocess::resize_area(&crop, self.config.input_size, self.config.input_size)?;

            if preprocess::is_degenerate(&patch) {
                debug!("Skipping degenerate crop at {:?}", region);
                annotations.push(Annotation::Caption {
                    text: self.config.degenerate_caption.clone(),
                    origin: self.config.degenerate_origin,
                    color: self.config.degenerate_color,
                });
                continue;
            }

            let probabilities = self.classifier.predict(&preprocess::to_tensor(&patch))?;
            let prediction = Prediction::from_probabilities(&probabilities).ok_or_else(|| {
                EmotionDetectorError::Classification(format!(
                    "No label for probabilities {probabilities:?}"
                ))
            })?;
            debug!("Face at {:?}: {}", region, prediction);

            let color = prediction.label.color();
            annotations.push(Annotation::Box {
                region,
                color,
                thickness: self.config.box_thickness,
            });
            annotations.push(Annotation::Caption {
                text: prediction.label.to_string(),
                origin: region.caption_origin(self.config.caption_offset),
                color,
            });
        }

        Ok(annotations)
    }

    /// Acquires and annotates one frame
    ///
    /// Returns `Ok(None)` when the read failed and the frame was skipped.
    pub fn tick(&mut self) -> Result<Option<Frame>> {
        let mut frame = match self.source.read_frame() {
            Ok(frame) => {
                self.consecutive_read_failures = 0;
                frame
            }
            Err(e) if !e.is_fatal() => {
                self.consecutive_read_failures += 1;
                if self.consecutive_read_failures > self.config.max_consecutive_read_failures {
                    error!(
                        "Giving up after {} consecutive failed reads",
                        self.consecutive_read_failures
                    );
                    return Err(e);
                }
                warn!("Skipping frame: {}", e);
                return Ok(None);
            }
            Err(e) => return Err(e),
        };

        let annotations = self.annotate(&frame)?;
        self.renderer.paint(&mut frame, &annotations)?;
        Ok(Some(frame))
    }

    /// Runs until the quit key is pressed or a fatal error occurs
    pub fn run(&mut self) -> Result<()> {
        info!("Capture loop started");
        let result = self.run_until_quit();
        self.source.release();

        match &result {
            Ok(()) => info!("Capture loop stopped by user"),
            Err(e) => error!("Capture loop aborted: {}", e),
        }
        result
    }

    fn run_until_quit(&mut self) -> Result<()> {
        loop {
            if let Some(frame) = self.tick()? {
                self.renderer.show(&frame)?;
            }
            if self.renderer.quit_requested()? {
                return Ok(());
            }
        }
    }

    /// Consumes the loop, handing back its collaborators
    pub fn into_parts(self) -> (S, L, C, R) {
        (self.source, self.locator, self.classifier, self.renderer)
    }
}
