//! Capture loop behavior with stub camera, detector, classifier and window.

use emotion_detector::camera::FrameSource;
use emotion_detector::config::{DetectionParams, DetectorConfig};
use emotion_detector::emotion::{EmotionClassifier, FaceLocator};
use emotion_detector::error::{EmotionDetectorError, Result};
use emotion_detector::pipeline::CaptureLoop;
use emotion_detector::ui::Renderer;
use emotion_detector::{Annotation, Color, EmotionLabel, FaceRegion, Frame};
use image::GrayImage;
use ndarray::Array4;
use std::collections::VecDeque;

/// Plays back a fixed script of reads, then repeats the last frame
struct ScriptedCamera {
    script: VecDeque<Result<Frame>>,
    fallback: Frame,
    reads: usize,
    releases: usize,
}

impl ScriptedCamera {
    fn new(script: Vec<Result<Frame>>, fallback: Frame) -> Self {
        Self {
            script: script.into(),
            fallback,
            reads: 0,
            releases: 0,
        }
    }

    fn repeating(frame: Frame) -> Self {
        Self::new(Vec::new(), frame)
    }
}

impl FrameSource for ScriptedCamera {
    fn read_frame(&mut self) -> Result<Frame> {
        self.reads += 1;
        self.script
            .pop_front()
            .unwrap_or_else(|| Ok(self.fallback.clone()))
    }

    fn release(&mut self) {
        self.releases += 1;
    }
}

/// Reports fixed regions and records how it was called
struct StubLocator {
    regions: Vec<FaceRegion>,
    calls: Vec<DetectionParams>,
}

impl StubLocator {
    fn new(regions: Vec<FaceRegion>) -> Self {
        Self {
            regions,
            calls: Vec::new(),
        }
    }
}

impl FaceLocator for StubLocator {
    fn locate(&mut self, _gray: &GrayImage, params: DetectionParams) -> Result<Vec<FaceRegion>> {
        self.calls.push(params);
        Ok(self.regions.clone())
    }
}

/// Returns the same distribution for every face, after the startup probe
struct StubClassifier {
    output: Vec<f32>,
    inputs: Vec<Vec<usize>>,
}

impl StubClassifier {
    fn new(output: Vec<f32>) -> Self {
        Self {
            output,
            inputs: Vec::new(),
        }
    }
}

impl EmotionClassifier for StubClassifier {
    fn predict(&mut self, input: &Array4<f32>) -> Result<Vec<f32>> {
        self.inputs.push(input.shape().to_vec());
        Ok(self.output.clone())
    }
}

/// Records paint calls and asks to quit after a number of shown frames
struct RecordingRenderer {
    painted: Vec<Vec<Annotation>>,
    shown: usize,
    quit_after: usize,
}

impl RecordingRenderer {
    fn new(quit_after: usize) -> Self {
        Self {
            painted: Vec::new(),
            shown: 0,
            quit_after,
        }
    }
}

impl Renderer for RecordingRenderer {
    fn paint(&mut self, _frame: &mut Frame, annotations: &[Annotation]) -> Result<()> {
        self.painted.push(annotations.to_vec());
        Ok(())
    }

    fn show(&mut self, _frame: &Frame) -> Result<()> {
        self.shown += 1;
        Ok(())
    }

    fn quit_requested(&mut self) -> Result<bool> {
        Ok(self.shown >= self.quit_after)
    }
}

/// 160x120 black frame with a solid gray block at (40, 30, 64, 64)
fn frame_with_block() -> Frame {
    let (width, height) = (160u32, 120u32);
    let mut data = vec![0u8; (width * height * 3) as usize];
    for y in 30..94 {
        for x in 40..104 {
            let i = ((y * width + x) * 3) as usize;
            data[i..i + 3].copy_from_slice(&[180, 180, 180]);
        }
    }
    Frame::new(data, width, height)
}

const HAPPY: [f32; 5] = [0.1, 0.7, 0.1, 0.05, 0.05];

#[test]
fn single_face_is_boxed_and_captioned_in_its_label_color() {
    let config = DetectorConfig::default();
    let region = FaceRegion::new(40, 30, 64, 64);
    let mut capture = CaptureLoop::new(
        &config,
        ScriptedCamera::repeating(frame_with_block()),
        StubLocator::new(vec![region]),
        StubClassifier::new(HAPPY.to_vec()),
        RecordingRenderer::new(1),
    )
    .unwrap();

    let annotations = capture.annotate(&frame_with_block()).unwrap();

    assert_eq!(
        annotations,
        vec![
            Annotation::Box {
                region,
                color: Color::GREEN,
                thickness: 2,
            },
            Annotation::Caption {
                text: "Happy".to_string(),
                origin: (40, 20),
                color: Color::GREEN,
            },
        ]
    );

    let (_, _, classifier, _) = capture.into_parts();
    // startup probe plus one face
    assert_eq!(classifier.inputs, vec![vec![1, 48, 48, 1], vec![1, 48, 48, 1]]);
}

#[test]
fn detector_is_called_with_fixed_policy() {
    let config = DetectorConfig::default();
    let mut capture = CaptureLoop::new(
        &config,
        ScriptedCamera::repeating(frame_with_block()),
        StubLocator::new(Vec::new()),
        StubClassifier::new(HAPPY.to_vec()),
        RecordingRenderer::new(1),
    )
    .unwrap();

    capture.annotate(&frame_with_block()).unwrap();
    let (_, locator, _, _) = capture.into_parts();
    assert_eq!(locator.calls.len(), 1);
    assert_eq!(locator.calls[0].scale_factor, 1.3);
    assert_eq!(locator.calls[0].min_neighbors, 5);
}

#[test]
fn no_faces_means_no_annotations_at_all() {
    let config = DetectorConfig::default();
    let mut capture = CaptureLoop::new(
        &config,
        ScriptedCamera::repeating(frame_with_block()),
        StubLocator::new(Vec::new()),
        StubClassifier::new(HAPPY.to_vec()),
        RecordingRenderer::new(1),
    )
    .unwrap();

    assert!(capture.annotate(&frame_with_block()).unwrap().is_empty());
    let (_, _, classifier, _) = capture.into_parts();
    assert_eq!(classifier.inputs.len(), 1, "only the startup probe ran");
}

#[test]
fn all_black_crop_gets_the_fixed_caption_instead_of_a_label() {
    let config = DetectorConfig::default();
    let black = FaceRegion::new(0, 0, 30, 20);
    let face = FaceRegion::new(40, 30, 64, 64);
    let mut capture = CaptureLoop::new(
        &config,
        ScriptedCamera::repeating(frame_with_block()),
        StubLocator::new(vec![black, face]),
        StubClassifier::new(HAPPY.to_vec()),
        RecordingRenderer::new(1),
    )
    .unwrap();

    let annotations = capture.annotate(&frame_with_block()).unwrap();
    assert_eq!(annotations.len(), 3);
    assert_eq!(
        annotations[0],
        Annotation::Caption {
            text: "No Face Found".to_string(),
            origin: (20, 60),
            color: Color::GREEN,
        }
    );
    assert!(matches!(annotations[1], Annotation::Box { region, .. } if region == face));

    let (_, _, classifier, _) = capture.into_parts();
    assert_eq!(classifier.inputs.len(), 2, "degenerate crop is never classified");
}

#[test]
fn boxes_follow_detector_order() {
    let config = DetectorConfig::default();
    let regions = vec![
        FaceRegion::new(60, 40, 20, 20),
        FaceRegion::new(40, 30, 10, 10),
        FaceRegion::new(90, 80, 12, 12),
    ];
    let mut capture = CaptureLoop::new(
        &config,
        ScriptedCamera::repeating(frame_with_block()),
        StubLocator::new(regions.clone()),
        StubClassifier::new(vec![0.0, 0.0, 0.0, 0.0, 1.0]),
        RecordingRenderer::new(1),
    )
    .unwrap();

    let annotations = capture.annotate(&frame_with_block()).unwrap();
    let boxed: Vec<FaceRegion> = annotations
        .iter()
        .filter_map(|a| match a {
            Annotation::Box { region, color, .. } => {
                assert_eq!(*color, EmotionLabel::Surprise.color());
                Some(*region)
            }
            _ => None,
        })
        .collect();
    assert_eq!(boxed, regions);
}

#[test]
fn every_label_maps_to_its_own_color() {
    let config = DetectorConfig::default();
    for label in EmotionLabel::ALL {
        let mut output = vec![0.0; 5];
        output[label.index()] = 0.9;
        let mut capture = CaptureLoop::new(
            &config,
            ScriptedCamera::repeating(frame_with_block()),
            StubLocator::new(vec![FaceRegion::new(40, 30, 64, 64)]),
            StubClassifier::new(output),
            RecordingRenderer::new(1),
        )
        .unwrap();

        let annotations = capture.annotate(&frame_with_block()).unwrap();
        match &annotations[1] {
            Annotation::Caption { text, color, .. } => {
                assert_eq!(text, label.as_str());
                assert_eq!(*color, label.color());
            }
            other => panic!("expected caption, got {other:?}"),
        }
    }
}

#[test]
fn wrong_output_width_fails_at_startup() {
    let config = DetectorConfig::default();
    let result = CaptureLoop::new(
        &config,
        ScriptedCamera::repeating(frame_with_block()),
        StubLocator::new(Vec::new()),
        StubClassifier::new(vec![0.5, 0.5]),
        RecordingRenderer::new(1),
    );
    assert!(matches!(
        result,
        Err(EmotionDetectorError::ShapeMismatch { .. })
    ));
}

#[test]
fn run_stops_on_quit_key_and_releases_camera_once() {
    let config = DetectorConfig::default();
    let mut capture = CaptureLoop::new(
        &config,
        ScriptedCamera::repeating(frame_with_block()),
        StubLocator::new(vec![FaceRegion::new(40, 30, 64, 64)]),
        StubClassifier::new(HAPPY.to_vec()),
        RecordingRenderer::new(3),
    )
    .unwrap();

    capture.run().unwrap();

    let (camera, _, _, renderer) = capture.into_parts();
    assert_eq!(camera.reads, 3);
    assert_eq!(camera.releases, 1);
    assert_eq!(renderer.shown, 3);
    assert_eq!(renderer.painted.len(), 3);
    assert!(renderer.painted.iter().all(|a| a.len() == 2));
}

#[test]
fn failed_reads_are_skipped() {
    let config = DetectorConfig::default();
    let camera = ScriptedCamera::new(
        vec![
            Err(EmotionDetectorError::FrameAcquisition("no data".into())),
            Ok(frame_with_block()),
        ],
        frame_with_block(),
    );
    let mut capture = CaptureLoop::new(
        &config,
        camera,
        StubLocator::new(Vec::new()),
        StubClassifier::new(HAPPY.to_vec()),
        RecordingRenderer::new(1),
    )
    .unwrap();

    assert!(capture.tick().unwrap().is_none());
    assert!(capture.tick().unwrap().is_some());
}

#[test]
fn too_many_failed_reads_end_the_loop() {
    let config = DetectorConfig {
        max_consecutive_read_failures: 2,
        ..DetectorConfig::default()
    };
    let failures = (0..3)
        .map(|_| Err(EmotionDetectorError::FrameAcquisition("unplugged".into())))
        .collect();
    let mut capture = CaptureLoop::new(
        &config,
        ScriptedCamera::new(failures, frame_with_block()),
        StubLocator::new(Vec::new()),
        StubClassifier::new(HAPPY.to_vec()),
        RecordingRenderer::new(usize::MAX),
    )
    .unwrap();

    let err = capture.run().unwrap_err();
    assert!(matches!(err, EmotionDetectorError::FrameAcquisition(_)));

    let (camera, _, _, renderer) = capture.into_parts();
    assert_eq!(camera.reads, 3);
    assert_eq!(camera.releases, 1);
    assert_eq!(renderer.shown, 0);
}

#[test]
fn classifier_errors_propagate() {
    struct Flaky {
        calls: usize,
    }

    impl EmotionClassifier for Flaky {
        fn predict(&mut self, _input: &Array4<f32>) -> Result<Vec<f32>> {
            self.calls += 1;
            if self.calls == 1 {
                Ok(vec![0.2; 5])
            } else {
                Err(EmotionDetectorError::Classification("session lost".into()))
            }
        }
    }

    let config = DetectorConfig::default();
    let mut capture = CaptureLoop::new(
        &config,
        ScriptedCamera::repeating(frame_with_block()),
        StubLocator::new(vec![FaceRegion::new(40, 30, 64, 64)]),
        Flaky { calls: 0 },
        RecordingRenderer::new(usize::MAX),
    )
    .unwrap();

    assert!(matches!(
        capture.run(),
        Err(EmotionDetectorError::Classification(_))
    ));
    let (camera, _, _, _) = capture.into_parts();
    assert_eq!(camera.releases, 1);
}
