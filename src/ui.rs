// Display of annotated frames

use crate::error::Result;
use crate::models::{Annotation, Frame};

/// Draws annotations and presents frames to the user
pub trait Renderer {
    /// Applies `annotations` to `frame` in order
    fn paint(&mut self, frame: &mut Frame, annotations: &[Annotation]) -> Result<()>;

    /// Presents the frame
    fn show(&mut self, frame: &Frame) -> Result<()>;

    /// Polls once for the quit signal
    fn quit_requested(&mut self) -> Result<bool>;
}

#[cfg(feature = "native")]
pub use native::HighGuiRenderer;

#[cfg(feature = "native")]
mod native {
    use super::*;
    use crate::error::EmotionDetectorError;
    use crate::models::Color;
    use opencv::core::{Mat, Point, Rect, Scalar};
    use opencv::prelude::*;
    use opencv::{highgui, imgproc};
    use tracing::{debug, warn};

    /// OpenCV window that paints with Hershey text and polls the keyboard
    pub struct HighGuiRenderer {
        window: String,
        quit_key: char,
    }

    impl HighGuiRenderer {
        pub fn new(window: &str, quit_key: char) -> Result<Self> {
            highgui::named_window(window, highgui::WINDOW_AUTOSIZE)?;
            Ok(Self {
                window: window.to_string(),
                quit_key,
            })
        }
    }

    // Frames are RGB; OpenCV only sees the bytes, so colors stay RGB too
    fn scalar(color: Color) -> Scalar {
        Scalar::new(color.r as f64, color.g as f64, color.b as f64, 0.0)
    }

    fn frame_to_mat(frame: &Frame) -> Result<Mat> {
        let mat = Mat::from_slice(frame.data.as_slice()).map_err(|e| {
            EmotionDetectorError::FrameProcessing(format!("Failed to create Mat: {e}"))
        })?;
        let mat = mat.reshape(3, frame.height as i32).map_err(|e| {
            EmotionDetectorError::FrameProcessing(format!("Failed to reshape Mat: {e}"))
        })?;
        Ok(mat.try_clone()?)
    }

    impl Renderer for HighGuiRenderer {
        fn paint(&mut self, frame: &mut Frame, annotations: &[Annotation]) -> Result<()> {
            if annotations.is_empty() {
                return Ok(());
            }

            let mut mat = frame_to_mat(frame)?;
            for annotation in annotations {
                match annotation {
                    Annotation::Box {
                        region,
                        color,
                        thickness,
                    } => {
                        imgproc::rectangle(
                            &mut mat,
                            Rect::new(region.x, region.y, region.width, region.height),
                            scalar(*color),
                            *thickness,
                            imgproc::LINE_8,
                            0,
                        )?;
                    }
                    Annotation::Caption {
                        text,
                        origin,
                        color,
                    } => {
                        imgproc::put_text(
                            &mut mat,
                            text,
                            Point::new(origin.0, origin.1),
                            imgproc::FONT_HERSHEY_SIMPLEX,
                            1.0,
                            scalar(*color),
                            2,
                            imgproc::LINE_8,
                            false,
                        )?;
                    }
                }
            }

            frame.data = mat.data_bytes()?.to_vec();
            Ok(())
        }

        fn show(&mut self, frame: &Frame) -> Result<()> {
            let rgb = frame_to_mat(frame)?;
            let mut bgr = Mat::default();
            imgproc::cvt_color_def(&rgb, &mut bgr, imgproc::COLOR_RGB2BGR)?;
            highgui::imshow(&self.window, &bgr)?;
            Ok(())
        }

        fn quit_requested(&mut self) -> Result<bool> {
            let key = highgui::wait_key(1)?;
            if key >= 0 {
                debug!("Key {} pressed", key);
            }
            Ok(key >= 0 && (key & 0xFF) as u8 as char == self.quit_key)
        }
    }

    impl Drop for HighGuiRenderer {
        fn drop(&mut self) {
            if let Err(e) = highgui::destroy_window(&self.window) {
                warn!("Failed to close window: {}", e);
            }
        }
    }
}
