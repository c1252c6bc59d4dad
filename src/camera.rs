// Camera module for webcam capture

use crate::error::Result;
use crate::models::Frame;

/// Anything the capture loop can pull frames from
pub trait FrameSource {
    /// Blocks until the next frame is available
    fn read_frame(&mut self) -> Result<Frame>;

    /// Releases the underlying device; calling it again is a no-op
    fn release(&mut self);
}

impl<T: FrameSource + ?Sized> FrameSource for Box<T> {
    fn read_frame(&mut self) -> Result<Frame> {
        (**self).read_frame()
    }

    fn release(&mut self) {
        (**self).release()
    }
}

#[cfg(feature = "native")]
pub use native::CameraManager;

#[cfg(feature = "native")]
mod native {
    use super::*;
    use crate::error::EmotionDetectorError;
    use nokhwa::pixel_format::RgbFormat;
    use nokhwa::utils::{CameraIndex, RequestedFormat, RequestedFormatType};
    use nokhwa::Camera;
    use tracing::{error, info};

    /// Owns the webcam for the lifetime of the capture loop
    pub struct CameraManager {
        camera: Camera,
        is_streaming: bool,
    }

    impl CameraManager {
        /// Opens the camera at `index` and starts its stream
        pub fn new(index: u32) -> Result<Self> {
            let requested_format =
                RequestedFormat::new::<RgbFormat>(RequestedFormatType::AbsoluteHighestFrameRate);

            let mut camera =
                Camera::new(CameraIndex::Index(index), requested_format).map_err(|e| {
                    error!("Failed to initialize camera {}: {}", index, e);
                    EmotionDetectorError::CameraInit(format!(
                        "Could not open camera {index}. Make sure:\n\
                        1. A camera is connected\n\
                        2. No other app is using it\n\
                        3. Camera permissions are granted\n\
                        Error: {e}"
                    ))
                })?;

            camera.open_stream().map_err(|e| {
                error!("Failed to open camera stream: {}", e);
                EmotionDetectorError::CameraInit(e.to_string())
            })?;

            info!(
                "Camera '{}' streaming at {}",
                camera.info().human_name(),
                camera.resolution()
            );

            Ok(Self {
                camera,
                is_streaming: true,
            })
        }
    }

    impl FrameSource for CameraManager {
        fn read_frame(&mut self) -> Result<Frame> {
            if !self.is_streaming {
                return Err(EmotionDetectorError::FrameAcquisition(
                    "Camera already released".to_string(),
                ));
            }

            let frame_data = self.camera.frame().map_err(|e| {
                EmotionDetectorError::FrameAcquisition(format!("Failed to capture frame: {e}"))
            })?;

            let buffer = frame_data.decode_image::<RgbFormat>().map_err(|e| {
                EmotionDetectorError::FrameAcquisition(format!("Failed to decode frame: {e}"))
            })?;

            let (width, height) = (buffer.width(), buffer.height());
            Ok(Frame::new(buffer.into_raw(), width, height))
        }

        fn release(&mut self) {
            if !self.is_streaming {
                return;
            }
            self.is_streaming = false;

            if let Err(e) = self.camera.stop_stream() {
                error!("Error stopping camera stream: {}", e);
            } else {
                info!("Camera released");
            }
        }
    }

    impl Drop for CameraManager {
        fn drop(&mut self) {
            self.release();
        }
    }
}
