//! Frame grabbers.
//!
//! This module provides the capture side of the camera collaborator:
//! - Synthetic camera (`stub://`) for demos and tests
//! - Directory of JPEG stills (`file://`), replayed in a loop
//! - HTTP snapshot endpoint (`http(s)://`, feature: ingest-http)
//!
//! Every grabber produces a [`CapturedFrame`]: a base64 JPEG re-encoded at the
//! requested quality, plus its pixel size. Low quality keeps latency and
//! payload size bounded; the detection service only needs a rough frame.

pub mod file;
#[cfg(feature = "ingest-http")]
pub mod http;
pub mod stub;

use anyhow::{anyhow, Context, Result};
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use image::codecs::jpeg::JpegEncoder;
use image::GenericImageView;
use url::Url;

use crate::error::CaptureError;

pub use file::DirectoryGrabber;
#[cfg(feature = "ingest-http")]
pub use http::SnapshotGrabber;
pub use stub::SyntheticGrabber;

/// One frame ready for transmission.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CapturedFrame {
    pub jpeg_base64: String,
    pub width: u32,
    pub height: u32,
}

/// Capture side of the camera.
pub trait FrameGrabber: Send {
    /// Source description for logs.
    fn describe(&self) -> String;

    /// Grab one frame. `quality` is in `(0, 1]`.
    fn capture(&mut self, quality: f32) -> Result<CapturedFrame, CaptureError>;
}

/// Open a grabber for a configured source URL.
pub fn open_grabber(source: &str) -> Result<Box<dyn FrameGrabber>> {
    let url = Url::parse(source).with_context(|| format!("parse capture source {}", source))?;
    match url.scheme() {
        "stub" => Ok(Box::new(SyntheticGrabber::from_url(&url)?)),
        "file" => {
            let path = url
                .to_file_path()
                .map_err(|_| anyhow!("invalid file source {}", source))?;
            Ok(Box::new(DirectoryGrabber::open(path)?))
        }
        #[cfg(feature = "ingest-http")]
        "http" | "https" => Ok(Box::new(SnapshotGrabber::new(source))),
        other => Err(anyhow!(
            "unsupported capture scheme '{}'; expected stub, file or http(s)",
            other
        )),
    }
}

/// Map `(0, 1]` onto the JPEG encoder's 1..=100 scale.
pub fn jpeg_quality(quality: f32) -> u8 {
    let q = (quality.clamp(0.0, 1.0) * 100.0).round() as u8;
    q.clamp(1, 100)
}

/// Decode arbitrary image bytes and re-encode as low-quality JPEG.
pub fn reencode_jpeg(bytes: &[u8], quality: f32) -> Result<CapturedFrame, CaptureError> {
    let image =
        image::load_from_memory(bytes).map_err(|e| CaptureError::Transient(e.to_string()))?;
    let (width, height) = image.dimensions();
    encode_rgb(&image.to_rgb8(), width, height, quality)
}

pub(crate) fn encode_rgb(
    rgb: &image::RgbImage,
    width: u32,
    height: u32,
    quality: f32,
) -> Result<CapturedFrame, CaptureError> {
    let mut jpeg = Vec::new();
    JpegEncoder::new_with_quality(&mut jpeg, jpeg_quality(quality))
        .encode_image(rgb)
        .map_err(|e| CaptureError::Transient(format!("jpeg encode: {}", e)))?;
    Ok(CapturedFrame {
        jpeg_base64: STANDARD.encode(&jpeg),
        width,
        height,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quality_maps_to_encoder_range() {
        assert_eq!(jpeg_quality(0.05), 5);
        assert_eq!(jpeg_quality(1.0), 100);
        assert_eq!(jpeg_quality(0.0), 1);
        assert_eq!(jpeg_quality(7.0), 100);
    }

    #[test]
    fn rejects_unknown_scheme() {
        assert!(open_grabber("rtsp://camera/stream").is_err());
        assert!(open_grabber("not a url").is_err());
    }

    #[test]
    fn stub_source_opens() {
        let mut grabber = open_grabber("stub://camera?width=64&height=48").unwrap();
        let frame = grabber.capture(0.05).unwrap();
        assert_eq!((frame.width, frame.height), (64, 48));
        assert!(!frame.jpeg_base64.is_empty());
    }

    #[test]
    fn reencode_rejects_garbage() {
        assert!(matches!(
            reencode_jpeg(b"definitely not an image", 0.5),
            Err(CaptureError::Transient(_))
        ));
    }
}
