//! Synthetic camera for `stub://` sources.
//!
//! Produces a moving gradient so consecutive frames differ. Size is taken from
//! the `width`/`height` query parameters, e.g. `stub://camera?width=640&height=480`.

use anyhow::{anyhow, Result};
use image::{Rgb, RgbImage};
use url::Url;

use super::{encode_rgb, CapturedFrame, FrameGrabber};
use crate::error::CaptureError;

const DEFAULT_WIDTH: u32 = 640;
const DEFAULT_HEIGHT: u32 = 480;

pub struct SyntheticGrabber {
    name: String,
    width: u32,
    height: u32,
    frame_count: u64,
}

impl SyntheticGrabber {
    pub fn new(width: u32, height: u32) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(anyhow!("synthetic camera size must be non-zero"));
        }
        Ok(Self {
            name: "stub://camera".to_string(),
            width,
            height,
            frame_count: 0,
        })
    }

    pub fn from_url(url: &Url) -> Result<Self> {
        let mut width = DEFAULT_WIDTH;
        let mut height = DEFAULT_HEIGHT;
        for (key, value) in url.query_pairs() {
            match key.as_ref() {
                "width" => width = value.parse().map_err(|_| anyhow!("invalid width {}", value))?,
                "height" => {
                    height = value.parse().map_err(|_| anyhow!("invalid height {}", value))?
                }
                _ => {}
            }
        }
        let mut grabber = Self::new(width, height)?;
        grabber.name = url.to_string();
        Ok(grabber)
    }

    pub fn frames_captured(&self) -> u64 {
        self.frame_count
    }
}

impl FrameGrabber for SyntheticGrabber {
    fn describe(&self) -> String {
        format!("{} ({}x{})", self.name, self.width, self.height)
    }

    fn capture(&mut self, quality: f32) -> Result<CapturedFrame, CaptureError> {
        self.frame_count += 1;
        let shift = (self.frame_count % 256) as u32;
        let image = RgbImage::from_fn(self.width, self.height, |x, y| {
            Rgb([
                ((x + shift) % 256) as u8,
                ((y + shift) % 256) as u8,
                ((x + y) % 256) as u8,
            ])
        });
        encode_rgb(&image, self.width, self.height, quality)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_without_query() {
        let url = Url::parse("stub://camera").unwrap();
        let grabber = SyntheticGrabber::from_url(&url).unwrap();
        assert!(grabber.describe().contains("640x480"));
    }

    #[test]
    fn counts_frames() {
        let mut grabber = SyntheticGrabber::new(16, 16).unwrap();
        grabber.capture(0.1).unwrap();
        grabber.capture(0.1).unwrap();
        assert_eq!(grabber.frames_captured(), 2);
    }

    #[test]
    fn rejects_zero_size() {
        assert!(SyntheticGrabber::new(0, 10).is_err());
        let url = Url::parse("stub://camera?width=abc").unwrap();
        assert!(SyntheticGrabber::from_url(&url).is_err());
    }
}
