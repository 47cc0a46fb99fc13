//! HTTP snapshot source.
//!
//! Polls a camera's single-JPEG endpoint (e.g. `http://camera/capture`) once per
//! capture request.

use std::io::Read;
use std::time::Duration;

use super::{reencode_jpeg, CapturedFrame, FrameGrabber};
use crate::error::CaptureError;

const SNAPSHOT_TIMEOUT: Duration = Duration::from_secs(5);

pub struct SnapshotGrabber {
    url: String,
    agent: ureq::Agent,
}

impl SnapshotGrabber {
    pub fn new(url: impl Into<String>) -> Self {
        let agent = ureq::AgentBuilder::new().timeout(SNAPSHOT_TIMEOUT).build();
        Self {
            url: url.into(),
            agent,
        }
    }

    fn fetch(&self) -> Result<Vec<u8>, CaptureError> {
        let response = self.agent.get(&self.url).call().map_err(|e| match e {
            // The camera answered but has no such resource.
            ureq::Error::Status(404, _) => {
                CaptureError::DeviceGone(format!("{} returned 404", self.url))
            }
            other => CaptureError::Transient(format!("fetch {}: {}", self.url, other)),
        })?;
        let mut bytes = Vec::new();
        response
            .into_reader()
            .read_to_end(&mut bytes)
            .map_err(|e| CaptureError::Transient(format!("read snapshot: {}", e)))?;
        if bytes.is_empty() {
            return Err(CaptureError::Transient("empty jpeg snapshot".to_string()));
        }
        Ok(bytes)
    }
}

impl FrameGrabber for SnapshotGrabber {
    fn describe(&self) -> String {
        self.url.clone()
    }

    fn capture(&mut self, quality: f32) -> Result<CapturedFrame, CaptureError> {
        let bytes = self.fetch()?;
        reencode_jpeg(&bytes, quality)
    }
}
