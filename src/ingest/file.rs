//! Local still-image source.
//!
//! Replays the JPEG files of a directory in name order, looping at the end.
//! Each still is decoded and re-encoded at the capture quality so the
//! outbound payload matches what a live camera would send.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};

use super::{reencode_jpeg, CapturedFrame, FrameGrabber};
use crate::error::CaptureError;

pub struct DirectoryGrabber {
    dir: PathBuf,
    files: Vec<PathBuf>,
    cursor: usize,
}

impl DirectoryGrabber {
    pub fn open(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        let files = list_stills(&dir)?;
        if files.is_empty() {
            return Err(anyhow!("no .jpg/.jpeg files in {}", dir.display()));
        }
        Ok(Self {
            dir,
            files,
            cursor: 0,
        })
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

impl FrameGrabber for DirectoryGrabber {
    fn describe(&self) -> String {
        format!("file://{} ({} stills)", self.dir.display(), self.files.len())
    }

    fn capture(&mut self, quality: f32) -> Result<CapturedFrame, CaptureError> {
        if !self.dir.is_dir() {
            return Err(CaptureError::DeviceGone(format!(
                "{} no longer exists",
                self.dir.display()
            )));
        }
        let path = &self.files[self.cursor % self.files.len()];
        self.cursor = (self.cursor + 1) % self.files.len();
        let bytes = fs::read(path)
            .map_err(|e| CaptureError::Transient(format!("read {}: {}", path.display(), e)))?;
        reencode_jpeg(&bytes, quality)
    }
}

fn list_stills(dir: &Path) -> Result<Vec<PathBuf>> {
    let entries = fs::read_dir(dir).with_context(|| format!("read dir {}", dir.display()))?;
    let mut files = Vec::new();
    for entry in entries {
        let path = entry?.path();
        let is_jpeg = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.eq_ignore_ascii_case("jpg") || ext.eq_ignore_ascii_case("jpeg"))
            .unwrap_or(false);
        if is_jpeg && path.is_file() {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}
