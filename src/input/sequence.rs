// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//! 图片序列输入: 单张图片、按文件名排序的帧目录, 以及内存帧
use std::collections::VecDeque;
use std::path::{Path, PathBuf};

use image::RgbImage;
use tracing::info;

use crate::pipeline::FrameSource;
use crate::types::FrameSize;
use crate::PunctureError;

const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "bmp", "tif", "tiff", "webp"];

pub fn is_image_path(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| IMAGE_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

/// 图片序列 (目录内按文件名排序)
pub struct ImageSequenceSource {
    paths: VecDeque<PathBuf>,
    fps: f64,
    size: FrameSize,
    first: Option<RgbImage>,
}

impl ImageSequenceSource {
    pub fn open(path: &Path, fps: f64) -> Result<Self, PunctureError> {
        let mut paths: Vec<PathBuf> = if path.is_dir() {
            std::fs::read_dir(path)
                .map_err(|e| PunctureError::unreadable(path, e))?
                .filter_map(|entry| entry.ok().map(|e| e.path()))
                .filter(|p| is_image_path(p))
                .collect()
        } else {
            vec![path.to_path_buf()]
        };
        paths.sort();

        let mut paths: VecDeque<PathBuf> = paths.into();
        let first_path = paths
            .pop_front()
            .ok_or_else(|| PunctureError::unreadable(path, "no image frames found"))?;
        let first = read_rgb(&first_path)?;
        let size = FrameSize::new(first.width(), first.height());
        info!(
            "📂 图片输入: {} ({} 帧, {}x{}, {}fps)",
            path.display(),
            paths.len() + 1,
            size.width,
            size.height,
            fps
        );

        Ok(Self {
            paths,
            fps,
            size,
            first: Some(first),
        })
    }
}

impl FrameSource for ImageSequenceSource {
    fn fps(&self) -> f64 {
        self.fps
    }

    fn frame_size(&self) -> FrameSize {
        self.size
    }

    fn next_frame(&mut self) -> Result<Option<RgbImage>, PunctureError> {
        if let Some(first) = self.first.take() {
            return Ok(Some(first));
        }
        match self.paths.pop_front() {
            Some(p) => read_rgb(&p).map(Some),
            None => Ok(None),
        }
    }
}

fn read_rgb(path: &Path) -> Result<RgbImage, PunctureError> {
    image::open(path)
        .map(|img| img.into_rgb8())
        .map_err(|e| PunctureError::unreadable(path, e))
}

/// 内存帧输入
pub struct MemorySource {
    frames: VecDeque<RgbImage>,
    fps: f64,
    size: FrameSize,
}

impl MemorySource {
    pub fn new(frames: Vec<RgbImage>, fps: f64) -> Self {
        let size = frames
            .first()
            .map(|f| FrameSize::new(f.width(), f.height()))
            .unwrap_or(FrameSize::new(0, 0));
        Self {
            frames: frames.into(),
            fps,
            size,
        }
    }
}

impl FrameSource for MemorySource {
    fn fps(&self) -> f64 {
        self.fps
    }

    fn frame_size(&self) -> FrameSize {
        self.size
    }

    fn next_frame(&mut self) -> Result<Option<RgbImage>, PunctureError> {
        Ok(self.frames.pop_front())
    }
}
