// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//! 图片序列输出与内存输出
use std::path::{Path, PathBuf};

use image::RgbImage;
use tracing::info;

use crate::pipeline::FrameSink;
use crate::PunctureError;

/// 逐帧写入 `<dir>/frame_000000.png`
pub struct PngSequenceSink {
    dir: PathBuf,
    written: usize,
}

impl PngSequenceSink {
    pub fn create(dir: &Path) -> Result<Self, PunctureError> {
        std::fs::create_dir_all(dir).map_err(|e| PunctureError::unwritable(dir, e))?;
        Ok(Self {
            dir: dir.to_path_buf(),
            written: 0,
        })
    }

    pub fn written(&self) -> usize {
        self.written
    }
}

impl FrameSink for PngSequenceSink {
    fn write(&mut self, frame: &RgbImage) -> Result<(), PunctureError> {
        let path = self.dir.join(format!("frame_{:06}.png", self.written));
        frame
            .save(&path)
            .map_err(|e| PunctureError::unwritable(&path, e))?;
        self.written += 1;
        Ok(())
    }

    fn finish(&mut self) -> Result<(), PunctureError> {
        info!("💾 已写入 {} 帧 → {}", self.written, self.dir.display());
        Ok(())
    }
}

/// 内存输出, 保存全部帧
#[derive(Default)]
pub struct MemorySink {
    pub frames: Vec<RgbImage>,
    pub finished: bool,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }
}

impl FrameSink for MemorySink {
    fn write(&mut self, frame: &RgbImage) -> Result<(), PunctureError> {
        self.frames.push(frame.clone());
        Ok(())
    }

    fn finish(&mut self) -> Result<(), PunctureError> {
        self.finished = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_png_sequence_sink_numbering() {
        let dir = std::env::temp_dir().join(format!("puncture-out-{}", std::process::id()));
        let mut sink = PngSequenceSink::create(&dir).unwrap();
        sink.write(&RgbImage::new(4, 4)).unwrap();
        sink.write(&RgbImage::new(4, 4)).unwrap();
        sink.finish().unwrap();

        assert_eq!(sink.written(), 2);
        assert!(dir.join("frame_000000.png").exists());
        assert!(dir.join("frame_000001.png").exists());
        std::fs::remove_dir_all(&dir).unwrap();
    }
}
