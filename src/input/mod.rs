// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
/// 视频输入系统 (Video Input System)
///
/// - ImageSequenceSource: 单张图片 / 图片序列目录
/// - MemorySource:        内存帧 (测试、二次处理)
/// - VideoDecoder:        FFmpeg 解码视频文件 (feature `ffmpeg`)
/// - FrameConcealer:      坏帧补齐, 保证帧号连续
pub mod conceal;
#[cfg(feature = "ffmpeg")]
pub mod decode_filter;
#[cfg(feature = "ffmpeg")]
pub mod decoder;
pub mod sequence;

pub use conceal::FrameConcealer;
#[cfg(feature = "ffmpeg")]
pub use decoder::VideoDecoder;
pub use sequence::{is_image_path, ImageSequenceSource, MemorySource};

use std::path::Path;

use crate::pipeline::FrameSource;
use crate::PunctureError;

/// 按路径打开输入: 目录 → 图片序列; 图片 → 单帧; 其它 → 视频
pub fn open_source(path: &Path, sequence_fps: f64) -> Result<Box<dyn FrameSource>, PunctureError> {
    if path.is_dir() || is_image_path(path) {
        return Ok(Box::new(ImageSequenceSource::open(path, sequence_fps)?));
    }
    open_video(path)
}

#[cfg(feature = "ffmpeg")]
fn open_video(path: &Path) -> Result<Box<dyn FrameSource>, PunctureError> {
    Ok(Box::new(VideoDecoder::open(path)?))
}

#[cfg(not(feature = "ffmpeg"))]
fn open_video(path: &Path) -> Result<Box<dyn FrameSource>, PunctureError> {
    Err(PunctureError::unreadable(
        path,
        "video input requires the `ffmpeg` feature; pass an image or a frame directory instead",
    ))
}
