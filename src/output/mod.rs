// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
/// 视频输出系统 (Video Output System)
///
/// - PngSequenceSink: 逐帧 PNG 写入目录
/// - MemorySink:      内存帧 (测试)
/// - VideoEncoder:    FFmpeg 编码视频文件 (feature `ffmpeg`)
#[cfg(feature = "ffmpeg")]
pub mod encoder;
pub mod sequence;

#[cfg(feature = "ffmpeg")]
pub use encoder::VideoEncoder;
pub use sequence::{MemorySink, PngSequenceSink};

use std::path::{Path, PathBuf};

use crate::gen_time_string;
use crate::input::is_image_path;
use crate::pipeline::FrameSink;
use crate::types::FrameSize;
use crate::PunctureError;

const VIDEO_EXTENSIONS: &[&str] = &["mp4", "avi", "mkv", "mov"];

pub fn is_video_path(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| VIDEO_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

/// 默认输出路径: 输入旁边的 `<名称>_<时间戳>`
///
/// 图片 → 同扩展名图片; 目录 → PNG 序列目录; 视频 → `.mp4`
pub fn default_output_path(source: &Path) -> PathBuf {
    let stem = source
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "output".to_string());
    let name = format!("{}_{}", stem, gen_time_string("-"));
    let parent = source.parent().unwrap_or_else(|| Path::new("."));

    if source.is_dir() {
        parent.join(name)
    } else if is_image_path(source) {
        let ext = source
            .extension()
            .map(|e| e.to_string_lossy().to_string())
            .unwrap_or_else(|| "png".to_string());
        parent.join(format!("{}.{}", name, ext))
    } else {
        parent.join(format!("{}.mp4", name))
    }
}

/// 按路径打开输出: 视频扩展名 → 编码器; 其它 → PNG 序列目录
pub fn open_sink(
    path: &Path,
    fps: f64,
    size: FrameSize,
) -> Result<Box<dyn FrameSink>, PunctureError> {
    if is_video_path(path) {
        return open_video(path, fps, size);
    }
    Ok(Box::new(PngSequenceSink::create(path)?))
}

#[cfg(feature = "ffmpeg")]
fn open_video(path: &Path, fps: f64, size: FrameSize) -> Result<Box<dyn FrameSink>, PunctureError> {
    Ok(Box::new(VideoEncoder::create(path, fps, size)?))
}

#[cfg(not(feature = "ffmpeg"))]
fn open_video(
    path: &Path,
    _fps: f64,
    _size: FrameSize,
) -> Result<Box<dyn FrameSink>, PunctureError> {
    Err(PunctureError::unwritable(
        path,
        "video output requires the `ffmpeg` feature; use a directory path for a PNG sequence",
    ))
}
