// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
/// 视频文件解码器
/// Video file decoder, frames are handed over through a bounded channel
use std::path::{Path, PathBuf};
use std::thread::JoinHandle;

use crossbeam_channel::{bounded, Receiver};
use ez_ffmpeg::core::context::null_output::create_null_output;
use ez_ffmpeg::filter::frame_pipeline_builder::FramePipelineBuilder;
use ez_ffmpeg::stream_info::{find_video_stream_info, StreamInfo};
use ez_ffmpeg::{AVMediaType, FfmpegContext, Input};
use image::RgbImage;
use tracing::{info, warn};

use super::decode_filter::DecodeFilter;
use crate::pipeline::FrameSource;
use crate::types::FrameSize;
use crate::PunctureError;

/// 解码线程与消费者之间的缓冲帧数
const CHANNEL_CAPACITY: usize = 8;
const DEFAULT_FPS: f64 = 30.0;

pub struct VideoDecoder {
    path: PathBuf,
    fps: f64,
    size: FrameSize,
    rx: Receiver<RgbImage>,
    handle: Option<JoinHandle<Result<(), String>>>,
}

impl VideoDecoder {
    /// 打开视频文件, 读取帧率与分辨率后启动解码线程
    pub fn open(path: &Path) -> Result<Self, PunctureError> {
        let url = path.to_string_lossy().to_string();
        let info = find_video_stream_info(url.clone())
            .map_err(|e| PunctureError::unreadable(path, e))?
            .ok_or_else(|| PunctureError::unreadable(path, "no video stream"))?;

        let (fps, size) = match info {
            StreamInfo::Video {
                width, height, fps, ..
            } => (fps, FrameSize::new(width as u32, height as u32)),
            _ => return Err(PunctureError::unreadable(path, "no video stream")),
        };
        let fps = if fps.is_finite() && fps > 0.0 {
            fps
        } else {
            warn!("⚠️ 无法读取帧率, 使用 {}fps", DEFAULT_FPS);
            DEFAULT_FPS
        };
        info!(
            "🎬 视频输入: {} ({}x{}, {:.2}fps)",
            path.display(),
            size.width,
            size.height,
            fps
        );

        let (tx, rx) = bounded(CHANNEL_CAPACITY);
        let handle = std::thread::Builder::new()
            .name("decoder".into())
            .spawn(move || decode(&url, DecodeFilter::new(tx, size)))
            .map_err(|e| PunctureError::unreadable(path, e))?;

        Ok(Self {
            path: path.to_path_buf(),
            fps,
            size,
            rx,
            handle: Some(handle),
        })
    }
}

fn decode(url: &str, filter: DecodeFilter) -> Result<(), String> {
    let pipe: FramePipelineBuilder = AVMediaType::AVMEDIA_TYPE_VIDEO.into();
    let pipe = pipe.filter("decode", Box::new(filter));
    let out = create_null_output().add_frame_pipeline(pipe);

    let ctx = FfmpegContext::builder()
        .input(Input::new(url))
        .filter_descs(["format=rgb24"].into())
        .output(out)
        .build()
        .map_err(|e| format!("构建失败: {}", e))?;

    let sch = ctx.start().map_err(|e| format!("启动失败: {}", e))?;
    sch.wait().map_err(|e| format!("解码失败: {}", e))
}

impl FrameSource for VideoDecoder {
    fn fps(&self) -> f64 {
        self.fps
    }

    fn frame_size(&self) -> FrameSize {
        self.size
    }

    fn next_frame(&mut self) -> Result<Option<RgbImage>, PunctureError> {
        if let Ok(frame) = self.rx.recv() {
            return Ok(Some(frame));
        }
        // 发送端已关闭: 解码结束或失败
        match self.handle.take().map(|h| h.join()) {
            Some(Ok(Err(e))) => Err(PunctureError::unreadable(&self.path, e)),
            Some(Err(_)) => Err(PunctureError::unreadable(&self.path, "decoder thread panicked")),
            _ => Ok(None),
        }
    }
}
