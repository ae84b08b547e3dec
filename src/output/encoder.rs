// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
/// 视频编码器
/// Video encoder, raw RGB24 frames are fed to FFmpeg through a read callback
use std::path::{Path, PathBuf};
use std::thread::JoinHandle;

use crossbeam_channel::{bounded, Receiver, Sender};
use ez_ffmpeg::{FfmpegContext, Input, Output};
use image::RgbImage;
use tracing::{info, warn};

use crate::pipeline::FrameSink;
use crate::types::FrameSize;
use crate::PunctureError;

const CHANNEL_CAPACITY: usize = 8;

pub struct VideoEncoder {
    path: PathBuf,
    size: FrameSize,
    tx: Option<Sender<Vec<u8>>>,
    handle: Option<JoinHandle<Result<(), String>>>,
    written: usize,
}

impl VideoEncoder {
    /// 以相同帧率/分辨率创建输出视频
    pub fn create(path: &Path, fps: f64, size: FrameSize) -> Result<Self, PunctureError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| PunctureError::unwritable(path, e))?;
        }

        let (tx, rx) = bounded::<Vec<u8>>(CHANNEL_CAPACITY);
        let url = path.to_string_lossy().to_string();
        let handle = std::thread::Builder::new()
            .name("encoder".into())
            .spawn(move || encode(&url, fps, size, rx))
            .map_err(|e| PunctureError::unwritable(path, e))?;

        info!(
            "🎞️ 视频输出: {} ({}x{}, {:.2}fps)",
            path.display(),
            size.width,
            size.height,
            fps
        );
        Ok(Self {
            path: path.to_path_buf(),
            size,
            tx: Some(tx),
            handle: Some(handle),
            written: 0,
        })
    }

    /// 关闭输入并等待编码线程结束
    fn join(&mut self) -> Result<(), PunctureError> {
        self.tx.take();
        match self.handle.take().map(|h| h.join()) {
            Some(Ok(Err(e))) => Err(PunctureError::unwritable(&self.path, e)),
            Some(Err(_)) => Err(PunctureError::unwritable(&self.path, "encoder thread panicked")),
            _ => Ok(()),
        }
    }
}

fn encode(url: &str, fps: f64, size: FrameSize, rx: Receiver<Vec<u8>>) -> Result<(), String> {
    let mut pending: Vec<u8> = Vec::new();
    let mut offset = 0usize;
    let read = move |buf: &mut [u8]| -> i32 {
        if offset >= pending.len() {
            match rx.recv() {
                Ok(frame) => {
                    pending = frame;
                    offset = 0;
                }
                Err(_) => return ffmpeg_sys_next::AVERROR_EOF,
            }
        }
        let n = buf.len().min(pending.len() - offset);
        buf[..n].copy_from_slice(&pending[offset..offset + n]);
        offset += n;
        n as i32
    };

    let input = Input::new_by_read_callback(read)
        .set_format("rawvideo")
        .set_input_opt("pixel_format", "rgb24")
        .set_input_opt("video_size", format!("{}x{}", size.width, size.height))
        .set_input_opt("framerate", format!("{}", fps));
    let output = Output::from(url).set_video_codec("mpeg4");

    let ctx = FfmpegContext::builder()
        .input(input)
        .output(output)
        .build()
        .map_err(|e| format!("构建失败: {}", e))?;
    let sch = ctx.start().map_err(|e| format!("启动失败: {}", e))?;
    sch.wait().map_err(|e| format!("编码失败: {}", e))
}

impl FrameSink for VideoEncoder {
    fn write(&mut self, frame: &RgbImage) -> Result<(), PunctureError> {
        if frame.width() != self.size.width || frame.height() != self.size.height {
            return Err(PunctureError::unwritable(
                &self.path,
                format!(
                    "frame {}x{} does not match output {}x{}",
                    frame.width(),
                    frame.height(),
                    self.size.width,
                    self.size.height
                ),
            ));
        }
        let sent = match &self.tx {
            Some(tx) => tx.send(frame.as_raw().clone()).is_ok(),
            None => false,
        };
        if !sent {
            // 编码线程已退出, 取出它的错误
            self.join()?;
            return Err(PunctureError::unwritable(&self.path, "encoder closed"));
        }
        self.written += 1;
        Ok(())
    }

    fn finish(&mut self) -> Result<(), PunctureError> {
        self.join()?;
        info!("💾 已编码 {} 帧 → {}", self.written, self.path.display());
        Ok(())
    }
}

impl Drop for VideoEncoder {
    fn drop(&mut self) {
        if self.handle.is_some() {
            if let Err(e) = self.join() {
                warn!("⚠️ 编码器关闭失败: {}", e);
            }
        }
    }
}
