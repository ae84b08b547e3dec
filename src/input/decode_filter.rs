// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
/// FFmpeg解码过滤器模块
/// FFmpeg decode filter module
use std::time::Instant;

use crossbeam_channel::Sender;
use ez_ffmpeg::filter::frame_filter::FrameFilter;
use ez_ffmpeg::filter::frame_filter_context::FrameFilterContext;
use ez_ffmpeg::{AVMediaType, Frame};
use image::RgbImage;
use tracing::{debug, info, warn};

use super::conceal::FrameConcealer;
use crate::types::FrameSize;

/// 单边最大分辨率
const MAX_SIDE: u32 = 8192;

/// FFmpeg解码过滤器: 视频文件 → RGB24帧 (filter graph 已做 `format=rgb24`)
///
/// 每个解码帧都会发出一帧, 不可用的帧由 [`FrameConcealer`] 补齐。
pub struct DecodeFilter {
    tx: Sender<RgbImage>,
    concealer: FrameConcealer,
    count: usize,
    last: Instant,
    total_frames: usize,
}

impl DecodeFilter {
    pub fn new(tx: Sender<RgbImage>, size: FrameSize) -> Self {
        Self {
            tx,
            concealer: FrameConcealer::new(size),
            count: 0,
            last: Instant::now(),
            total_frames: 0,
        }
    }

    fn conceal(&self, reason: &str) -> Option<RgbImage> {
        if self.concealer.concealed() < 10 {
            warn!("⚠️ 帧 #{} 不可用, 使用上一帧代替: {}", self.total_frames, reason);
        }
        None
    }

    /// 拷贝 RGB24 平面, 数据不可用时返回 `None`
    fn copy_rgb(&self, frame: &Frame) -> Option<RgbImage> {
        if frame.as_ptr().is_null() || frame.is_empty() {
            return self.conceal("空帧");
        }
        if frame.is_corrupt() {
            warn!("⚠️ 帧 #{} 标记为损坏, 按解码结果输出", self.total_frames);
        }

        unsafe {
            let raw = &*frame.as_ptr();
            let (w, h) = (raw.width as u32, raw.height as u32);
            if w == 0 || h == 0 || w > MAX_SIDE || h > MAX_SIDE {
                return self.conceal(&format!("非法分辨率 {}x{}", w, h));
            }

            let plane = raw.data[0];
            let stride = raw.linesize[0] as usize;
            let row_bytes = w as usize * 3;
            if plane.is_null() || stride < row_bytes {
                return self.conceal(&format!("RGB数据异常 stride={}", stride));
            }

            // 去掉行尾填充
            let mut buffer = Vec::with_capacity(row_bytes * h as usize);
            for y in 0..h as usize {
                let row = std::slice::from_raw_parts(plane.add(y * stride), row_bytes);
                buffer.extend_from_slice(row);
            }
            match RgbImage::from_raw(w, h, buffer) {
                Some(img) => Some(img),
                None => self.conceal("缓冲区大小不匹配"),
            }
        }
    }
}

impl FrameFilter for DecodeFilter {
    fn media_type(&self) -> AVMediaType {
        AVMediaType::AVMEDIA_TYPE_VIDEO
    }

    fn init(&mut self, _ctx: &FrameFilterContext) -> Result<(), String> {
        debug!("✅ 解码线程启动");
        Ok(())
    }

    fn filter_frame(
        &mut self,
        frame: Frame,
        _ctx: &FrameFilterContext,
    ) -> Result<Option<Frame>, String> {
        self.total_frames += 1;
        let decoded = self.copy_rgb(&frame);
        let image = self.concealer.fill(decoded);

        self.count += 1;
        if self.last.elapsed().as_secs_f64() >= 1.0 {
            let elapsed = self.last.elapsed().as_secs_f64();
            debug!(
                "📺 解码统计: {:.1}fps | 总帧{} | 补齐{}",
                self.count as f64 / elapsed,
                self.total_frames,
                self.concealer.concealed(),
            );
            self.last = Instant::now();
            self.count = 0;
        }

        // 接收端已关闭 → 停止解码
        self.tx
            .send(image)
            .map_err(|_| "frame receiver closed".to_string())?;
        Ok(Some(frame))
    }

    fn uninit(&mut self, _ctx: &FrameFilterContext) {
        if self.concealer.concealed() > 0 {
            info!(
                "📺 解码结束: 总帧{} | 补齐{}",
                self.total_frames,
                self.concealer.concealed()
            );
        }
    }
}
