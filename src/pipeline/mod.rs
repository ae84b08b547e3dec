// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
/// 逐帧融合流水线 (Frame Fusion Pipeline)
///
/// 单线程、严格按帧序:
/// - FrameSource: 视频/图片序列解码
/// - Detector:    目标检测 + 分割掩码 (逐帧)
/// - Classifier:  插入状态分类 (整段视频一次, 分批推理)
/// - Renderer:    掩码/ROI/标签叠加
/// - FrameSink:   编码输出
///
/// 协作方都以 trait 接入, 具体实现在 `models` / `input` / `output` / `renderer`。
pub mod driver;

use anyhow::Result;
use image::RgbImage;

use crate::types::{Detection, FrameSize, NeedleClass, Rect, SegMask};
use crate::PunctureError;

pub use driver::{FrameFusionDriver, RunSummary};

/// 逐帧目标检测
pub trait Detector {
    /// 返回置信度最高的目标, 未检测到时返回 `Ok(None)`
    fn detect(&mut self, frame: &RgbImage) -> Result<Option<Detection>>;

    /// 返回全部目标 (图片模式)
    fn detect_all(&mut self, frame: &RgbImage) -> Result<Vec<Detection>> {
        Ok(self.detect(frame)?.into_iter().collect())
    }
}

/// 整段视频的分类结果, 与帧号对齐
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Classification {
    pub classes: Vec<NeedleClass>,
    pub probs: Vec<f32>,
    /// 插入起始帧 (外部判定, 状态机原样使用)
    pub insert_start_frame: Option<usize>,
}

impl Classification {
    /// 第 idx 帧的分类, 缺失时视为未插入、概率 0
    pub fn at(&self, idx: usize) -> (NeedleClass, f32) {
        (
            self.classes.get(idx).copied().unwrap_or_default(),
            self.probs.get(idx).copied().unwrap_or(0.0),
        )
    }
}

/// 插入状态分类
pub trait Classifier {
    fn classify_video(
        &mut self,
        frames: &[RgbImage],
        boxes: &[Rect],
        judge_wnd: usize,
        batch_size: usize,
    ) -> Result<Classification>;
}

/// 叠加绘制
pub trait Renderer {
    fn render(&self, frame: &RgbImage, mask: Option<&SegMask>, roi: Rect, label: &str)
        -> RgbImage;
}

/// 帧输入
pub trait FrameSource {
    fn fps(&self) -> f64;
    fn frame_size(&self) -> FrameSize;
    /// 下一帧, 结束时返回 `Ok(None)`
    fn next_frame(&mut self) -> Result<Option<RgbImage>, PunctureError>;
}

/// 帧输出
pub trait FrameSink {
    fn write(&mut self, frame: &RgbImage) -> Result<(), PunctureError>;
    /// 写完全部帧后调用, 负责落盘/关闭编码器
    fn finish(&mut self) -> Result<(), PunctureError>;
}
