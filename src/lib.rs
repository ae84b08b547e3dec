// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
pub mod config; // 运行参数 (CLI + 测量常量)
pub mod error; // 错误类型
pub mod geometry; // 掩码最小外接矩形
pub mod judge; // 插入起始帧判定窗口
pub mod measure; // 标定窗口 / ROI跟踪 / 插入状态机
pub mod input; // 视频/图片输入
pub mod output; // 视频/图片输出
pub mod pipeline; // 逐帧融合驱动
pub mod renderer; // 掩码/ROI/标签绘制
pub mod types; // 公共数据结构

#[cfg(feature = "onnx")]
pub mod models; // 模型接口与具体实现
#[cfg(feature = "onnx")]
pub mod ort_backend;

pub use crate::config::{Args, MeasureConfig};
pub use crate::error::PunctureError;
pub use crate::measure::{CalibrationWindow, InsertionState, InsertionStateMachine, RegionTracker};
pub use crate::pipeline::{FrameFusionDriver, RunSummary};
pub use crate::types::{Detection, FrameSize, Measurement, NeedleClass, Rect, SegMask};

#[cfg(feature = "onnx")]
pub use crate::ort_backend::{OrtBackend, OrtConfig, OrtEP};

/// 检测候选框 (NMS 之前, 原图坐标)
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Bbox {
    xmin: f32,
    ymin: f32,
    xmax: f32,
    ymax: f32,
    confidence: f32,
}

impl Bbox {
    pub fn new(xmin: f32, ymin: f32, xmax: f32, ymax: f32, confidence: f32) -> Self {
        Self {
            xmin,
            ymin,
            xmax,
            ymax,
            confidence,
        }
    }

    pub fn xmin(&self) -> f32 {
        self.xmin
    }

    pub fn ymin(&self) -> f32 {
        self.ymin
    }

    pub fn xmax(&self) -> f32 {
        self.xmax
    }

    pub fn ymax(&self) -> f32 {
        self.ymax
    }

    pub fn confidence(&self) -> f32 {
        self.confidence
    }

    pub fn area(&self) -> f32 {
        (self.xmax - self.xmin).max(0.) * (self.ymax - self.ymin).max(0.)
    }

    pub fn intersection_area(&self, another: &Bbox) -> f32 {
        let l = self.xmin.max(another.xmin);
        let r = self.xmax.min(another.xmax);
        let t = self.ymin.max(another.ymin);
        let b = self.ymax.min(another.ymax);
        (r - l).max(0.) * (b - t).max(0.)
    }

    pub fn iou(&self, another: &Bbox) -> f32 {
        let union = self.area() + another.area() - self.intersection_area(another);
        if union <= 0. {
            return 0.;
        }
        self.intersection_area(another) / union
    }

    /// 截断为整数像素矩形 (与检测框写入视频时一致)
    pub fn to_rect(&self) -> Rect {
        Rect::new(
            self.xmin as i32,
            self.ymin as i32,
            self.xmax as i32,
            self.ymax as i32,
        )
    }
}

/// 按置信度降序做 NMS, 附带数据 (掩码系数等) 跟随候选框一起保留
pub fn non_max_suppression<T>(xs: &mut Vec<(Bbox, T)>, iou_threshold: f32) {
    xs.sort_by(|b1, b2| b2.0.confidence().total_cmp(&b1.0.confidence()));

    let mut current_index = 0;
    for index in 0..xs.len() {
        let mut drop = false;
        for prev_index in 0..current_index {
            let iou = xs[prev_index].0.iou(&xs[index].0);
            if iou > iou_threshold {
                drop = true;
                break;
            }
        }
        if !drop {
            xs.swap(current_index, index);
            current_index += 1;
        }
    }
    xs.truncate(current_index);
}

/// 生成时间戳字符串, 用于默认输出文件名
pub fn gen_time_string(delimiter: &str) -> String {
    let t_now = chrono::Local::now();
    let fmt = format!(
        "%Y{}%m{}%d{}%H{}%M{}%S",
        delimiter, delimiter, delimiter, delimiter, delimiter
    );
    t_now.format(&fmt).to_string()
}
