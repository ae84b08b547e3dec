// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
/// 穿刺检测公共数据结构
/// Data structures shared by the measurement pipeline
use image::GrayImage;
use serde::{Deserialize, Serialize};

// ========== 几何 ==========

/// 帧尺寸
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameSize {
    pub width: u32,
    pub height: u32,
}

impl FrameSize {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

/// 像素矩形 (x1, y1, x2, y2), 右下角为开区间
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rect {
    pub x1: i32,
    pub y1: i32,
    pub x2: i32,
    pub y2: i32,
}

impl Rect {
    pub fn new(x1: i32, y1: i32, x2: i32, y2: i32) -> Self {
        Self { x1, y1, x2, y2 }
    }

    /// 整帧矩形 (0, 0, width, height)
    pub fn full_frame(size: FrameSize) -> Self {
        Self::new(0, 0, size.width as i32, size.height as i32)
    }

    pub fn width(&self) -> i32 {
        self.x2 - self.x1
    }

    pub fn height(&self) -> i32 {
        self.y2 - self.y1
    }

    /// 四周各扩展 margin 像素, 并限制在帧范围内
    pub fn expand(&self, margin: u32, size: FrameSize) -> Self {
        let m = margin as i32;
        Self {
            x1: self.x1 - m,
            y1: self.y1 - m,
            x2: self.x2 + m,
            y2: self.y2 + m,
        }
        .clamp(size)
    }

    /// 限制在帧范围内
    pub fn clamp(&self, size: FrameSize) -> Self {
        let w = size.width as i32;
        let h = size.height as i32;
        Self {
            x1: self.x1.clamp(0, w),
            y1: self.y1.clamp(0, h),
            x2: self.x2.clamp(0, w),
            y2: self.y2.clamp(0, h),
        }
    }

    pub fn is_within(&self, size: FrameSize) -> bool {
        self.x1 >= 0
            && self.y1 >= 0
            && self.x2 <= size.width as i32
            && self.y2 <= size.height as i32
    }
}

// ========== 检测 ==========

/// 二值分割掩码, 行优先, 非零即前景
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegMask {
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>,
}

impl SegMask {
    pub fn new(width: u32, height: u32, data: Vec<u8>) -> Self {
        debug_assert_eq!(data.len(), (width * height) as usize);
        Self {
            width,
            height,
            data,
        }
    }

    pub fn empty(width: u32, height: u32) -> Self {
        Self::new(width, height, vec![0; (width * height) as usize])
    }

    pub fn from_fn(width: u32, height: u32, f: impl Fn(u32, u32) -> bool) -> Self {
        let mut data = Vec::with_capacity((width * height) as usize);
        for y in 0..height {
            for x in 0..width {
                data.push(if f(x, y) { 255 } else { 0 });
            }
        }
        Self::new(width, height, data)
    }

    pub fn from_luma(img: GrayImage) -> Self {
        let (width, height) = img.dimensions();
        Self::new(width, height, img.into_raw())
    }

    #[inline]
    pub fn is_on(&self, x: u32, y: u32) -> bool {
        x < self.width && y < self.height && self.data[(y * self.width + x) as usize] != 0
    }

    /// 前景像素个数
    pub fn count(&self) -> usize {
        self.data.iter().filter(|&&v| v != 0).count()
    }

    /// 前景像素坐标 (x, y)
    pub fn on_pixels(&self) -> impl Iterator<Item = (u32, u32)> + '_ {
        let w = self.width;
        self.data
            .iter()
            .enumerate()
            .filter(|&(_, &v)| v != 0)
            .map(move |(i, _)| (i as u32 % w, i as u32 / w))
    }
}

/// 单帧检测结果 (置信度最高的目标)
#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
    pub rect: Rect,
    pub mask: Option<SegMask>,
    pub confidence: f32,
}

// ========== 分类 ==========

/// 针梗状态类别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum NeedleClass {
    /// 未插入皮肤 (0)
    #[default]
    NotInserted,
    /// 已插入皮肤 (1)
    Inserted,
}

impl NeedleClass {
    pub fn from_index(idx: usize) -> Self {
        if idx == 1 {
            NeedleClass::Inserted
        } else {
            NeedleClass::NotInserted
        }
    }

    pub fn index(&self) -> u8 {
        match self {
            NeedleClass::NotInserted => 0,
            NeedleClass::Inserted => 1,
        }
    }
}

/// 最小外接矩形测量结果 (像素)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Measurement {
    pub pixel_width: f32,
    pub pixel_height: f32,
    pub ratio: f32,
}

impl Measurement {
    pub fn new(pixel_width: f32, pixel_height: f32) -> Self {
        let ratio = if pixel_height != 0.0 {
            pixel_width / pixel_height
        } else {
            0.0
        };
        Self {
            pixel_width,
            pixel_height,
            ratio,
        }
    }
}

/// 单帧融合输入 (检测 + 分类), 生成后不再修改
#[derive(Debug, Clone)]
pub struct FrameRecord {
    pub frame_index: usize,
    pub detection_box: Option<Rect>,
    pub segmentation_mask: Option<SegMask>,
    pub predicted_class: NeedleClass,
    pub class_probability: f32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rect_expand_clamps_to_frame() {
        let size = FrameSize::new(640, 480);
        let r = Rect::new(10, 400, 630, 470).expand(50, size);
        assert_eq!(r, Rect::new(0, 350, 640, 480));
        assert!(r.is_within(size));
    }

    #[test]
    fn test_mask_on_pixels() {
        let mask = SegMask::from_fn(4, 3, |x, y| x == 1 && y == 2);
        assert_eq!(mask.count(), 1);
        assert_eq!(mask.on_pixels().collect::<Vec<_>>(), vec![(1, 2)]);
        assert!(mask.is_on(1, 2));
        assert!(!mask.is_on(9, 9));
    }

    #[test]
    fn test_measurement_ratio_zero_height() {
        let m = Measurement::new(5.0, 0.0);
        assert_eq!(m.ratio, 0.0);
    }
}
