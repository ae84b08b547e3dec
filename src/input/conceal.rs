// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//! 解码帧补齐
//!
//! 每个解码出的帧都必须占一个帧号, 否则后续帧号整体前移, 起止帧间隔与速度都会算错。
//! 数据不可用的帧用上一帧代替 (没有上一帧时用黑帧), 尺寸不一致的帧缩放到流尺寸。
use image::RgbImage;

use crate::types::FrameSize;

pub struct FrameConcealer {
    size: FrameSize,
    last: Option<RgbImage>,
    concealed: usize,
}

impl FrameConcealer {
    pub fn new(size: FrameSize) -> Self {
        Self {
            size,
            last: None,
            concealed: 0,
        }
    }

    /// 本帧的输出, `decoded` 为 `None` 表示数据不可用
    pub fn fill(&mut self, decoded: Option<RgbImage>) -> RgbImage {
        let frame = match decoded {
            Some(img) if img.dimensions() == (self.size.width, self.size.height) => img,
            Some(img) if self.size.width > 0 && self.size.height > 0 => image::imageops::resize(
                &img,
                self.size.width,
                self.size.height,
                image::imageops::FilterType::Triangle,
            ),
            Some(img) => img,
            None => {
                self.concealed += 1;
                match &self.last {
                    Some(last) => last.clone(),
                    None => RgbImage::new(self.size.width, self.size.height),
                }
            }
        };
        self.last = Some(frame.clone());
        frame
    }

    /// 被替换的帧数
    pub fn concealed(&self) -> usize {
        self.concealed
    }
}
