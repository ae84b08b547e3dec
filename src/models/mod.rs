// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
/// 模型统一接口与实现
///
/// - **YOLOv8-seg**: 针梗检测 + 分割掩码, 实现 `pipeline::Detector` (`yolov8.rs`)
/// - **NeedleClassifier**: 插入状态二分类, 实现 `pipeline::Classifier` (`classifier.rs`)
///
/// 两者都走同一套流程: preprocess → run → postprocess
use anyhow::{anyhow, Result};
use fast_image_resize as fr;
use image::RgbImage;
use ndarray::{Array, IxDyn};

use crate::OrtBackend;

pub mod classifier;
pub mod yolov8;

pub use classifier::{NeedleClassifier, NeedleClassifierConfig};
pub use yolov8::{YOLOv8, YOLOv8Config};

/// 统一的深度学习模型接口
///
/// ```text
/// 原始图片 → preprocess → NCHW张量 → run → 原始输出 → postprocess → 结果
/// ```
pub trait Model {
    /// 单张图片的后处理结果
    type Output;

    /// 预处理: 图片 → NCHW 张量
    fn preprocess(&mut self, images: &[RgbImage]) -> Result<Array<f32, IxDyn>>;

    /// 推理: 模型前向传播, 返回全部输出
    fn run(&mut self, xs: Array<f32, IxDyn>, profile: bool) -> Result<Vec<Array<f32, IxDyn>>> {
        self.engine_mut().run(xs, profile)
    }

    /// 后处理: 原始输出 → 每张图片一个结果
    fn postprocess(
        &self,
        ys: Vec<Array<f32, IxDyn>>,
        xs0: &[RgbImage],
    ) -> Result<Vec<Self::Output>>;

    /// 完整的推理流程: preprocess → run → postprocess
    fn forward(&mut self, images: &[RgbImage]) -> Result<Vec<Self::Output>> {
        let xs = self.preprocess(images)?;
        let ys = self.run(xs, false)?;
        self.postprocess(ys, images)
    }

    fn engine_mut(&mut self) -> &mut OrtBackend;

    /// 打印模型信息
    fn summary(&self);
}

/// RGB 缩放 (fast_image_resize, 双线性)
pub fn resize_rgb(img: &RgbImage, width: u32, height: u32) -> Result<RgbImage> {
    if img.dimensions() == (width, height) {
        return Ok(img.clone());
    }
    let src = fr::images::Image::from_vec_u8(
        img.width(),
        img.height(),
        img.as_raw().clone(),
        fr::PixelType::U8x3,
    )?;
    let mut dst = fr::images::Image::new(width, height, fr::PixelType::U8x3);
    let mut resizer = fr::Resizer::new();
    resizer.resize(
        &src,
        &mut dst,
        &fr::ResizeOptions::new().resize_alg(fr::ResizeAlg::Convolution(fr::FilterType::Bilinear)),
    )?;
    RgbImage::from_raw(width, height, dst.into_vec())
        .ok_or_else(|| anyhow!("resize buffer size mismatch"))
}
