// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//
// 插入状态分类模型 (EfficientNet 二分类, ONNX)
// 输入: 每帧 ROI 裁剪 → 缩放 → ImageNet 归一化; 输出: softmax 后的 (类别, 概率)

use anyhow::{anyhow, Result};
use image::RgbImage;
use ndarray::{Array, Axis, IxDyn};
use tracing::{debug, info};

use super::{resize_rgb, Model};
use crate::judge::judge_insert_start;
use crate::pipeline::{Classification, Classifier};
use crate::types::{FrameSize, NeedleClass, Rect};
use crate::{OrtBackend, OrtConfig, OrtEP};

const IMAGENET_MEAN: [f32; 3] = [0.485, 0.456, 0.406];
const IMAGENET_STD: [f32; 3] = [0.229, 0.224, 0.225];
/// 动态输入模型使用的分辨率
const DEFAULT_INPUT_SIZE: u32 = 224;

#[derive(Debug, Clone)]
pub struct NeedleClassifierConfig {
    pub model: String,
    pub ep: OrtEP,
    pub fp16: bool,
    pub profile: bool,
}

impl NeedleClassifierConfig {
    pub fn from_args(args: &crate::Args) -> Self {
        Self {
            model: args.classify_model.clone(),
            ep: OrtEP::from_flags(args.trt, args.cuda, args.device_id),
            fp16: args.fp16,
            profile: args.profile,
        }
    }
}

pub struct NeedleClassifier {
    engine: OrtBackend,
    height: u32,
    width: u32,
    profile: bool,
}

impl NeedleClassifier {
    pub fn new(config: NeedleClassifierConfig) -> Result<Self> {
        let engine = OrtBackend::build(OrtConfig {
            f: config.model,
            ep: config.ep,
            trt_fp16: config.fp16,
            image_size: (DEFAULT_INPUT_SIZE, DEFAULT_INPUT_SIZE),
        })?;
        let (height, width) = (engine.height(), engine.width());
        let model = Self {
            engine,
            height,
            width,
            profile: config.profile,
        };
        model.summary();
        Ok(model)
    }
}

/// 按检测框裁剪, 框无效时使用整帧
pub fn crop_roi(frame: &RgbImage, roi: Rect) -> RgbImage {
    let r = roi.clamp(FrameSize::new(frame.width(), frame.height()));
    if r.width() <= 0 || r.height() <= 0 {
        return frame.clone();
    }
    let (x, y) = (r.x1 as u32, r.y1 as u32);
    image::imageops::crop_imm(frame, x, y, r.width() as u32, r.height() as u32).to_image()
}

/// softmax 后取最大类别
pub fn softmax_argmax(logits: &[f32]) -> Option<(usize, f32)> {
    let max = logits.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    if !max.is_finite() {
        return None;
    }
    let exps: Vec<f32> = logits.iter().map(|&v| (v - max).exp()).collect();
    let sum: f32 = exps.iter().sum();
    exps.iter()
        .copied()
        .enumerate()
        .max_by(|a, b| a.1.total_cmp(&b.1))
        .map(|(i, e)| (i, e / sum))
}

impl Model for NeedleClassifier {
    type Output = (NeedleClass, f32);

    fn preprocess(&mut self, xs: &[RgbImage]) -> Result<Array<f32, IxDyn>> {
        let (h, w) = (self.height as usize, self.width as usize);
        let mut ys = Array::zeros((xs.len(), 3, h, w)).into_dyn();
        for (idx, x) in xs.iter().enumerate() {
            let img = resize_rgb(x, self.width, self.height)?;
            for (x, y, rgb) in img.enumerate_pixels() {
                let (x, y) = (x as usize, y as usize);
                for c in 0..3 {
                    ys[[idx, c, y, x]] =
                        (rgb.0[c] as f32 / 255.0 - IMAGENET_MEAN[c]) / IMAGENET_STD[c];
                }
            }
        }
        Ok(ys)
    }

    fn postprocess(
        &self,
        ys: Vec<Array<f32, IxDyn>>,
        xs0: &[RgbImage],
    ) -> Result<Vec<(NeedleClass, f32)>> {
        let logits = ys.first().ok_or_else(|| anyhow!("model produced no outputs"))?;
        let rows: Vec<(NeedleClass, f32)> = logits
            .axis_iter(Axis(0))
            .map(|row| {
                let row: Vec<f32> = row.iter().copied().collect();
                softmax_argmax(&row)
                    .map(|(i, p)| (NeedleClass::from_index(i), p))
                    .unwrap_or((NeedleClass::NotInserted, 0.0))
            })
            .collect();
        if rows.len() != xs0.len() {
            return Err(anyhow!(
                "classifier returned {} rows for {} images",
                rows.len(),
                xs0.len()
            ));
        }
        Ok(rows)
    }

    fn engine_mut(&mut self) -> &mut OrtBackend {
        &mut self.engine
    }

    fn summary(&self) {
        info!(
            "NeedleClassifier | EP: {:?} | Batch: {} | {}x{}",
            self.engine.ep(),
            match self.engine.batch() {
                Some(b) => b.to_string(),
                None => "Dynamic".to_string(),
            },
            self.width,
            self.height,
        );
    }
}

impl Classifier for NeedleClassifier {
    fn classify_video(
        &mut self,
        frames: &[RgbImage],
        boxes: &[Rect],
        judge_wnd: usize,
        batch_size: usize,
    ) -> Result<Classification> {
        if frames.len() != boxes.len() {
            return Err(anyhow!("{} frames but {} boxes", frames.len(), boxes.len()));
        }
        // 固定批大小的模型只能按其批大小推理
        let chunk = match self.engine.batch() {
            Some(b) => b as usize,
            None => batch_size.max(1),
        };

        let mut classes = Vec::with_capacity(frames.len());
        let mut probs = Vec::with_capacity(frames.len());
        for (i, (fs, bs)) in frames.chunks(chunk).zip(boxes.chunks(chunk)).enumerate() {
            let t = std::time::Instant::now();
            let mut crops: Vec<RgbImage> =
                fs.iter().zip(bs).map(|(f, b)| crop_roi(f, *b)).collect();
            let n = crops.len();
            // 最后一批不足时补齐
            while crops.len() < chunk {
                crops.push(crops[n - 1].clone());
            }
            let mut ys = self.forward(&crops)?;
            ys.truncate(n);
            for (c, p) in ys {
                classes.push(c);
                probs.push(p);
            }
            if self.profile {
                debug!("[Classifier batch {}]: {} 帧 {:?}", i, n, t.elapsed());
            }
        }

        let insert_start_frame = judge_insert_start(&classes, judge_wnd);
        Ok(Classification {
            classes,
            probs,
            insert_start_frame,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_softmax_argmax() {
        let (i, p) = softmax_argmax(&[0.0, 0.0]).unwrap();
        assert!((p - 0.5).abs() < 1e-6);
        assert!(i == 0 || i == 1);

        let (i, p) = softmax_argmax(&[1.0, 3.0]).unwrap();
        assert_eq!(i, 1);
        assert!((p - 0.880_797).abs() < 1e-4);

        assert!(softmax_argmax(&[]).is_none());
    }

    #[test]
    fn test_crop_roi_falls_back_to_full_frame() {
        let frame = RgbImage::new(32, 24);
        assert_eq!(crop_roi(&frame, Rect::new(4, 4, 12, 20)).dimensions(), (8, 16));
        assert_eq!(crop_roi(&frame, Rect::new(10, 10, 10, 10)).dimensions(), (32, 24));
        // 超出边界的部分被裁掉
        assert_eq!(crop_roi(&frame, Rect::new(20, 20, 60, 60)).dimensions(), (12, 4));
    }
}
