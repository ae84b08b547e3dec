// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//
// YOLOv8 分割模型实现
// 包含: 模型加载、letterbox 预处理、推理、框 + 掩码后处理

use anyhow::{anyhow, Result};
use image::{ImageBuffer, Luma, RgbImage};
use ndarray::{s, Array, Axis, IxDyn};
use tracing::{debug, info};

use super::{resize_rgb, Model};
use crate::pipeline::Detector;
use crate::types::{Detection, Rect, SegMask};
use crate::{non_max_suppression, Bbox, OrtBackend, OrtConfig, OrtEP};

const CXYWH_OFFSET: usize = 4;
/// letterbox 填充值
const PAD_VALUE: f32 = 144.0 / 255.0;
/// 掩码二值化阈值 (sigmoid 之后)
const MASK_THRESHOLD: f32 = 0.5;

#[derive(Debug, Clone)]
pub struct YOLOv8Config {
    pub model: String,
    pub imgsz: u32,
    pub conf: f32,
    pub iou: f32,
    pub ep: OrtEP,
    pub fp16: bool,
    pub profile: bool,
}

impl YOLOv8Config {
    pub fn from_args(args: &crate::Args) -> Self {
        Self {
            model: args.detect_model.clone(),
            imgsz: args.imgsz,
            conf: args.conf,
            iou: args.iou,
            ep: OrtEP::from_flags(args.trt, args.cuda, args.device_id),
            fp16: args.fp16,
            profile: args.profile,
        }
    }
}

/// YOLOv8-seg 模型
pub struct YOLOv8 {
    engine: OrtBackend,
    height: u32,
    width: u32,
    conf: f32,
    iou: f32,
    names: Vec<String>,
    profile: bool,
}

impl YOLOv8 {
    pub fn new(config: YOLOv8Config) -> Result<Self> {
        let engine = OrtBackend::build(OrtConfig {
            f: config.model,
            ep: config.ep,
            trt_fp16: config.fp16,
            image_size: (config.imgsz, config.imgsz),
        })?;
        let (height, width) = (engine.height(), engine.width());
        let names = engine
            .names()
            .map(|n| n.to_vec())
            .unwrap_or_else(|| vec!["needle".to_string()]);

        let model = Self {
            engine,
            height,
            width,
            conf: config.conf,
            iou: config.iou,
            names,
            profile: config.profile,
        };
        model.summary();
        Ok(model)
    }

    fn scale_wh(&self, w0: f32, h0: f32, w1: f32, h1: f32) -> (f32, f32, f32) {
        let r = (w1 / w0).min(h1 / h0);
        (r, (w0 * r).round(), (h0 * r).round())
    }
}

/// 二值化概率掩码, 只保留框内像素 (右下角为开区间)
pub fn crop_mask(probs: &ImageBuffer<Luma<f32>, Vec<f32>>, rect: Rect) -> SegMask {
    SegMask::from_fn(probs.width(), probs.height(), |x, y| {
        let (xi, yi) = (x as i32, y as i32);
        xi >= rect.x1
            && xi < rect.x2
            && yi >= rect.y1
            && yi < rect.y2
            && probs.get_pixel(x, y).0[0] > MASK_THRESHOLD
    })
}

impl Model for YOLOv8 {
    type Output = Vec<Detection>;

    fn preprocess(&mut self, xs: &[RgbImage]) -> Result<Array<f32, IxDyn>> {
        let (h1, w1) = (self.height as usize, self.width as usize);
        let mut ys = Array::from_elem((xs.len(), 3, h1, w1), PAD_VALUE).into_dyn();
        for (idx, x) in xs.iter().enumerate() {
            let (w0, h0) = x.dimensions();
            let (_, w_new, h_new) =
                self.scale_wh(w0 as f32, h0 as f32, self.width as f32, self.height as f32);
            let img = resize_rgb(x, (w_new as u32).max(1), (h_new as u32).max(1))?;

            // 左上角对齐
            for (x, y, rgb) in img.enumerate_pixels() {
                let (x, y) = (x as usize, y as usize);
                let [r, g, b] = rgb.0;
                ys[[idx, 0, y, x]] = r as f32 / 255.0;
                ys[[idx, 1, y, x]] = g as f32 / 255.0;
                ys[[idx, 2, y, x]] = b as f32 / 255.0;
            }
        }
        Ok(ys)
    }

    fn postprocess(
        &self,
        xs: Vec<Array<f32, IxDyn>>,
        xs0: &[RgbImage],
    ) -> Result<Vec<Vec<Detection>>> {
        let preds = xs.first().ok_or_else(|| anyhow!("model produced no outputs"))?;
        let protos = xs
            .get(1)
            .ok_or_else(|| anyhow!("model has no mask prototypes, expected a segmentation model"))?;
        // preds: [B, 4 + nc + nm, N]; protos: [B, nm, mh, mw]
        let nm = protos.shape()[1];
        let nc = preds
            .shape()
            .get(1)
            .and_then(|c| c.checked_sub(CXYWH_OFFSET + nm))
            .filter(|&nc| nc > 0)
            .ok_or_else(|| anyhow!("unexpected output shape {:?}", preds.shape()))?;

        let mut ys = Vec::with_capacity(xs0.len());
        for (idx, anchor) in preds.axis_iter(Axis(0)).enumerate() {
            let width_original = xs0[idx].width() as f32;
            let height_original = xs0[idx].height() as f32;
            let ratio =
                (self.width as f32 / width_original).min(self.height as f32 / height_original);

            let mut data: Vec<(Bbox, Vec<f32>)> = Vec::new();
            for pred in anchor.axis_iter(Axis(1)) {
                let bbox = pred.slice(s![0..CXYWH_OFFSET]);
                let clss = pred.slice(s![CXYWH_OFFSET..CXYWH_OFFSET + nc]);
                let confidence = clss.iter().copied().fold(f32::MIN, f32::max);
                if confidence < self.conf {
                    continue;
                }

                let cx = bbox[0] / ratio;
                let cy = bbox[1] / ratio;
                let w = bbox[2] / ratio;
                let h = bbox[3] / ratio;
                let y_bbox = Bbox::new(
                    (cx - w / 2.).clamp(0.0, width_original),
                    (cy - h / 2.).clamp(0.0, height_original),
                    (cx + w / 2.).clamp(0.0, width_original),
                    (cy + h / 2.).clamp(0.0, height_original),
                    confidence,
                );
                let coefs = pred.slice(s![pred.len() - nm..]).to_vec();
                data.push((y_bbox, coefs));
            }

            non_max_suppression(&mut data, self.iou);

            let proto = protos.slice(s![idx, .., .., ..]);
            let (_, nh, nw) = proto.dim();
            let proto = proto.to_shape((nm, nh * nw))?;
            let mut detections = Vec::with_capacity(data.len());
            for (bbox, coefs) in data {
                let coefs = Array::from_shape_vec((1, nm), coefs)?;
                let logits = coefs.dot(&proto);
                let probs: Vec<f32> = logits.iter().map(|&v| 1.0 / (1.0 + (-v).exp())).collect();
                let mask_im: ImageBuffer<Luma<f32>, Vec<f32>> =
                    ImageBuffer::from_raw(nw as u32, nh as u32, probs)
                        .ok_or_else(|| anyhow!("can not create mask from prototypes"))?;

                // 去掉 letterbox 填充, 还原到原图尺寸
                let (_, w_mask, h_mask) =
                    self.scale_wh(width_original, height_original, nw as f32, nh as f32);
                let cropped = image::imageops::crop_imm(
                    &mask_im,
                    0,
                    0,
                    (w_mask as u32).clamp(1, nw as u32),
                    (h_mask as u32).clamp(1, nh as u32),
                )
                .to_image();
                let full = image::imageops::resize(
                    &cropped,
                    width_original as u32,
                    height_original as u32,
                    image::imageops::FilterType::Triangle,
                );

                let rect = bbox.to_rect();
                let mask = crop_mask(&full, rect);
                detections.push(Detection {
                    rect,
                    mask: Some(mask),
                    confidence: bbox.confidence(),
                });
            }
            ys.push(detections);
        }
        Ok(ys)
    }

    fn engine_mut(&mut self) -> &mut OrtBackend {
        &mut self.engine
    }

    fn summary(&self) {
        info!(
            "YOLOv8-seg | EP: {:?} | Batch: {} | {}x{} | classes: {:?} | conf: {} iou: {}",
            self.engine.ep(),
            match self.engine.batch() {
                Some(b) => b.to_string(),
                None => "Dynamic".to_string(),
            },
            self.width,
            self.height,
            self.names,
            self.conf,
            self.iou,
        );
    }
}

impl Detector for YOLOv8 {
    fn detect(&mut self, frame: &RgbImage) -> Result<Option<Detection>> {
        // NMS 之后按置信度降序
        Ok(self.detect_all(frame)?.into_iter().next())
    }

    fn detect_all(&mut self, frame: &RgbImage) -> Result<Vec<Detection>> {
        let t = std::time::Instant::now();
        let images = std::slice::from_ref(frame);
        let xs = self.preprocess(images)?;
        let ys = self.run(xs, self.profile)?;
        let mut results = self.postprocess(ys, images)?;
        if self.profile {
            debug!("[YOLOv8 detect]: {:?}", t.elapsed());
        }
        Ok(results.pop().unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_crop_mask_excludes_right_and_bottom_edges() {
        let probs: ImageBuffer<Luma<f32>, Vec<f32>> = ImageBuffer::from_pixel(10, 10, Luma([0.9]));
        let mask = crop_mask(&probs, Rect::new(2, 3, 6, 8));

        assert_eq!(mask.count(), 4 * 5);
        assert!(mask.is_on(2, 3));
        assert!(mask.is_on(5, 7));
        assert!(!mask.is_on(6, 7));
        assert!(!mask.is_on(5, 8));
    }

    #[test]
    fn test_crop_mask_applies_threshold() {
        let probs: ImageBuffer<Luma<f32>, Vec<f32>> =
            ImageBuffer::from_fn(4, 4, |x, _| Luma([if x < 2 { 0.9 } else { 0.1 }]));
        let mask = crop_mask(&probs, Rect::new(0, 0, 4, 4));
        assert_eq!(mask.count(), 8);
    }
}
