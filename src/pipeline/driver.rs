// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//! 逐帧融合驱动
//!
//! 两遍处理:
//! 1. 解码全部帧并逐帧检测 (分类需要整段视频和每帧的检测框)
//! 2. 整段分类, 然后按帧序推进状态机 → 更新 ROI → 绘制 → 输出
//!
//! 单帧检测失败、整段分类失败都只降级, 不中止; 只有输入/输出错误中止整次运行。
use std::time::Instant;

use image::RgbImage;
use serde::Serialize;
use tracing::{debug, info, warn};

use super::{Classification, Classifier, Detector, FrameSink, FrameSource, Renderer};
use crate::config::MeasureConfig;
use crate::geometry::min_rect_len;
use crate::measure::{FrameInput, InsertionStateMachine, RegionTracker};
use crate::types::{Detection, FrameRecord, FrameSize, Measurement, NeedleClass, SegMask};
use crate::PunctureError;

/// 整次运行摘要
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RunSummary {
    pub frames: usize,
    pub fps: f64,
    pub insert_start_frame: Option<usize>,
    pub insert_spec_end_frame: Option<usize>,
    pub speed_mm_per_s: Option<f32>,
}

pub struct FrameFusionDriver {
    config: MeasureConfig,
    detector: Box<dyn Detector>,
    classifier: Box<dyn Classifier>,
    renderer: Box<dyn Renderer>,
}

impl FrameFusionDriver {
    pub fn new(
        config: MeasureConfig,
        detector: Box<dyn Detector>,
        classifier: Box<dyn Classifier>,
        renderer: Box<dyn Renderer>,
    ) -> Self {
        Self {
            config,
            detector,
            classifier,
            renderer,
        }
    }

    /// 处理整段视频
    pub fn run(
        &mut self,
        source: &mut dyn FrameSource,
        sink: &mut dyn FrameSink,
    ) -> Result<RunSummary, PunctureError> {
        let fps = source.fps();
        let t_start = Instant::now();

        // 1. 解码 + 逐帧检测
        let mut frames: Vec<RgbImage> = Vec::new();
        let mut detections: Vec<Option<Detection>> = Vec::new();
        let mut boxes = Vec::new();
        let mut box_tracker = RegionTracker::new();
        while let Some(frame) = source.next_frame()? {
            let idx = frames.len();
            let size = FrameSize::new(frame.width(), frame.height());
            let detection = match self.detector.detect(&frame) {
                Ok(det) => det,
                Err(e) => {
                    warn!("⚠️ 第 {} 帧检测失败, 按未检测处理: {:#}", idx, e);
                    None
                }
            };
            if detection.is_none() {
                debug!("第 {} 帧未检测到针梗", idx);
            }
            boxes.push(box_tracker.resolve_detection(detection.as_ref().map(|d| d.rect), size));
            detections.push(detection);
            frames.push(frame);
        }
        info!(
            "🔍 检测完成: {} 帧, 检出 {} 帧, 用时 {:.1}s",
            frames.len(),
            detections.iter().filter(|d| d.is_some()).count(),
            t_start.elapsed().as_secs_f64()
        );

        // 2. 整段分类
        let t_cls = Instant::now();
        let classification = match self.classifier.classify_video(
            &frames,
            &boxes,
            self.config.judge_wnd,
            self.config.batch_size,
        ) {
            Ok(c) => c,
            Err(e) => {
                warn!("⚠️ 分类失败, 全部按未插入处理: {:#}", e);
                Classification::default()
            }
        };
        if classification.classes.len() != frames.len() {
            warn!(
                "⚠️ 分类结果 {} 帧与视频 {} 帧不一致, 缺失帧按未插入处理",
                classification.classes.len(),
                frames.len()
            );
        }
        info!(
            "🧠 分类完成: 插入起始帧 {:?}, 用时 {:.1}s",
            classification.insert_start_frame,
            t_cls.elapsed().as_secs_f64()
        );

        // 3. 按帧序融合
        let mut machine =
            InsertionStateMachine::new(&self.config, fps, classification.insert_start_frame);
        let mut region = RegionTracker::new();
        let mut last_measurement: Option<Measurement> = None;

        let total = frames.len();
        for (idx, (frame, detection)) in frames.into_iter().zip(detections).enumerate() {
            let (predicted_class, class_probability) = classification.at(idx);
            let record = FrameRecord {
                frame_index: idx,
                detection_box: detection.as_ref().map(|d| d.rect),
                segmentation_mask: detection.and_then(|d| d.mask),
                predicted_class,
                class_probability,
            };
            self.process_frame(
                &record,
                &frame,
                &mut machine,
                &mut region,
                &mut last_measurement,
                sink,
            )?;
        }
        sink.finish()?;

        let state = machine.into_state();
        info!(
            "🏁 Start: {:?} End: {:?} Speed: {:?}mm/s ({} 帧, 用时 {:.1}s)",
            state.insert_start_frame,
            state.insert_spec_end_frame,
            state.speed_mm_per_s,
            total,
            t_start.elapsed().as_secs_f64()
        );

        Ok(RunSummary {
            frames: total,
            fps,
            insert_start_frame: state.insert_start_frame,
            insert_spec_end_frame: state.insert_spec_end_frame,
            speed_mm_per_s: state.speed_mm_per_s,
        })
    }

    fn process_frame(
        &self,
        record: &FrameRecord,
        frame: &RgbImage,
        machine: &mut InsertionStateMachine,
        region: &mut RegionTracker,
        last_measurement: &mut Option<Measurement>,
        sink: &mut dyn FrameSink,
    ) -> Result<(), PunctureError> {
        let size = FrameSize::new(frame.width(), frame.height());
        let mask = record.segmentation_mask.as_ref();
        let (measurement, fresh) = resolve_measurement(mask, last_measurement);

        let label = machine.step(FrameInput {
            frame_index: record.frame_index,
            class: record.predicted_class,
            probability: record.class_probability,
            pixel_length: measurement.map(|m| m.pixel_width),
            fresh_measurement: fresh,
        });

        // ROI 使用状态转移之后的插入标记
        let roi = region.update(label.inserted, record.detection_box, size, self.config.roi_margin);

        debug!(
            "帧 {} | 类别 {} ({:.2}) | 长度 {:.2}mm | 插入 {} | ROI {:?}",
            record.frame_index,
            record.predicted_class.index(),
            record.class_probability,
            label.actual_length_mm,
            label.inserted,
            roi
        );
        if record.predicted_class == NeedleClass::Inserted && label.pixel_length.is_none() {
            debug!("帧 {} 没有任何可用测量, 长度按名义值", record.frame_index);
        }

        let out = self.renderer.render(frame, mask, roi, &label.text());
        sink.write(&out)
    }
}

/// 本帧测量: 有掩码且非空 → 新测量; 否则 → 上一次有效测量
///
/// 返回 (测量, 是否为本帧新测量)。
pub fn resolve_measurement(
    mask: Option<&SegMask>,
    last: &mut Option<Measurement>,
) -> (Option<Measurement>, bool) {
    match mask.and_then(min_rect_len) {
        Some(m) => {
            *last = Some(m);
            (Some(m), true)
        }
        None => (*last, false),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_measurement_fallback_chain() {
        let mut last = None;
        // 没有掩码, 也没有历史
        assert_eq!(resolve_measurement(None, &mut last), (None, false));

        let mask = SegMask::from_fn(32, 32, |x, y| x < 4 && y < 12);
        let (m, fresh) = resolve_measurement(Some(&mask), &mut last);
        assert!(fresh);
        let m = m.unwrap();
        assert!((m.pixel_width - 12.0).abs() < 1e-3);

        // 空掩码 → 回退
        let empty = SegMask::empty(32, 32);
        let (m2, fresh) = resolve_measurement(Some(&empty), &mut last);
        assert!(!fresh);
        assert_eq!(m2, Some(m));

        // 无掩码 → 回退
        let (m3, fresh) = resolve_measurement(None, &mut last);
        assert!(!fresh);
        assert_eq!(m3, Some(m));
    }
}
