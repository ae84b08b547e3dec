// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//! 逐帧融合驱动端到端测试 (内存输入输出 + 模拟模型)
use std::cell::RefCell;
use std::rc::Rc;

use anyhow::{anyhow, Result};
use image::{Rgb, RgbImage};

use puncture_rs::input::MemorySource;
use puncture_rs::judge::judge_insert_start;
use puncture_rs::output::MemorySink;
use puncture_rs::pipeline::{Classification, Classifier, Detector, FrameSink};
use puncture_rs::renderer::{OverlayRenderer, ROI_COLOR};
use puncture_rs::{
    Detection, FrameFusionDriver, FrameSize, MeasureConfig, NeedleClass, PunctureError, Rect,
    SegMask,
};

const W: u32 = 64;
const H: u32 = 48;

/// 按帧号返回一根竖直针梗, 长度由 `len_at` 决定, 左边缘由 `x_at` 决定
struct ScriptedDetector {
    frame: usize,
    len_at: fn(usize) -> Option<u32>,
    x_at: fn(usize) -> u32,
    fail_at: Option<usize>,
}

impl ScriptedDetector {
    fn new(len_at: fn(usize) -> Option<u32>) -> Self {
        Self {
            frame: 0,
            len_at,
            x_at: |_| 30,
            fail_at: None,
        }
    }
}

impl Detector for ScriptedDetector {
    fn detect(&mut self, _frame: &RgbImage) -> Result<Option<Detection>> {
        let idx = self.frame;
        self.frame += 1;
        if self.fail_at == Some(idx) {
            return Err(anyhow!("inference failed"));
        }
        let x0 = (self.x_at)(idx);
        Ok((self.len_at)(idx).map(|len| Detection {
            rect: Rect::new(x0 as i32, 10, x0 as i32 + 2, 10 + len as i32),
            mask: Some(SegMask::from_fn(W, H, |x, y| {
                (x0..x0 + 2).contains(&x) && (10..10 + len).contains(&y)
            })),
            confidence: 0.9,
        }))
    }
}

/// 按帧号给出分类结果, 并记录驱动传入的裁剪框
struct ScriptedClassifier {
    inserted_at: fn(usize) -> bool,
    seen_boxes: Rc<RefCell<Vec<Rect>>>,
}

impl ScriptedClassifier {
    fn new(inserted_at: fn(usize) -> bool) -> Self {
        Self {
            inserted_at,
            seen_boxes: Rc::default(),
        }
    }
}

impl Classifier for ScriptedClassifier {
    fn classify_video(
        &mut self,
        frames: &[RgbImage],
        boxes: &[Rect],
        judge_wnd: usize,
        _batch_size: usize,
    ) -> Result<Classification> {
        *self.seen_boxes.borrow_mut() = boxes.to_vec();
        let classes: Vec<NeedleClass> = (0..frames.len())
            .map(|i| NeedleClass::from_index(usize::from((self.inserted_at)(i))))
            .collect();
        let insert_start_frame = judge_insert_start(&classes, judge_wnd);
        Ok(Classification {
            probs: vec![0.95; classes.len()],
            classes,
            insert_start_frame,
        })
    }
}

struct FailingClassifier;

impl Classifier for FailingClassifier {
    fn classify_video(
        &mut self,
        _: &[RgbImage],
        _: &[Rect],
        _: usize,
        _: usize,
    ) -> Result<Classification> {
        Err(anyhow!("model not loaded"))
    }
}

/// 第 n 帧开始写入失败
struct BrokenSink {
    ok_frames: usize,
    written: usize,
}

impl FrameSink for BrokenSink {
    fn write(&mut self, _frame: &RgbImage) -> Result<(), PunctureError> {
        if self.written >= self.ok_frames {
            return Err(PunctureError::unwritable("broken.mp4", "disk full"));
        }
        self.written += 1;
        Ok(())
    }

    fn finish(&mut self) -> Result<(), PunctureError> {
        Ok(())
    }
}

fn frames(n: usize) -> Vec<RgbImage> {
    vec![RgbImage::new(W, H); n]
}

/// 前 40 帧针梗 20px, 之后缩短为 17px (插入 3mm)
fn shrinking(idx: usize) -> Option<u32> {
    Some(if idx < 40 { 20 } else { 17 })
}

fn driver(detector: ScriptedDetector, classifier: Box<dyn Classifier>) -> FrameFusionDriver {
    driver_with(MeasureConfig::default(), detector, classifier)
}

fn driver_with(
    config: MeasureConfig,
    detector: ScriptedDetector,
    classifier: Box<dyn Classifier>,
) -> FrameFusionDriver {
    FrameFusionDriver::new(
        config,
        Box::new(detector),
        classifier,
        Box::new(OverlayRenderer::with_font(None)),
    )
}

#[test]
fn test_insertion_speed_end_to_end() {
    let classifier = ScriptedClassifier::new(|i| i >= 10);
    let mut driver = driver(ScriptedDetector::new(shrinking), Box::new(classifier));
    let mut source = MemorySource::new(frames(60), 30.0);
    let mut sink = MemorySink::new();

    let summary = driver.run(&mut source, &mut sink).unwrap();

    assert_eq!(summary.frames, 60);
    assert_eq!(summary.insert_start_frame, Some(10));
    assert_eq!(summary.insert_spec_end_frame, Some(40));
    // 30 帧 / 30fps = 1s, 移动 2mm
    let speed = summary.speed_mm_per_s.unwrap();
    assert!((speed - 2000.0).abs() < 1e-2, "speed {}", speed);

    assert_eq!(sink.frames.len(), 60);
    assert!(sink.finished);
    assert!(sink.frames.iter().all(|f| f.dimensions() == (W, H)));
}

#[test]
fn test_never_inserted_run() {
    let classifier = ScriptedClassifier::new(|_| false);
    let mut driver = driver(ScriptedDetector::new(shrinking), Box::new(classifier));
    let mut source = MemorySource::new(frames(20), 25.0);
    let mut sink = MemorySink::new();

    let summary = driver.run(&mut source, &mut sink).unwrap();

    assert_eq!(summary.insert_start_frame, None);
    assert_eq!(summary.insert_spec_end_frame, None);
    assert_eq!(summary.speed_mm_per_s, None);
    assert_eq!(sink.frames.len(), 20);
}

#[test]
fn test_detector_failure_degrades_to_missing_detection() {
    let mut detector = ScriptedDetector::new(|idx| if idx < 3 { Some(20) } else { None });
    detector.fail_at = Some(1);
    let classifier = ScriptedClassifier::new(|_| false);
    let mut driver = driver(detector, Box::new(classifier));
    let mut source = MemorySource::new(frames(6), 30.0);
    let mut sink = MemorySink::new();

    let summary = driver.run(&mut source, &mut sink).unwrap();
    assert_eq!(summary.frames, 6);
    assert_eq!(sink.frames.len(), 6);
}

#[test]
fn test_classifier_boxes_fall_back_to_last_detection() {
    // 第 0 帧无检测 → 整帧; 第 1 帧检测; 之后沿用第 1 帧的框
    let detector = ScriptedDetector::new(|idx| if idx == 1 { Some(20) } else { None });
    let classifier = ScriptedClassifier::new(|_| false);
    let seen_boxes = Rc::clone(&classifier.seen_boxes);
    let mut driver = driver(detector, Box::new(classifier));
    let mut source = MemorySource::new(frames(4), 30.0);
    let mut sink = MemorySink::new();

    driver.run(&mut source, &mut sink).unwrap();

    let detected = Rect::new(30, 10, 32, 30);
    assert_eq!(
        *seen_boxes.borrow(),
        vec![Rect::full_frame(FrameSize::new(W, H)), detected, detected, detected]
    );
}

#[test]
fn test_roi_frozen_from_insertion_start_frame() {
    // 第 10 帧起分类为插入, 同一帧针梗框移到 x=40; ROI 应停在第 9 帧的扩展框
    let mut detector = ScriptedDetector::new(|_| Some(20));
    detector.x_at = |idx| if idx < 10 { 10 } else { 40 };
    let config = MeasureConfig {
        roi_margin: 4,
        ..MeasureConfig::default()
    };
    let classifier = ScriptedClassifier::new(|i| i >= 10);
    let mut driver = driver_with(config, detector, Box::new(classifier));
    let mut source = MemorySource::new(frames(30), 30.0);
    let mut sink = MemorySink::new();

    let summary = driver.run(&mut source, &mut sink).unwrap();
    assert_eq!(summary.insert_start_frame, Some(10));
    assert_eq!(summary.insert_spec_end_frame, None);

    // 冻结的 ROI: (10, 10, 12, 30) 扩展 4px → (6, 6, 16, 34)
    for idx in [9, 10, 15, 29] {
        let frame = &sink.frames[idx];
        assert_eq!(*frame.get_pixel(6, 6), ROI_COLOR, "frame {}", idx);
        assert_eq!(*frame.get_pixel(15, 33), ROI_COLOR, "frame {}", idx);
        // 跟随新检测框时左上角会在 (36, 6)
        assert_eq!(*frame.get_pixel(36, 6), Rgb([0, 0, 0]), "frame {}", idx);
    }
}

#[test]
fn test_missing_mask_while_inserted_reuses_last_measurement() {
    // 第 19 帧分类抖动为未插入, 掩码量到 17px; 第 20 帧起没有检测
    let detector = ScriptedDetector::new(|idx| match idx {
        0..=18 => Some(20),
        19 => Some(17),
        _ => None,
    });
    let classifier = ScriptedClassifier::new(|i| (10..=18).contains(&i) || i >= 20);
    let mut driver = driver(detector, Box::new(classifier));
    let mut source = MemorySource::new(frames(40), 30.0);
    let mut sink = MemorySink::new();

    let summary = driver.run(&mut source, &mut sink).unwrap();

    assert_eq!(summary.insert_start_frame, Some(10));
    // 第 20 帧沿用 17px → 17mm, 移动 3mm
    assert_eq!(summary.insert_spec_end_frame, Some(20));
    // 10 帧 / 30fps, 移动 2mm
    let speed = summary.speed_mm_per_s.unwrap();
    assert!((speed - 6000.0).abs() < 1e-1, "speed {}", speed);
    assert_eq!(sink.frames.len(), 40);
}

#[test]
fn test_classifier_failure_treats_all_frames_as_not_inserted() {
    let mut driver = driver(ScriptedDetector::new(shrinking), Box::new(FailingClassifier));
    let mut source = MemorySource::new(frames(12), 30.0);
    let mut sink = MemorySink::new();

    let summary = driver.run(&mut source, &mut sink).unwrap();
    assert_eq!(summary.insert_start_frame, None);
    assert_eq!(summary.speed_mm_per_s, None);
    assert_eq!(sink.frames.len(), 12);
}

#[test]
fn test_sink_error_aborts_run() {
    let classifier = ScriptedClassifier::new(|_| false);
    let mut driver = driver(ScriptedDetector::new(shrinking), Box::new(classifier));
    let mut source = MemorySource::new(frames(10), 30.0);
    let mut sink = BrokenSink {
        ok_frames: 3,
        written: 0,
    };

    let err = driver.run(&mut source, &mut sink).unwrap_err();
    assert!(matches!(err, PunctureError::UnwritableOutput { .. }));
    assert_eq!(sink.written, 3);
}
