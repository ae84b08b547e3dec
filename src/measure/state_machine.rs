// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//! 插入状态机
//!
//! 两个状态 {未插入, 已插入} 加一个一次性的 `speed_computed` 标记。
//! 必须按帧序逐帧调用 [`InsertionStateMachine::step`], 第 N 帧的状态依赖第 N-1 帧。
//!
//! - 开始插入: 由外部分类器给出的起始帧 (hint) 驱动, 状态机原样信任
//! - 插入到指定长度: 由估计的物理长度自行判定, `actual <= 名义长度 - 移动阈值`
//! - 速度只计算一次, 之后整段视频保持不变, 不会重新触发
//!
//! 起始帧与结束帧都使用从 0 开始的循环帧号。
use serde::Serialize;
use tracing::{debug, info};

use crate::config::MeasureConfig;
use crate::measure::CalibrationWindow;
use crate::types::NeedleClass;

/// 每个视频一份的插入状态
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct InsertionState {
    pub inserted: bool,
    pub insert_start_frame: Option<usize>,
    pub insert_spec_end_frame: Option<usize>,
    pub speed_computed: bool,
    pub speed_mm_per_s: Option<f32>,
}

/// 状态机单帧输入
#[derive(Debug, Clone, Copy)]
pub struct FrameInput {
    pub frame_index: usize,
    pub class: NeedleClass,
    pub probability: f32,
    /// 当前像素长度 (本帧测量, 或回退到上一次有效测量)
    pub pixel_length: Option<f32>,
    /// 本帧是否有真实的掩码测量 (非回退)
    pub fresh_measurement: bool,
}

/// 单帧输出, 用于绘制标签
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameLabel {
    pub frame_index: usize,
    pub class: NeedleClass,
    pub probability: f32,
    pub actual_length_mm: f32,
    pub pixel_length: Option<f32>,
    pub inserted: bool,
    pub speed_computed: bool,
    pub speed_mm_per_s: Option<f32>,
}

impl FrameLabel {
    /// 标签文字: 计算出速度后显示速度, 否则显示当前长度和像素长度
    pub fn text(&self) -> String {
        let cls = self.class.index();
        if self.speed_computed {
            match self.speed_mm_per_s {
                Some(speed) => format!("{} {:.2} {:.2}mm/s", cls, self.probability, speed),
                None => format!("{} {:.2} --mm/s", cls, self.probability),
            }
        } else {
            match self.pixel_length {
                Some(px) => format!(
                    "{} {:.2} {:.2} {:.2}",
                    cls, self.probability, self.actual_length_mm, px
                ),
                None => format!("{} {:.2} {:.2} --", cls, self.probability, self.actual_length_mm),
            }
        }
    }
}

pub struct InsertionStateMachine {
    shaft_len_mm: f32,
    move_threshold_mm: f32,
    fps: f64,
    start_hint: Option<usize>,
    window: CalibrationWindow,
    state: InsertionState,
}

impl InsertionStateMachine {
    pub fn new(config: &MeasureConfig, fps: f64, start_hint: Option<usize>) -> Self {
        Self {
            shaft_len_mm: config.shaft_len_mm,
            move_threshold_mm: config.move_threshold_mm,
            fps,
            start_hint,
            window: CalibrationWindow::new(config.confirmation_frames),
            state: InsertionState::default(),
        }
    }

    pub fn state(&self) -> &InsertionState {
        &self.state
    }

    pub fn window(&self) -> &CalibrationWindow {
        &self.window
    }

    pub fn into_state(self) -> InsertionState {
        self.state
    }

    /// 推进一帧
    pub fn step(&mut self, input: FrameInput) -> FrameLabel {
        let idx = input.frame_index;

        // 标定: 未插入、分类为未插入、本帧有真实掩码
        if input.class == NeedleClass::NotInserted
            && !self.state.inserted
            && input.fresh_measurement
        {
            if let Some(px) = input.pixel_length {
                self.window.record(px);
            }
        }

        let actual_length_mm = self.actual_length(idx, input.class, input.pixel_length);

        // 判断是否开始插入皮肤
        if self.start_hint == Some(idx) {
            self.state.inserted = true;
            self.state.insert_start_frame = Some(idx);
            info!("💉 第 {} 帧开始插入皮肤", idx);
        }

        // 判断是否插入皮肤达到指定长度
        if input.class == NeedleClass::Inserted
            && self.state.inserted
            && actual_length_mm <= self.shaft_len_mm - self.move_threshold_mm
        {
            self.state.inserted = false;
            if !self.state.speed_computed {
                self.finish(idx);
            } else {
                debug!("第 {} 帧再次满足结束条件, 速度保持不变", idx);
            }
        }

        FrameLabel {
            frame_index: idx,
            class: input.class,
            probability: input.probability,
            actual_length_mm,
            pixel_length: input.pixel_length,
            inserted: self.state.inserted,
            speed_computed: self.state.speed_computed,
            speed_mm_per_s: self.state.speed_mm_per_s,
        }
    }

    /// 当前针梗长度 (mm)
    ///
    /// 未插入时为名义长度; 插入时按标定窗口线性换算。
    /// 标定窗口为空或没有任何测量时回退为名义长度。
    fn actual_length(&self, idx: usize, class: NeedleClass, pixel_length: Option<f32>) -> f32 {
        if class == NeedleClass::NotInserted {
            return self.shaft_len_mm;
        }
        let Some(px) = pixel_length else {
            debug!("第 {} 帧没有可用的像素长度, 使用名义长度", idx);
            return self.shaft_len_mm;
        };
        match self.window.reference() {
            Ok(reference) if reference > 0.0 => self.shaft_len_mm * px / reference,
            Ok(_) => {
                debug!("第 {} 帧参考像素长度为 0, 使用名义长度", idx);
                self.shaft_len_mm
            }
            Err(e) => {
                debug!("第 {} 帧 {}, 使用名义长度", idx, e);
                self.shaft_len_mm
            }
        }
    }

    fn finish(&mut self, idx: usize) {
        self.state.speed_computed = true;
        self.state.insert_spec_end_frame = Some(idx);

        let start = self.state.insert_start_frame.unwrap_or(idx);
        let interval_time = (idx as f64 - start as f64) / self.fps;
        self.state.speed_mm_per_s = if interval_time > 0.0 && interval_time.is_finite() {
            Some((1000.0 * self.move_threshold_mm as f64 / interval_time) as f32)
        } else {
            None
        };

        match self.state.speed_mm_per_s {
            Some(speed) => info!(
                "✅ 第 {} 帧插入达到 {}mm, 用时 {:.3}s, 速度 {:.2}mm/s",
                idx, self.move_threshold_mm, interval_time, speed
            ),
            None => info!(
                "⚠️ 第 {} 帧插入达到 {}mm, 但时间间隔无效 ({:.3}s), 不计算速度",
                idx, self.move_threshold_mm, interval_time
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input(idx: usize, class: NeedleClass, px: Option<f32>) -> FrameInput {
        FrameInput {
            frame_index: idx,
            class,
            probability: 0.9,
            pixel_length: px,
            fresh_measurement: px.is_some(),
        }
    }

    #[test]
    fn test_all_not_inserted() {
        let mut sm = InsertionStateMachine::new(&MeasureConfig::default(), 30.0, None);
        for idx in 0..50 {
            let label = sm.step(input(idx, NeedleClass::NotInserted, Some(100.0 + idx as f32)));
            assert!(!label.inserted);
            assert_eq!(label.actual_length_mm, 20.0);
        }
        assert!(!sm.state().speed_computed);
        assert!(sm.window().len() <= 5);
    }

    #[test]
    fn test_hint_drives_insertion() {
        let mut sm = InsertionStateMachine::new(&MeasureConfig::default(), 30.0, Some(5));
        for idx in 0..20 {
            let class = if idx < 5 {
                NeedleClass::NotInserted
            } else {
                NeedleClass::Inserted
            };
            // 插入后像素长度保持不变 → 长度不减小, 不会结束
            let label = sm.step(input(idx, class, Some(100.0)));
            assert_eq!(label.inserted, idx >= 5, "frame {}", idx);
        }
        assert_eq!(sm.state().insert_start_frame, Some(5));
    }

    #[test]
    fn test_speed_formula() {
        // fps=30, start=10, end=40 → 1s → 1000*2/1 = 2000
        let mut sm = InsertionStateMachine::new(&MeasureConfig::default(), 30.0, Some(10));
        for idx in 0..=40 {
            let (class, px) = match idx {
                0..=9 => (NeedleClass::NotInserted, 100.0),
                10..=39 => (NeedleClass::Inserted, 95.0),
                _ => (NeedleClass::Inserted, 90.0),
            };
            sm.step(input(idx, class, Some(px)));
        }
        let state = sm.state();
        assert!(state.speed_computed);
        assert_eq!(state.insert_start_frame, Some(10));
        assert_eq!(state.insert_spec_end_frame, Some(40));
        assert!((state.speed_mm_per_s.unwrap() - 2000.0).abs() < 1e-3);
        assert!(!state.inserted);
    }

    #[test]
    fn test_speed_is_one_shot() {
        let mut sm = InsertionStateMachine::new(&MeasureConfig::default(), 30.0, Some(2));
        sm.step(input(0, NeedleClass::NotInserted, Some(100.0)));
        sm.step(input(1, NeedleClass::NotInserted, Some(100.0)));
        sm.step(input(2, NeedleClass::Inserted, Some(99.0)));
        let label = sm.step(input(5, NeedleClass::Inserted, Some(80.0)));
        assert!(label.speed_computed);
        let speed = label.speed_mm_per_s;
        assert_eq!(sm.state().insert_spec_end_frame, Some(5));

        // 强制再次进入插入状态, 结束条件再次满足也不重新计算
        sm.state.inserted = true;
        let label = sm.step(input(20, NeedleClass::Inserted, Some(50.0)));
        assert_eq!(label.speed_mm_per_s, speed);
        assert_eq!(sm.state().insert_spec_end_frame, Some(5));
        assert!(label.text().ends_with("mm/s"));
    }

    #[test]
    fn test_empty_window_falls_back_to_nominal() {
        // 第一帧就判定为插入, 标定窗口为空
        let mut sm = InsertionStateMachine::new(&MeasureConfig::default(), 30.0, Some(0));
        let label = sm.step(input(0, NeedleClass::Inserted, Some(50.0)));
        assert_eq!(label.actual_length_mm, 20.0);
        assert!(label.inserted);
        assert!(!label.speed_computed);
    }

    #[test]
    fn test_calibration_only_from_fresh_not_inserted_frames() {
        let mut sm = InsertionStateMachine::new(&MeasureConfig::default(), 30.0, Some(3));
        sm.step(input(0, NeedleClass::NotInserted, Some(100.0)));
        // 回退测量不计入
        sm.step(FrameInput {
            fresh_measurement: false,
            ..input(1, NeedleClass::NotInserted, Some(300.0))
        });
        // 分类为插入的帧不计入
        sm.step(input(2, NeedleClass::Inserted, Some(300.0)));
        sm.step(input(3, NeedleClass::NotInserted, Some(100.0)));
        // 已插入, 不计入
        sm.step(input(4, NeedleClass::NotInserted, Some(500.0)));
        assert_eq!(sm.window().samples().collect::<Vec<_>>(), vec![100.0, 100.0]);
    }

    #[test]
    fn test_label_text() {
        let label = FrameLabel {
            frame_index: 0,
            class: NeedleClass::Inserted,
            probability: 0.876,
            actual_length_mm: 19.5,
            pixel_length: Some(97.5),
            inserted: true,
            speed_computed: false,
            speed_mm_per_s: None,
        };
        assert_eq!(label.text(), "1 0.88 19.50 97.50");
    }
}
