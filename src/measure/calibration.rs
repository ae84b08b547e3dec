// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//! 标定窗口: 最近若干个"未插入且有掩码"帧的像素长度, 取均值作为参考长度
use std::collections::VecDeque;

use crate::PunctureError;

#[derive(Debug, Clone)]
pub struct CalibrationWindow {
    samples: VecDeque<f32>,
    capacity: usize,
}

impl CalibrationWindow {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            samples: VecDeque::with_capacity(capacity + 1),
            capacity,
        }
    }

    /// 追加样本, 超出容量时丢弃最旧的
    pub fn record(&mut self, pixel_length: f32) {
        self.samples.push_back(pixel_length);
        while self.samples.len() > self.capacity {
            self.samples.pop_front();
        }
    }

    /// 参考像素长度 (算术平均)
    pub fn reference(&self) -> Result<f32, PunctureError> {
        if self.samples.is_empty() {
            return Err(PunctureError::EmptyCalibrationWindow);
        }
        Ok(self.samples.iter().sum::<f32>() / self.samples.len() as f32)
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn samples(&self) -> impl Iterator<Item = f32> + '_ {
        self.samples.iter().copied()
    }
}
