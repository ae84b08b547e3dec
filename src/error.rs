// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//! 错误类型
//!
//! 单帧的检测/分类失败不会出现在这里: 它们在驱动循环内部降级处理。
//! 只有输入不可读、输出不可写等整次运行级别的错误才会向上传播。
use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum PunctureError {
    /// 标定窗口为空时请求参考像素长度
    #[error("calibration window is empty, no not-inserted frame has been recorded yet")]
    EmptyCalibrationWindow,

    #[error("unreadable input {}: {reason}", path.display())]
    UnreadableInput { path: PathBuf, reason: String },

    #[error("unwritable output {}: {reason}", path.display())]
    UnwritableOutput { path: PathBuf, reason: String },

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("model error: {0}")]
    Model(String),
}

impl PunctureError {
    pub fn unreadable(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        PunctureError::UnreadableInput {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    pub fn unwritable(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        PunctureError::UnwritableOutput {
            path: path.into(),
            reason: reason.to_string(),
        }
    }
}
