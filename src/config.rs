// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//! 运行参数
//!
//! - `Args`: 命令行参数 (模型、推理尺寸、阈值、输入输出)
//! - `MeasureConfig`: 测量常量, 可通过 JSON 文件调整

use std::fs;
use std::path::{Path, PathBuf};

use clap::Parser;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::PunctureError;

/// 针梗的实际长度, 单位毫米
pub const INIT_SHAFT_LEN: f32 = 20.0;
/// 针梗移动的阈值, 单位毫米
pub const MOVE_THRESHOLD: f32 = 2.0;
/// 标定窗口大小 (连续几帧确认像素比例)
pub const CONFIRMATION_FRAMES: usize = 5;
/// 输出图像感兴趣区域的扩展像素数
pub const OUT_EXPAND: u32 = 50;

/// 穿刺检测命令行参数
#[derive(Parser, Clone, Debug)]
#[command(author, version, about = "针梗插入长度/速度测量", long_about = None)]
pub struct Args {
    /// 输入: 视频文件 / 图片 / 图片序列目录
    #[arg(long, required = true)]
    pub source: PathBuf,

    /// 输出路径 (默认: 按时间戳生成)
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// YOLOv8 分割模型 (ONNX)
    #[arg(long, default_value = "models/seg-best.onnx")]
    pub detect_model: String,

    /// 插入状态分类模型 (ONNX)
    #[arg(long, default_value = "models/efficientnet-needle.onnx")]
    pub classify_model: String,

    /// 检测模型输入尺寸
    #[arg(long, default_value_t = 640)]
    pub imgsz: u32,

    /// 检测置信度阈值
    #[arg(long, default_value_t = 0.35)]
    pub conf: f32,

    /// NMS IOU阈值
    #[arg(long, default_value_t = 0.45)]
    pub iou: f32,

    /// 判定插入起始帧的窗口大小
    #[arg(long, default_value_t = 20)]
    pub judge_wnd: usize,

    /// 分类批大小
    #[arg(long, default_value_t = 4)]
    pub batch: usize,

    /// 图片序列输入的帧率 (视频使用自身帧率)
    #[arg(long, default_value_t = 30.0)]
    pub fps: f64,

    /// 测量参数 JSON 文件
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// 运行摘要输出 (JSON)
    #[arg(long)]
    pub summary: Option<PathBuf>,

    /// 针梗实际长度 (mm), 覆盖配置文件
    #[arg(long)]
    pub shaft_len: Option<f32>,

    /// 移动阈值 (mm), 覆盖配置文件
    #[arg(long)]
    pub move_threshold: Option<f32>,

    /// 输出 ROI 扩展像素, 覆盖配置文件
    #[arg(long)]
    pub margin: Option<u32>,

    /// 设备ID
    #[arg(long, default_value_t = 0)]
    pub device_id: i32,

    /// 使用 CUDA
    #[arg(long)]
    pub cuda: bool,

    /// 使用 TensorRT
    #[arg(long)]
    pub trt: bool,

    /// TensorRT FP16
    #[arg(long)]
    pub fp16: bool,

    /// 打印各阶段耗时
    #[arg(long)]
    pub profile: bool,
}

impl Args {
    /// 加载测量参数, 再用命令行覆盖
    pub fn measure_config(&self) -> Result<MeasureConfig, PunctureError> {
        let mut config = match &self.config {
            Some(path) => MeasureConfig::load(path),
            None => MeasureConfig::default(),
        };
        if let Some(v) = self.shaft_len {
            config.shaft_len_mm = v;
        }
        if let Some(v) = self.move_threshold {
            config.move_threshold_mm = v;
        }
        if let Some(v) = self.margin {
            config.roi_margin = v;
        }
        config.judge_wnd = self.judge_wnd;
        config.batch_size = self.batch;
        config.validate()?;
        Ok(config)
    }
}

/// 测量参数, 整次运行内保持不变
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MeasureConfig {
    // === 测量常量 ===
    pub shaft_len_mm: f32,        // 针梗名义长度
    pub move_threshold_mm: f32,   // 计算速度所需的移动距离
    pub confirmation_frames: usize, // 标定窗口容量

    // === 输出 ===
    pub roi_margin: u32, // ROI 扩展像素

    // === 分类 ===
    pub judge_wnd: usize,  // 起始帧判定窗口
    pub batch_size: usize, // 分类批大小
}

impl Default for MeasureConfig {
    fn default() -> Self {
        Self {
            shaft_len_mm: INIT_SHAFT_LEN,
            move_threshold_mm: MOVE_THRESHOLD,
            confirmation_frames: CONFIRMATION_FRAMES,
            roi_margin: OUT_EXPAND,
            judge_wnd: 20,
            batch_size: 4,
        }
    }
}

impl MeasureConfig {
    /// 从JSON文件加载配置, 失败时使用默认值
    pub fn load(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        match fs::read_to_string(path) {
            Ok(json) => match serde_json::from_str(&json) {
                Ok(config) => {
                    info!("✅ 测量参数已从 {} 加载", path.display());
                    config
                }
                Err(e) => {
                    warn!("⚠️ 配置文件解析失败: {}, 使用默认值", e);
                    Self::default()
                }
            },
            Err(e) => {
                warn!("⚠️ 配置文件读取失败 {}: {}, 使用默认值", path.display(), e);
                Self::default()
            }
        }
    }

    /// 保存到JSON文件
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), PunctureError> {
        let path = path.as_ref();
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| PunctureError::Config(e.to_string()))?;
        fs::write(path, json).map_err(|e| PunctureError::unwritable(path, e))?;
        info!("💾 测量参数已保存到 {}", path.display());
        Ok(())
    }

    pub fn validate(&self) -> Result<(), PunctureError> {
        if !(self.shaft_len_mm > 0.0) {
            return Err(PunctureError::Config(format!(
                "shaft_len_mm must be positive, got {}",
                self.shaft_len_mm
            )));
        }
        if !(self.move_threshold_mm > 0.0 && self.move_threshold_mm < self.shaft_len_mm) {
            return Err(PunctureError::Config(format!(
                "move_threshold_mm must be in (0, {}), got {}",
                self.shaft_len_mm, self.move_threshold_mm
            )));
        }
        if self.confirmation_frames == 0 {
            return Err(PunctureError::Config(
                "confirmation_frames must be at least 1".to_string(),
            ));
        }
        if self.judge_wnd == 0 || self.batch_size == 0 {
            return Err(PunctureError::Config(
                "judge_wnd and batch_size must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = MeasureConfig::default();
        assert_eq!(config.shaft_len_mm, 20.0);
        assert_eq!(config.move_threshold_mm, 2.0);
        assert_eq!(config.confirmation_frames, 5);
        assert_eq!(config.roi_margin, 50);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let mut config = MeasureConfig::default();
        config.move_threshold_mm = 25.0;
        assert!(config.validate().is_err());

        config.move_threshold_mm = 2.0;
        config.confirmation_frames = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_partial_json() {
        let config: MeasureConfig = serde_json::from_str(r#"{"roi_margin": 30}"#).unwrap();
        assert_eq!(config.roi_margin, 30);
        assert_eq!(config.shaft_len_mm, INIT_SHAFT_LEN);
    }

    #[test]
    fn test_config_load_missing_file_falls_back() {
        let config = MeasureConfig::load("/nonexistent/measure.json");
        assert_eq!(config, MeasureConfig::default());
    }

    #[test]
    fn test_config_save_then_load() {
        let name = format!("puncture-measure-{}.json", std::process::id());
        let path = std::env::temp_dir().join(name);
        let config = MeasureConfig {
            shaft_len_mm: 15.0,
            ..MeasureConfig::default()
        };
        config.save(&path).unwrap();
        assert_eq!(MeasureConfig::load(&path), config);
        fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_args_override() {
        let args = Args::parse_from([
            "puncture",
            "--source",
            "in.mp4",
            "--shaft-len",
            "25",
            "--margin",
            "10",
        ]);
        let config = args.measure_config().unwrap();
        assert_eq!(config.shaft_len_mm, 25.0);
        assert_eq!(config.roi_margin, 10);
        assert_eq!(config.judge_wnd, 20);
        assert_eq!(config.batch_size, 4);
    }
}
