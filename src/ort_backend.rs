// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//! ONNX Runtime 推理后端
//!
//! 负责会话创建 (CPU / CUDA / TensorRT)、输入尺寸解析与元数据读取,
//! 输入输出统一为 `ndarray` 动态维度张量。
use std::path::Path;
use std::time::Instant;

use anyhow::{anyhow, Context, Result};
use ndarray::{Array, IxDyn};
use ort::execution_providers::{
    CPUExecutionProvider, CUDAExecutionProvider, ExecutionProviderDispatch,
    TensorRTExecutionProvider,
};
use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use ort::value::Tensor;
use tracing::{debug, info};

/// 执行后端
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrtEP {
    CPU,
    CUDA(i32),
    Trt(i32),
}

impl OrtEP {
    /// 按命令行开关选择: TensorRT 优先, 其次 CUDA
    pub fn from_flags(trt: bool, cuda: bool, device_id: i32) -> Self {
        if trt {
            OrtEP::Trt(device_id)
        } else if cuda {
            OrtEP::CUDA(device_id)
        } else {
            OrtEP::CPU
        }
    }

    fn providers(&self, trt_fp16: bool) -> Vec<ExecutionProviderDispatch> {
        match *self {
            OrtEP::CPU => vec![CPUExecutionProvider::default().build()],
            OrtEP::CUDA(id) => vec![
                CUDAExecutionProvider::default().with_device_id(id).build(),
                CPUExecutionProvider::default().build(),
            ],
            OrtEP::Trt(id) => vec![
                TensorRTExecutionProvider::default()
                    .with_device_id(id)
                    .with_fp16(trt_fp16)
                    .with_engine_cache(true)
                    .build(),
                CUDAExecutionProvider::default().with_device_id(id).build(),
                CPUExecutionProvider::default().build(),
            ],
        }
    }
}

/// 后端构建参数
#[derive(Debug, Clone)]
pub struct OrtConfig {
    pub f: String,
    pub ep: OrtEP,
    pub trt_fp16: bool,
    /// 动态输入时使用的 (高, 宽)
    pub image_size: (u32, u32),
}

pub struct OrtBackend {
    session: Session,
    ep: OrtEP,
    batch: Option<u32>,
    height: u32,
    width: u32,
    names: Option<Vec<String>>,
}

impl OrtBackend {
    pub fn build(config: OrtConfig) -> Result<Self> {
        if !Path::new(&config.f).exists() {
            return Err(anyhow!("model file not found: {}", config.f));
        }

        let session = Session::builder()?
            .with_execution_providers(config.ep.providers(config.trt_fp16))?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .commit_from_file(&config.f)
            .with_context(|| format!("Failed to load model {}", config.f))?;

        // NCHW, 动态维度为负数
        let dims: Vec<i64> = session
            .inputs
            .first()
            .and_then(|input| input.input_type.tensor_shape())
            .map(|shape| shape.iter().copied().collect())
            .ok_or_else(|| anyhow!("model {} has no tensor input", config.f))?;
        let fixed = |i: usize| dims.get(i).copied().filter(|&d| d > 0).map(|d| d as u32);
        let batch = fixed(0);
        let height = fixed(2).unwrap_or(config.image_size.0);
        let width = fixed(3).unwrap_or(config.image_size.1);

        let names = session
            .metadata()
            .ok()
            .and_then(|m| m.custom("names").ok().flatten())
            .map(|s| parse_names(&s));

        info!(
            "🧩 模型加载: {} | EP: {:?} | 输入: {}x{}{}",
            config.f,
            config.ep,
            width,
            height,
            match batch {
                Some(b) => format!(" batch {}", b),
                None => " batch dynamic".to_string(),
            }
        );

        Ok(Self {
            session,
            ep: config.ep,
            batch,
            height,
            width,
            names,
        })
    }

    /// 推理: 单输入, 返回全部输出
    pub fn run(&mut self, xs: Array<f32, IxDyn>, profile: bool) -> Result<Vec<Array<f32, IxDyn>>> {
        let t = Instant::now();
        let input = Tensor::from_array(xs)?;
        let outputs = self.session.run(ort::inputs![input])?;

        let mut ys = Vec::with_capacity(outputs.len());
        for (_, value) in outputs.iter() {
            ys.push(value.try_extract_array::<f32>()?.into_owned());
        }
        if profile {
            debug!("[ORT Inference]: {:?}", t.elapsed());
        }
        Ok(ys)
    }

    pub fn ep(&self) -> OrtEP {
        self.ep
    }

    /// 固定批大小, 动态时为 `None`
    pub fn batch(&self) -> Option<u32> {
        self.batch
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn names(&self) -> Option<&[String]> {
        self.names.as_deref()
    }
}

/// 解析 ultralytics 导出的 `names` 元数据: `{0: 'needle', 1: 'tip'}`
fn parse_names(s: &str) -> Vec<String> {
    s.trim_matches(|c| c == '{' || c == '}')
        .split(',')
        .filter_map(|kv| kv.split_once(':'))
        .map(|(_, v)| v.trim().trim_matches(|c| c == '\'' || c == '"').to_string())
        .collect()
}
