// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
/// 针梗插入测量 - 主程序入口
///
/// 直接运行: cargo run --release --bin puncture --features onnx,ffmpeg -- --source video.mp4
use std::path::Path;

use anyhow::Result;
use clap::Parser;
use mimalloc::MiMalloc;
use tracing::info;
use tracing_subscriber::EnvFilter;

use puncture_rs::input::{is_image_path, open_source};
use puncture_rs::output::{default_output_path, open_sink};
use puncture_rs::pipeline::{Classifier, Detector};
use puncture_rs::renderer::OverlayRenderer;
use puncture_rs::{Args, FrameFusionDriver, PunctureError, RunSummary};

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let args = Args::parse();
    let output = args
        .output
        .clone()
        .unwrap_or_else(|| default_output_path(&args.source));

    if args.source.is_file() && is_image_path(&args.source) {
        run_image(&args, &output)
    } else {
        run_video(&args, &output)
    }
}

/// 图片模式: 绘制全部检测结果
fn run_image(args: &Args, output: &Path) -> Result<()> {
    let frame = image::open(&args.source)
        .map_err(|e| PunctureError::unreadable(&args.source, e))?
        .into_rgb8();
    let mut detector = build_detector(args)?;
    let detections = detector.detect_all(&frame)?;
    info!("🔍 检测到 {} 个目标", detections.len());

    let annotated = OverlayRenderer::new().render_detections(&frame, &detections);
    annotated
        .save(output)
        .map_err(|e| PunctureError::unwritable(output, e))?;
    info!("💾 结果已保存: {}", output.display());
    Ok(())
}

/// 视频模式: 检测 → 分类 → 逐帧融合 → 输出
fn run_video(args: &Args, output: &Path) -> Result<()> {
    let config = args.measure_config()?;
    info!("⚙️ 测量参数: {:?}", config);

    let detector = build_detector(args)?;
    let classifier = build_classifier(args)?;

    let mut source = open_source(&args.source, args.fps)?;
    let mut sink = open_sink(output, source.fps(), source.frame_size())?;

    let mut driver = FrameFusionDriver::new(
        config,
        detector,
        classifier,
        Box::new(OverlayRenderer::new()),
    );
    let summary = driver.run(source.as_mut(), sink.as_mut())?;
    info!(
        "Start: {:?} End: {:?}",
        summary.insert_start_frame, summary.insert_spec_end_frame
    );
    info!("💾 结果已保存: {}", output.display());

    if let Some(path) = &args.summary {
        write_summary(path, &summary)?;
    }
    Ok(())
}

fn write_summary(path: &Path, summary: &RunSummary) -> Result<(), PunctureError> {
    let json =
        serde_json::to_string_pretty(summary).map_err(|e| PunctureError::unwritable(path, e))?;
    std::fs::write(path, json).map_err(|e| PunctureError::unwritable(path, e))?;
    info!("📝 运行摘要: {}", path.display());
    Ok(())
}

#[cfg(feature = "onnx")]
fn build_detector(args: &Args) -> Result<Box<dyn Detector>> {
    use puncture_rs::models::{YOLOv8, YOLOv8Config};
    Ok(Box::new(YOLOv8::new(YOLOv8Config::from_args(args))?))
}

#[cfg(feature = "onnx")]
fn build_classifier(args: &Args) -> Result<Box<dyn Classifier>> {
    use puncture_rs::models::{NeedleClassifier, NeedleClassifierConfig};
    let config = NeedleClassifierConfig::from_args(args);
    Ok(Box::new(NeedleClassifier::new(config)?))
}

#[cfg(not(feature = "onnx"))]
fn build_detector(_args: &Args) -> Result<Box<dyn Detector>> {
    let msg = "built without the `onnx` feature, no detector available";
    Err(PunctureError::Model(msg.into()).into())
}

#[cfg(not(feature = "onnx"))]
fn build_classifier(_args: &Args) -> Result<Box<dyn Classifier>> {
    let msg = "built without the `onnx` feature, no classifier available";
    Err(PunctureError::Model(msg.into()).into())
}
