// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//! 渲染: 分割掩码叠加 + ROI 框 + 标签文字
//!
//! 字体缓存在用户配置目录, 不存在时下载一次; 没有字体时只跳过标签文字。
use std::io::Read;
use std::path::PathBuf;

use ab_glyph::{FontVec, PxScale};
use anyhow::{Context, Result};
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_hollow_rect_mut, draw_text_mut, text_size};
use rand::Rng;
use tracing::{info, warn};

use crate::pipeline::Renderer;
use crate::types::{Detection, Rect, SegMask};

const FONT_URL: &str = "https://ultralytics.com/assets/Arial.ttf";
const FONT_NAME: &str = "Arial.ttf";

/// ROI 框颜色
pub const ROI_COLOR: Rgb<u8> = Rgb([0, 0, 255]);
const ROI_THICKNESS: i32 = 2;
const FONT_SCALE: f32 = 28.0;

pub struct OverlayRenderer {
    font: Option<FontVec>,
    mask_color: Rgb<u8>,
}

impl OverlayRenderer {
    /// 加载字体 (必要时下载), 失败时不绘制文字
    pub fn new() -> Self {
        let font = match load_font() {
            Ok(font) => Some(font),
            Err(e) => {
                warn!("⚠️ 字体加载失败, 将不绘制标签: {:#}", e);
                None
            }
        };
        Self::with_font(font)
    }

    pub fn with_font(font: Option<FontVec>) -> Self {
        let mut rng = rand::thread_rng();
        let mask_color = Rgb([rng.gen::<u8>(), rng.gen::<u8>(), rng.gen::<u8>()]);
        Self { font, mask_color }
    }

    pub fn mask_color(&self) -> Rgb<u8> {
        self.mask_color
    }

    /// 图片模式: 绘制全部检测结果
    pub fn render_detections(&self, frame: &RgbImage, detections: &[Detection]) -> RgbImage {
        let mut canvas = frame.clone();
        for det in detections {
            if let Some(mask) = &det.mask {
                self.draw_mask(&mut canvas, mask);
            }
            self.draw_roi(&mut canvas, det.rect, &format!("needle {:.2}", det.confidence));
        }
        canvas
    }

    /// 掩码区域叠加颜色 (饱和相加)
    fn draw_mask(&self, canvas: &mut RgbImage, mask: &SegMask) {
        if mask.width != canvas.width() || mask.height != canvas.height() {
            warn!(
                "⚠️ 掩码尺寸 {}x{} 与帧 {}x{} 不一致, 跳过叠加",
                mask.width,
                mask.height,
                canvas.width(),
                canvas.height()
            );
            return;
        }
        let [r, g, b] = self.mask_color.0;
        for (x, y) in mask.on_pixels() {
            let px = canvas.get_pixel_mut(x, y);
            px.0 = [
                px.0[0].saturating_add(r),
                px.0[1].saturating_add(g),
                px.0[2].saturating_add(b),
            ];
        }
    }

    /// ROI 框 + 框上方标签
    fn draw_roi(&self, canvas: &mut RgbImage, roi: Rect, label: &str) {
        let w = roi.width().max(1) as u32;
        let h = roi.height().max(1) as u32;
        for t in 0..ROI_THICKNESS {
            let inner_w = w.saturating_sub(2 * t as u32).max(1);
            let inner_h = h.saturating_sub(2 * t as u32).max(1);
            let r = imageproc::rect::Rect::at(roi.x1 + t, roi.y1 + t).of_size(inner_w, inner_h);
            draw_hollow_rect_mut(canvas, r, ROI_COLOR);
        }

        let Some(font) = &self.font else {
            return;
        };
        if label.is_empty() {
            return;
        }
        let scale = PxScale::from(FONT_SCALE);
        let (_, text_h) = text_size(scale, font, label);
        // 框上方放不下时放到框内
        let text_y = if roi.y1 - 10 > 10 {
            roi.y1 - 10 - text_h as i32
        } else {
            roi.y1 + 10
        };
        draw_text_mut(canvas, ROI_COLOR, roi.x1, text_y, scale, font, label);
    }
}

impl Default for OverlayRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl Renderer for OverlayRenderer {
    fn render(
        &self,
        frame: &RgbImage,
        mask: Option<&SegMask>,
        roi: Rect,
        label: &str,
    ) -> RgbImage {
        let mut canvas = frame.clone();
        if let Some(mask) = mask {
            self.draw_mask(&mut canvas, mask);
        }
        self.draw_roi(&mut canvas, roi, label);
        canvas
    }
}

fn font_path() -> Result<PathBuf> {
    let dir = dirs::config_dir()
        .context("no config directory available")?
        .join("puncture-rs");
    Ok(dir.join(FONT_NAME))
}

/// 从缓存目录加载字体, 不存在时下载
fn load_font() -> Result<FontVec> {
    let path = font_path()?;
    if !path.exists() {
        info!("⬇️ 下载字体 {} → {}", FONT_URL, path.display());
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let resp = ureq::get(FONT_URL)
            .call()
            .with_context(|| format!("failed to download {}", FONT_URL))?;
        let mut buffer = Vec::new();
        resp.into_reader().read_to_end(&mut buffer)?;
        std::fs::write(&path, &buffer)?;
    }
    let buffer = std::fs::read(&path)?;
    FontVec::try_from_vec(buffer)
        .map_err(|e| anyhow::anyhow!("invalid font {}: {}", path.display(), e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_draws_mask_and_roi() {
        let renderer = OverlayRenderer::with_font(None);
        let frame = RgbImage::new(64, 48);
        let mask = SegMask::from_fn(64, 48, |x, y| x == 30 && y == 30);
        let out = renderer.render(&frame, Some(&mask), Rect::new(10, 10, 50, 40), "0 0.90");

        assert_eq!(out.dimensions(), (64, 48));
        assert_eq!(*out.get_pixel(30, 30), renderer.mask_color());
        assert_eq!(*out.get_pixel(10, 10), ROI_COLOR);
        assert_eq!(*out.get_pixel(11, 20), ROI_COLOR);
        assert_eq!(*out.get_pixel(5, 5), Rgb([0, 0, 0]));
    }

    #[test]
    fn test_mismatched_mask_is_skipped() {
        let renderer = OverlayRenderer::with_font(None);
        let frame = RgbImage::new(16, 16);
        let mask = SegMask::from_fn(8, 8, |_, _| true);
        let out = renderer.render(&frame, Some(&mask), Rect::new(0, 0, 16, 16), "");
        assert_eq!(*out.get_pixel(4, 4), Rgb([0, 0, 0]));
    }
}
