// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//! 掩码最小外接矩形 (旋转矩形)
//!
//! 每个前景像素按单位正方形处理, 所以一个 10x20 的轴对齐像素块测得的边长正好是 10 和 20。
//! 约定 `pixel_width` 为长边 (针梗方向), `pixel_height` 为短边, 因此 `ratio >= 1`。
//! 空掩码没有外接矩形, 返回 `None` (零测量), 调用方应沿用上一次有效测量。
use imageproc::geometry::convex_hull;
use imageproc::point::Point;

use crate::types::{Measurement, SegMask};

/// 计算掩码最小外接矩形的边长, `pixel_width` 为长边
pub fn min_rect_len(mask: &SegMask) -> Option<Measurement> {
    let corners = pixel_corners(mask);
    if corners.is_empty() {
        return None;
    }
    let hull = convex_hull(corners.as_slice());
    let (a, b) = min_area_sides(&hull);
    Some(Measurement::new(a.max(b), a.min(b)))
}

/// 每行最左/最右前景像素的四个角点, 其凸包等于全部像素正方形的凸包
fn pixel_corners(mask: &SegMask) -> Vec<Point<i32>> {
    let mut corners = Vec::new();
    for y in 0..mask.height {
        let row = &mask.data[(y * mask.width) as usize..((y + 1) * mask.width) as usize];
        let first = row.iter().position(|&v| v != 0);
        let last = row.iter().rposition(|&v| v != 0);
        if let (Some(l), Some(r)) = (first, last) {
            let (l, r, y) = (l as i32, r as i32 + 1, y as i32);
            corners.push(Point::new(l, y));
            corners.push(Point::new(l, y + 1));
            corners.push(Point::new(r, y));
            corners.push(Point::new(r, y + 1));
        }
    }
    corners
}

/// 旋转卡壳: 最小面积矩形的两条边长 (沿凸包边方向, 垂直方向)
fn min_area_sides(hull: &[Point<i32>]) -> (f32, f32) {
    if hull.len() < 3 {
        return axis_aligned_sides(hull);
    }

    let mut best: Option<(f64, f64, f64)> = None;
    for i in 0..hull.len() {
        let p = hull[i];
        let q = hull[(i + 1) % hull.len()];
        let (dx, dy) = ((q.x - p.x) as f64, (q.y - p.y) as f64);
        let norm = (dx * dx + dy * dy).sqrt();
        if norm == 0.0 {
            continue;
        }
        let (ux, uy) = (dx / norm, dy / norm);

        let (mut min_u, mut max_u) = (f64::MAX, f64::MIN);
        let (mut min_v, mut max_v) = (f64::MAX, f64::MIN);
        for pt in hull {
            let (x, y) = (pt.x as f64, pt.y as f64);
            let u = x * ux + y * uy;
            let v = -x * uy + y * ux;
            min_u = min_u.min(u);
            max_u = max_u.max(u);
            min_v = min_v.min(v);
            max_v = max_v.max(v);
        }

        let (w, h) = (max_u - min_u, max_v - min_v);
        let area = w * h;
        if best.map_or(true, |(a, _, _)| area < a - 1e-9) {
            best = Some((area, w, h));
        }
    }

    match best {
        Some((_, w, h)) => (w as f32, h as f32),
        None => axis_aligned_sides(hull),
    }
}

fn axis_aligned_sides(points: &[Point<i32>]) -> (f32, f32) {
    let xs = points.iter().map(|p| p.x);
    let ys = points.iter().map(|p| p.y);
    let w = xs.clone().max().unwrap_or(0) - xs.min().unwrap_or(0);
    let h = ys.clone().max().unwrap_or(0) - ys.min().unwrap_or(0);
    (w as f32, h as f32)
}
