// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//! ROI 跟踪
//!
//! 未插入时跟随检测框 (四周扩展 margin), 插入后冻结为上一帧的 ROI。
//! 检测失败时的回退顺序: 本帧检测框 → 上一次检测框 → 整帧。
//! 回退使用未扩展的检测框, 连续丢检时 ROI 不会逐帧变大。
use crate::types::{FrameSize, Rect};

#[derive(Debug, Clone, Default)]
pub struct RegionTracker {
    last_active_box: Option<Rect>,
    last_detection_box: Option<Rect>,
}

impl RegionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// 解析本帧检测框: 本帧 → 上一次检测框 → 整帧 (未扩展)
    ///
    /// 分类模型的裁剪输入也使用这个结果。
    pub fn resolve_detection(
        &mut self,
        detection_box: Option<Rect>,
        frame_size: FrameSize,
    ) -> Rect {
        match detection_box {
            Some(rect) => {
                let rect = rect.clamp(frame_size);
                self.last_detection_box = Some(rect);
                rect
            }
            None => self
                .last_detection_box
                .unwrap_or_else(|| Rect::full_frame(frame_size)),
        }
    }

    /// 更新本帧 ROI
    pub fn update(
        &mut self,
        inserted: bool,
        detection_box: Option<Rect>,
        frame_size: FrameSize,
        margin: u32,
    ) -> Rect {
        if inserted {
            // 插入后冻结
            if let Some(rect) = self.last_active_box {
                return rect;
            }
            let rect = Rect::full_frame(frame_size);
            self.last_active_box = Some(rect);
            return rect;
        }

        let rect = self
            .resolve_detection(detection_box, frame_size)
            .expand(margin, frame_size);
        self.last_active_box = Some(rect);
        rect
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SIZE: FrameSize = FrameSize {
        width: 640,
        height: 480,
    };

    #[test]
    fn test_expand_not_inserted() {
        let mut tracker = RegionTracker::new();
        let roi = tracker.update(false, Some(Rect::new(100, 100, 200, 200)), SIZE, 50);
        assert_eq!(roi, Rect::new(50, 50, 250, 250));
    }

    #[test]
    fn test_frozen_while_inserted() {
        let mut tracker = RegionTracker::new();
        let first = tracker.update(false, Some(Rect::new(100, 100, 200, 200)), SIZE, 50);
        let frozen = tracker.update(true, Some(Rect::new(300, 300, 400, 400)), SIZE, 50);
        assert_eq!(first, frozen);
    }

    #[test]
    fn test_missing_detection_falls_back_without_growing() {
        let mut tracker = RegionTracker::new();
        tracker.update(false, Some(Rect::new(100, 100, 200, 200)), SIZE, 50);
        let a = tracker.update(false, None, SIZE, 50);
        let b = tracker.update(false, None, SIZE, 50);
        assert_eq!(a, Rect::new(50, 50, 250, 250));
        assert_eq!(a, b);
    }

    #[test]
    fn test_no_detection_ever_uses_full_frame() {
        let mut tracker = RegionTracker::new();
        let roi = tracker.update(false, None, SIZE, 50);
        assert_eq!(roi, Rect::full_frame(SIZE));
        let roi = tracker.update(true, None, SIZE, 50);
        assert_eq!(roi, Rect::full_frame(SIZE));
    }

    #[test]
    fn test_inserted_on_first_frame() {
        let mut tracker = RegionTracker::new();
        let roi = tracker.update(true, Some(Rect::new(1, 1, 2, 2)), SIZE, 50);
        assert_eq!(roi, Rect::full_frame(SIZE));
        assert!(roi.is_within(SIZE));
    }
}
