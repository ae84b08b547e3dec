// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
/// 测量系统 (Measurement System)
///
/// 单线程、按帧序执行, 每个视频独占一套状态:
/// - CalibrationWindow:     未插入帧的像素长度滚动窗口 → 像素/毫米标定
/// - RegionTracker:         ROI 跟踪与检测失败时的回退
/// - InsertionStateMachine: 插入开始/结束判定与速度计算
pub mod calibration;
pub mod region;
pub mod state_machine;

pub use calibration::CalibrationWindow;
pub use region::RegionTracker;
pub use state_machine::{FrameInput, FrameLabel, InsertionState, InsertionStateMachine};
