// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//! 插入起始帧判定
//!
//! 逐帧分类结果带噪声, 单帧翻转不能作为插入开始。
//! 起始帧取第一个满足以下条件的帧 i:
//! - 第 i 帧本身被分类为插入
//! - 窗口 [i, i + wnd) 内插入帧严格过半 (窗口在视频末尾截断)
use crate::types::NeedleClass;

/// 返回插入起始帧, 找不到时返回 `None`
pub fn judge_insert_start(classes: &[NeedleClass], judge_wnd: usize) -> Option<usize> {
    let wnd = judge_wnd.max(1);
    if classes.is_empty() {
        return None;
    }

    // 前缀和, 窗口内插入帧计数 O(1)
    let mut prefix = Vec::with_capacity(classes.len() + 1);
    prefix.push(0usize);
    for c in classes {
        let last = *prefix.last().unwrap_or(&0);
        prefix.push(last + usize::from(*c == NeedleClass::Inserted));
    }

    (0..classes.len()).find(|&i| {
        if classes[i] != NeedleClass::Inserted {
            return false;
        }
        let end = (i + wnd).min(classes.len());
        let inserted = prefix[end] - prefix[i];
        inserted * 2 > end - i
    })
}
