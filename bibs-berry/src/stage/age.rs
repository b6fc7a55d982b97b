//! 模板月龄选择.

use std::collections::BTreeSet;

use crate::error::{PipelineError, PipelineResult};
use crate::layout::TemplateAssets;

/// 从 `available` 中选出与 `age` 差值最小的模板月龄. 差值相同时取较小者.
///
/// `available` 为空时返回 `None`.
pub fn nearest_age(age: u32, available: &BTreeSet<u32>) -> Option<u32> {
    // 升序迭代, `min_by_key` 在相等时保留最先出现的元素.
    available.iter().copied().min_by_key(|&a| a.abs_diff(age))
}

/// 扫描模板资源目录, 为 `age` 月龄的被试选出模板月龄.
pub fn select(assets: &TemplateAssets, age: u32) -> PipelineResult<u32> {
    let available = assets.ages()?;
    nearest_age(age, &available).ok_or_else(|| {
        PipelineError::Configuration(format!(
            "no template age available under {}",
            assets.root().display()
        ))
    })
}
