//! 流水线各阶段.
//!
//! 每个阶段都是一个 `run` 函数: 先在上下文中进入自己的状态,
//! 再从上下文读取上游产出的路径, 最后写回自己的产出.
//! 阶段之间不共享内存中的体数据.

use std::fs;
use std::path::Path;

use log::warn;

use crate::error::{PipelineError, PipelineResult};

pub mod age;
pub mod averager;
pub mod chirality;
pub mod cropper;
pub mod derivatives;
pub mod inference;
pub mod lr_mask;
pub mod mask;
pub mod registration;
pub mod revert;

/// 复制文件. 目标已存在时跳过, 返回是否真的复制了.
pub(crate) fn copy_if_absent(from: &Path, to: &Path) -> PipelineResult<bool> {
    if to.exists() {
        warn!("{} already exists, skipping copy", to.display());
        return Ok(false);
    }
    if let Some(parent) = to.parent() {
        fs::create_dir_all(parent).map_err(PipelineError::io(parent))?;
    }
    fs::copy(from, to).map_err(PipelineError::io(from))?;
    Ok(true)
}

/// 复制文件. 目标已存在时, 若 `overwrite` 则先删除旧文件, 否则跳过.
pub(crate) fn copy_with_overwrite(from: &Path, to: &Path, overwrite: bool) -> PipelineResult<bool> {
    if overwrite && to.exists() {
        fs::remove_file(to).map_err(PipelineError::io(to))?;
    }
    copy_if_absent(from, to)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_copy_semantics() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.txt");
        let b = dir.path().join("sub").join("b.txt");
        fs::write(&a, "first").unwrap();

        assert!(copy_if_absent(&a, &b).unwrap());
        fs::write(&a, "second").unwrap();
        assert!(!copy_if_absent(&a, &b).unwrap());
        assert_eq!(fs::read_to_string(&b).unwrap(), "first");

        assert!(!copy_with_overwrite(&a, &b, false).unwrap());
        assert_eq!(fs::read_to_string(&b).unwrap(), "first");
        assert!(copy_with_overwrite(&a, &b, true).unwrap());
        assert_eq!(fs::read_to_string(&b).unwrap(), "second");
    }
}
