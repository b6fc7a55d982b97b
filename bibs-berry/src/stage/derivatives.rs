//! 写入 derivatives 目录.

use std::fs;
use std::io::ErrorKind;

use log::{info, warn};

use crate::error::{PipelineError, PipelineResult};
use crate::pipeline::{Context, Stage};
use crate::stage::copy_with_overwrite;

/// 把每个模态的原生空间分割和脑掩膜复制到 derivatives 目录,
/// 并复制一次数据集描述文件.
///
/// 目标已存在时, 若设置了覆盖标记则先删除旧文件, 否则跳过.
pub fn run(ctx: &mut Context) -> PipelineResult<()> {
    ctx.enter(Stage::DerivativesWritten)?;
    let anat = ctx.derivatives.anat();
    fs::create_dir_all(anat).map_err(PipelineError::io(anat))?;

    for &m in ctx.modalities() {
        copy_with_overwrite(ctx.native(m)?, &ctx.derivatives.aseg(m), ctx.overwrite)?;
        copy_with_overwrite(ctx.mask(m)?, &ctx.derivatives.brain_mask(m), ctx.overwrite)?;
    }
    copy_with_overwrite(
        &ctx.assets.dataset_description(),
        &ctx.derivatives.dataset_description(),
        ctx.overwrite,
    )?;
    info!("derivatives written to {}", anat.display());
    Ok(())
}

/// 成功运行后清理工作目录. 只有位于默认临时路径的工作目录会被删除.
///
/// 只删除本被试-会话独占的目录, 然后向上删除变空的父目录, 最多到临时根目录为止.
/// 其他被试的工作目录不受影响. 返回是否删除了工作目录.
pub fn cleanup(ctx: &Context) -> PipelineResult<bool> {
    if !ctx.work.is_default_scratch() {
        return Ok(false);
    }
    let base = ctx.work.base();
    match fs::remove_dir_all(base) {
        Ok(()) => {}
        Err(e) if e.kind() == ErrorKind::NotFound => {
            warn!("{} was already removed", base.display());
            return Ok(false);
        }
        Err(e) => return Err(PipelineError::io(base)(e)),
    }

    // 非空目录删除失败即停止.
    let root = ctx.work.root();
    for dir in base.ancestors().skip(1) {
        if !dir.starts_with(root) || fs::remove_dir(dir).is_err() {
            break;
        }
    }
    Ok(true)
}
