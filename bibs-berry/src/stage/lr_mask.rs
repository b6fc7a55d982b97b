//! 左右半球判定.

use log::info;

use crate::consts::naming::NII_GZ;
use crate::consts::LR_MASK_DILATION_RADIUS;
use crate::error::PipelineResult;
use crate::pipeline::{Context, Stage};
use crate::tool::{LrRequest, Toolbox};
use crate::MriMask;

/// 以参考模态在模板空间中的扫描为固定图像, 得到左右半球掩膜并膨胀.
///
/// 参考模态由 [`crate::pipeline::Availability::lr_reference`] 决定,
/// 月龄模板为上下文中选中的模板月龄.
pub fn run<T: Toolbox + ?Sized>(ctx: &mut Context, tools: &T) -> PipelineResult<()> {
    ctx.enter(Stage::Disambiguated)?;
    let reference = ctx.availability.lr_reference();
    let age = ctx.template_age;
    let subject = ctx.registered(reference)?.volume.clone();

    let raw = ctx.work.post(&format!("lr_mask{NII_GZ}"));
    tools.label_left_right(&LrRequest {
        subject: &subject,
        template: &ctx.assets.age_template(age, reference),
        template_mask: &ctx.assets.age_lr_mask(age),
        prefix: &ctx.work.post("lr_"),
        output: &raw,
    })?;

    let mut mask = MriMask::open(&raw)?;
    let grown = mask.dilate(LR_MASK_DILATION_RADIUS);
    let dilated = ctx.work.post(&format!("lr_mask_dilated{NII_GZ}"));
    mask.save(&dilated)?;
    info!("left/right mask from {reference} against {age}mo template, dilation grew {grown} voxel(s)");

    ctx.set_lr_mask(dilated);
    Ok(())
}
