//! 头部视野裁剪.

use log::info;

use crate::error::{PipelineError, PipelineResult};
use crate::pipeline::{Context, Cropped, Stage};
use crate::tool::{CropRequest, Toolbox};
use crate::transform::Affine;

/// 对每个所需模态独立地裁剪平均后的扫描, 并记录 crop->full 变换.
///
/// 裁剪工具失败是致命的, 不会重试. crop->full 变换必须可逆.
pub fn run<T: Toolbox + ?Sized>(ctx: &mut Context, tools: &T) -> PipelineResult<()> {
    ctx.enter(Stage::Cropped)?;
    for &m in ctx.modalities() {
        let input = ctx.averaged(m)?.to_owned();
        let output = ctx.work.cropped(m);
        let mat = ctx.work.crop_to_full_mat(m);
        tools.crop_fov(&CropRequest {
            input: &input,
            output: &output,
            crop_to_full: &mat,
        })?;

        let crop_to_full = Affine::load(&mat)?;
        if crop_to_full.inverse().is_none() {
            return Err(PipelineError::Composition(format!(
                "crop-to-full transform {} is not invertible",
                mat.display()
            )));
        }
        info!("cropped {m}");
        ctx.set_cropped(
            m,
            Cropped {
                volume: output,
                crop_to_full,
            },
        );
    }
    Ok(())
}
