//! 还原到原生空间.

use log::info;

use crate::consts::naming::NII_GZ;
use crate::consts::AFFINE_TOLERANCE;
use crate::data::read_header;
use crate::error::{PipelineError, PipelineResult};
use crate::pipeline::{Context, Stage};
use crate::tool::{ApplyRequest, Interp, Toolbox};
use crate::NiftiHeaderAttr;

/// 把左右校正后的分割还原到每个所需模态的原生空间.
///
/// 使用的矩阵恰好是该模态配准变换链组合矩阵的逆, 以平均后的扫描为参考网格,
/// 最近邻插值, 只重采样一次. 输出不在原生网格上时返回外部工具错误.
pub fn run<T: Toolbox + ?Sized>(ctx: &mut Context, tools: &T) -> PipelineResult<()> {
    ctx.enter(Stage::NativeSpace)?;
    let corrected = ctx.corrected()?.to_owned();

    for &m in ctx.modalities() {
        let registered = ctx.registered(m)?;
        let inverse = registered.chain.inverse()?;
        let matrix = ctx.work.registered(m, "template_to_native.mat");
        inverse.save(&matrix)?;

        let native = ctx.averaged(m)?.to_owned();
        let output = ctx.work.post(&format!("{}_native_aseg{NII_GZ}", m.tag()));
        tools.apply_affine(&ApplyRequest {
            input: &corrected,
            reference: &native,
            matrix: &matrix,
            output: &output,
            interp: Interp::NearestNeighbour,
        })?;

        let got = read_header(&output)?;
        let want = read_header(&native)?;
        if !got.same_grid(&want, AFFINE_TOLERANCE) {
            return Err(PipelineError::tool(
                "flirt",
                format!("reverted {m} segmentation is not on the native grid"),
                &output,
                &native,
            ));
        }
        info!("reverted segmentation to {m} native space");
        ctx.set_native(m, output);
    }
    Ok(())
}
