//! 配准到 1mm 各向同性模板空间.
//!
//! 两种路径由模态组合决定:
//!
//! 1. 单模态: 裁剪扫描直接配准到模板 (crop->template), 再与 full->crop 组合;
//! 2. 双模态: 先做非 ACPC 配准 (crop->template), 再以其结果为起点做刚体 ACPC 配准
//!    (template->acpc), 三者与 full->crop 组合.
//!
//! 两种路径都只对平均后 (未裁剪) 的扫描做一次重采样.
//! 组合后的变换链会保存在上下文中, 还原到原生空间时使用它的逆.

use std::path::Path;

use log::info;

use crate::consts::naming::NII_GZ;
use crate::error::{PipelineError, PipelineResult};
use crate::pipeline::{Context, Modality, Registered, Stage};
use crate::stage::copy_with_overwrite;
use crate::tool::{ApplyRequest, EstimateRequest, Interp, Toolbox};
use crate::transform::{Affine, TransformChain};

/// 完整仿射自由度.
const AFFINE_DOF: u8 = 12;

/// 刚体自由度.
const RIGID_DOF: u8 = 6;

/// 估计 `moving` -> `reference` 的变换, 以单位阵为初始变换.
fn estimate<T: Toolbox + ?Sized>(
    tools: &T,
    moving: &Path,
    reference: &Path,
    identity: &Path,
    dof: u8,
    out_matrix: &Path,
    out_volume: Option<&Path>,
) -> PipelineResult<Affine> {
    tools.estimate_affine(&EstimateRequest {
        moving,
        reference,
        init: identity,
        dof,
        out_matrix,
        out_volume,
    })?;
    Affine::load(out_matrix)
}

/// 为模态 `m` 构造 native->template 变换链. `dual` 决定是否做 ACPC 配准.
fn build_chain<T: Toolbox + ?Sized>(
    ctx: &Context,
    tools: &T,
    m: Modality,
    identity: &Path,
    dual: bool,
) -> PipelineResult<TransformChain> {
    let cropped = ctx.cropped(m)?;
    let reference = ctx.assets.reference(m);
    let full_to_crop = cropped.crop_to_full.inverse().ok_or_else(|| {
        PipelineError::Composition(format!("crop-to-full transform of {m} is singular"))
    })?;

    let mut chain = TransformChain::new();
    chain.push("full_to_crop", full_to_crop);

    if dual {
        let non_acpc = ctx.work.registered(m, &format!("non_acpc{NII_GZ}"));
        let crop_to_template = estimate(
            tools,
            &cropped.volume,
            &reference,
            identity,
            AFFINE_DOF,
            &ctx.work.registered(m, "crop_to_template.mat"),
            Some(&non_acpc),
        )?;
        let template_to_acpc = estimate(
            tools,
            &non_acpc,
            &reference,
            identity,
            RIGID_DOF,
            &ctx.work.registered(m, "template_to_acpc.mat"),
            None,
        )?;
        chain
            .push("crop_to_template", crop_to_template)
            .push("template_to_acpc", template_to_acpc);
    } else {
        let crop_to_template = estimate(
            tools,
            &cropped.volume,
            &reference,
            identity,
            AFFINE_DOF,
            &ctx.work.registered(m, "crop_to_template.mat"),
            None,
        )?;
        chain.push("crop_to_template", crop_to_template);
    }
    Ok(chain)
}

/// 将所需模态配准到模板空间, 并把结果按 slot 复制到推理输入目录.
pub fn run<T: Toolbox + ?Sized>(ctx: &mut Context, tools: &T) -> PipelineResult<()> {
    ctx.enter(Stage::Registered)?;
    let identity = ctx.work.identity_mat();
    Affine::identity().save(&identity)?;

    let set = ctx.availability.set;
    for &m in ctx.modalities() {
        let slot = set.slot(m).ok_or_else(|| {
            PipelineError::Composition(format!("{m} has no inference slot in {set:?}"))
        })?;
        let chain = build_chain(ctx, tools, m, &identity, set.is_dual())?;
        let matrix = ctx.work.registered(m, "full_to_template.mat");
        chain.compose()?.save(&matrix)?;

        let volume = ctx.work.registered(m, &format!("template{NII_GZ}"));
        tools.apply_affine(&ApplyRequest {
            input: ctx.averaged(m)?,
            reference: &ctx.assets.reference(m),
            matrix: &matrix,
            output: &volume,
            interp: Interp::Trilinear,
        })?;
        info!("registered {m} to template space via [{}]", chain.describe());

        // 工作目录只反映本次运行, 上次留下的推理输入总是被替换.
        copy_with_overwrite(&volume, &ctx.work.inference_input(slot), true)?;
        ctx.set_registered(
            m,
            Registered {
                volume,
                chain,
                matrix,
            },
        );
    }
    Ok(())
}
