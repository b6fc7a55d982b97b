//! 调用外部推理程序得到模板空间中的分割.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use log::{info, warn};

use crate::consts::naming::NII_GZ;
use crate::error::{PipelineError, PipelineResult};
use crate::layout::slot_glob;
use crate::pipeline::{Context, Stage};
use crate::stage::averager::glob_sorted;
use crate::tool::{PredictRequest, Toolbox};

/// 推理任务与模型.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InferenceTask {
    /// 任务号.
    pub task: u32,

    /// 模型名.
    pub model: String,
}

/// 检查推理输入目录中是否有 `expected` 个按 slot 命名的模态文件.
///
/// 1. 需要两个模态时, 至少要有两个 `*_000?.nii.gz`, 否则报告两个 slot 的 glob;
/// 2. 需要一个模态时, 必须存在 `*_0000.nii.gz`, 否则报告该 glob.
pub fn validate_inputs(input_dir: &Path, expected: usize, task: u32) -> PipelineResult<()> {
    let any_slot = input_dir
        .join(format!("*_000?{NII_GZ}"))
        .display()
        .to_string();
    let found = glob_sorted(&any_slot)?;
    let first_slot = slot_glob(input_dir, 0);

    let missing = match expected {
        2 if found.len() < 2 => vec![first_slot, slot_glob(input_dir, 1)],
        1 if glob_sorted(&first_slot)?.is_empty() => vec![first_slot],
        _ => return Ok(()),
    };
    Err(PipelineError::input(
        format!(
            "task {task} requires image file(s) at the path(s) below, and at least 1 is \
             missing. Either save the image file(s) there or try a different task"
        ),
        missing,
    ))
}

/// 推理输出目录中的全部分割, 按路径排序.
pub fn outputs(output_dir: &Path) -> PipelineResult<Vec<PathBuf>> {
    glob_sorted(&output_dir.join(format!("*{NII_GZ}")).display().to_string())
}

/// 删除推理输出目录中已有的分割, 返回删除的个数.
///
/// 推理结束后只认本次写出的文件, 上次运行留下的分割不能掩盖推理失败.
pub fn clear_outputs(output_dir: &Path) -> PipelineResult<usize> {
    let mut removed = 0usize;
    for stale in outputs(output_dir)? {
        match fs::remove_file(&stale) {
            Ok(()) => {
                warn!("removed stale segmentation {}", stale.display());
                removed += 1;
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(PipelineError::io(&stale)(e)),
        }
    }
    Ok(removed)
}

/// 运行推理, 并检查是否至少产生了一个分割.
///
/// 没有任何输出时返回外部工具错误, 同时给出输出目录与输入目录,
/// 后续的左右判定不会运行.
pub fn run<T: Toolbox + ?Sized>(
    ctx: &mut Context,
    tools: &T,
    task: &InferenceTask,
) -> PipelineResult<()> {
    ctx.enter(Stage::Segmented)?;
    let input_dir = ctx.work.inference_input_dir();
    let output_dir = ctx.work.inference_output_dir();
    validate_inputs(&input_dir, ctx.modalities().len(), task.task)?;
    clear_outputs(&output_dir)?;

    tools.predict(&PredictRequest {
        input_dir: &input_dir,
        output_dir: &output_dir,
        task: task.task,
        model: &task.model,
    })?;

    let segmentation = outputs(&output_dir)?.into_iter().next().ok_or_else(|| {
        PipelineError::tool(
            "nnUNet_predict",
            "output segmentation file not created",
            &output_dir,
            &input_dir,
        )
    })?;
    info!("segmentation at {}", segmentation.display());
    ctx.set_segmentation(segmentation);
    Ok(())
}
