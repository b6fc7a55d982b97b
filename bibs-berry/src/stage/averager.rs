//! 同一模态多次采集的平均.

use std::fs;
use std::path::{Path, PathBuf};

use log::{debug, info};

use crate::error::{PipelineError, PipelineResult};
use crate::layout::raw_glob;
use crate::pipeline::{Context, Stage};
use crate::{MriScan, NiftiHeaderAttr};

/// 列出匹配 `pattern` 的文件, 按路径排序.
pub(crate) fn glob_sorted(pattern: &str) -> PipelineResult<Vec<PathBuf>> {
    let paths = glob::glob(pattern).map_err(|e| {
        PipelineError::input(format!("invalid pattern: {e}"), vec![pattern.to_string()])
    })?;
    let mut ans: Vec<PathBuf> = paths.filter_map(Result::ok).collect();
    ans.sort();
    Ok(ans)
}

/// 将 `inputs` 平均后写入 `output`.
///
/// 1. 只有一个输入时, 输出与输入逐字节相同;
/// 2. 否则为逐体素算术平均, 使用第一个输入的 header;
/// 3. 各输入形状必须相同, 否则返回输入错误.
pub fn average_files(inputs: &[PathBuf], output: &Path) -> PipelineResult<()> {
    match inputs {
        [] => Err(PipelineError::input("no volumes to average", vec![])),
        [single] => fs::copy(single, output)
            .map(|_| ())
            .map_err(PipelineError::io(single)),
        [first, ..] => {
            let mut scans = open_all(inputs)?.into_iter();
            let Some(mut acc) = scans.next() else {
                return Err(PipelineError::input("no volumes to average", vec![]));
            };
            for (p, other) in inputs[1..].iter().zip(scans) {
                if other.shape() != acc.shape() {
                    return Err(PipelineError::input(
                        format!(
                            "cannot average volumes of shape {:?} and {:?}",
                            acc.shape(),
                            other.shape()
                        ),
                        vec![first.display().to_string(), p.display().to_string()],
                    ));
                }
                let mut data = acc.data_mut();
                data += &other.data();
            }
            let n = inputs.len() as f32;
            acc.data_mut().mapv_inplace(|v| v / n);
            acc.save(output)
        }
    }
}

cfg_if::cfg_if! {
    if #[cfg(feature = "rayon")] {
        use rayon::prelude::*;

        /// 并行读取并解压全部输入.
        fn open_all(inputs: &[PathBuf]) -> PipelineResult<Vec<MriScan>> {
            inputs.par_iter().map(MriScan::open).collect()
        }
    } else {
        /// 依次读取全部输入.
        fn open_all(inputs: &[PathBuf]) -> PipelineResult<Vec<MriScan>> {
            inputs.iter().map(MriScan::open).collect()
        }
    }
}

/// 对每个所需模态, 平均原始输入目录下该模态的全部采集.
///
/// 某个所需模态没有任何输入时, 返回带有确切 glob 模式的输入错误.
pub fn run(ctx: &mut Context) -> PipelineResult<()> {
    ctx.enter(Stage::Averaged)?;
    for &m in ctx.modalities() {
        let pattern = raw_glob(&ctx.anat_dir, m);
        let inputs = glob_sorted(&pattern)?;
        if inputs.is_empty() {
            return Err(PipelineError::input(
                format!("{m} is required but no {m} volume was found"),
                vec![pattern],
            ));
        }
        debug!("{m} inputs: {inputs:?}");

        let output = ctx.work.averaged(m);
        average_files(&inputs, &output)?;
        info!("averaged {} {m} volume(s)", inputs.len());
        ctx.set_averaged(m, output);
    }
    Ok(())
}
