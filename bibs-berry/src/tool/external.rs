//! 调用 FSL, ANTs 与 nnU-Net 命令行程序的工具集.

use std::env;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::process::Command;

use log::{debug, warn};

use super::*;
use crate::error::{PipelineError, PipelineResult};

/// 基于命令行程序的 [`Toolbox`] 实现.
#[derive(Clone, Debug)]
pub struct ExternalTools {
    fsl_bin: Option<PathBuf>,
    ants_bin: Option<PathBuf>,
    nnunet: PathBuf,
}

impl Default for ExternalTools {
    fn default() -> Self {
        Self::from_env()
    }
}

impl ExternalTools {
    /// 由环境变量定位工具.
    ///
    /// 1. FSL 位于 `$FSLDIR/bin`;
    /// 2. ANTs 位于 `$ANTSPATH`;
    /// 3. 环境变量为空时, 从 `$PATH` 中查找;
    /// 4. `nnUNet_predict` 总是从 `$PATH` 中查找.
    pub fn from_env() -> Self {
        let non_empty = |key: &str| env::var_os(key).filter(|v| !v.is_empty()).map(PathBuf::from);
        Self {
            fsl_bin: non_empty("FSLDIR").map(|d| d.join("bin")),
            ants_bin: non_empty("ANTSPATH"),
            nnunet: PathBuf::from("nnUNet_predict"),
        }
    }

    /// 指定 FSL 安装目录 (其下的 `bin/` 中有 `flirt` 和 `robustfov`).
    pub fn with_fsl_dir<P: AsRef<Path>>(mut self, dir: P) -> Self {
        self.fsl_bin = Some(dir.as_ref().join("bin"));
        self
    }

    /// 指定 ANTs 可执行文件所在目录.
    pub fn with_ants_path<P: AsRef<Path>>(mut self, dir: P) -> Self {
        self.ants_bin = Some(dir.as_ref().to_owned());
        self
    }

    /// 指定 `nnUNet_predict` 可执行文件.
    pub fn with_nnunet<P: AsRef<Path>>(mut self, exe: P) -> Self {
        self.nnunet = exe.as_ref().to_owned();
        self
    }

    fn fsl(&self, name: &str) -> Command {
        Command::new(locate(self.fsl_bin.as_deref(), name))
    }

    fn ants(&self, name: &str) -> Command {
        Command::new(locate(self.ants_bin.as_deref(), name))
    }
}

fn locate(dir: Option<&Path>, name: &str) -> PathBuf {
    match dir {
        Some(d) => d.join(name),
        None => PathBuf::from(name),
    }
}

/// 以可读形式输出命令行.
fn render(cmd: &Command) -> String {
    std::iter::once(cmd.get_program())
        .chain(cmd.get_args())
        .map(OsStr::to_string_lossy)
        .collect::<Vec<_>>()
        .join(" ")
}

/// 同步运行 `cmd`, 并检查退出状态与期望的输出文件.
///
/// `input` 只用于错误诊断信息.
fn run(mut cmd: Command, tool: &str, outputs: &[&Path], input: &Path) -> PipelineResult<()> {
    debug!("{}", render(&cmd));
    let first = outputs.first().copied().unwrap_or(input);

    let status = cmd
        .status()
        .map_err(|e| PipelineError::tool(tool, format!("cannot launch: {e}"), first, input))?;
    if !status.success() {
        return Err(PipelineError::tool(
            tool,
            format!("exited with {status}"),
            first,
            input,
        ));
    }
    match outputs.iter().find(|p| !p.is_file()) {
        Some(missing) => Err(PipelineError::tool(
            tool,
            "expected output file was not created",
            *missing,
            input,
        )),
        None => Ok(()),
    }
}

impl Toolbox for ExternalTools {
    fn crop_fov(&self, req: &CropRequest<'_>) -> PipelineResult<()> {
        let mut cmd = self.fsl("robustfov");
        cmd.arg("-i")
            .arg(req.input)
            .arg("-r")
            .arg(req.output)
            .arg("-m")
            .arg(req.crop_to_full);
        run(cmd, "robustfov", &[req.output, req.crop_to_full], req.input)
    }

    fn estimate_affine(&self, req: &EstimateRequest<'_>) -> PipelineResult<()> {
        let mut cmd = self.fsl("flirt");
        cmd.arg("-in")
            .arg(req.moving)
            .arg("-ref")
            .arg(req.reference)
            .arg("-init")
            .arg(req.init)
            .arg("-omat")
            .arg(req.out_matrix)
            .arg("-dof")
            .arg(req.dof.to_string());
        let mut outputs = vec![req.out_matrix];
        if let Some(out) = req.out_volume {
            cmd.arg("-out").arg(out);
            outputs.push(out);
        }
        run(cmd, "flirt", &outputs, req.moving)
    }

    fn apply_affine(&self, req: &ApplyRequest<'_>) -> PipelineResult<()> {
        let mut cmd = self.fsl("flirt");
        cmd.arg("-in")
            .arg(req.input)
            .arg("-ref")
            .arg(req.reference)
            .arg("-applyxfm")
            .arg("-init")
            .arg(req.matrix)
            .arg("-interp")
            .arg(req.interp.flirt_name())
            .arg("-out")
            .arg(req.output);
        run(cmd, "flirt", &[req.output], req.input)
    }

    fn label_left_right(&self, req: &LrRequest<'_>) -> PipelineResult<()> {
        let warp = with_suffix(req.prefix, "1Warp.nii.gz");
        let affine = with_suffix(req.prefix, "0GenericAffine.mat");

        let mut cmd = self.ants("antsRegistrationSyNQuick.sh");
        cmd.arg("-d")
            .arg("3")
            .arg("-f")
            .arg(req.subject)
            .arg("-m")
            .arg(req.template)
            .arg("-o")
            .arg(req.prefix);
        run(
            cmd,
            "antsRegistrationSyNQuick.sh",
            &[warp.as_path(), affine.as_path()],
            req.subject,
        )?;

        let mut cmd = self.ants("antsApplyTransforms");
        cmd.arg("-d")
            .arg("3")
            .arg("-i")
            .arg(req.template_mask)
            .arg("-r")
            .arg(req.subject)
            .arg("-o")
            .arg(req.output)
            .arg("-n")
            .arg("NearestNeighbor")
            .arg("-t")
            .arg(&warp)
            .arg("-t")
            .arg(&affine);
        run(cmd, "antsApplyTransforms", &[req.output], req.template_mask)
    }

    fn predict(&self, req: &PredictRequest<'_>) -> PipelineResult<()> {
        let mut cmd = Command::new(&self.nnunet);
        cmd.arg("-i")
            .arg(req.input_dir)
            .arg("-o")
            .arg(req.output_dir)
            .arg("-t")
            .arg(req.task.to_string())
            .arg("-m")
            .arg(req.model);
        debug!("{}", render(&cmd));

        // 退出状态不可靠, 是否成功以输出目录中是否产生分割为准.
        let status = cmd.status().map_err(|e| {
            PipelineError::tool(
                "nnUNet_predict",
                format!("cannot launch: {e}"),
                req.output_dir,
                req.input_dir,
            )
        })?;
        if !status.success() {
            warn!("nnUNet_predict exited with {status}");
        }
        Ok(())
    }
}
