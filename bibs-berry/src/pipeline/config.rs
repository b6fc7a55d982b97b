//! 单次运行的配置.

use std::path::PathBuf;

use crate::consts::{DEFAULT_MODEL, DEFAULT_TASK};
use crate::error::{PipelineError, PipelineResult};
use crate::layout::{self, SubjectSession};

/// 单个被试-会话的运行配置.
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PipelineConfig {
    /// 被试标识.
    pub id: SubjectSession,

    /// 原始解剖输入目录, 其中为 `*_T1w.nii.gz` 与 `*_T2w.nii.gz`.
    pub anat_dir: PathBuf,

    /// derivatives 根目录.
    pub output_dir: PathBuf,

    /// 工作目录. 缺省时为默认临时路径, 成功运行后会被删除.
    #[cfg_attr(feature = "serde", serde(default))]
    pub work_dir: Option<PathBuf>,

    /// 被试月龄.
    pub age_months: u32,

    /// 推理任务号.
    #[cfg_attr(feature = "serde", serde(default = "default_task"))]
    pub task: u32,

    /// 推理模型名.
    #[cfg_attr(feature = "serde", serde(default = "default_model"))]
    pub model: String,

    /// 是否覆盖已存在的 derivatives.
    #[cfg_attr(feature = "serde", serde(default))]
    pub overwrite: bool,

    /// 模板资源目录. 缺省时见 [`layout::asset_dir_from_env_or_home`].
    #[cfg_attr(feature = "serde", serde(default))]
    pub asset_dir: Option<PathBuf>,

    /// 任务需求表. 缺省时为资源目录下的 `models.csv`.
    #[cfg_attr(feature = "serde", serde(default))]
    pub requirements: Option<PathBuf>,

    /// FreeSurfer 颜色表. 缺省时使用资源目录下的颜色表, 若没有则使用内置标签对.
    #[cfg_attr(feature = "serde", serde(default))]
    pub color_lut: Option<PathBuf>,
}

#[cfg(feature = "serde")]
fn default_task() -> u32 {
    DEFAULT_TASK
}

#[cfg(feature = "serde")]
fn default_model() -> String {
    DEFAULT_MODEL.to_string()
}

impl PipelineConfig {
    /// 以默认任务, 默认模型和默认工作目录创建配置.
    pub fn new<P: Into<PathBuf>, Q: Into<PathBuf>>(
        id: SubjectSession,
        anat_dir: P,
        output_dir: Q,
        age_months: u32,
    ) -> Self {
        Self {
            id,
            anat_dir: anat_dir.into(),
            output_dir: output_dir.into(),
            work_dir: None,
            age_months,
            task: DEFAULT_TASK,
            model: DEFAULT_MODEL.to_string(),
            overwrite: false,
            asset_dir: None,
            requirements: None,
            color_lut: None,
        }
    }

    /// 实际使用的工作目录根.
    pub fn work_root(&self) -> PathBuf {
        self.work_dir
            .clone()
            .unwrap_or_else(layout::default_scratch_dir)
    }

    /// 实际使用的模板资源目录. 无法确定时返回配置错误.
    pub fn asset_root(&self) -> PipelineResult<PathBuf> {
        self.asset_dir
            .clone()
            .or_else(layout::asset_dir_from_env_or_home)
            .ok_or_else(|| {
                PipelineError::Configuration(
                    "template asset directory is not set and no home directory was found"
                        .to_string(),
                )
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let c = PipelineConfig::new(SubjectSession::new("01", None), "/in", "/out", 8);
        assert_eq!(c.task, 512);
        assert_eq!(c.model, "3d_fullres");
        assert_eq!(c.work_root(), layout::default_scratch_dir());

        let c = PipelineConfig {
            asset_dir: Some("/assets".into()),
            work_dir: Some("/work".into()),
            ..c
        };
        assert_eq!(c.asset_root().unwrap(), PathBuf::from("/assets"));
        assert_eq!(c.work_root(), PathBuf::from("/work"));
    }
}
