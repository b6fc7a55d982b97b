//! 模板资源目录.
//!
//! ```text
//! {root}/
//!     models.csv                                  任务 -> 所需模态
//!     dataset_description.json                    数据集描述
//!     FreeSurferColorLUT.txt                      (可选) 标签颜色表
//!     MNI_templates/INFANT_MNI_T1_1mm.nii.gz      配准参考模板
//!     MNI_templates/INFANT_MNI_T2_1mm.nii.gz
//!     chirality_masks/{age}mo_template_T1w.nii.gz 各月龄模板
//!     chirality_masks/{age}mo_template_T2w.nii.gz
//!     chirality_masks/{age}mo_template_LRmask.nii.gz
//! ```

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use crate::consts::naming::*;
use crate::error::{PipelineError, PipelineResult};
use crate::pipeline::Modality;

const MODELS_CSV: &str = "models.csv";
const COLOR_LUT: &str = "FreeSurferColorLUT.txt";
const REFERENCE_DIR: &str = "MNI_templates";
const CHIRALITY_DIR: &str = "chirality_masks";
const LR_MASK_TAG: &str = "LRmask";

/// 模板资源目录.
#[derive(Clone, Debug)]
pub struct TemplateAssets {
    root: PathBuf,
}

impl TemplateAssets {
    /// 以 `root` 为根目录创建. 不会触碰文件系统.
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_owned(),
        }
    }

    /// 资源根目录.
    #[inline]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// 默认的任务需求表.
    pub fn requirements_csv(&self) -> PathBuf {
        self.root.join(MODELS_CSV)
    }

    /// 数据集描述文件.
    pub fn dataset_description(&self) -> PathBuf {
        self.root.join(DATASET_DESCRIPTION)
    }

    /// 标签颜色表. 文件不存在时返回 `None`.
    pub fn color_lut(&self) -> Option<PathBuf> {
        let p = self.root.join(COLOR_LUT);
        p.is_file().then_some(p)
    }

    /// 某模态的 1mm 各向同性配准参考模板.
    pub fn reference(&self, m: Modality) -> PathBuf {
        let t = match m {
            Modality::T1w => "T1",
            Modality::T2w => "T2",
        };
        self.root
            .join(REFERENCE_DIR)
            .join(format!("INFANT_MNI_{t}_1mm{NII_GZ}"))
    }

    fn chirality_dir(&self) -> PathBuf {
        self.root.join(CHIRALITY_DIR)
    }

    /// 月龄 `age` 的某模态模板.
    pub fn age_template(&self, age: u32, m: Modality) -> PathBuf {
        self.chirality_dir()
            .join(format!("{age}mo_template_{}{NII_GZ}", m.tag()))
    }

    /// 月龄 `age` 模板上的左右半球掩膜.
    pub fn age_lr_mask(&self, age: u32) -> PathBuf {
        self.chirality_dir()
            .join(format!("{age}mo_template_{LR_MASK_TAG}{NII_GZ}"))
    }

    /// 扫描 `chirality_masks/` 目录, 获取全部存在左右掩膜的模板月龄.
    ///
    /// 一个都没有时返回配置错误.
    pub fn ages(&self) -> PipelineResult<BTreeSet<u32>> {
        let suffix = format!("mo_template_{LR_MASK_TAG}{NII_GZ}");
        let pattern = self
            .chirality_dir()
            .join(format!("*{suffix}"))
            .display()
            .to_string();
        let paths = glob::glob(&pattern).map_err(|e| {
            PipelineError::Configuration(format!("bad template pattern {pattern}: {e}"))
        })?;

        let ages: BTreeSet<u32> = paths
            .filter_map(Result::ok)
            .filter_map(|p| {
                let name = p.file_name()?.to_str()?.to_owned();
                name.strip_suffix(&suffix)?.parse().ok()
            })
            .collect();
        if ages.is_empty() {
            return Err(PipelineError::Configuration(format!(
                "no chirality masks matching {pattern}"
            )));
        }
        Ok(ages)
    }

    /// 在运行任何外部工具之前, 检查本次运行所需的资源是否齐全.
    ///
    /// `modalities` 为需要配准的模态, `lr_reference` 为左右判定参考模态,
    /// `age` 为选中的模板月龄. 缺失的全部文件会在同一个配置错误中列出.
    pub fn check(
        &self,
        modalities: &[Modality],
        lr_reference: Modality,
        age: u32,
    ) -> PipelineResult<()> {
        let mut required: Vec<PathBuf> = modalities.iter().map(|&m| self.reference(m)).collect();
        required.push(self.age_template(age, lr_reference));
        required.push(self.age_lr_mask(age));
        required.push(self.dataset_description());

        let missing: Vec<String> = required
            .iter()
            .filter(|p| !p.is_file())
            .map(|p| p.display().to_string())
            .collect();
        if missing.is_empty() {
            Ok(())
        } else {
            Err(PipelineError::Configuration(format!(
                "missing template assets:\n{}",
                missing.join("\n")
            )))
        }
    }
}
