//! 贯穿各阶段的运行上下文.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use log::info;

use super::{Availability, Modality, Stage};
use crate::error::{PipelineError, PipelineResult};
use crate::layout::{DerivativesDir, SubjectSession, TemplateAssets, WorkDir};
use crate::transform::{Affine, TransformChain};

/// 某模态裁剪后的结果.
#[derive(Clone, Debug)]
pub struct Cropped {
    /// 裁剪后的扫描.
    pub volume: PathBuf,

    /// crop->full 变换.
    pub crop_to_full: Affine,
}

/// 某模态配准到模板空间后的结果.
#[derive(Clone, Debug)]
pub struct Registered {
    /// 模板空间中的扫描.
    pub volume: PathBuf,

    /// 由原生 (平均后, 未裁剪) 空间到模板空间的变换链.
    pub chain: TransformChain,

    /// 组合矩阵文件.
    pub matrix: PathBuf,
}

/// 单次运行的上下文. 每个阶段从这里读取上一阶段的产出, 并写回自己的产出.
///
/// 所有产出都是磁盘路径; 读取一个尚未产生的产出会得到组合错误.
#[derive(Debug)]
pub struct Context {
    /// 被试标识.
    pub id: SubjectSession,

    /// 原始解剖输入目录.
    pub anat_dir: PathBuf,

    /// 工作目录.
    pub work: WorkDir,

    /// derivatives 目录.
    pub derivatives: DerivativesDir,

    /// 模板资源.
    pub assets: TemplateAssets,

    /// 模态可用性.
    pub availability: Availability,

    /// 选中的模板月龄.
    pub template_age: u32,

    /// 是否覆盖已存在的 derivatives.
    pub overwrite: bool,

    stage: Option<Stage>,
    averaged: BTreeMap<Modality, PathBuf>,
    cropped: BTreeMap<Modality, Cropped>,
    registered: BTreeMap<Modality, Registered>,
    segmentation: Option<PathBuf>,
    lr_mask: Option<PathBuf>,
    corrected: Option<PathBuf>,
    native: BTreeMap<Modality, PathBuf>,
    masks: BTreeMap<Modality, PathBuf>,
}

fn require<'a, T>(map: &'a BTreeMap<Modality, T>, m: Modality, what: &str) -> PipelineResult<&'a T> {
    map.get(&m).ok_or_else(|| {
        PipelineError::Composition(format!("{what} for {m} was never produced"))
    })
}

fn require_one<'a>(p: &'a Option<PathBuf>, what: &str) -> PipelineResult<&'a Path> {
    p.as_deref()
        .ok_or_else(|| PipelineError::Composition(format!("{what} was never produced")))
}

impl Context {
    /// 创建上下文. 尚未进入任何阶段.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: SubjectSession,
        anat_dir: PathBuf,
        work: WorkDir,
        derivatives: DerivativesDir,
        assets: TemplateAssets,
        availability: Availability,
        template_age: u32,
        overwrite: bool,
    ) -> Self {
        Self {
            id,
            anat_dir,
            work,
            derivatives,
            assets,
            availability,
            template_age,
            overwrite,
            stage: None,
            averaged: BTreeMap::new(),
            cropped: BTreeMap::new(),
            registered: BTreeMap::new(),
            segmentation: None,
            lr_mask: None,
            corrected: None,
            native: BTreeMap::new(),
            masks: BTreeMap::new(),
        }
    }

    /// 按 slot 顺序排列的所需模态.
    #[inline]
    pub fn modalities(&self) -> &'static [Modality] {
        self.availability.set.modalities()
    }

    /// 最近进入的阶段.
    #[inline]
    pub fn stage(&self) -> Option<Stage> {
        self.stage
    }

    /// 进入阶段 `next`. 只有当前阶段恰好是 `next` 的前驱时才成功, 否则返回组合错误.
    pub fn enter(&mut self, next: Stage) -> PipelineResult<()> {
        if self.stage != next.predecessor() {
            return Err(PipelineError::Composition(format!(
                "stage {next} cannot run after {}",
                self.stage
                    .map_or_else(|| "start".to_string(), |s| s.to_string())
            )));
        }
        info!("{}: {next}", self.id);
        self.stage = Some(next);
        Ok(())
    }

    /// 创建工作目录.
    pub fn create_dirs(&self) -> PipelineResult<()> {
        for d in self.work.dirs() {
            fs::create_dir_all(&d).map_err(PipelineError::io(&d))?;
        }
        Ok(())
    }

    /// 平均后的扫描.
    pub fn averaged(&self, m: Modality) -> PipelineResult<&Path> {
        require(&self.averaged, m, "averaged volume").map(PathBuf::as_path)
    }

    /// 记录平均结果.
    pub fn set_averaged(&mut self, m: Modality, p: PathBuf) {
        self.averaged.insert(m, p);
    }

    /// 裁剪结果.
    pub fn cropped(&self, m: Modality) -> PipelineResult<&Cropped> {
        require(&self.cropped, m, "cropped volume")
    }

    /// 记录裁剪结果.
    pub fn set_cropped(&mut self, m: Modality, c: Cropped) {
        self.cropped.insert(m, c);
    }

    /// 配准结果.
    pub fn registered(&self, m: Modality) -> PipelineResult<&Registered> {
        require(&self.registered, m, "template-space registration")
    }

    /// 记录配准结果.
    pub fn set_registered(&mut self, m: Modality, r: Registered) {
        self.registered.insert(m, r);
    }

    /// 推理得到的 (模板空间) 分割.
    pub fn segmentation(&self) -> PipelineResult<&Path> {
        require_one(&self.segmentation, "segmentation")
    }

    /// 记录推理分割.
    pub fn set_segmentation(&mut self, p: PathBuf) {
        self.segmentation = Some(p);
    }

    /// 膨胀后的左右半球掩膜.
    pub fn lr_mask(&self) -> PipelineResult<&Path> {
        require_one(&self.lr_mask, "left/right mask")
    }

    /// 记录左右半球掩膜.
    pub fn set_lr_mask(&mut self, p: PathBuf) {
        self.lr_mask = Some(p);
    }

    /// 左右校正后的分割.
    pub fn corrected(&self) -> PipelineResult<&Path> {
        require_one(&self.corrected, "chirality-corrected segmentation")
    }

    /// 记录左右校正后的分割.
    pub fn set_corrected(&mut self, p: PathBuf) {
        self.corrected = Some(p);
    }

    /// 原生空间分割.
    pub fn native(&self, m: Modality) -> PipelineResult<&Path> {
        require(&self.native, m, "native-space segmentation").map(PathBuf::as_path)
    }

    /// 记录原生空间分割.
    pub fn set_native(&mut self, m: Modality, p: PathBuf) {
        self.native.insert(m, p);
    }

    /// 原生空间脑掩膜.
    pub fn mask(&self, m: Modality) -> PipelineResult<&Path> {
        require(&self.masks, m, "brain mask").map(PathBuf::as_path)
    }

    /// 记录原生空间脑掩膜.
    pub fn set_mask(&mut self, m: Modality, p: PathBuf) {
        self.masks.insert(m, p);
    }
}
