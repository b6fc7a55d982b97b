//! 左右半球标签校正.
//!
//! 分割中每个带半球属性的标签 (如 `Left-Cerebral-White-Matter`) 都有另一侧的对应标签.
//! 若膨胀后的左右掩膜表明某体素位于另一侧半球, 则把它的标签换成对应标签.
//! 掩膜为背景或中线的体素, 以及无半球属性的标签都保持不变.
//! 校正只改标签, 不改变几何.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use log::info;
use ndarray::Zip;
use once_cell::sync::Lazy;

use crate::consts::label::*;
use crate::consts::naming::NII_GZ;
use crate::error::{PipelineError, PipelineResult};
use crate::pipeline::{Context, Stage};
use crate::{MriLabel, MriMask, NiftiHeaderAttr};

/// 半球.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Hemisphere {
    /// 左半球.
    Left,

    /// 右半球.
    Right,
}

impl Hemisphere {
    /// 左右掩膜体素对应的半球. 背景与中线没有确定的半球.
    #[inline]
    pub const fn from_mask(v: u8) -> Option<Self> {
        match v {
            LR_LEFT => Some(Self::Left),
            LR_RIGHT => Some(Self::Right),
            _ => None,
        }
    }
}

/// FreeSurfer aseg 中的左右标签对 (左, 右).
const FREESURFER_PAIRS: [(u16, u16); 16] = [
    (2, 41),  // Cerebral-White-Matter
    (3, 42),  // Cerebral-Cortex
    (4, 43),  // Lateral-Ventricle
    (5, 44),  // Inf-Lat-Vent
    (7, 46),  // Cerebellum-White-Matter
    (8, 47),  // Cerebellum-Cortex
    (10, 49), // Thalamus
    (11, 50), // Caudate
    (12, 51), // Putamen
    (13, 52), // Pallidum
    (17, 53), // Hippocampus
    (18, 54), // Amygdala
    (26, 58), // Accumbens-area
    (28, 60), // VentralDC
    (30, 62), // vessel
    (31, 63), // choroid-plexus
];

static FREESURFER: Lazy<ChiralityTable> =
    Lazy::new(|| ChiralityTable::from_pairs(FREESURFER_PAIRS.iter().copied()));

/// 标签 -> (所属半球, 另一侧对应标签).
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ChiralityTable {
    labels: HashMap<u16, (Hemisphere, u16)>,
}

impl ChiralityTable {
    /// 由 (左, 右) 标签对构造.
    pub fn from_pairs<I: IntoIterator<Item = (u16, u16)>>(pairs: I) -> Self {
        let mut labels = HashMap::new();
        for (l, r) in pairs {
            labels.insert(l, (Hemisphere::Left, r));
            labels.insert(r, (Hemisphere::Right, l));
        }
        Self { labels }
    }

    /// 内置的 FreeSurfer aseg 标签对.
    pub fn freesurfer() -> &'static ChiralityTable {
        &FREESURFER
    }

    /// 解析 FreeSurfer 颜色表 (`id name r g b a`), 把 `Left-X` 与 `Right-X` 配对.
    ///
    /// 空行与 `#` 开头的注释行被忽略. 没有得到任何配对时返回配置错误.
    pub fn parse_lut(text: &str) -> PipelineResult<Self> {
        let mut left = HashMap::new();
        let mut right = HashMap::new();
        for line in text.lines().map(str::trim) {
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let mut cols = line.split_whitespace();
            let (Some(id), Some(name)) = (cols.next(), cols.next()) else {
                continue;
            };
            let Ok(id) = id.parse::<u16>() else {
                continue;
            };
            if let Some(rest) = name.strip_prefix("Left-") {
                left.insert(rest.to_string(), id);
            } else if let Some(rest) = name.strip_prefix("Right-") {
                right.insert(rest.to_string(), id);
            }
        }

        let table = Self::from_pairs(
            left.iter()
                .filter_map(|(name, &l)| right.get(name).map(|&r| (l, r))),
        );
        if table.is_empty() {
            return Err(PipelineError::Configuration(
                "colour table contains no Left-*/Right-* label pairs".to_string(),
            ));
        }
        Ok(table)
    }

    /// 读取 FreeSurfer 颜色表文件.
    pub fn open_lut<P: AsRef<Path>>(path: P) -> PipelineResult<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(PipelineError::io(path))?;
        Self::parse_lut(&text).map_err(|e| {
            PipelineError::Configuration(format!("{}: {e}", path.display()))
        })
    }

    /// 有半球属性的标签个数.
    #[inline]
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    /// 是否没有任何标签?
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// 位于掩膜值为 `mask` 处的 `label` 应当被换成的标签. 不需要交换时返回 `None`.
    #[inline]
    pub fn swapped(&self, label: u16, mask: u8) -> Option<u16> {
        let actual = Hemisphere::from_mask(mask)?;
        match self.labels.get(&label) {
            Some(&(h, counterpart)) if h != actual => Some(counterpart),
            _ => None,
        }
    }
}

/// 按左右掩膜原地校正分割, 返回被换掉标签的体素个数.
///
/// `seg` 与 `mask` 形状必须相同, 否则返回组合错误.
pub fn correct(seg: &mut MriLabel, mask: &MriMask, table: &ChiralityTable) -> PipelineResult<usize> {
    if seg.shape() != mask.shape() {
        return Err(PipelineError::Composition(format!(
            "left/right mask of shape {:?} does not match segmentation of shape {:?}",
            mask.shape(),
            seg.shape()
        )));
    }
    let mut swapped = 0usize;
    Zip::from(seg.data_mut())
        .and(mask.data())
        .for_each(|label, &side| {
            if let Some(new) = table.swapped(*label, side) {
                *label = new;
                swapped += 1;
            }
        });
    Ok(swapped)
}

/// 对推理得到的分割做左右校正.
pub fn run(ctx: &mut Context, table: &ChiralityTable) -> PipelineResult<()> {
    ctx.enter(Stage::ChiralityCorrected)?;
    let mut seg = MriLabel::open(ctx.segmentation()?)?;
    let mask = MriMask::open(ctx.lr_mask()?)?;
    let swapped = correct(&mut seg, &mask, table)?;

    let output = ctx.work.post(&format!("aseg_chirality_corrected{NII_GZ}"));
    seg.save(&output)?;
    info!("chirality correction relabelled {swapped} voxel(s)");
    ctx.set_corrected(output);
    Ok(())
}
