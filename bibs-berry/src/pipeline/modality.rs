//! 模态与模态可用性.

use std::fmt;

use crate::consts::T2_REFERENCE_AGE_LIMIT;
use crate::error::{PipelineError, PipelineResult};

/// MRI 对比模态.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Modality {
    /// T1 加权.
    T1w,

    /// T2 加权.
    T2w,
}

impl Modality {
    /// 文件名中的模态标记.
    #[inline]
    pub const fn tag(self) -> &'static str {
        match self {
            Self::T1w => "T1w",
            Self::T2w => "T2w",
        }
    }
}

impl fmt::Display for Modality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// 一次运行所需的模态组合. 在运行开始时确定, 之后不再改变.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum ModalitySet {
    /// 只有 T1w.
    T1Only,

    /// 只有 T2w.
    T2Only,

    /// T1w 和 T2w 都有.
    T1AndT2,
}

impl ModalitySet {
    /// 由两个标记确定组合. 两者都为假时没有意义, 返回配置错误.
    pub fn from_flags(t1w: bool, t2w: bool) -> PipelineResult<Self> {
        match (t1w, t2w) {
            (true, true) => Ok(Self::T1AndT2),
            (true, false) => Ok(Self::T1Only),
            (false, true) => Ok(Self::T2Only),
            (false, false) => Err(PipelineError::Configuration(
                "neither T1w nor T2w is required".to_string(),
            )),
        }
    }

    /// 是否需要两种模态 (走 ACPC 双模态配准路径)?
    #[inline]
    pub const fn is_dual(self) -> bool {
        matches!(self, Self::T1AndT2)
    }

    /// 按推理输入 slot 顺序排列的模态.
    pub fn modalities(self) -> &'static [Modality] {
        match self {
            Self::T1Only => &[Modality::T1w],
            Self::T2Only => &[Modality::T2w],
            Self::T1AndT2 => &[Modality::T1w, Modality::T2w],
        }
    }

    /// 模态 `m` 在推理输入中的 slot. 唯一的模态总是 slot 0.
    pub fn slot(self, m: Modality) -> Option<usize> {
        self.modalities().iter().position(|&x| x == m)
    }
}

/// 模态可用性记录: 模态组合与被试月龄.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Availability {
    /// 模态组合.
    pub set: ModalitySet,

    /// 被试月龄.
    pub age_months: u32,
}

impl Availability {
    /// 创建记录.
    #[inline]
    pub const fn new(set: ModalitySet, age_months: u32) -> Self {
        Self { set, age_months }
    }

    /// 左右半球判定使用的参考模态.
    ///
    /// 双模态且月龄小于 22 时使用 T2w, 否则使用 T1w; 单模态时使用唯一的模态.
    pub const fn lr_reference(&self) -> Modality {
        match self.set {
            ModalitySet::T1Only => Modality::T1w,
            ModalitySet::T2Only => Modality::T2w,
            ModalitySet::T1AndT2 if self.age_months < T2_REFERENCE_AGE_LIMIT => Modality::T2w,
            ModalitySet::T1AndT2 => Modality::T1w,
        }
    }
}
