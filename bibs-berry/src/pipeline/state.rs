//! 阶段状态机.

use std::fmt;

/// 流水线阶段. 每个阶段只能紧接在它的前驱之后进入.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Stage {
    /// 各模态已平均.
    Averaged,

    /// 各模态已裁剪.
    Cropped,

    /// 各模态已配准到模板空间, 并复制到推理输入目录.
    Registered,

    /// 推理已产生分割.
    Segmented,

    /// 已得到 (膨胀后的) 左右半球掩膜.
    Disambiguated,

    /// 分割已完成左右校正.
    ChiralityCorrected,

    /// 分割已还原到各模态的原生空间.
    NativeSpace,

    /// 已由原生空间分割得到脑掩膜.
    Masked,

    /// 结果已写入 derivatives 目录.
    DerivativesWritten,
}

impl Stage {
    /// 全部阶段, 按执行顺序排列.
    pub const ALL: [Stage; 9] = [
        Stage::Averaged,
        Stage::Cropped,
        Stage::Registered,
        Stage::Segmented,
        Stage::Disambiguated,
        Stage::ChiralityCorrected,
        Stage::NativeSpace,
        Stage::Masked,
        Stage::DerivativesWritten,
    ];

    /// 前驱阶段. 第一个阶段没有前驱.
    pub fn predecessor(self) -> Option<Stage> {
        let i = Self::ALL.iter().position(|&s| s == self)?;
        i.checked_sub(1).map(|j| Self::ALL[j])
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}
