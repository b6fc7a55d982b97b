//! 有名仿射变换链.

use itertools::Itertools;

use super::Affine;
use crate::error::{PipelineError, PipelineResult};

/// 带名字的仿射变换, 名字形如 `full_to_crop`, 用于诊断信息.
#[derive(Clone, Debug, PartialEq)]
pub struct NamedAffine {
    /// 变换名.
    pub name: String,

    /// 变换矩阵.
    pub affine: Affine,
}

/// 按应用顺序排列的仿射变换链.
///
/// 第一个元素最先被应用. 组合后的矩阵为 `M_n * ... * M_2 * M_1`.
/// 反向 (还原到原生空间) 必须使用 [`TransformChain::inverse`],
/// 即恰好是该链组合矩阵的逆, 而不是重新估计的变换.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TransformChain {
    steps: Vec<NamedAffine>,
}

impl TransformChain {
    /// 空链.
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// 在链尾追加一个变换 (最后应用).
    pub fn push<S: Into<String>>(&mut self, name: S, affine: Affine) -> &mut Self {
        self.steps.push(NamedAffine {
            name: name.into(),
            affine,
        });
        self
    }

    /// 链式构造版本的 [`TransformChain::push`].
    #[inline]
    pub fn with<S: Into<String>>(mut self, name: S, affine: Affine) -> Self {
        self.push(name, affine);
        self
    }

    /// 变换个数.
    #[inline]
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// 是否为空链?
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// 按应用顺序迭代所有变换.
    #[inline]
    pub fn iter(&self) -> impl ExactSizeIterator<Item = &NamedAffine> {
        self.steps.iter()
    }

    /// 按名字获取变换. 不存在时返回组合错误.
    pub fn get(&self, name: &str) -> PipelineResult<&Affine> {
        self.steps
            .iter()
            .find(|s| s.name == name)
            .map(|s| &s.affine)
            .ok_or_else(|| {
                PipelineError::Composition(format!(
                    "transform `{name}` was never produced (chain: [{}])",
                    self.describe()
                ))
            })
    }

    /// 将整条链组合为单个矩阵. 空链没有意义, 返回组合错误.
    pub fn compose(&self) -> PipelineResult<Affine> {
        if self.steps.is_empty() {
            return Err(PipelineError::Composition(
                "cannot compose an empty transform chain".to_string(),
            ));
        }
        Ok(self
            .steps
            .iter()
            .fold(Affine::identity(), |acc, s| acc.then(&s.affine)))
    }

    /// 组合矩阵的逆. 组合矩阵奇异时返回组合错误.
    pub fn inverse(&self) -> PipelineResult<Affine> {
        self.compose()?.inverse().ok_or_else(|| {
            PipelineError::Composition(format!(
                "composed transform [{}] is singular",
                self.describe()
            ))
        })
    }

    /// 形如 `a -> b -> c` 的链描述.
    pub fn describe(&self) -> String {
        self.steps.iter().map(|s| s.name.as_str()).join(" -> ")
    }
}
