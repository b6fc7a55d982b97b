//! 仿射变换代数.
//!
//! 变换以 FSL `.mat` 文本格式 (4 行, 每行 4 个以空白分隔的浮点数) 持久化.
//! 组合与求逆都在进程内完成, 因而可以脱离任何图像 I/O 单独测试.
//! 变换的 *应用* (重采样) 则委托给外部工具, 见 [`crate::tool`].

use std::fmt;
use std::fs;
use std::path::Path;

use itertools::Itertools;
use nalgebra::{Matrix4, Point3};
use thiserror::Error;

use crate::consts::AFFINE_TOLERANCE;
use crate::error::{PipelineError, PipelineResult};

mod chain;

pub use chain::{NamedAffine, TransformChain};

/// 4×4 仿射矩阵.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Affine(Matrix4<f64>);

impl Affine {
    /// 单位阵.
    #[inline]
    pub fn identity() -> Self {
        Self(Matrix4::identity())
    }

    /// 由行优先的 16 个元素创建.
    #[inline]
    pub fn from_row_slice(rows: &[f64; 16]) -> Self {
        Self(Matrix4::from_row_slice(rows))
    }

    /// 平移变换.
    #[inline]
    pub fn translation(x: f64, y: f64, z: f64) -> Self {
        Self(Matrix4::new_translation(&nalgebra::Vector3::new(x, y, z)))
    }

    /// 底层矩阵.
    #[inline]
    pub fn matrix(&self) -> &Matrix4<f64> {
        &self.0
    }

    /// 先应用 `self`, 再应用 `next` 的组合变换, 即 `next * self`.
    #[inline]
    pub fn then(&self, next: &Affine) -> Affine {
        Affine(next.0 * self.0)
    }

    /// 逆变换. 矩阵奇异时返回 `None`.
    #[inline]
    pub fn inverse(&self) -> Option<Affine> {
        self.0.try_inverse().map(Affine)
    }

    /// 最后一行是否为 `[0, 0, 0, 1]`?
    pub fn is_affine(&self) -> bool {
        let row = self.0.row(3);
        row[0].abs() < AFFINE_TOLERANCE
            && row[1].abs() < AFFINE_TOLERANCE
            && row[2].abs() < AFFINE_TOLERANCE
            && (row[3] - 1.0).abs() < AFFINE_TOLERANCE
    }

    /// 对单个点应用该变换.
    #[inline]
    pub fn apply_point(&self, p: &Point3<f64>) -> Point3<f64> {
        self.0.transform_point(p)
    }

    /// 两个变换在 `tol` 内是否一致?
    #[inline]
    pub fn approx_eq(&self, other: &Affine, tol: f64) -> bool {
        (self.0 - other.0).amax() <= tol
    }

    /// 解析 FSL `.mat` 文本.
    pub fn parse(text: &str) -> Result<Affine, ParseAffineError> {
        let values: Vec<f64> = text
            .split_whitespace()
            .map(|tok| {
                tok.parse::<f64>()
                    .map_err(|_| ParseAffineError::BadNumber(tok.to_string()))
            })
            .collect::<Result<_, _>>()?;
        let rows: [f64; 16] = values
            .as_slice()
            .try_into()
            .map_err(|_| ParseAffineError::WrongCount(values.len()))?;
        let ans = Affine::from_row_slice(&rows);
        if ans.is_affine() {
            Ok(ans)
        } else {
            Err(ParseAffineError::NotAffine)
        }
    }

    /// 从 `path` 读取 FSL `.mat` 文件.
    pub fn load<P: AsRef<Path>>(path: P) -> PipelineResult<Affine> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(PipelineError::io(path))?;
        Affine::parse(&text).map_err(|e| {
            PipelineError::Composition(format!("invalid matrix file {}: {e}", path.display()))
        })
    }

    /// 以 FSL `.mat` 格式写入 `path`.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> PipelineResult<()> {
        let path = path.as_ref();
        fs::write(path, self.to_string()).map_err(PipelineError::io(path))
    }
}

impl Default for Affine {
    #[inline]
    fn default() -> Self {
        Self::identity()
    }
}

impl fmt::Display for Affine {
    /// FSL `.mat` 格式: 每行 4 个数, 两个空格分隔.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for r in 0..4 {
            let line = (0..4).map(|c| format!("{:.10}", self.0[(r, c)])).join("  ");
            writeln!(f, "{line}  ")?;
        }
        Ok(())
    }
}

/// 解析 `.mat` 文本错误.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ParseAffineError {
    /// 非法数字.
    #[error("`{0}` is not a number")]
    BadNumber(String),

    /// 数字个数不是 16.
    #[error("expected 16 numbers, found {0}")]
    WrongCount(usize),

    /// 最后一行不是 `[0, 0, 0, 1]`.
    #[error("last row is not [0 0 0 1]")]
    NotAffine,
}
