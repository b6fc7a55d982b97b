#![warn(missing_docs)] // <= 合适时移除它.
// #![warn(clippy::missing_docs_in_private_items)]  // <= too strict.

//! 核心库. 婴儿脑 MRI (T1w / T2w) 分割的前处理与后处理流水线.
//!
//! 该 crate 负责决定 *做哪些* 几何变换, *以什么顺序* 做, 以及如何 *组合* 与 *求逆*.
//! 仿射估计, 重采样, 视野裁剪, 左右半球配准与推理本身都委托给外部工具 (FSL, ANTs, nnU-Net).
//!
//! # 注意
//!
//! 1. 每个阶段只从磁盘读取输入, 并把输出写入新的路径. 阶段之间不共享内存中的体数据.
//! 2. 任何阶段失败对本次运行都是致命的, 不会自动重试. 中间结果保留在工作目录中.
//!
//! # 开发计划
//!
//! ### 体数据读写与 voxel-to-world 仿射 ✅
//!
//! 实现位于 `bibs-berry/src/data`.
//!
//! ### 仿射变换链的组合与求逆 ✅
//!
//! 以 FSL `.mat` 格式持久化, 可以脱离图像 I/O 单独测试.
//!
//! 实现位于 `bibs-berry/src/transform`.
//!
//! ### 平均, 裁剪, 单模态 / 双模态 (ACPC) 配准 ✅
//!
//! 实现位于 `bibs-berry/src/stage`.
//!
//! ### 左右半球掩膜膨胀与左右标签校正 ✅
//!
//! 膨胀实现位于 `bibs-berry/src/data/morph_3d.rs`,
//! 标签校正实现位于 `bibs-berry/src/stage/chirality.rs`.
//!
//! ### 还原到原生空间, 脑掩膜与 derivatives ✅
//!
//! 还原只使用正向变换链组合矩阵的逆, 只重采样一次.
//!
//! ### 按被试并行的批处理 ⌛️
//!
//! 各被试的运行独占工作目录, 目前由调用方自行并行.

/// 三维索引, 同时也可一定程度上用作非负整数向量.
pub type Idx3d = (usize, usize, usize);

/// 3D MRI nii 文件基础数据结构.
pub mod data;

pub use data::{MriLabel, MriMask, MriScan, NiftiHeaderAttr};

pub mod consts;
pub mod error;

pub use error::{PipelineError, PipelineResult};

pub mod layout;
pub mod pipeline;
pub mod requirements;
pub mod stage;
pub mod tool;
pub mod transform;

pub mod prelude;

#[cfg(test)]
pub(crate) mod testing;
