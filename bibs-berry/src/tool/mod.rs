//! 外部工具接口.
//!
//! 仿射估计, 重采样, 视野裁剪, 左右半球标记与推理都委托给外部程序.
//! 流水线只通过 [`Toolbox`] 使用它们, 因而各阶段可以在测试中换成假实现.

use std::path::{Path, PathBuf};

mod external;

pub use external::ExternalTools;

/// 重采样插值方式.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Interp {
    /// 三线性插值, 用于强度图像.
    Trilinear,

    /// 最近邻插值, 用于标签与掩膜.
    NearestNeighbour,
}

impl Interp {
    /// FSL `flirt -interp` 参数值.
    pub const fn flirt_name(self) -> &'static str {
        match self {
            Self::Trilinear => "trilinear",
            Self::NearestNeighbour => "nearestneighbour",
        }
    }
}

/// 视野裁剪请求.
#[derive(Clone, Debug)]
pub struct CropRequest<'a> {
    /// 输入扫描.
    pub input: &'a Path,

    /// 裁剪后的扫描.
    pub output: &'a Path,

    /// 输出的 crop->full 矩阵.
    pub crop_to_full: &'a Path,
}

/// 仿射估计请求.
#[derive(Clone, Debug)]
pub struct EstimateRequest<'a> {
    /// 浮动图像.
    pub moving: &'a Path,

    /// 参考图像.
    pub reference: &'a Path,

    /// 初始变换.
    pub init: &'a Path,

    /// 自由度: 12 为完整仿射, 6 为刚体.
    pub dof: u8,

    /// 输出矩阵.
    pub out_matrix: &'a Path,

    /// 可选的输出重采样图像.
    pub out_volume: Option<&'a Path>,
}

/// 仿射应用 (重采样) 请求.
#[derive(Clone, Debug)]
pub struct ApplyRequest<'a> {
    /// 输入图像.
    pub input: &'a Path,

    /// 参考图像, 决定输出网格.
    pub reference: &'a Path,

    /// 应用的矩阵.
    pub matrix: &'a Path,

    /// 输出图像.
    pub output: &'a Path,

    /// 插值方式.
    pub interp: Interp,
}

/// 左右半球标记请求: 把模板配准到被试, 再把模板上的左右掩膜搬到被试网格上.
#[derive(Clone, Debug)]
pub struct LrRequest<'a> {
    /// 被试图像 (固定图像).
    pub subject: &'a Path,

    /// 月龄模板 (浮动图像).
    pub template: &'a Path,

    /// 模板上的左右掩膜.
    pub template_mask: &'a Path,

    /// 配准中间文件前缀.
    pub prefix: &'a Path,

    /// 被试网格上的左右掩膜.
    pub output: &'a Path,
}

/// 推理请求.
#[derive(Clone, Debug)]
pub struct PredictRequest<'a> {
    /// 按 slot 命名的输入目录.
    pub input_dir: &'a Path,

    /// 输出目录.
    pub output_dir: &'a Path,

    /// 任务号.
    pub task: u32,

    /// 模型名.
    pub model: &'a str,
}

/// 流水线使用的外部工具集.
///
/// 每个方法都同步阻塞直到工具结束. 除 [`Toolbox::predict`] 外,
/// 工具非零退出或没有产生期望的文件都应当返回外部工具错误.
pub trait Toolbox {
    /// 裁剪头部周围的无关视野.
    fn crop_fov(&self, req: &CropRequest<'_>) -> crate::PipelineResult<()>;

    /// 估计 `moving` 到 `reference` 的仿射变换.
    fn estimate_affine(&self, req: &EstimateRequest<'_>) -> crate::PipelineResult<()>;

    /// 以参考图像的网格重采样输入图像.
    fn apply_affine(&self, req: &ApplyRequest<'_>) -> crate::PipelineResult<()>;

    /// 得到被试网格上的左右半球掩膜.
    fn label_left_right(&self, req: &LrRequest<'_>) -> crate::PipelineResult<()>;

    /// 运行推理. 是否产生了输出由调用方检查.
    fn predict(&self, req: &PredictRequest<'_>) -> crate::PipelineResult<()>;
}

/// 构造 `prefix` 加后缀的路径, 用于工具按前缀生成的文件.
pub(crate) fn with_suffix(prefix: &Path, suffix: &str) -> PathBuf {
    let mut s = prefix.as_os_str().to_owned();
    s.push(suffix);
    PathBuf::from(s)
}
