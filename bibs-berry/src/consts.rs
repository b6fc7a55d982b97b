//! 通用常量.

/// 单通道标签值.
pub mod label {
    /// 分割结果中背景的体素值.
    pub const BACKGROUND: u16 = 0;

    /// 二值脑掩膜中前景的体素值.
    pub const MASK_FOREGROUND: u8 = 1;

    /// 二值脑掩膜中背景的体素值.
    pub const MASK_BACKGROUND: u8 = 0;

    /// 左右半球掩膜中, 背景的体素值.
    pub const LR_BACKGROUND: u8 = 0;

    /// 左右半球掩膜中, 左半球的体素值.
    pub const LR_LEFT: u8 = 1;

    /// 左右半球掩膜中, 右半球的体素值.
    pub const LR_RIGHT: u8 = 2;

    /// 左右半球掩膜中, 中线 (左右交界, 无法判定) 的体素值.
    /// 该值只由膨胀操作产生.
    pub const LR_MIDLINE: u8 = 3;

    /// 体素是否是分割背景?
    #[inline]
    pub const fn is_background(p: u16) -> bool {
        p == BACKGROUND
    }
}

/// 文件命名约定.
pub mod naming {
    /// nifti 压缩文件扩展名.
    pub const NII_GZ: &str = ".nii.gz";

    /// derivatives 中分割结果的后缀.
    pub const ASEG_SUFFIX: &str = "aseg_dseg";

    /// derivatives 中脑掩膜的后缀.
    pub const MASK_SUFFIX: &str = "brain_mask";

    /// derivatives 流水线目录名.
    pub const PIPELINE_NAME: &str = "bibsnet";

    /// 数据集描述文件名.
    pub const DATASET_DESCRIPTION: &str = "dataset_description.json";

    /// 单位阵变换文件名.
    pub const IDENTITY_MAT: &str = "identity_matrix.mat";
}

/// 默认 nnU-Net 任务号.
pub const DEFAULT_TASK: u32 = 512;

/// 默认 nnU-Net 模型名.
pub const DEFAULT_MODEL: &str = "3d_fullres";

/// 双模态情况下, 年龄 (月) 小于该值时以 T2w 作为左右半球判定的参考模态.
pub const T2_REFERENCE_AGE_LIMIT: u32 = 22;

/// 左右半球掩膜的膨胀半径 (钻石型结构元, 以体素为单位).
pub const LR_MASK_DILATION_RADIUS: usize = 2;

/// 仿射变换相关比较的默认数值容差.
pub const AFFINE_TOLERANCE: f64 = 1e-6;
