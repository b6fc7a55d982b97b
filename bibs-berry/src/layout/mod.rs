//! 磁盘布局: 被试标识, 工作目录, derivatives 目录与模板资源目录.
//!
//! 所有路径都由被试标识确定性地构造. 每个阶段只从磁盘读取输入,
//! 并把输出写入新的路径, 因此这里只负责 "命名", 不负责内容.

use std::env;
use std::fmt;
use std::path::{Path, PathBuf};

use crate::consts::naming::*;
use crate::pipeline::Modality;

mod assets;

pub use assets::TemplateAssets;

/// 被试-会话标识. 只用于构造输出路径, 构造后不可变.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SubjectSession {
    subject: String,
    session: Option<String>,
}

impl SubjectSession {
    /// 创建标识. `sub-` / `ses-` 前缀可有可无.
    pub fn new<S: AsRef<str>>(subject: S, session: Option<S>) -> Self {
        fn strip(s: &str, prefix: &str) -> String {
            s.strip_prefix(prefix).unwrap_or(s).to_string()
        }
        Self {
            subject: strip(subject.as_ref(), "sub-"),
            session: session.map(|s| strip(s.as_ref(), "ses-")),
        }
    }

    /// 不带前缀的被试名.
    #[inline]
    pub fn subject(&self) -> &str {
        &self.subject
    }

    /// 不带前缀的会话名.
    #[inline]
    pub fn session(&self) -> Option<&str> {
        self.session.as_deref()
    }

    /// 文件名前缀, 形如 `sub-01_ses-A`.
    pub fn prefix(&self) -> String {
        match &self.session {
            Some(ses) => format!("sub-{}_ses-{}", self.subject, ses),
            None => format!("sub-{}", self.subject),
        }
    }

    /// 相对目录, 形如 `sub-01/ses-A`.
    pub fn rel_dir(&self) -> PathBuf {
        let mut ans = PathBuf::from(format!("sub-{}", self.subject));
        if let Some(ses) = &self.session {
            ans.push(format!("ses-{ses}"));
        }
        ans
    }
}

impl fmt::Display for SubjectSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.prefix())
    }
}

/// 获取默认的临时工作目录 `{tmp}/bibsnet`.
///
/// 只有位于该路径的工作目录才会在成功运行后被删除.
pub fn default_scratch_dir() -> PathBuf {
    env::temp_dir().join(PIPELINE_NAME)
}

/// 获取模板资源目录.
///
/// 1. 若环境变量 `$BIBSNET_DATA_DIR` 非空, 则返回其值;
/// 2. 否则, 返回 `$HOME/bibsnet/data`.
pub fn asset_dir_from_env_or_home() -> Option<PathBuf> {
    match env::var("BIBSNET_DATA_DIR") {
        Ok(d) if !d.is_empty() => Some(PathBuf::from(d)),
        _ => home_dir_with([PIPELINE_NAME, "data"]),
    }
}

/// 获取 `{用户主目录}` 下给定继续项组成的全路径.
pub fn home_dir_with<P: AsRef<Path>, I: IntoIterator<Item = P>>(it: I) -> Option<PathBuf> {
    let mut ans = dirs::home_dir()?;
    ans.extend(it);
    Some(ans)
}

/// 单个被试-会话独占的工作目录.
///
/// 目录结构:
///
/// ```text
/// {root}/{sub}/{ses}/
///     prebibsnet/averaged/    平均后的各模态扫描
///     prebibsnet/cropped/     裁剪后的扫描与 crop->full 矩阵
///     prebibsnet/registered/  配准中间结果与组合矩阵
///     bibsnet/input/          推理输入 (slot 命名)
///     bibsnet/output/         推理输出
///     postbibsnet/            左右掩膜, 校正后分割, 原生空间结果
/// ```
#[derive(Clone, Debug)]
pub struct WorkDir {
    root: PathBuf,
    base: PathBuf,
    prefix: String,
}

impl WorkDir {
    /// 以 `root` 为根目录创建被试工作目录描述. 不会触碰文件系统.
    pub fn new<P: AsRef<Path>>(root: P, id: &SubjectSession) -> Self {
        let root = root.as_ref().to_owned();
        let base = root.join(id.rel_dir());
        Self {
            root,
            base,
            prefix: id.prefix(),
        }
    }

    /// 工作目录根.
    #[inline]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// 该被试的工作目录.
    #[inline]
    pub fn base(&self) -> &Path {
        &self.base
    }

    /// 根目录是否是默认临时目录?
    pub fn is_default_scratch(&self) -> bool {
        self.root == default_scratch_dir()
    }

    /// 需要预先创建的全部子目录.
    pub fn dirs(&self) -> [PathBuf; 6] {
        [
            self.averaged_dir(),
            self.cropped_dir(),
            self.registered_dir(),
            self.inference_input_dir(),
            self.inference_output_dir(),
            self.post_dir(),
        ]
    }

    fn pre_dir(&self) -> PathBuf {
        self.base.join("prebibsnet")
    }

    /// 平均结果目录.
    pub fn averaged_dir(&self) -> PathBuf {
        self.pre_dir().join("averaged")
    }

    /// 裁剪结果目录.
    pub fn cropped_dir(&self) -> PathBuf {
        self.pre_dir().join("cropped")
    }

    /// 配准结果目录.
    pub fn registered_dir(&self) -> PathBuf {
        self.pre_dir().join("registered")
    }

    /// 推理输入目录.
    pub fn inference_input_dir(&self) -> PathBuf {
        self.base.join("bibsnet").join("input")
    }

    /// 推理输出目录.
    pub fn inference_output_dir(&self) -> PathBuf {
        self.base.join("bibsnet").join("output")
    }

    /// 后处理目录.
    pub fn post_dir(&self) -> PathBuf {
        self.base.join("postbibsnet")
    }

    /// 单位阵矩阵文件.
    pub fn identity_mat(&self) -> PathBuf {
        self.registered_dir().join(IDENTITY_MAT)
    }

    /// 某模态平均后的扫描.
    pub fn averaged(&self, m: Modality) -> PathBuf {
        self.averaged_dir()
            .join(format!("{}_{}_averaged{NII_GZ}", self.prefix, m.tag()))
    }

    /// 某模态裁剪后的扫描.
    pub fn cropped(&self, m: Modality) -> PathBuf {
        self.cropped_dir()
            .join(format!("{}_{}_cropped{NII_GZ}", self.prefix, m.tag()))
    }

    /// 某模态的 crop->full 矩阵.
    pub fn crop_to_full_mat(&self, m: Modality) -> PathBuf {
        self.cropped_dir()
            .join(format!("{}_{}_crop_to_full.mat", self.prefix, m.tag()))
    }

    /// 配准目录中某模态的中间文件, `what` 为文件名片段.
    pub fn registered(&self, m: Modality, what: &str) -> PathBuf {
        self.registered_dir()
            .join(format!("{}_{}_{what}", self.prefix, m.tag()))
    }

    /// 推理输入文件, 按 slot 命名: `{prefix}_000{slot}.nii.gz`.
    pub fn inference_input(&self, slot: usize) -> PathBuf {
        self.inference_input_dir()
            .join(format!("{}_{:04}{NII_GZ}", self.prefix, slot))
    }

    /// 后处理目录中的文件.
    pub fn post(&self, what: &str) -> PathBuf {
        self.post_dir().join(format!("{}_{what}", self.prefix))
    }
}

/// derivatives 输出树.
///
/// 结果位于 `{root}/bibsnet/{sub}/{ses}/anat/`.
#[derive(Clone, Debug)]
pub struct DerivativesDir {
    root: PathBuf,
    anat: PathBuf,
    prefix: String,
}

impl DerivativesDir {
    /// 以 `root` 为 derivatives 根创建描述. 不会触碰文件系统.
    pub fn new<P: AsRef<Path>>(root: P, id: &SubjectSession) -> Self {
        let root = root.as_ref().join(PIPELINE_NAME);
        let anat = root.join(id.rel_dir()).join("anat");
        Self {
            root,
            anat,
            prefix: id.prefix(),
        }
    }

    /// 流水线 derivatives 根 (`{root}/bibsnet`).
    #[inline]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// 该被试的 `anat` 目录.
    #[inline]
    pub fn anat(&self) -> &Path {
        &self.anat
    }

    /// 数据集描述文件的目标位置.
    pub fn dataset_description(&self) -> PathBuf {
        self.root.join(DATASET_DESCRIPTION)
    }

    /// 原生空间分割结果.
    pub fn aseg(&self, m: Modality) -> PathBuf {
        self.anat.join(format!(
            "{}_space-{}_desc-{ASEG_SUFFIX}{NII_GZ}",
            self.prefix,
            m.tag()
        ))
    }

    /// 原生空间脑掩膜.
    pub fn brain_mask(&self, m: Modality) -> PathBuf {
        self.anat.join(format!(
            "{}_space-{}_desc-{MASK_SUFFIX}{NII_GZ}",
            self.prefix,
            m.tag()
        ))
    }
}

/// 原始解剖输入目录下, 某模态的 glob 模式: `{dir}/*_T1w.nii.gz`.
pub fn raw_glob<P: AsRef<Path>>(anat_dir: P, m: Modality) -> String {
    anat_dir
        .as_ref()
        .join(format!("*_{}{NII_GZ}", m.tag()))
        .display()
        .to_string()
}

/// 推理输入目录下, 某 slot 的 glob 模式: `{dir}/*_000{slot}.nii.gz`.
pub fn slot_glob<P: AsRef<Path>>(input_dir: P, slot: usize) -> String {
    input_dir
        .as_ref()
        .join(format!("*_{:04}{NII_GZ}", slot))
        .display()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subject_session_prefix() {
        let id = SubjectSession::new("sub-01", Some("ses-6mo"));
        assert_eq!(id.prefix(), "sub-01_ses-6mo");
        assert_eq!(id.rel_dir(), PathBuf::from("sub-01").join("ses-6mo"));

        let id = SubjectSession::new("02", None);
        assert_eq!(id.prefix(), "sub-02");
        assert_eq!(id.rel_dir(), PathBuf::from("sub-02"));
    }

    #[test]
    fn test_work_dir_paths() {
        let id = SubjectSession::new("01", Some("A"));
        let w = WorkDir::new("/work", &id);
        assert_eq!(
            w.inference_input(0),
            PathBuf::from("/work/sub-01/ses-A/bibsnet/input/sub-01_ses-A_0000.nii.gz")
        );
        assert_eq!(
            w.inference_input(1),
            PathBuf::from("/work/sub-01/ses-A/bibsnet/input/sub-01_ses-A_0001.nii.gz")
        );
        assert_eq!(
            w.averaged(Modality::T2w),
            PathBuf::from("/work/sub-01/ses-A/prebibsnet/averaged/sub-01_ses-A_T2w_averaged.nii.gz")
        );
        assert!(!w.is_default_scratch());
        assert!(WorkDir::new(default_scratch_dir(), &id).is_default_scratch());
    }

    #[test]
    fn test_derivatives_paths() {
        let id = SubjectSession::new("01", Some("A"));
        let d = DerivativesDir::new("/out", &id);
        assert_eq!(
            d.aseg(Modality::T1w),
            PathBuf::from("/out/bibsnet/sub-01/ses-A/anat/sub-01_ses-A_space-T1w_desc-aseg_dseg.nii.gz")
        );
        assert_eq!(
            d.brain_mask(Modality::T2w),
            PathBuf::from(
                "/out/bibsnet/sub-01/ses-A/anat/sub-01_ses-A_space-T2w_desc-brain_mask.nii.gz"
            )
        );
        assert_eq!(
            d.dataset_description(),
            PathBuf::from("/out/bibsnet/dataset_description.json")
        );
    }

    #[test]
    fn test_globs() {
        assert_eq!(slot_glob("/in", 0), "/in/*_0000.nii.gz");
        assert_eq!(slot_glob("/in", 1), "/in/*_0001.nii.gz");
        assert_eq!(raw_glob("/anat", Modality::T1w), "/anat/*_T1w.nii.gz");
    }
}
