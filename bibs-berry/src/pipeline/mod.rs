//! 流水线驱动.
//!
//! 一次运行处理一个被试-会话, 严格串行:
//!
//! ```text
//! 平均 -> 裁剪 -> 配准 -> 推理 -> 左右判定 -> 左右校正 -> 还原 -> 掩膜 -> derivatives
//! ```
//!
//! 任何阶段失败对本次运行都是致命的. 不同被试的运行各自独占工作目录, 可以并行.

use log::info;

use crate::error::PipelineResult;
use crate::layout::{DerivativesDir, TemplateAssets, WorkDir};
use crate::requirements::RequirementsTable;
use crate::stage::chirality::ChiralityTable;
use crate::stage::inference::InferenceTask;
use crate::stage::*;
use crate::tool::Toolbox;

mod config;
pub mod context;
mod modality;
mod state;

pub use config::PipelineConfig;
pub use context::{Context, Cropped, Registered};
pub use modality::{Availability, Modality, ModalitySet};
pub use state::Stage;

/// 流水线: 一份配置加一套外部工具.
#[derive(Debug)]
pub struct Pipeline<T> {
    config: PipelineConfig,
    tools: T,
}

impl<T: Toolbox> Pipeline<T> {
    /// 创建流水线.
    pub fn new(config: PipelineConfig, tools: T) -> Self {
        Self { config, tools }
    }

    /// 配置.
    #[inline]
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// 外部工具集.
    #[inline]
    pub fn tools(&self) -> &T {
        &self.tools
    }

    /// 在运行任何外部工具之前完成全部配置检查, 并创建工作目录.
    ///
    /// 1. 读取任务需求表, 确定模态组合;
    /// 2. 选出模板月龄;
    /// 3. 检查所需的模板资源是否齐全.
    pub fn prepare(&self) -> PipelineResult<Context> {
        let c = &self.config;
        let assets = TemplateAssets::new(c.asset_root()?);
        let table_path = c
            .requirements
            .clone()
            .unwrap_or_else(|| assets.requirements_csv());
        let set = RequirementsTable::open(table_path)?
            .lookup(c.task)?
            .modality_set()?;
        let availability = Availability::new(set, c.age_months);

        let template_age = age::select(&assets, c.age_months)?;
        assets.check(set.modalities(), availability.lr_reference(), template_age)?;
        info!(
            "{}: {set:?}, {} months old, {template_age}mo template",
            c.id, c.age_months
        );

        let ctx = Context::new(
            c.id.clone(),
            c.anat_dir.clone(),
            WorkDir::new(c.work_root(), &c.id),
            DerivativesDir::new(&c.output_dir, &c.id),
            assets,
            availability,
            template_age,
            c.overwrite,
        );
        ctx.create_dirs()?;
        Ok(ctx)
    }

    /// 左右校正使用的标签对.
    pub fn chirality_table(&self, assets: &TemplateAssets) -> PipelineResult<ChiralityTable> {
        match self.config.color_lut.clone().or_else(|| assets.color_lut()) {
            Some(lut) => ChiralityTable::open_lut(lut),
            None => Ok(ChiralityTable::freesurfer().clone()),
        }
    }

    /// 完整运行一次. 成功时返回最终的上下文.
    pub fn run(&self) -> PipelineResult<Context> {
        let mut ctx = self.prepare()?;
        let table = self.chirality_table(&ctx.assets)?;
        let task = InferenceTask {
            task: self.config.task,
            model: self.config.model.clone(),
        };

        averager::run(&mut ctx)?;
        cropper::run(&mut ctx, &self.tools)?;
        registration::run(&mut ctx, &self.tools)?;
        inference::run(&mut ctx, &self.tools, &task)?;
        lr_mask::run(&mut ctx, &self.tools)?;
        chirality::run(&mut ctx, &table)?;
        revert::run(&mut ctx, &self.tools)?;
        mask::run(&mut ctx)?;
        derivatives::run(&mut ctx)?;

        if derivatives::cleanup(&ctx)? {
            info!("removed scratch directory {}", ctx.work.base().display());
        }
        Ok(ctx)
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use super::*;
    use crate::layout::SubjectSession;
    use crate::testing::*;
    use crate::tool::Interp;
    use crate::transform::Affine;
    use crate::{MriLabel, MriMask, MriScan, NiftiHeaderAttr};

    /// 任务 512 需要双模态, 514 只需要 T1w, 515 只需要 T2w.
    fn pipeline(root: &Path, task: u32, age: u32, tools: RecordingTools) -> Pipeline<RecordingTools> {
        write_assets(&root.join("assets"), &[1, 6, 12, 24]);
        let mut config = PipelineConfig::new(
            SubjectSession::new("01", Some("A")),
            root.join("anat"),
            root.join("out"),
            age,
        );
        config.task = task;
        config.work_dir = Some(root.join("work"));
        config.asset_dir = Some(root.join("assets"));
        Pipeline::new(config, tools)
    }

    fn lr_subjects(tools: &RecordingTools) -> Vec<std::path::PathBuf> {
        tools
            .calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::LeftRight { subject } => Some(subject),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_t1_only_end_to_end() {
        let dir = tempfile::tempdir().unwrap();
        let p = pipeline(dir.path(), 514, 8, RecordingTools::new());
        let raw = write_raw(&dir.path().join("anat"), Modality::T1w, 2);

        let ctx = p.run().unwrap();
        assert_eq!(ctx.stage(), Some(Stage::DerivativesWritten));
        assert_eq!(ctx.availability.set, ModalitySet::T1Only);
        assert_eq!(ctx.template_age, 6);

        // 单模态路径: 一次估计, 没有 ACPC.
        let estimates: Vec<_> = p
            .tools()
            .calls()
            .into_iter()
            .filter(|c| matches!(c, Call::Estimate { .. }))
            .collect();
        assert_eq!(estimates.len(), 1);

        // 还原使用正向组合矩阵的逆, 最近邻插值.
        let forward = ctx.registered(Modality::T1w).unwrap().chain.compose().unwrap();
        let applied = p.tools().applied();
        assert_eq!(applied.len(), 2);
        let (input, inverse, interp) = &applied[1];
        assert_eq!(input, ctx.corrected().unwrap());
        assert_eq!(*interp, Interp::NearestNeighbour);
        assert!(forward.then(inverse).approx_eq(&Affine::identity(), 1e-8));

        // 输出在原生网格上, 右半部分的左侧标签已被校正.
        let aseg = MriLabel::open(ctx.derivatives.aseg(Modality::T1w)).unwrap();
        let native = MriLabel::open(&raw[0]).unwrap();
        assert!(aseg.same_grid(&native, 1e-6));
        assert_eq!(aseg.count(LEFT_WM), 3 * 6 * 6);
        assert_eq!(aseg.count(RIGHT_WM), 3 * 6 * 6);
        assert_eq!(aseg[(2, 3, 3)], LEFT_WM);
        assert_eq!(aseg[(5, 3, 3)], RIGHT_WM);

        let mask = MriMask::open(ctx.derivatives.brain_mask(Modality::T1w)).unwrap();
        assert_eq!(mask.foreground_count(), 6 * 6 * 6);
        assert!(ctx.derivatives.dataset_description().is_file());
        assert!(!ctx.derivatives.aseg(Modality::T2w).exists());

        // 用户指定的工作目录不会被删除.
        assert!(ctx.work.base().is_dir());
    }

    #[test]
    fn test_dual_young_uses_t2_reference() {
        let dir = tempfile::tempdir().unwrap();
        let p = pipeline(dir.path(), 512, 18, RecordingTools::new());
        write_raw(&dir.path().join("anat"), Modality::T1w, 1);
        write_raw(&dir.path().join("anat"), Modality::T2w, 1);

        let ctx = p.run().unwrap();
        assert!(ctx.availability.set.is_dual());
        assert_eq!(ctx.template_age, 12);
        assert_eq!(
            lr_subjects(p.tools()),
            vec![ctx.registered(Modality::T2w).unwrap().volume.clone()]
        );
        for m in [Modality::T1w, Modality::T2w] {
            assert!(ctx.derivatives.aseg(m).is_file());
            assert!(ctx.derivatives.brain_mask(m).is_file());
            assert_eq!(ctx.registered(m).unwrap().chain.len(), 3);
        }
    }

    #[test]
    fn test_dual_older_uses_t1_reference() {
        let dir = tempfile::tempdir().unwrap();
        let p = pipeline(dir.path(), 512, 30, RecordingTools::new());
        write_raw(&dir.path().join("anat"), Modality::T1w, 1);
        write_raw(&dir.path().join("anat"), Modality::T2w, 1);

        let ctx = p.run().unwrap();
        assert_eq!(
            lr_subjects(p.tools()),
            vec![ctx.registered(Modality::T1w).unwrap().volume.clone()]
        );
    }

    #[test]
    fn test_missing_t1_is_input_error() {
        let dir = tempfile::tempdir().unwrap();
        let p = pipeline(dir.path(), 514, 8, RecordingTools::new());
        write_raw(&dir.path().join("anat"), Modality::T2w, 1);

        let err = p.run().unwrap_err();
        assert!(err.is_input());
        let glob = dir.path().join("anat").join("*_T1w.nii.gz");
        assert!(err.to_string().contains(&glob.display().to_string()));
        assert!(p.tools().calls().is_empty());
    }

    #[test]
    fn test_no_inference_output_stops_before_lr() {
        let dir = tempfile::tempdir().unwrap();
        let p = pipeline(dir.path(), 515, 8, RecordingTools::silent_predict());
        write_raw(&dir.path().join("anat"), Modality::T2w, 1);

        let err = p.run().unwrap_err();
        assert!(err.is_external_tool());
        let msg = err.to_string();
        assert!(msg.contains("bibsnet/output"));
        assert!(msg.contains("bibsnet/input"));
        assert!(matches!(p.tools().calls().last(), Some(Call::Predict { .. })));
        assert!(lr_subjects(p.tools()).is_empty());
    }

    #[test]
    fn test_configuration_errors_before_tools() {
        let dir = tempfile::tempdir().unwrap();
        let p = pipeline(dir.path(), 999, 8, RecordingTools::new());
        write_raw(&dir.path().join("anat"), Modality::T1w, 1);
        assert!(p.run().unwrap_err().is_configuration());

        let dir = tempfile::tempdir().unwrap();
        let p = pipeline(dir.path(), 514, 8, RecordingTools::new());
        std::fs::remove_file(
            TemplateAssets::new(dir.path().join("assets")).reference(Modality::T1w),
        )
        .unwrap();
        assert!(p.prepare().unwrap_err().is_configuration());
        assert!(p.tools().calls().is_empty());
    }

    #[test]
    fn test_lut_from_assets() {
        let dir = tempfile::tempdir().unwrap();
        let p = pipeline(dir.path(), 514, 8, RecordingTools::new());
        let assets = TemplateAssets::new(dir.path().join("assets"));
        assert_eq!(&p.chirality_table(&assets).unwrap(), ChiralityTable::freesurfer());

        std::fs::write(
            assets.root().join("FreeSurferColorLUT.txt"),
            "2 Left-Cerebral-White-Matter 0 0 0 0\n41 Right-Cerebral-White-Matter 0 0 0 0\n",
        )
        .unwrap();
        assert_eq!(p.chirality_table(&assets).unwrap().len(), 2);
    }

    #[test]
    fn test_failing_crop_stops_before_registration() {
        let dir = tempfile::tempdir().unwrap();
        let p = pipeline(dir.path(), 514, 8, RecordingTools::failing(Step::Crop));
        write_raw(&dir.path().join("anat"), Modality::T1w, 1);

        let err = p.run().unwrap_err();
        assert!(err.is_external_tool());
        assert!(err.to_string().contains("robustfov"));
        assert_eq!(p.tools().calls().len(), 1);
        assert!(matches!(p.tools().calls()[0], Call::Crop(_)));
    }

    #[test]
    fn test_failing_registration_stops_before_inference() {
        let dir = tempfile::tempdir().unwrap();
        let p = pipeline(dir.path(), 512, 8, RecordingTools::failing(Step::Estimate));
        write_raw(&dir.path().join("anat"), Modality::T1w, 1);
        write_raw(&dir.path().join("anat"), Modality::T2w, 1);

        let err = p.run().unwrap_err();
        assert!(err.is_external_tool());
        assert!(err.to_string().contains("flirt"));
        let calls = p.tools().calls();
        assert!(matches!(calls.last(), Some(Call::Estimate { .. })));
        assert!(!calls
            .iter()
            .any(|c| matches!(c, Call::Apply { .. } | Call::Predict { .. })));

        let out = DerivativesDir::new(dir.path().join("out"), &SubjectSession::new("01", Some("A")));
        assert!(!out.aseg(Modality::T1w).exists());
    }

    #[test]
    fn test_rerun_segments_new_data() {
        let dir = tempfile::tempdir().unwrap();
        let raw = write_raw(&dir.path().join("anat"), Modality::T1w, 1);
        pipeline(dir.path(), 514, 8, RecordingTools::new()).run().unwrap();

        write_scan(&raw[0], 9.0, -10.0);
        let ctx = pipeline(dir.path(), 514, 8, RecordingTools::new())
            .run()
            .unwrap();
        let input = MriScan::open(ctx.work.inference_input(0)).unwrap();
        let registered = MriScan::open(&ctx.registered(Modality::T1w).unwrap().volume).unwrap();
        assert!(input.data().iter().all(|v| *v == 9.0));
        assert_eq!(input.data(), registered.data());
    }

    #[test]
    fn test_rerun_does_not_reuse_old_segmentation() {
        let dir = tempfile::tempdir().unwrap();
        write_raw(&dir.path().join("anat"), Modality::T2w, 1);
        pipeline(dir.path(), 515, 8, RecordingTools::new()).run().unwrap();

        let again = pipeline(dir.path(), 515, 8, RecordingTools::silent_predict());
        let err = again.run().unwrap_err();
        assert!(err.is_external_tool());
        assert!(err.to_string().contains("bibsnet/output"));
        assert!(lr_subjects(again.tools()).is_empty());
    }
}
