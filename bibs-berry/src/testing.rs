//! 单元测试共用的小体数据, 资源目录与记录调用的假工具集.

use std::cell::RefCell;
use std::fs;
use std::path::{Path, PathBuf};

use ndarray::Array3;
use nifti::NiftiHeader;

use crate::consts::label::*;
use crate::data::read_header;
use crate::layout::TemplateAssets;
use crate::pipeline::Modality;
use crate::tool::*;
use crate::transform::Affine;
use crate::{MriLabel, MriMask, MriScan, NiftiHeaderAttr, PipelineError, PipelineResult};

/// 测试体数据形状.
pub(crate) const SHAPE: (usize, usize, usize) = (8, 8, 8);

/// 假推理写出的标签: 左侧大脑白质.
pub(crate) const LEFT_WM: u16 = 2;

/// 左侧大脑白质的右侧对应标签.
pub(crate) const RIGHT_WM: u16 = 41;

/// 1mm 各向同性, 带平移的 header.
pub(crate) fn header(offset: f32) -> NiftiHeader {
    let mut h = NiftiHeader::default();
    h.pixdim = [1.0; 8];
    h.sform_code = 1;
    h.srow_x = [1.0, 0.0, 0.0, offset];
    h.srow_y = [0.0, 1.0, 0.0, -offset];
    h.srow_z = [0.0, 0.0, 1.0, 2.0 * offset];
    h
}

/// 写入一个所有体素都为 `fill` 的扫描.
pub(crate) fn write_scan(path: &Path, fill: f32, offset: f32) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    MriScan::from_parts(&header(offset), Array3::from_elem(SHAPE, fill))
        .save(path)
        .unwrap();
}

/// 在 `anat` 下写入某模态的 `n` 次采集, 第 i 次的强度为 `i + 1`.
pub(crate) fn write_raw(anat: &Path, m: Modality, n: usize) -> Vec<PathBuf> {
    (0..n)
        .map(|i| {
            let p = anat.join(format!("sub-01_ses-A_run-{:02}_{}.nii.gz", i + 1, m.tag()));
            write_scan(&p, (i + 1) as f32, -10.0);
            p
        })
        .collect()
}

/// 写入完整的模板资源目录.
pub(crate) fn write_assets(root: &Path, ages: &[u32]) -> TemplateAssets {
    let a = TemplateAssets::new(root);
    for m in [Modality::T1w, Modality::T2w] {
        write_scan(&a.reference(m), 100.0, 0.0);
        for &age in ages {
            write_scan(&a.age_template(age, m), 50.0, 0.0);
        }
    }
    for &age in ages {
        write_scan(&a.age_lr_mask(age), 1.0, 0.0);
    }
    fs::write(a.dataset_description(), "{\"Name\": \"bibsnet\"}").unwrap();
    fs::write(
        a.requirements_csv(),
        "model_num,T1w,T2w\n512,1,1\n514,1,0\n515,0,1\n",
    )
    .unwrap();
    a
}

/// 假工具集记录下的一次调用.
#[derive(Clone, Debug, PartialEq)]
pub(crate) enum Call {
    Crop(PathBuf),
    Estimate { moving: PathBuf, dof: u8 },
    Apply { input: PathBuf, matrix: Affine, interp: Interp },
    LeftRight { subject: PathBuf },
    Predict { input_dir: PathBuf },
}

/// 假工具集中可以被设为失败的一步.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(crate) enum Step {
    Crop,
    Estimate,
    Apply,
    LeftRight,
    Predict,
}

impl Step {
    fn program(self) -> &'static str {
        match self {
            Self::Crop => "robustfov",
            Self::Estimate | Self::Apply => "flirt",
            Self::LeftRight => "antsRegistrationSyNQuick.sh",
            Self::Predict => "nnUNet_predict",
        }
    }
}

/// 记录调用的假工具集. 输出文件都写在参考图像的网格上.
#[derive(Debug)]
pub(crate) struct RecordingTools {
    pub(crate) calls: RefCell<Vec<Call>>,
    pub(crate) predict_writes: bool,
    pub(crate) fail_at: Option<Step>,
    pub(crate) off_grid: bool,
}

impl RecordingTools {
    pub(crate) fn new() -> Self {
        Self {
            calls: RefCell::new(Vec::new()),
            predict_writes: true,
            fail_at: None,
            off_grid: false,
        }
    }

    /// 推理时不写出任何分割.
    pub(crate) fn silent_predict() -> Self {
        Self {
            predict_writes: false,
            ..Self::new()
        }
    }

    /// 在 `step` 上以非零状态退出.
    pub(crate) fn failing(step: Step) -> Self {
        Self {
            fail_at: Some(step),
            ..Self::new()
        }
    }

    /// 重采样结果偏离参考网格 5mm.
    pub(crate) fn off_grid() -> Self {
        Self {
            off_grid: true,
            ..Self::new()
        }
    }

    pub(crate) fn crop_to_full() -> Affine {
        Affine::translation(2.0, 3.0, 1.0)
    }

    pub(crate) fn estimated(dof: u8) -> Affine {
        match dof {
            6 => Affine::translation(0.0, 0.5, -0.5),
            _ => Affine::from_row_slice(&[
                1.1, 0.0, 0.0, -1.0, //
                0.0, 0.9, 0.0, 2.0, //
                0.0, 0.0, 1.0, 0.5, //
                0.0, 0.0, 0.0, 1.0,
            ]),
        }
    }

    pub(crate) fn calls(&self) -> Vec<Call> {
        self.calls.borrow().clone()
    }

    /// 全部 `apply_affine` 调用.
    pub(crate) fn applied(&self) -> Vec<(PathBuf, Affine, Interp)> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Apply {
                    input,
                    matrix,
                    interp,
                } => Some((input, matrix, interp)),
                _ => None,
            })
            .collect()
    }

    fn record(&self, c: Call) {
        self.calls.borrow_mut().push(c);
    }

    fn exit_status(&self, step: Step, output: &Path, input: &Path) -> PipelineResult<()> {
        match self.fail_at {
            Some(s) if s == step => Err(PipelineError::tool(
                step.program(),
                "exited with status 1",
                output,
                input,
            )),
            _ => Ok(()),
        }
    }
}

/// 以 `reference` 的网格写出 `data` 的左上角部分 (不足处补零).
fn regrid<T: Copy + Default>(data: &Array3<T>, reference: &NiftiHeader) -> Array3<T> {
    Array3::from_shape_fn(reference.shape(), |pos| {
        data.get(pos).copied().unwrap_or_default()
    })
}

fn resample(
    input: &Path,
    reference: &Path,
    output: &Path,
    interp: Interp,
    shift: bool,
) -> PipelineResult<()> {
    let mut h = read_header(reference)?;
    if shift {
        h.srow_x[3] += 5.0;
    }
    match interp {
        Interp::Trilinear => {
            let scan = MriScan::open(input)?;
            MriScan::from_parts(&h, regrid(&scan.into_data(), &h)).save(output)
        }
        Interp::NearestNeighbour => {
            let label = MriLabel::open(input)?;
            MriLabel::from_parts(&h, regrid(&label.into_data(), &h)).save(output)
        }
    }
}

impl Toolbox for RecordingTools {
    fn crop_fov(&self, req: &CropRequest<'_>) -> PipelineResult<()> {
        self.record(Call::Crop(req.input.to_owned()));
        self.exit_status(Step::Crop, req.output, req.input)?;
        MriScan::open(req.input)?.save(req.output)?;
        Self::crop_to_full().save(req.crop_to_full)
    }

    fn estimate_affine(&self, req: &EstimateRequest<'_>) -> PipelineResult<()> {
        self.record(Call::Estimate {
            moving: req.moving.to_owned(),
            dof: req.dof,
        });
        self.exit_status(Step::Estimate, req.out_matrix, req.moving)?;
        Affine::load(req.init)?;
        Self::estimated(req.dof).save(req.out_matrix)?;
        match req.out_volume {
            Some(out) => resample(req.moving, req.reference, out, Interp::Trilinear, false),
            None => Ok(()),
        }
    }

    fn apply_affine(&self, req: &ApplyRequest<'_>) -> PipelineResult<()> {
        self.record(Call::Apply {
            input: req.input.to_owned(),
            matrix: Affine::load(req.matrix)?,
            interp: req.interp,
        });
        self.exit_status(Step::Apply, req.output, req.input)?;
        resample(req.input, req.reference, req.output, req.interp, self.off_grid)
    }

    fn label_left_right(&self, req: &LrRequest<'_>) -> PipelineResult<()> {
        self.record(Call::LeftRight {
            subject: req.subject.to_owned(),
        });
        self.exit_status(Step::LeftRight, req.output, req.subject)?;
        let h = read_header(req.subject)?;
        let (sx, sy, sz) = h.shape();
        // 左右各半, 四周留出一圈背景.
        let data = Array3::from_shape_fn((sx, sy, sz), |(x, y, z)| {
            let border = x == 0 || y == 0 || z == 0 || x + 1 == sx || y + 1 == sy || z + 1 == sz;
            match (border, x < sx / 2) {
                (true, _) => LR_BACKGROUND,
                (false, true) => LR_LEFT,
                (false, false) => LR_RIGHT,
            }
        });
        MriMask::from_parts(&h, data).save(req.output)
    }

    fn predict(&self, req: &PredictRequest<'_>) -> PipelineResult<()> {
        self.record(Call::Predict {
            input_dir: req.input_dir.to_owned(),
        });
        self.exit_status(Step::Predict, req.output_dir, req.input_dir)?;
        if !self.predict_writes {
            return Ok(());
        }
        let first = req.input_dir.join("sub-01_ses-A_0000.nii.gz");
        let h = read_header(&first)?;
        // 整个脑区都被标为左侧白质, 右半部分需要校正.
        let (sx, sy, sz) = h.shape();
        let data = Array3::from_shape_fn((sx, sy, sz), |(x, y, z)| {
            let inside = (1..sx - 1).contains(&x) && (1..sy - 1).contains(&y) && (1..sz - 1).contains(&z);
            if inside {
                LEFT_WM
            } else {
                BACKGROUND
            }
        });
        MriLabel::from_parts(&h, data).save(req.output_dir.join("sub-01_ses-A.nii.gz"))
    }
}
