//! 对单个被试-会话运行完整的 BIBSnet 前后处理流水线.

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Instant;

use bibs_berry::consts::{DEFAULT_MODEL, DEFAULT_TASK};
use bibs_berry::prelude::*;
use clap::Parser;
use log::{error, LevelFilter};
use simple_logger::SimpleLogger;

/// 婴儿脑 MRI 分割前后处理.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// 被试标识, `sub-` 前缀可有可无.
    #[arg(long, short = 's')]
    subject: String,

    /// 会话标识, `ses-` 前缀可有可无.
    #[arg(long)]
    session: Option<String>,

    /// 原始解剖输入目录, 其中为 `*_T1w.nii.gz` 和/或 `*_T2w.nii.gz`.
    #[arg(long, short = 'i')]
    input: PathBuf,

    /// derivatives 输出根目录, 结果位于其下的 `bibsnet/`.
    #[arg(long, short = 'o')]
    output: PathBuf,

    /// 被试月龄.
    #[arg(long, short = 'a')]
    age_months: u32,

    /// 工作目录. 缺省时使用临时目录, 并在成功后删除.
    #[arg(long, short = 'w')]
    work_dir: Option<PathBuf>,

    /// nnU-Net 任务号.
    #[arg(long, short = 't', default_value_t = DEFAULT_TASK)]
    task: u32,

    /// nnU-Net 模型名.
    #[arg(long, short = 'm', default_value = DEFAULT_MODEL)]
    model: String,

    /// 覆盖已存在的 derivatives.
    #[arg(long)]
    overwrite: bool,

    /// 模板资源目录. 缺省时为 `$BIBSNET_DATA_DIR` 或 `$HOME/bibsnet/data`.
    #[arg(long)]
    assets: Option<PathBuf>,

    /// 任务需求表. 缺省时为资源目录下的 `models.csv`.
    #[arg(long)]
    requirements: Option<PathBuf>,

    /// FreeSurfer 颜色表, 用于确定左右标签对.
    #[arg(long)]
    lut: Option<PathBuf>,

    /// FSL 安装目录. 缺省时为 `$FSLDIR`.
    #[arg(long)]
    fsl_dir: Option<PathBuf>,

    /// ANTs 可执行文件目录. 缺省时为 `$ANTSPATH`.
    #[arg(long)]
    ants_path: Option<PathBuf>,

    /// `nnUNet_predict` 可执行文件.
    #[arg(long, short = 'n')]
    nnunet: Option<PathBuf>,

    /// 输出调试日志 (包括每条外部命令).
    #[arg(long, short = 'v')]
    verbose: bool,
}

impl Args {
    fn config(&self) -> PipelineConfig {
        let id = SubjectSession::new(self.subject.as_str(), self.session.as_deref());
        let mut c = PipelineConfig::new(id, &self.input, &self.output, self.age_months);
        c.work_dir = self.work_dir.clone();
        c.task = self.task;
        c.model = self.model.clone();
        c.overwrite = self.overwrite;
        c.asset_dir = self.assets.clone();
        c.requirements = self.requirements.clone();
        c.color_lut = self.lut.clone();
        c
    }

    fn tools(&self) -> ExternalTools {
        let mut t = ExternalTools::from_env();
        if let Some(d) = &self.fsl_dir {
            t = t.with_fsl_dir(d);
        }
        if let Some(d) = &self.ants_path {
            t = t.with_ants_path(d);
        }
        if let Some(exe) = &self.nnunet {
            t = t.with_nnunet(exe);
        }
        t
    }
}

fn main() -> ExitCode {
    let args = Args::parse();
    let level = if args.verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };
    if let Err(e) = SimpleLogger::new().with_level(level).init() {
        eprintln!("cannot initialise logger: {e}");
    }

    let start = Instant::now();
    let result = Pipeline::new(args.config(), args.tools()).run();
    let verdict = match &result {
        Ok(_) => "successfully",
        Err(_) => "and then crashed",
    };
    if let Err(e) = &result {
        error!("{e}");
    }
    println!(
        "BIBSnet for this subject took this long to run {verdict}: {:?}",
        start.elapsed()
    );
    match result {
        Ok(_) => ExitCode::SUCCESS,
        Err(_) => ExitCode::FAILURE,
    }
}
