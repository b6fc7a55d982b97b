//! 任务需求表: 推理任务号 -> 所需模态.
//!
//! 表格为 CSV 格式, 第一列为任务号, 另有 `T1w` 与 `T2w` 两列标记:
//!
//! ```text
//! model_num,T1w,T2w
//! 512,1,1
//! 514,1,0
//! 515,0,1
//! ```

use std::collections::BTreeMap;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use itertools::Itertools;

use crate::error::{PipelineError, PipelineResult};
use crate::pipeline::ModalitySet;

/// 单个任务需要的模态.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct TaskRequirements {
    /// 是否需要 T1w.
    pub t1w: bool,

    /// 是否需要 T2w.
    pub t2w: bool,
}

impl TaskRequirements {
    /// 对应的模态组合.
    #[inline]
    pub fn modality_set(&self) -> PipelineResult<ModalitySet> {
        ModalitySet::from_flags(self.t1w, self.t2w)
    }
}

/// 任务需求表.
#[derive(Clone, Debug)]
pub struct RequirementsTable {
    source: PathBuf,
    tasks: BTreeMap<u32, TaskRequirements>,
}

/// 解析标记单元格. 空单元格视为假.
fn parse_flag(cell: &str) -> Option<bool> {
    match cell.trim() {
        "1" | "1.0" | "true" | "True" | "TRUE" => Some(true),
        "" | "0" | "0.0" | "false" | "False" | "FALSE" => Some(false),
        _ => None,
    }
}

impl RequirementsTable {
    /// 读取 `path` 处的需求表. 文件不可读或格式错误时返回配置错误.
    pub fn open<P: AsRef<Path>>(path: P) -> PipelineResult<Self> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| {
            PipelineError::Configuration(format!(
                "{} not found ({e}). This file is needed to determine the modalities \
                 each segmentation task requires",
                path.display()
            ))
        })?;
        Self::from_reader(file, path)
    }

    /// 从 `rdr` 读取需求表. `source` 只用于错误信息.
    pub fn from_reader<R: Read, P: AsRef<Path>>(rdr: R, source: P) -> PipelineResult<Self> {
        let source = source.as_ref().to_owned();
        let bad = |what: String| {
            PipelineError::Configuration(format!("{}: {what}", source.display()))
        };

        let mut rdr = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(rdr);
        let headers = rdr.headers().map_err(|e| bad(e.to_string()))?.clone();
        let column = |name: &str| {
            headers
                .iter()
                .position(|h| h == name)
                .ok_or_else(|| bad(format!("missing `{name}` column")))
        };
        let (t1_col, t2_col) = (column("T1w")?, column("T2w")?);

        let mut tasks = BTreeMap::new();
        for (line, record) in rdr.records().enumerate() {
            let record = record.map_err(|e| bad(e.to_string()))?;
            let cell = |i: usize| record.get(i).unwrap_or("");
            let task: u32 = cell(0)
                .parse()
                .map_err(|_| bad(format!("row {}: bad task id `{}`", line + 1, cell(0))))?;
            let flag = |i: usize| {
                parse_flag(cell(i)).ok_or_else(|| {
                    bad(format!(
                        "row {}: `{}` is not a valid flag for task {task}",
                        line + 1,
                        cell(i)
                    ))
                })
            };
            tasks.insert(
                task,
                TaskRequirements {
                    t1w: flag(t1_col)?,
                    t2w: flag(t2_col)?,
                },
            );
        }
        Ok(Self { source, tasks })
    }

    /// 全部已知任务号, 升序排列.
    pub fn tasks(&self) -> impl Iterator<Item = u32> + '_ {
        self.tasks.keys().copied()
    }

    /// 查询任务 `task` 的需求. 未知任务返回配置错误, 并列出已知任务.
    pub fn lookup(&self, task: u32) -> PipelineResult<TaskRequirements> {
        self.tasks.get(&task).copied().ok_or_else(|| {
            PipelineError::Configuration(format!(
                "task {task} is not in {} so its requirements are unknown. \
                 Add a task {task} row to that file or try one of these tasks: [{}]",
                self.source.display(),
                self.tasks().join(", ")
            ))
        })
    }
}
