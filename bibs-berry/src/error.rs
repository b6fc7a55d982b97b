//! 流水线运行时错误.

use std::path::PathBuf;
use thiserror::Error;

/// 流水线运行时错误.
///
/// 所有错误对当前被试的本次运行都是致命的, 不会自动重试.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// 配置错误: 任务需求表缺失或无效, 模板资源缺失等.
    /// 在任何外部工具运行之前报告.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// 输入错误: 期望的模态文件不存在. 携带确切的期望路径 (或 glob 模式).
    #[error("input error: {message}\n{}", format_paths(.expected))]
    Input {
        /// 错误说明.
        message: String,

        /// 期望存在的路径或 glob 模式.
        expected: Vec<String>,
    },

    /// 外部工具以非零状态退出, 或没有生成期望的输出文件.
    #[error(
        "external tool `{tool}` failed: {reason}\n\
         output searched at:\n{}\n\n\
         for the input files at the path below, check their filenames and \
         visually inspect them if needed:\n{}",
        .output.display(),
        .input.display()
    )]
    ExternalTool {
        /// 工具名.
        tool: String,

        /// 失败原因.
        reason: String,

        /// 被检查的输出路径.
        output: PathBuf,

        /// 原始输入路径.
        input: PathBuf,
    },

    /// 组合或求逆一个从未产生过的变换, 或者阶段执行顺序错误.
    /// 这属于程序控制流错误, 用户无法恢复.
    #[error("composition error: {0}")]
    Composition(String),

    /// 底层 I/O 错误.
    #[error("I/O error at {}: {source}", .path.display())]
    Io {
        /// 出错路径.
        path: PathBuf,

        /// 底层错误.
        #[source]
        source: std::io::Error,
    },

    /// nifti 读写错误.
    #[error("nifti error at {}: {source}", .path.display())]
    Nifti {
        /// 出错路径.
        path: PathBuf,

        /// 底层错误.
        #[source]
        source: nifti::NiftiError,
    },
}

fn format_paths(paths: &[String]) -> String {
    paths.join("\n")
}

impl PipelineError {
    /// 构造输入错误.
    pub fn input<S: Into<String>>(message: S, expected: Vec<String>) -> Self {
        Self::Input {
            message: message.into(),
            expected,
        }
    }

    /// 构造外部工具错误.
    pub fn tool<T, R, O, I>(tool: T, reason: R, output: O, input: I) -> Self
    where
        T: Into<String>,
        R: Into<String>,
        O: Into<PathBuf>,
        I: Into<PathBuf>,
    {
        Self::ExternalTool {
            tool: tool.into(),
            reason: reason.into(),
            output: output.into(),
            input: input.into(),
        }
    }

    /// 包装 `path` 上发生的 I/O 错误.
    pub fn io<P: Into<PathBuf>>(path: P) -> impl FnOnce(std::io::Error) -> Self {
        let path = path.into();
        move |source| Self::Io { path, source }
    }

    /// 包装 `path` 上发生的 nifti 错误.
    pub fn nifti<P: Into<PathBuf>>(path: P) -> impl FnOnce(nifti::NiftiError) -> Self {
        let path = path.into();
        move |source| Self::Nifti { path, source }
    }

    /// 是否是配置错误.
    #[inline]
    pub fn is_configuration(&self) -> bool {
        matches!(self, Self::Configuration(_))
    }

    /// 是否是输入错误.
    #[inline]
    pub fn is_input(&self) -> bool {
        matches!(self, Self::Input { .. })
    }

    /// 是否是外部工具错误.
    #[inline]
    pub fn is_external_tool(&self) -> bool {
        matches!(self, Self::ExternalTool { .. })
    }

    /// 是否是组合 (控制流) 错误.
    #[inline]
    pub fn is_composition(&self) -> bool {
        matches!(self, Self::Composition(_))
    }
}

/// 流水线运行结果.
pub type PipelineResult<T> = Result<T, PipelineError>;
