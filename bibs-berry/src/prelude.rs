//! 🍇欢迎光临🍓
//!
//! 涵盖了本 crate 一系列常用的功能.

pub use crate::Idx3d;

pub use crate::data::{MriLabel, MriMask, MriScan, NiftiHeaderAttr};

pub use crate::consts::label::{LR_BACKGROUND, LR_LEFT, LR_MIDLINE, LR_RIGHT};
pub use crate::consts::{DEFAULT_MODEL, DEFAULT_TASK};

pub use crate::error::{PipelineError, PipelineResult};

pub use crate::layout::{DerivativesDir, SubjectSession, TemplateAssets, WorkDir};
pub use crate::pipeline::{
    Availability, Context, Modality, ModalitySet, Pipeline, PipelineConfig, Stage,
};
pub use crate::tool::{ExternalTools, Toolbox};
pub use crate::transform::{Affine, TransformChain};
