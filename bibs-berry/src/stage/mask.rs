//! 由分割得到二值脑掩膜.

use log::info;

use crate::consts::label::*;
use crate::consts::naming::NII_GZ;
use crate::error::PipelineResult;
use crate::pipeline::{Context, Stage};
use crate::{MriLabel, MriMask, NiftiHeaderAttr};

/// 非背景标签处为 1, 其余为 0. 保留分割的 header.
pub fn derive(seg: &MriLabel) -> MriMask {
    let data = seg.data().mapv(|p| {
        if is_background(p) {
            MASK_BACKGROUND
        } else {
            MASK_FOREGROUND
        }
    });
    MriMask::from_parts(seg.header(), data)
}

impl MriMask {
    /// 把二值掩膜当作分割. 前景标签为 1.
    pub fn as_label(&self) -> MriLabel {
        MriLabel::from_parts(self.header(), self.data().mapv(u16::from))
    }
}

/// 对每个模态的原生空间分割生成脑掩膜.
pub fn run(ctx: &mut Context) -> PipelineResult<()> {
    ctx.enter(Stage::Masked)?;
    for &m in ctx.modalities() {
        let seg = MriLabel::open(ctx.native(m)?)?;
        let mask = derive(&seg);
        let output = ctx.work.post(&format!("{}_brain_mask{NII_GZ}", m.tag()));
        mask.save(&output)?;
        info!("{m} brain mask has {} voxel(s)", mask.count(MASK_FOREGROUND));
        ctx.set_mask(m, output);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array3;
    use nifti::NiftiHeader;

    #[test]
    fn test_derive_and_idempotent() {
        let mut data = Array3::<u16>::zeros((3, 3, 3));
        data[(0, 0, 0)] = 2;
        data[(1, 1, 1)] = 41;
        data[(2, 2, 2)] = 16;
        let seg = MriLabel::from_parts(&NiftiHeader::default(), data);

        let mask = derive(&seg);
        assert_eq!(mask.count(MASK_FOREGROUND), 3);
        assert_eq!(mask[(1, 1, 1)], MASK_FOREGROUND);
        assert_eq!(mask[(0, 1, 1)], MASK_BACKGROUND);

        let again = derive(&mask.as_label());
        assert_eq!(again.data(), mask.data());
    }
}
