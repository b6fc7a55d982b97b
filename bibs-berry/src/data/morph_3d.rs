//! 3D 形态学操作.
//!
//! 目前只提供左右半球掩膜的钻石型 (6-邻域) 膨胀.

use crate::consts::label::*;
use crate::{Idx3d, MriMask, NiftiHeaderAttr};
use ndarray::{Array3, Zip};

/// 获取 `pos` 前后上下左右六个点的坐标.
///
/// 在 `shape` 范围外的坐标会被过滤掉, 不会包含在返回值中.
#[inline]
fn diamond_neighbours((x, y, z): Idx3d, shape: Idx3d) -> impl Iterator<Item = Idx3d> {
    let (sx, sy, sz) = shape;
    [
        (x.wrapping_sub(1), y, z),
        (x.saturating_add(1), y, z),
        (x, y.wrapping_sub(1), z),
        (x, y.saturating_add(1), z),
        (x, y, z.wrapping_sub(1)),
        (x, y, z.saturating_add(1)),
    ]
    .into_iter()
    .filter(move |&(a, b, c)| a < sx && b < sy && c < sz)
}

/// 根据背景体素 `pos` 的 6-邻域决定其膨胀后的值.
///
/// 1. 邻域全为背景: 保持背景;
/// 2. 邻域只出现一种非背景值: 取该值;
/// 3. 邻域出现多种非背景值: 记为中线.
#[inline]
fn grown_value(old: &Array3<u8>, pos: Idx3d) -> u8 {
    let mut seen = LR_BACKGROUND;
    for neigh in diamond_neighbours(pos, old.dim()) {
        match (seen, old[neigh]) {
            (_, LR_BACKGROUND) => {}
            (LR_BACKGROUND, v) => seen = v,
            (s, v) if s != v => return LR_MIDLINE,
            _ => {}
        }
    }
    seen
}

/// 单轮膨胀. 只有背景体素可能改变.
fn dilate_once(old: &Array3<u8>) -> Array3<u8> {
    let mut next = old.clone();

    cfg_if::cfg_if! {
        if #[cfg(feature = "rayon")] {
            Zip::indexed(&mut next).par_for_each(|pos, v| {
                if *v == LR_BACKGROUND {
                    *v = grown_value(old, pos);
                }
            });
        } else {
            Zip::indexed(&mut next).for_each(|pos, v| {
                if *v == LR_BACKGROUND {
                    *v = grown_value(old, pos);
                }
            });
        }
    }
    next
}

impl MriMask {
    /// 以钻石型结构元对左右半球掩膜膨胀 `radius` 轮.
    ///
    /// # 性质
    ///
    /// 1. 膨胀只会扩张掩膜, 原有非背景体素的值保持不变;
    /// 2. 同一轮中被左右两侧同时触及的背景体素记为 `LR_MIDLINE`.
    ///
    /// 返回新增的非背景体素个数.
    pub fn dilate(&mut self, radius: usize) -> usize {
        let before = self.foreground_count();
        debug_assert_eq!(self.shape(), self.data.dim());

        for _ in 0..radius {
            let next = dilate_once(&self.data);
            if next == self.data {
                break;
            }
            self.data = next;
        }
        self.foreground_count() - before
    }
}
