use std::ops::{Index, IndexMut};
use std::path::Path;

use log::warn;
use nalgebra::Matrix4;
use ndarray::{Array3, ArrayD, ArrayView, ArrayViewMut, Axis, Ix3};
use nifti::writer::WriterOptions;
use nifti::{IntoNdArray, NiftiHeader, NiftiObject, ReaderOptions};

use crate::consts::label::*;
use crate::error::{PipelineError, PipelineResult};
use crate::Idx3d;

pub mod morph_3d;

/// `NiftiHeader` 是栈上大对象, 移动该对象的开销很可观.
/// 因此我们将其分配到堆上.
type BoxedHeader = Box<NiftiHeader>;

/// 从 header 读取 (x, y, z) 三维形状.
///
/// 保留 nifti 原生的 \[x, y, z\] 索引顺序,
/// 以便与 voxel-to-world 仿射矩阵直接对应.
#[inline]
fn get_shape_from_header(h: &NiftiHeader) -> Idx3d {
    let [_, x, y, z, ..] = h.dim;
    (x as usize, y as usize, z as usize)
}

/// 由 header 计算 voxel-to-world 仿射矩阵.
///
/// 优先使用 sform, 其次 qform, 都不存在时退化为仅含体素尺寸的对角阵.
pub fn voxel_to_world(h: &NiftiHeader) -> Matrix4<f64> {
    if h.sform_code > 0 {
        let [x, y, z] = [h.srow_x, h.srow_y, h.srow_z].map(|r| r.map(f64::from));
        return Matrix4::new(
            x[0], x[1], x[2], x[3], //
            y[0], y[1], y[2], y[3], //
            z[0], z[1], z[2], z[3], //
            0.0, 0.0, 0.0, 1.0,
        );
    }

    let [_, dx, dy, dz, ..] = h.pixdim.map(f64::from);
    if h.qform_code > 0 {
        let (b, c, d) = (
            f64::from(h.quatern_b),
            f64::from(h.quatern_c),
            f64::from(h.quatern_d),
        );
        let a = (1.0 - (b * b + c * c + d * d).min(1.0)).sqrt();
        let qfac = if h.pixdim[0] < 0.0 { -1.0 } else { 1.0 };
        let dz = dz * qfac;
        let (qx, qy, qz) = (
            f64::from(h.quatern_x),
            f64::from(h.quatern_y),
            f64::from(h.quatern_z),
        );
        return Matrix4::new(
            (a * a + b * b - c * c - d * d) * dx,
            2.0 * (b * c - a * d) * dy,
            2.0 * (b * d + a * c) * dz,
            qx,
            2.0 * (b * c + a * d) * dx,
            (a * a + c * c - b * b - d * d) * dy,
            2.0 * (c * d - a * b) * dz,
            qy,
            2.0 * (b * d - a * c) * dx,
            2.0 * (c * d + a * b) * dy,
            (a * a + d * d - c * c - b * b) * dz,
            qz,
            0.0,
            0.0,
            0.0,
            1.0,
        );
    }

    Matrix4::new(
        dx, 0.0, 0.0, 0.0, //
        0.0, dy, 0.0, 0.0, //
        0.0, 0.0, dz, 0.0, //
        0.0, 0.0, 0.0, 1.0,
    )
}

/// 3D MRI nii 文件 header 的共用属性和部分通用操作.
pub trait NiftiHeaderAttr {
    /// 获取 header 部分.
    fn header(&self) -> &NiftiHeader;

    /// 获取数据形状大小 (x, y, z).
    #[inline]
    fn shape(&self) -> Idx3d {
        get_shape_from_header(self.header())
    }

    /// voxel-to-world 仿射矩阵.
    #[inline]
    fn affine(&self) -> Matrix4<f64> {
        voxel_to_world(self.header())
    }

    /// 与 `other` 是否处于同一网格 (形状相同, 仿射矩阵在 `tol` 内一致)?
    fn same_grid<H: NiftiHeaderAttr>(&self, other: &H, tol: f64) -> bool {
        self.shape() == other.shape() && (self.affine() - other.affine()).amax() <= tol
    }
}

impl NiftiHeaderAttr for NiftiHeader {
    #[inline]
    fn header(&self) -> &NiftiHeader {
        self
    }
}

/// 只读取 `path` 处 nifti 文件的 header, 不加载体素数据.
pub fn read_header<P: AsRef<Path>>(path: P) -> PipelineResult<NiftiHeader> {
    let path = path.as_ref();
    NiftiHeader::from_file(path).map_err(PipelineError::nifti(path))
}

/// 将可能为 4D 的数组降为 3D. 第四维长度必须为 1.
fn squeeze_to_3d<T>(data: ArrayD<T>, path: &Path) -> PipelineResult<Array3<T>> {
    let data = match data.ndim() {
        4 if data.shape()[3] == 1 => data.index_axis_move(Axis(3), 0),
        _ => data,
    };
    data.into_dimensionality::<Ix3>().map_err(|e| {
        PipelineError::input(
            format!("volume is not reducible to 3-D ({e})"),
            vec![path.display().to_string()],
        )
    })
}

/// 为体数据类型生成 header 访问, 索引访问, 读写等共用实现.
macro_rules! impl_volume {
    ($volume: ident, $elem: ty) => {
        impl NiftiHeaderAttr for $volume {
            #[inline]
            fn header(&self) -> &NiftiHeader {
                &self.header
            }
        }

        impl Index<Idx3d> for $volume {
            type Output = $elem;

            #[inline]
            fn index(&self, index: Idx3d) -> &Self::Output {
                &self.data[index]
            }
        }

        impl IndexMut<Idx3d> for $volume {
            #[inline]
            fn index_mut(&mut self, index: Idx3d) -> &mut Self::Output {
                &mut self.data[index]
            }
        }

        impl $volume {
            /// 以 `header` 为参考, 直接由数据创建实体.
            ///
            /// `data` 按照 nifti 惯用标准以 \[x, y, z\] 格式组织.
            pub fn from_parts(header: &NiftiHeader, data: Array3<$elem>) -> Self {
                let mut header = Box::new(header.clone());
                let (x, y, z) = data.dim();
                header.dim = [3, x as u16, y as u16, z as u16, 1, 1, 1, 1];
                Self { header, data }
            }

            /// 将数据写入 `path`. 以 `.gz` 结尾时自动压缩.
            pub fn save<P: AsRef<Path>>(&self, path: P) -> PipelineResult<()> {
                let path = path.as_ref();
                // 体素值已经是物理值, 写出时不再缩放.
                let mut header = self.header.clone();
                header.scl_slope = 1.0;
                header.scl_inter = 0.0;
                WriterOptions::new(path)
                    .reference_header(&header)
                    .write_nifti(&self.data)
                    .map_err(PipelineError::nifti(path))
            }

            /// 获得数据的一份不可变 shallow copy.
            #[inline]
            pub fn data(&self) -> ArrayView<'_, $elem, Ix3> {
                self.data.view()
            }

            /// 获得数据的一份可变 shallow copy.
            #[inline]
            pub fn data_mut(&mut self) -> ArrayViewMut<'_, $elem, Ix3> {
                self.data.view_mut()
            }

            /// 消费自身, 获得底层数据.
            #[inline]
            pub fn into_data(self) -> Array3<$elem> {
                self.data
            }
        }
    };
}

/// nii 格式 3D MRI 扫描, 包括 header 和体素强度. 强度以 `f32` 保存.
#[derive(Debug, Clone)]
pub struct MriScan {
    header: BoxedHeader,
    data: Array3<f32>,
}

impl_volume!(MriScan, f32);

impl MriScan {
    /// 打开 nii 文件格式的 3D MRI 扫描. `path` 为 nii 文件的本地路径.
    ///
    /// 4D 扫描会沿第四维求平均, 降为 3D.
    pub fn open<P: AsRef<Path>>(path: P) -> PipelineResult<Self> {
        let path = path.as_ref();
        let obj = ReaderOptions::new()
            .read_file(path)
            .map_err(PipelineError::nifti(path))?;
        let header = Box::new(obj.header().clone());
        let data = obj
            .into_volume()
            .into_ndarray::<f32>()
            .map_err(PipelineError::nifti(path))?;

        let data = match data.ndim() {
            4 if data.shape()[3] > 1 => {
                warn!(
                    "{} has {} frames, averaging them over time",
                    path.display(),
                    data.shape()[3]
                );
                data.mean_axis(Axis(3)).ok_or_else(|| {
                    PipelineError::input("empty fourth dimension", vec![path.display().to_string()])
                })?
            }
            _ => data,
        };
        let data = squeeze_to_3d(data, path)?;
        Ok(Self { header, data })
    }
}

/// nii 格式 3D 多标签分割, 包括 header 和标签. 标签值以 `u16` 保存.
#[derive(Debug, Clone)]
pub struct MriLabel {
    header: BoxedHeader,
    data: Array3<u16>,
}

impl_volume!(MriLabel, u16);

impl MriLabel {
    /// 打开 nii 文件格式的 3D 分割. `path` 为 nii 文件的本地路径.
    pub fn open<P: AsRef<Path>>(path: P) -> PipelineResult<Self> {
        let path = path.as_ref();
        let obj = ReaderOptions::new()
            .read_file(path)
            .map_err(PipelineError::nifti(path))?;
        let header = Box::new(obj.header().clone());
        let data = obj
            .into_volume()
            .into_ndarray::<u16>()
            .map_err(PipelineError::nifti(path))?;
        let data = squeeze_to_3d(data, path)?;
        Ok(Self { header, data })
    }

    /// 获取 3D 分割中值为 `label` 的体素个数.
    #[inline]
    pub fn count(&self, label: u16) -> usize {
        self.data.iter().filter(|p| **p == label).count()
    }
}

/// nii 格式 3D 二值 / 左右半球掩膜. 体素值以 `u8` 保存.
#[derive(Debug, Clone)]
pub struct MriMask {
    header: BoxedHeader,
    data: Array3<u8>,
}

impl_volume!(MriMask, u8);

impl MriMask {
    /// 打开 nii 文件格式的 3D 掩膜. `path` 为 nii 文件的本地路径.
    pub fn open<P: AsRef<Path>>(path: P) -> PipelineResult<Self> {
        let path = path.as_ref();
        let obj = ReaderOptions::new()
            .read_file(path)
            .map_err(PipelineError::nifti(path))?;
        let header = Box::new(obj.header().clone());
        let data = obj
            .into_volume()
            .into_ndarray::<u8>()
            .map_err(PipelineError::nifti(path))?;
        let data = squeeze_to_3d(data, path)?;
        Ok(Self { header, data })
    }

    /// 获取掩膜中值为 `value` 的体素个数.
    #[inline]
    pub fn count(&self, value: u8) -> usize {
        self.data.iter().filter(|p| **p == value).count()
    }

    /// 获取掩膜中非背景体素个数.
    #[inline]
    pub fn foreground_count(&self) -> usize {
        self.data.iter().filter(|p| **p != LR_BACKGROUND).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array3;

    fn f64_eq(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-6
    }

    #[test]
    fn test_affine_falls_back_to_pixdim() {
        let mut h = NiftiHeader::default();
        h.sform_code = 0;
        h.qform_code = 0;
        h.pixdim = [1.0, 2.0, 3.0, 4.0, 1.0, 1.0, 1.0, 1.0];
        let m = voxel_to_world(&h);
        assert!(f64_eq(m[(0, 0)], 2.0));
        assert!(f64_eq(m[(1, 1)], 3.0));
        assert!(f64_eq(m[(2, 2)], 4.0));
        assert!(f64_eq(m[(3, 3)], 1.0));
    }

    #[test]
    fn test_affine_prefers_sform() {
        let mut h = NiftiHeader::default();
        h.sform_code = 1;
        h.srow_x = [1.0, 0.0, 0.0, -90.0];
        h.srow_y = [0.0, 1.0, 0.0, -126.0];
        h.srow_z = [0.0, 0.0, 1.0, -72.0];
        let m = voxel_to_world(&h);
        assert!(f64_eq(m[(0, 3)], -90.0));
        assert!(f64_eq(m[(1, 3)], -126.0));
        assert!(f64_eq(m[(2, 3)], -72.0));
    }

    #[test]
    fn test_label_save_and_open() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("seg.nii.gz");

        let mut data = Array3::<u16>::zeros((4, 5, 6));
        data[(1, 2, 3)] = 41;
        data[(3, 4, 5)] = 2;
        let label = MriLabel::from_parts(&NiftiHeader::default(), data);
        label.save(&path).unwrap();

        let back = MriLabel::open(&path).unwrap();
        assert_eq!(back.shape(), (4, 5, 6));
        assert_eq!(back[(1, 2, 3)], 41);
        assert_eq!(back[(3, 4, 5)], 2);
        assert_eq!(back.count(0), 4 * 5 * 6 - 2);
    }

    #[test]
    fn test_open_averages_frames() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bold.nii.gz");

        let mut data = ndarray::Array4::<f32>::from_elem((3, 4, 5, 2), 1.0);
        data.index_axis_mut(Axis(3), 1).fill(3.0);
        WriterOptions::new(&path)
            .reference_header(&NiftiHeader::default())
            .write_nifti(&data)
            .unwrap();

        let scan = MriScan::open(&path).unwrap();
        assert_eq!(scan.shape(), (3, 4, 5));
        assert!(scan.data().iter().all(|v| f64_eq(*v as f64, 2.0)));
    }
}
