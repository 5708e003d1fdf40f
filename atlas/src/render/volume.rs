use super::transform::Affine;
use super::RenderError;
use ndarray::{Array3, ArrayView3, Axis, Ix3};
use nifti::{IntoNdArray, NiftiObject, ReaderOptions};
use std::path::Path;

/// 三维体数据及其 qform 方向矩阵。数据按 `[x, y, z]` 索引，读入后不再修改。
#[derive(Debug, Clone)]
pub struct Volume {
    data: Array3<f32>,
    qform: Affine,
}

impl Volume {
    #[inline]
    pub fn new(data: Array3<f32>, qform: Affine) -> Self {
        Self { data, qform }
    }

    /// 读取 NIfTI 文件 (`.nii` 或 `.nii.gz`)。四维图像只取第一帧，二维图像视为只有一层。
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, RenderError> {
        let path = path.as_ref();
        let read_err = |source| RenderError::Read {
            path: path.to_path_buf(),
            source,
        };
        let obj = ReaderOptions::new().read_file(path).map_err(read_err)?;
        let qform = Affine::from_qform(obj.header());

        let mut data = obj.into_volume().into_ndarray::<f32>().map_err(read_err)?;
        while data.ndim() > 3 {
            let last = data.ndim() - 1;
            data = data.index_axis_move(Axis(last), 0);
        }
        while data.ndim() < 3 {
            let next = data.ndim();
            data = data.insert_axis(Axis(next));
        }
        let data = data
            .into_dimensionality::<Ix3>()
            .map_err(|e| RenderError::Shape(format!("`{}`: {e}", path.display())))?;

        tracing::debug!(
            "read `{}`: dims {:?}, spacing [{:.3}, {:.3}, {:.3}]",
            path.display(),
            data.shape(),
            qform.spacing(0),
            qform.spacing(1),
            qform.spacing(2)
        );
        Ok(Self { data, qform })
    }

    #[inline]
    pub fn data(&self) -> ArrayView3<'_, f32> {
        self.data.view()
    }

    #[inline]
    pub fn qform(&self) -> &Affine {
        &self.qform
    }

    /// 三个轴上的体素个数。
    #[inline]
    pub fn dims(&self) -> [usize; 3] {
        let s = self.data.shape();
        [s[0], s[1], s[2]]
    }

    /// 中心体素索引，即各维度整除 2。
    #[inline]
    pub fn center_index(&self) -> [usize; 3] {
        self.dims().map(|d| d / 2)
    }

    /// 有限值体素的最小、最大强度。没有有限值时返回 `None`。
    pub fn intensity_range(&self) -> Option<(f32, f32)> {
        self.data
            .iter()
            .copied()
            .filter(|v| v.is_finite())
            .fold(None, |acc, v| match acc {
                None => Some((v, v)),
                Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
            })
    }

    /// 体素 `[x, y, z]` 的强度。
    #[inline]
    pub fn at(&self, x: usize, y: usize, z: usize) -> f32 {
        self.data[(x, y, z)]
    }
}
