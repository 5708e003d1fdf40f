//! 从体数据中截取二维切片并重采样到输出尺寸。

use super::volume::Volume;
use super::RenderError;
use ndarray::Array2;
use std::fmt;
use std::str::FromStr;

/// 切片的法向轴。数值即体素轴序号 (`--up` 参数)。
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum SliceAxis {
    Sagittal = 0,
    Coronal = 1,
    Axial = 2,
}

impl SliceAxis {
    #[inline]
    pub fn from_index(zdir: usize) -> Option<Self> {
        match zdir {
            0 => Some(SliceAxis::Sagittal),
            1 => Some(SliceAxis::Coronal),
            2 => Some(SliceAxis::Axial),
            _ => None,
        }
    }

    /// 法向轴的体素轴序号。
    #[inline]
    pub fn zdir(self) -> usize {
        self as usize
    }

    /// 切片平面内的水平轴和垂直轴。
    #[inline]
    pub fn slice_axes(self) -> (usize, usize) {
        match self {
            SliceAxis::Sagittal => (1, 2),
            SliceAxis::Coronal => (0, 2),
            SliceAxis::Axial => (0, 1),
        }
    }

    /// 用于输出文件名的名称。
    #[inline]
    pub fn name(self) -> &'static str {
        match self {
            SliceAxis::Sagittal => "sagittal",
            SliceAxis::Coronal => "coronal",
            SliceAxis::Axial => "axial",
        }
    }
}

impl fmt::Display for SliceAxis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// 重采样插值方式。
#[derive(Copy, Clone, Debug, PartialEq, Eq, Default)]
pub enum Interpolation {
    #[default]
    Nearest,
    Linear,
}

impl FromStr for Interpolation {
    type Err = RenderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "nearest" | "nn" => Ok(Interpolation::Nearest),
            "linear" | "bilinear" | "trilinear" => Ok(Interpolation::Linear),
            _ => Err(RenderError::Interpolation(s.to_string())),
        }
    }
}

/// 输出图像尺寸 `(宽, 高)`。为 0 的分量使用切片在该方向上的体素个数。
#[derive(Copy, Clone, Debug, PartialEq, Eq, Default)]
pub struct Size {
    pub width: u32,
    pub height: u32,
}

impl Size {
    #[inline]
    pub const fn square(n: u32) -> Self {
        Self {
            width: n,
            height: n,
        }
    }
}

/// 截取经过体素 `index` 的切片，返回形状为 `(高, 宽)` 的强度矩阵，第 0 行在图像顶端。
///
/// 切片按体素物理尺寸等比缩放并居中放入输出图像，图像以外的像素为 NaN。
/// 水平方向沿该体素轴对应的世界坐标增大方向向右，垂直方向沿世界坐标增大方向向上。
pub fn extract_slice(
    volume: &Volume,
    index: [usize; 3],
    axis: SliceAxis,
    size: Size,
    interp: Interpolation,
) -> Result<Array2<f64>, RenderError> {
    let dims = volume.dims();
    let zdir = axis.zdir();
    if index[zdir] >= dims[zdir] {
        return Err(RenderError::IndexOutOfRange {
            axis: axis.name(),
            index: index[zdir] as i64,
            len: dims[zdir],
        });
    }
    let (xdir, ydir) = axis.slice_axes();
    let (nx, ny) = (dims[xdir], dims[ydir]);
    if nx == 0 || ny == 0 {
        return Err(RenderError::Shape(format!("empty {axis} slice")));
    }

    let width = if size.width > 0 { size.width as usize } else { nx };
    let height = if size.height > 0 { size.height as usize } else { ny };

    let qform = volume.qform();
    let (sx, sy) = (qform.spacing(xdir), qform.spacing(ydir));
    let (_, flip_x) = qform.orientation(xdir);
    let (_, flip_y) = qform.orientation(ydir);
    // 物理尺寸及使其完整放入输出图像的缩放比例 (像素/毫米)。
    let (ex, ey) = (nx as f64 * sx, ny as f64 * sy);
    let scale = (width as f64 / ex).min(height as f64 / ey);

    let mut out = Array2::<f64>::from_elem((height, width), f64::NAN);
    for ((r, c), px) in out.indexed_iter_mut() {
        // 像素中心对应的连续体素坐标。
        let mut u = ((c as f64 + 0.5 - width as f64 / 2.0) / scale + ex / 2.0) / sx - 0.5;
        let mut v = ((height as f64 / 2.0 - r as f64 - 0.5) / scale + ey / 2.0) / sy - 0.5;
        if u < -0.5 || u >= nx as f64 - 0.5 || v < -0.5 || v >= ny as f64 - 0.5 {
            continue;
        }
        if flip_x < 0.0 {
            u = nx as f64 - 1.0 - u;
        }
        if flip_y < 0.0 {
            v = ny as f64 - 1.0 - v;
        }
        *px = sample(volume, index, xdir, ydir, u, v, interp);
    }
    Ok(out)
}

fn sample(
    volume: &Volume,
    index: [usize; 3],
    xdir: usize,
    ydir: usize,
    u: f64,
    v: f64,
    interp: Interpolation,
) -> f64 {
    let dims = volume.dims();
    let voxel = |i: usize, j: usize| {
        let mut p = index;
        p[xdir] = i;
        p[ydir] = j;
        volume.at(p[0], p[1], p[2]) as f64
    };
    let clamp = |x: f64, n: usize| x.max(0.0).min((n - 1) as f64);
    let (u, v) = (clamp(u, dims[xdir]), clamp(v, dims[ydir]));
    match interp {
        Interpolation::Nearest => voxel(u.round() as usize, v.round() as usize),
        Interpolation::Linear => {
            let (i0, j0) = (u.floor() as usize, v.floor() as usize);
            let (i1, j1) = ((i0 + 1).min(dims[xdir] - 1), (j0 + 1).min(dims[ydir] - 1));
            let (fu, fv) = (u - i0 as f64, v - j0 as f64);
            let top = voxel(i0, j0) * (1.0 - fu) + voxel(i1, j0) * fu;
            let bottom = voxel(i0, j1) * (1.0 - fu) + voxel(i1, j1) * fu;
            top * (1.0 - fv) + bottom * fv
        }
    }
}
