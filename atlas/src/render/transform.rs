//! 体素坐标到世界坐标的仿射变换 (qform)。

use nifti::NiftiHeader;

/// 4x4 齐次仿射矩阵，行主序。
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Affine {
    m: [[f64; 4]; 4],
}

impl Default for Affine {
    #[inline]
    fn default() -> Self {
        Self::identity()
    }
}

impl Affine {
    #[inline]
    pub const fn identity() -> Self {
        Self {
            m: [
                [1.0, 0.0, 0.0, 0.0],
                [0.0, 1.0, 0.0, 0.0],
                [0.0, 0.0, 1.0, 0.0],
                [0.0, 0.0, 0.0, 1.0],
            ],
        }
    }

    #[inline]
    const fn from_rows(m: [[f64; 4]; 4]) -> Self {
        Self { m }
    }

    /// 只有缩放的变换。
    pub fn scaling(sx: f64, sy: f64, sz: f64) -> Self {
        let mut a = Self::identity();
        a.m[0][0] = sx;
        a.m[1][1] = sy;
        a.m[2][2] = sz;
        a
    }

    /// 由 NIfTI header 中的四元数字段计算 qform 矩阵。
    ///
    /// `qform_code` 为 0 时没有方向信息，退化为按体素间距缩放。
    pub fn from_qform(h: &NiftiHeader) -> Self {
        let spacing = |v: f32| if v > 0.0 { v as f64 } else { 1.0 };
        let (dx, dy, dz) = (spacing(h.pixdim[1]), spacing(h.pixdim[2]), spacing(h.pixdim[3]));
        if h.qform_code <= 0 {
            return Self::scaling(dx, dy, dz);
        }

        let (b, c, d) = (h.quatern_b as f64, h.quatern_c as f64, h.quatern_d as f64);
        let (a, b, c, d) = match 1.0 - (b * b + c * c + d * d) {
            // 数值误差导致 a^2 略小于 0 时，重新归一化 (b, c, d)。
            r if r < 1e-7 => {
                let n = (b * b + c * c + d * d).sqrt();
                (0.0, b / n, c / n, d / n)
            }
            r => (r.sqrt(), b, c, d),
        };
        let qfac = if h.pixdim[0] < 0.0 { -1.0 } else { 1.0 };
        let dz = dz * qfac;

        Self::from_rows([
            [
                (a * a + b * b - c * c - d * d) * dx,
                2.0 * (b * c - a * d) * dy,
                2.0 * (b * d + a * c) * dz,
                h.quatern_x as f64,
            ],
            [
                2.0 * (b * c + a * d) * dx,
                (a * a + c * c - b * b - d * d) * dy,
                2.0 * (c * d - a * b) * dz,
                h.quatern_y as f64,
            ],
            [
                2.0 * (b * d - a * c) * dx,
                2.0 * (c * d + a * b) * dy,
                (a * a + d * d - b * b - c * c) * dz,
                h.quatern_z as f64,
            ],
            [0.0, 0.0, 0.0, 1.0],
        ])
    }

    /// 体素轴 `axis` 方向上一个体素的物理长度。
    pub fn spacing(&self, axis: usize) -> f64 {
        (0..3).map(|i| self.m[i][axis].powi(2)).sum::<f64>().sqrt()
    }

    /// 体素轴 `axis` 主要对应的世界坐标轴，以及两者方向是否一致 (`+1.0` / `-1.0`)。
    pub fn orientation(&self, axis: usize) -> (usize, f64) {
        let world = (0..3)
            .max_by(|&i, &j| self.m[i][axis].abs().total_cmp(&self.m[j][axis].abs()))
            .unwrap_or(axis);
        let sign = if self.m[world][axis] < 0.0 { -1.0 } else { 1.0 };
        (world, sign)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: [f64; 3], b: [f64; 3]) -> bool {
        a.iter().zip(b.iter()).all(|(x, y)| (x - y).abs() < 1e-9)
    }

    fn apply(a: &Affine, p: [f64; 3]) -> [f64; 3] {
        let mut out = [0.0; 3];
        for (i, o) in out.iter_mut().enumerate() {
            *o = a.m[i][0] * p[0] + a.m[i][1] * p[1] + a.m[i][2] * p[2] + a.m[i][3];
        }
        out
    }

    #[test]
    fn test_orientation_and_spacing() {
        // LPS 风格：x 轴翻转，y/z 轴交换。
        let a = Affine::from_rows([
            [-0.8, 0.0, 0.0, 0.0],
            [0.0, 0.0, 1.2, 0.0],
            [0.0, 2.0, 0.0, 0.0],
            [0.0, 0.0, 0.0, 1.0],
        ]);
        assert_eq!(a.orientation(0), (0, -1.0));
        assert_eq!(a.orientation(1), (2, 1.0));
        assert_eq!(a.orientation(2), (1, 1.0));
        assert!((a.spacing(1) - 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_qform_from_header() {
        let mut h = NiftiHeader::default();
        h.pixdim = [1.0, 2.0, 2.0, 3.0, 0.0, 0.0, 0.0, 0.0];
        h.qform_code = 0;
        assert_eq!(Affine::from_qform(&h), Affine::scaling(2.0, 2.0, 3.0));

        // 绕 z 轴旋转 180 度：四元数 (0, 0, 0, 1)。
        h.qform_code = 1;
        h.quatern_d = 1.0;
        h.quatern_x = 5.0;
        let a = Affine::from_qform(&h);
        assert!(approx(apply(&a, [1.0, 1.0, 1.0]), [3.0, -2.0, 3.0]));

        // qfac = -1 翻转第三个轴。
        h.pixdim[0] = -1.0;
        let a = Affine::from_qform(&h);
        assert!(approx(apply(&a, [0.0, 0.0, 1.0]), [5.0, 0.0, -3.0]));
    }
}
