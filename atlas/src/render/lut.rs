//! 颜色查找表。
//!
//! 预设颜色映射作用在窗位窗宽归一化之后的 `[0, 1]` 强度上；样条查找表直接作用在原始强度上。

use super::spline::KochanekSpline;
use super::RenderError;

/// 各分量在 `[0, 1]` 内的 RGB 颜色。
pub type Rgb = [f64; 3];

const BLACK: Rgb = [0.0, 0.0, 0.0];
const WHITE: Rgb = [1.0, 1.0, 1.0];

/// 样条查找表的表项个数。
pub const SPLINE_TABLE_SIZE: usize = 2048;

/// 分段线性的颜色传递函数。
///
/// 开启截断 (clamping) 时，控制点范围以外的值取两端颜色；关闭时取越界颜色，
/// 未设置越界颜色则为黑色。
#[derive(Clone, Debug, PartialEq)]
pub struct ColorTransferFunction {
    points: Vec<(f64, Rgb)>,
    clamping: bool,
    below: Option<Rgb>,
    above: Option<Rgb>,
}

impl Default for ColorTransferFunction {
    fn default() -> Self {
        Self::new()
    }
}

impl ColorTransferFunction {
    #[inline]
    pub fn new() -> Self {
        Self {
            points: Vec::new(),
            clamping: true,
            below: None,
            above: None,
        }
    }

    /// 添加控制点。同一位置的控制点会被替换。
    pub fn add_rgb_point(mut self, x: f64, rgb: Rgb) -> Self {
        match self.points.binary_search_by(|(px, _)| px.total_cmp(&x)) {
            Ok(i) => self.points[i].1 = rgb,
            Err(i) => self.points.insert(i, (x, rgb)),
        }
        self
    }

    #[inline]
    pub fn clamping(mut self, on: bool) -> Self {
        self.clamping = on;
        self
    }

    #[inline]
    pub fn below_range_color(mut self, rgb: Rgb) -> Self {
        self.below = Some(rgb);
        self
    }

    #[inline]
    pub fn above_range_color(mut self, rgb: Rgb) -> Self {
        self.above = Some(rgb);
        self
    }

    /// 控制点覆盖的强度范围。
    pub fn range(&self) -> Option<(f64, f64)> {
        Some((self.points.first()?.0, self.points.last()?.0))
    }

    /// 求 `x` 处的颜色。
    pub fn color(&self, x: f64) -> Rgb {
        let Some((lo, hi)) = self.range() else {
            return BLACK;
        };
        if x < lo {
            return match (self.clamping, self.below) {
                (_, Some(c)) if !self.clamping => c,
                (true, _) => self.points[0].1,
                _ => BLACK,
            };
        }
        if x > hi {
            return match (self.clamping, self.above) {
                (_, Some(c)) if !self.clamping => c,
                (true, _) => self.points[self.points.len() - 1].1,
                _ => BLACK,
            };
        }
        let i = self.points.partition_point(|(px, _)| *px <= x);
        if i == 0 {
            return self.points[0].1;
        }
        if i == self.points.len() {
            return self.points[i - 1].1;
        }
        let (x0, c0) = self.points[i - 1];
        let (x1, c1) = self.points[i];
        let t = if x1 > x0 { (x - x0) / (x1 - x0) } else { 1.0 };
        [
            c0[0] + (c1[0] - c0[0]) * t,
            c0[1] + (c1[1] - c0[1]) * t,
            c0[2] + (c1[2] - c0[2]) * t,
        ]
    }
}

/// 白到黑的反色映射。
pub fn inverse() -> ColorTransferFunction {
    linear(WHITE, BLACK)
}

/// 两种颜色之间的线性映射。
pub fn linear(min_color: Rgb, max_color: Rgb) -> ColorTransferFunction {
    ColorTransferFunction::new()
        .add_rgb_point(0.0, min_color)
        .add_rgb_point(1.0, max_color)
        .clamping(true)
}

/// 热力图，低于 0.3 的部分为黑色。
pub fn hot() -> ColorTransferFunction {
    ColorTransferFunction::new()
        .add_rgb_point(0.0, BLACK)
        .add_rgb_point(0.3, BLACK)
        .add_rgb_point(0.35, [0.847, 0.0, 0.0])
        .add_rgb_point(0.44, [1.0, 0.227, 0.0])
        .add_rgb_point(0.76, [1.0, 1.0, 0.0])
        .add_rgb_point(1.0, WHITE)
        .clamping(false)
        .below_range_color(WHITE)
        .above_range_color(WHITE)
}

pub fn jet() -> ColorTransferFunction {
    ColorTransferFunction::new()
        .add_rgb_point(0.0, [0.0, 0.0, 0.5])
        .add_rgb_point(0.1, [0.0, 0.0, 1.0])
        .add_rgb_point(0.4, [0.0, 1.0, 1.0])
        .add_rgb_point(0.6, [1.0, 1.0, 0.0])
        .add_rgb_point(0.9, [1.0, 0.0, 0.0])
        .add_rgb_point(1.0, [0.5, 0.0, 0.0])
        .clamping(false)
        .below_range_color(WHITE)
        .above_range_color(WHITE)
}

/// 背景为白色的 jet 映射。
pub fn jet_with_white_background() -> ColorTransferFunction {
    ColorTransferFunction::new()
        .add_rgb_point(0.0, WHITE)
        .add_rgb_point(0.4, [0.0, 1.0, 1.0])
        .add_rgb_point(0.6, [1.0, 1.0, 0.0])
        .add_rgb_point(0.9, [1.0, 0.0, 0.0])
        .add_rgb_point(1.0, [0.5, 0.0, 0.0])
        .clamping(true)
}

/// 在 `[min, max]` 上线性分布表项的查找表。范围外的值取两端表项。
#[derive(Clone, Debug, PartialEq)]
pub struct LookupTable {
    table: Vec<Rgb>,
    min: f64,
    max: f64,
}

impl LookupTable {
    /// `table` 不能为空。
    pub fn new(table: Vec<Rgb>, min: f64, max: f64) -> Option<Self> {
        if table.is_empty() || !(min.is_finite() && max.is_finite()) || max < min {
            return None;
        }
        Some(Self { table, min, max })
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.table.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    #[inline]
    pub fn range(&self) -> (f64, f64) {
        (self.min, self.max)
    }

    pub fn color(&self, v: f64) -> Rgb {
        let n = self.table.len();
        if v.is_nan() || self.max <= self.min {
            return self.table[0];
        }
        let i = ((v - self.min) / (self.max - self.min) * n as f64).floor();
        self.table[i.clamp(0.0, (n - 1) as f64) as usize]
    }
}

/// 用 Kochanek 样条把强度重新映射后再上色。
///
/// 样条穿过 `control_points` 中的 `(强度, 映射值)`，映射值再经 `colors` 上色，
/// 没有 `colors` 时为灰度。查找表覆盖控制点强度的最小值到最大值。
///
/// 第 `i` 个表项取样条在 `min + i * dt` 处的值 (`dt = (max - min) / (n - 1)`)，
/// 即从最小控制点而不是从 0 开始，表项与其覆盖的强度一一对应。
pub fn spline_color_map(
    control_points: &[(f64, f64)],
    colors: Option<&ColorMap>,
) -> Result<LookupTable, RenderError> {
    let spline = KochanekSpline::new(control_points)?;
    let (min, max) = spline.range();
    let n = SPLINE_TABLE_SIZE;
    let dt = (max - min) / (n - 1) as f64;
    let table = (0..n)
        .map(|i| {
            let s = spline.evaluate(min + dt * i as f64);
            match colors {
                Some(c) => c.rgb(s),
                None => [s, s, s],
            }
        })
        .collect();
    LookupTable::new(table, min, max)
        .ok_or_else(|| RenderError::ControlPoints("control points must be finite".to_string()))
}

/// 由 `--colors` 参数得到的颜色映射。
#[derive(Clone, Debug, PartialEq)]
pub enum ColorMap {
    Grey,
    Transfer(ColorTransferFunction),
    Table(LookupTable),
}

impl ColorMap {
    /// 解析预设名 (`grey`、`jet`、`jet+white`、`hot`、`inverse`)，
    /// 或以空白分隔的六个浮点数 (最小值 RGB 与最大值 RGB)。
    pub fn parse(s: &str) -> Result<Self, RenderError> {
        match s.trim() {
            "grey" | "gray" => Ok(ColorMap::Grey),
            "jet" => Ok(ColorMap::Transfer(jet())),
            "jet+white" => Ok(ColorMap::Transfer(jet_with_white_background())),
            "hot" => Ok(ColorMap::Transfer(hot())),
            "inverse" => Ok(ColorMap::Transfer(inverse())),
            other => {
                let values = other
                    .split_whitespace()
                    .map(|v| v.parse::<f64>())
                    .collect::<Result<Vec<_>, _>>()
                    .map_err(|_| RenderError::Colors(s.to_string()))?;
                match values.as_slice() {
                    &[r0, g0, b0, r1, g1, b1] => {
                        Ok(ColorMap::Transfer(linear([r0, g0, b0], [r1, g1, b1])))
                    }
                    _ => Err(RenderError::Colors(s.to_string())),
                }
            }
        }
    }

    /// 将 `[0, 1]` 归一化强度映射为颜色。
    pub fn rgb(&self, s: f64) -> Rgb {
        match self {
            ColorMap::Grey => {
                let g = s.clamp(0.0, 1.0);
                [g, g, g]
            }
            ColorMap::Transfer(f) => f.color(s),
            ColorMap::Table(t) => t.color(s),
        }
    }
}
