//! Kochanek (TCB) 样条。
//!
//! 参数固定为张力 0、偏置 0、连续性 -1，两端约束为二阶导数等于 0，
//! 与 ITK-SNAP 的强度曲线编辑器一致。

use super::RenderError;

const TENSION: f64 = 0.0;
const BIAS: f64 = 0.0;
const CONTINUITY: f64 = -1.0;

/// 一维 Kochanek 样条 `y = f(x)`。
#[derive(Clone, Debug)]
pub struct KochanekSpline {
    x: Vec<f64>,
    y: Vec<f64>,
    /// 每个控制点的出切线与入切线。
    out_tangent: Vec<f64>,
    in_tangent: Vec<f64>,
}

impl KochanekSpline {
    /// 由控制点构建样条。控制点按 `x` 排序；`x` 相同的点只保留最后一个。
    pub fn new(points: &[(f64, f64)]) -> Result<Self, RenderError> {
        if points.is_empty() {
            return Err(RenderError::ControlPoints("at least one control point is required".to_string()));
        }
        if points.iter().any(|(x, y)| !x.is_finite() || !y.is_finite()) {
            return Err(RenderError::ControlPoints("control points must be finite".to_string()));
        }
        let mut sorted = points.to_vec();
        sorted.sort_by(|a, b| a.0.total_cmp(&b.0));
        let mut x: Vec<f64> = Vec::with_capacity(sorted.len());
        let mut y: Vec<f64> = Vec::with_capacity(sorted.len());
        for (px, py) in sorted {
            if let (Some(&last_x), Some(last_y)) = (x.last(), y.last_mut()) {
                if last_x == px {
                    *last_y = py;
                    continue;
                }
            }
            x.push(px);
            y.push(py);
        }

        let (out_tangent, in_tangent) = tangents(&x, &y);
        Ok(Self {
            x,
            y,
            out_tangent,
            in_tangent,
        })
    }

    /// 控制点 `x` 的最小值与最大值。
    #[inline]
    pub fn range(&self) -> (f64, f64) {
        (self.x[0], self.x[self.x.len() - 1])
    }

    /// 求 `t` 处的值。范围外的 `t` 截断到两端。
    pub fn evaluate(&self, t: f64) -> f64 {
        let n = self.x.len();
        if n == 1 {
            return self.y[0];
        }
        let (lo, hi) = self.range();
        let t = t.clamp(lo, hi);
        let i = self.x.partition_point(|&v| v <= t).clamp(1, n - 1) - 1;

        let h = self.x[i + 1] - self.x[i];
        let u = (t - self.x[i]) / h;
        let (p0, p1) = (self.y[i], self.y[i + 1]);
        let (d0, d1) = (self.out_tangent[i], self.in_tangent[i + 1]);

        let c2 = -3.0 * p0 + 3.0 * p1 - 2.0 * d0 - d1;
        let c3 = 2.0 * p0 - 2.0 * p1 + d0 + d1;
        ((c3 * u + c2) * u + d0) * u + p0
    }
}

/// 计算各控制点的出/入切线，以段参数 `u ∈ [0, 1]` 为单位。
fn tangents(x: &[f64], y: &[f64]) -> (Vec<f64>, Vec<f64>) {
    let n = x.len();
    let mut out_t = vec![0.0; n];
    let mut in_t = vec![0.0; n];
    if n < 2 {
        return (out_t, in_t);
    }
    if n == 2 {
        let d = y[1] - y[0];
        return (vec![d; 2], vec![d; 2]);
    }

    for i in 1..(n - 1) {
        let cs = y[i] - y[i - 1];
        let cd = y[i + 1] - y[i];
        let incoming = cs * ((1.0 - TENSION) * (1.0 - CONTINUITY) * (1.0 + BIAS)) / 2.0
            + cd * ((1.0 - TENSION) * (1.0 + CONTINUITY) * (1.0 - BIAS)) / 2.0;
        let outgoing = cs * ((1.0 - TENSION) * (1.0 + CONTINUITY) * (1.0 + BIAS)) / 2.0
            + cd * ((1.0 - TENSION) * (1.0 - CONTINUITY) * (1.0 - BIAS)) / 2.0;
        // 非均匀节点间距的修正。
        let n0 = x[i] - x[i - 1];
        let n1 = x[i + 1] - x[i];
        in_t[i] = incoming * (2.0 * n0 / (n0 + n1));
        out_t[i] = outgoing * (2.0 * n1 / (n0 + n1));
    }

    // 两端二阶导数为 0。
    out_t[0] = (6.0 * (y[1] - y[0]) - 2.0 * in_t[1]) / 4.0;
    in_t[0] = out_t[0];
    let last = n - 1;
    in_t[last] = (6.0 * (y[last] - y[last - 1]) - 2.0 * out_t[last - 1]) / 4.0;
    out_t[last] = in_t[last];

    (out_t, in_t)
}
