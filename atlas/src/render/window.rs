use super::volume::Volume;

/// 显示窗口，包含窗位 (level) 和窗宽 (window)。
///
/// 该窗口是只读的。若要修改窗口参数，应创建新的实例。
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct LevelWindow {
    level: f64,
    window: f64,
}

impl LevelWindow {
    /// 按原样保存用户给出的窗位和窗宽。
    #[inline]
    pub const fn new(level: f64, window: f64) -> Self {
        Self { level, window }
    }

    /// 窗位。
    #[inline]
    pub fn level(&self) -> f64 {
        self.level
    }

    /// 窗宽。
    #[inline]
    pub fn window(&self) -> f64 {
        self.window
    }

    /// 窗下限。
    #[inline]
    pub fn lower(&self) -> f64 {
        self.level - self.window / 2.0
    }

    /// 窗上限。
    #[inline]
    pub fn upper(&self) -> f64 {
        self.level + self.window / 2.0
    }

    /// 将强度线性映射到 `[0, 1]`，窗外的值截断。
    ///
    /// 窗宽不为正时退化为以窗位为阈值的二值映射。`v` 无意义 (NaN) 时返回 `None`。
    pub fn normalize(&self, v: f64) -> Option<f64> {
        if v.is_nan() {
            return None;
        }
        if self.window <= 0.0 {
            return Some(if v >= self.level { 1.0 } else { 0.0 });
        }
        Some(((v - self.lower()) / self.window).clamp(0.0, 1.0))
    }

    /// 合并用户给出的窗位/窗宽与自动窗口。
    ///
    /// 两者都给出时直接使用；否则使用 `auto` 计算的窗口，并用给出的那一个覆盖对应的值。
    pub fn resolve<F>(level: Option<f64>, window: Option<f64>, auto: F) -> Self
    where
        F: FnOnce() -> LevelWindow,
    {
        match (level, window) {
            (Some(level), Some(window)) => Self::new(level, window),
            (level, window) => {
                let lw = auto();
                Self::new(level.unwrap_or(lw.level), window.unwrap_or(lw.window))
            }
        }
    }
}

/// 自动窗口的强度分位数。
const AUTO_PERCENTILES: (f64, f64) = (0.01, 0.99);

/// 根据体数据强度分布计算显示窗口：取所有有限值体素的第 1 至第 99 百分位。
///
/// 百分位区间为空时使用完整强度范围；常数图像使用宽度为 1 的窗口。
pub fn auto_level_window(volume: &Volume) -> LevelWindow {
    let mut values: Vec<f32> = volume
        .data()
        .iter()
        .copied()
        .filter(|v| v.is_finite())
        .collect();
    if values.is_empty() {
        return LevelWindow::new(0.5, 1.0);
    }
    values.sort_unstable_by(f32::total_cmp);

    let pick = |q: f64| values[((values.len() - 1) as f64 * q).round() as usize] as f64;
    let (mut lo, mut hi) = (pick(AUTO_PERCENTILES.0), pick(AUTO_PERCENTILES.1));
    if hi <= lo {
        lo = values[0] as f64;
        hi = values[values.len() - 1] as f64;
    }
    if hi <= lo {
        return LevelWindow::new(lo, 1.0);
    }
    LevelWindow::new((lo + hi) / 2.0, hi - lo)
}
