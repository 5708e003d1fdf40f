use super::utils::{color_map, finite_f64, interpolation, non_negative_f64, slice_axis};
use anyhow::{bail, Context};
use atlas::render::{
    auto_level_window, spline_color_map, ColorMap, Interpolation, LevelWindow, OutputNaming,
    Size, SliceAxis, SliceView, Volume,
};
use clap::{ArgAction, Args};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Args, Debug)]
pub struct TakeScreenshots {
    /// 输入的NIfTI图像 (`.nii`或`.nii.gz`)。
    image: PathBuf,
    /// 输出文件。截取多张切片时作为文件名前缀。
    output: String,
    /// 文件名后缀，可以带扩展名。
    postfix: Option<String>,
    /// 切片序号，可重复。默认为图像中心。
    #[arg(short = 'i', long = "index", action = ArgAction::Append, allow_negative_numbers = true)]
    indices: Vec<i64>,
    /// 切片法向：0 矢状面，1 冠状面，2 横断面。可重复，与`--index`一一对应。
    #[arg(short = 'u', long = "up", action = ArgAction::Append, value_parser = slice_axis)]
    zdirs: Vec<SliceAxis>,
    /// 输出图像边长，0 表示使用切片的体素个数。
    #[arg(short = 's', long = "size", default_value_t = 0)]
    size: u32,
    /// 窗位。
    #[arg(short = 'l', long = "level", value_parser = finite_f64, allow_negative_numbers = true)]
    level: Option<f64>,
    /// 窗宽。
    #[arg(short = 'w', long = "window", value_parser = non_negative_f64)]
    window: Option<f64>,
    /// 插值方式 (`nearest`或`linear`)。
    #[arg(long = "interp", default_value = "nearest", value_parser = interpolation)]
    interp: Interpolation,
    /// 强度映射曲线的控制点`X Y`，可重复。
    #[arg(
        long = "map",
        num_args = 2,
        value_names = ["X", "Y"],
        action = ArgAction::Append,
        value_parser = finite_f64,
        allow_negative_numbers = true
    )]
    map: Vec<f64>,
    /// 颜色表：`grey`、`jet`、`jet+white`、`hot`、`inverse`，或六个浮点数 (最小值与最大值的RGB)。
    #[arg(long = "colors", default_value = "grey", value_parser = color_map)]
    colors: ColorMap,
}

/// 一张待截取的切片。
#[derive(Debug, PartialEq)]
struct Shot {
    index: [usize; 3],
    axis: SliceAxis,
    path: PathBuf,
}

impl TakeScreenshots {
    pub fn run(&mut self) -> anyhow::Result<()> {
        let volume = Volume::open(&self.image)
            .with_context(|| format!("无法读取图像`{}`", self.image.display()))?;
        let colors = self.color_map()?;
        let level_window = LevelWindow::resolve(self.level, self.window, || auto_level_window(&volume));
        info!(
            "窗位 {:.2}，窗宽 {:.2}",
            level_window.level(),
            level_window.window()
        );

        let shots = self.plan(volume.dims())?;
        if let Some(first) = shots.first() {
            create_parent(&first.path)?;
        }
        for shot in shots {
            let view = SliceView {
                index: shot.index,
                axis: shot.axis,
                size: Size::square(self.size),
                level_window,
                interpolation: self.interp,
                colors: &colors,
            };
            view.save(&volume, &shot.path)?;
            info!("已保存`{}`", shot.path.display());
        }
        Ok(())
    }

    /// 给出`--map`时，用样条曲线把强度映射后再上色。
    fn color_map(&self) -> anyhow::Result<ColorMap> {
        if self.map.is_empty() {
            return Ok(self.colors.clone());
        }
        let points: Vec<(f64, f64)> = self.map.chunks_exact(2).map(|p| (p[0], p[1])).collect();
        let colors = match self.colors {
            ColorMap::Grey => None,
            ref other => Some(other),
        };
        Ok(ColorMap::Table(spline_color_map(&points, colors)?))
    }

    /// 计算每张切片经过的体素与输出路径。
    ///
    /// 第`n`个序号使用第`n`个法向，法向不足时沿用最后一个。横断面序号从上往下数。
    fn plan(&self, dims: [usize; 3]) -> anyhow::Result<Vec<Shot>> {
        let zdirs = if self.zdirs.is_empty() {
            vec![SliceAxis::Axial]
        } else {
            self.zdirs.clone()
        };
        let center = dims.map(|d| d / 2);
        let indices = if self.indices.is_empty() {
            vec![center[zdirs[0].zdir()] as i64]
        } else {
            self.indices.clone()
        };

        let postfix = self.postfix.as_deref().unwrap_or("");
        let naming = OutputNaming::new(&self.output, postfix);
        let multiple = indices.len() > 1;

        let mut shots = Vec::with_capacity(indices.len());
        for (n, &i) in indices.iter().enumerate() {
            let axis = zdirs.get(n).or_else(|| zdirs.last()).copied().unwrap_or(SliceAxis::Axial);
            let zdir = axis.zdir();
            let len = dims[zdir] as i64;
            let slice = if axis == SliceAxis::Axial { len - i - 1 } else { i };
            if !(0..len).contains(&slice) {
                bail!("{axis} slice index {i} out of range [0, {len})");
            }
            let mut index = center;
            index[zdir] = slice as usize;
            shots.push(Shot {
                index,
                axis,
                path: naming.path(axis, i, multiple),
            });
        }
        Ok(shots)
    }
}

fn create_parent(path: &Path) -> anyhow::Result<()> {
    match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() && !dir.is_dir() => fs::create_dir_all(dir)
            .with_context(|| format!("无法创建目录`{}`", dir.display())),
        _ => Ok(()),
    }
}
