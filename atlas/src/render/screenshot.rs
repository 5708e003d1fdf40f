//! 切片截图的渲染、保存与输出文件命名。

use super::lut::ColorMap;
use super::slice::{extract_slice, Interpolation, Size, SliceAxis};
use super::volume::Volume;
use super::window::LevelWindow;
use super::RenderError;
use image::{Rgb, RgbImage};
use ndarray::Array2;
use std::path::{Path, PathBuf};

/// 一张切片截图的全部显示参数。
#[derive(Clone, Debug)]
pub struct SliceView<'a> {
    /// 切片经过的体素。
    pub index: [usize; 3],
    pub axis: SliceAxis,
    pub size: Size,
    pub level_window: LevelWindow,
    pub interpolation: Interpolation,
    pub colors: &'a ColorMap,
}

/// 图像以外区域的颜色。
const BACKGROUND: Rgb<u8> = Rgb([0, 0, 0]);

impl SliceView<'_> {
    /// 截取切片并映射为彩色图像。
    pub fn render(&self, volume: &Volume) -> Result<RgbImage, RenderError> {
        let slice = extract_slice(volume, self.index, self.axis, self.size, self.interpolation)?;
        Ok(self.colorize(&slice))
    }

    fn colorize(&self, slice: &Array2<f64>) -> RgbImage {
        let (height, width) = slice.dim();
        let mut buf = RgbImage::new(width as u32, height as u32);
        for ((h, w), &v) in slice.indexed_iter() {
            let pixel = self.color(v).map_or(BACKGROUND, to_rgb8);
            buf.put_pixel(w as u32, h as u32, pixel);
        }
        buf
    }

    /// 样条查找表自带强度范围，不经过窗位窗宽。
    fn color(&self, v: f64) -> Option<[f64; 3]> {
        if v.is_nan() {
            return None;
        }
        match self.colors {
            ColorMap::Table(lut) => Some(lut.color(v)),
            colors => self.level_window.normalize(v).map(|s| colors.rgb(s)),
        }
    }

    /// 渲染并保存到 `path`，图像格式由扩展名决定。
    pub fn save<P: AsRef<Path>>(&self, volume: &Volume, path: P) -> Result<(), RenderError> {
        let path = path.as_ref();
        let img = self.render(volume)?;
        img.save(path).map_err(|source| RenderError::Image {
            path: path.to_path_buf(),
            source,
        })?;
        tracing::debug!(
            "saved {} slice {:?} ({}x{}) to `{}`",
            self.axis,
            self.index,
            img.width(),
            img.height(),
            path.display()
        );
        Ok(())
    }
}

#[inline]
fn to_rgb8(c: [f64; 3]) -> Rgb<u8> {
    let q = |x: f64| (x.clamp(0.0, 1.0) * 255.0).round() as u8;
    Rgb([q(c[0]), q(c[1]), q(c[2])])
}

/// 输出文件命名规则。
///
/// 只截取一张时直接使用给定的输出路径；截取多张时，文件名为
/// `{prefix}-{axis}-{index:03}{postfix}{ext}`。
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OutputNaming {
    output: String,
    prefix: String,
    postfix: String,
    ext: String,
}

impl OutputNaming {
    /// 输出路径没有扩展名时，从 `postfix` 中取扩展名，仍没有则使用 `.png`。
    pub fn new(output: &str, postfix: &str) -> Self {
        let (prefix, ext) = split_ext(output);
        let (mut postfix, mut ext) = (postfix.to_string(), ext.to_string());
        if ext.is_empty() {
            let (p, e) = split_ext(&postfix);
            let (p, e) = (p.to_string(), e.to_string());
            postfix = p;
            ext = if e.is_empty() { ".png".to_string() } else { e };
        }
        if !postfix.is_empty() {
            postfix.insert(0, '-');
        }
        Self {
            output: output.to_string(),
            prefix: prefix.to_string(),
            postfix,
            ext,
        }
    }

    /// 扩展名，包含 `.`。
    #[inline]
    pub fn ext(&self) -> &str {
        &self.ext
    }

    /// 第 `index` 张切片的输出路径。`multiple` 为是否请求了多张切片。
    pub fn path(&self, axis: SliceAxis, index: i64, multiple: bool) -> PathBuf {
        if !multiple {
            return PathBuf::from(&self.output);
        }
        let sep = if self.prefix.is_empty() || self.prefix.ends_with(std::path::is_separator) {
            ""
        } else {
            "-"
        };
        PathBuf::from(format!(
            "{prefix}{sep}{axis}-{index:03}{postfix}{ext}",
            prefix = self.prefix,
            axis = axis.name(),
            postfix = self.postfix,
            ext = self.ext,
        ))
    }
}

/// 按 `os.path.splitext` 的规则拆分扩展名：文件名开头的 `.` 不视为扩展名分隔符。
fn split_ext(p: &str) -> (&str, &str) {
    let sep = p.rfind(std::path::is_separator).map_or(0, |i| i + 1);
    let name = &p[sep..];
    match name.rfind('.') {
        Some(dot) if name[..dot].bytes().any(|b| b != b'.') => {
            (&p[..sep + dot], &p[sep + dot..])
        }
        _ => (p, ""),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::lut;
    use crate::render::transform::Affine;
    use ndarray::Array3;

    #[test]
    fn test_split_ext() {
        assert_eq!(split_ext("out.png"), ("out", ".png"));
        assert_eq!(split_ext("dir/out"), ("dir/out", ""));
        assert_eq!(split_ext("a.b/out"), ("a.b/out", ""));
        assert_eq!(split_ext(".hidden"), (".hidden", ""));
        assert_eq!(split_ext("..x.jpg"), ("..x", ".jpg"));
        assert_eq!(split_ext("img.nii.gz"), ("img.nii", ".gz"));
        assert_eq!(split_ext(""), ("", ""));
    }

    #[test]
    fn test_multiple_outputs() {
        let naming = OutputNaming::new("out.png", "seg");
        assert_eq!(
            naming.path(SliceAxis::Sagittal, 5, true),
            PathBuf::from("out-sagittal-005-seg.png")
        );
        assert_eq!(
            naming.path(SliceAxis::Sagittal, 10, true),
            PathBuf::from("out-sagittal-010-seg.png")
        );
    }

    #[test]
    fn test_single_output_is_literal() {
        let naming = OutputNaming::new("shots/out.png", "seg");
        assert_eq!(naming.path(SliceAxis::Axial, 5, false), PathBuf::from("shots/out.png"));
    }

    #[test]
    fn test_extension_from_postfix() {
        let naming = OutputNaming::new("shots/", "t2.jpg");
        assert_eq!(naming.ext(), ".jpg");
        assert_eq!(naming.path(SliceAxis::Coronal, 7, true), PathBuf::from("shots/coronal-007-t2.jpg"));

        let naming = OutputNaming::new("shots/brain", "");
        assert_eq!(naming.ext(), ".png");
        assert_eq!(naming.path(SliceAxis::Axial, 120, true), PathBuf::from("shots/brain-axial-120.png"));
    }

    #[test]
    fn test_render_grey_and_background() {
        let data = Array3::from_shape_fn((2, 1, 1), |(x, _, _)| x as f32 * 100.0);
        let volume = Volume::new(data, Affine::identity());
        let colors = ColorMap::Grey;
        let view = SliceView {
            index: [0, 0, 0],
            axis: SliceAxis::Axial,
            size: Size::square(2),
            level_window: LevelWindow::new(50.0, 100.0),
            interpolation: Interpolation::Nearest,
            colors: &colors,
        };
        let img = view.render(&volume).unwrap();
        assert_eq!(img.dimensions(), (2, 2));
        // 2x1 的切片放入 2x2 图像，上下两行中只有一行在图像内。
        let row: Vec<_> = (0..2).map(|w| *img.get_pixel(w, 0)).collect();
        let other: Vec<_> = (0..2).map(|w| *img.get_pixel(w, 1)).collect();
        let (image_row, bg_row) = if row[1] == Rgb([255, 255, 255]) { (row, other) } else { (other, row) };
        assert_eq!(image_row, vec![Rgb([0, 0, 0]), Rgb([255, 255, 255])]);
        assert_eq!(bg_row, vec![BACKGROUND, BACKGROUND]);
    }

    #[test]
    fn test_spline_table_ignores_level_window() {
        let data = Array3::from_shape_fn((3, 1, 1), |(x, _, _)| x as f32 * 50.0);
        let volume = Volume::new(data, Affine::identity());
        let colors = ColorMap::Table(lut::spline_color_map(&[(0.0, 0.0), (100.0, 1.0)], None).unwrap());
        let view = SliceView {
            index: [0, 0, 0],
            axis: SliceAxis::Axial,
            size: Size::default(),
            level_window: LevelWindow::new(1000.0, 1.0),
            interpolation: Interpolation::Nearest,
            colors: &colors,
        };
        let img = view.render(&volume).unwrap();
        assert_eq!(*img.get_pixel(0, 0), Rgb([0, 0, 0]));
        assert_eq!(*img.get_pixel(2, 0), Rgb([255, 255, 255]));
        let mid = img.get_pixel(1, 0)[0];
        assert!((126..=129).contains(&mid), "{mid}");
    }

    #[test]
    fn test_save_png_with_colors() {
        let dir = tempfile::tempdir().unwrap();
        let data = Array3::from_shape_fn((4, 4, 3), |(x, y, z)| (x + y + z) as f32);
        let volume = Volume::new(data, Affine::identity());
        let colors = ColorMap::Transfer(lut::hot());
        let view = SliceView {
            index: [2, 2, 1],
            axis: SliceAxis::Coronal,
            size: Size::default(),
            level_window: LevelWindow::new(4.0, 8.0),
            interpolation: Interpolation::Linear,
            colors: &colors,
        };
        let path = dir.path().join("coronal.png");
        view.save(&volume, &path).unwrap();
        let img = image::open(&path).unwrap().to_rgb8();
        assert_eq!(img.dimensions(), (4, 3));
    }
}
