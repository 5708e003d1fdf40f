use atlas::render::{ColorMap, Interpolation, SliceAxis};

pub fn finite_f64(s: &str) -> Result<f64, String> {
    let v: f64 = s
        .parse()
        .map_err(|_| format!("`{s}` is not a legal number"))?;
    if !v.is_finite() {
        return Err(format!("`{s}` is not a finite number"));
    }
    Ok(v)
}

pub fn non_negative_f64(s: &str) -> Result<f64, String> {
    let v = finite_f64(s)?;
    if v < 0.0 {
        return Err(format!("value must not be negative, but got `{v}`"));
    }
    Ok(v)
}

pub fn positive_usize(s: &str) -> Result<usize, String> {
    match s.parse::<usize>() {
        Ok(0) => Err("value must be positive, but got `0`".to_string()),
        Ok(n) => Ok(n),
        Err(_) => Err(format!("`{s}` is not a legal positive integer")),
    }
}

/// `--up` 只接受 0 (矢状面)、1 (冠状面)、2 (横断面)。
pub fn slice_axis(s: &str) -> Result<SliceAxis, String> {
    const ERR: &str = "slice normal must be one of 0, 1, 2";
    let zdir: usize = s.parse().map_err(|_| ERR.to_string())?;
    SliceAxis::from_index(zdir).ok_or_else(|| ERR.to_string())
}

pub fn interpolation(s: &str) -> Result<Interpolation, String> {
    s.parse().map_err(|e: atlas::render::RenderError| e.to_string())
}

pub fn color_map(s: &str) -> Result<ColorMap, String> {
    ColorMap::parse(s).map_err(|e| e.to_string())
}
