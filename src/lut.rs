//! 3D LUT loading (`.cube`, `.3dl`, `.lut`), trilinear sampling, and the 2D
//! texture layout used by the GPU engine.

use std::fmt;
use std::fs;
use std::path::Path;

use image::{Rgba, RgbaImage};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::LutParseError;

pub const SUPPORTED_LUT_EXTENSIONS: &[&str] = &["cube", "3dl", "lut"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LutFormat {
    Cube,
    #[serde(rename = "3dl")]
    ThreeDl,
    Lut,
}

impl LutFormat {
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.trim_start_matches('.').to_ascii_lowercase().as_str() {
            "cube" => Some(Self::Cube),
            "3dl" => Some(Self::ThreeDl),
            "lut" => Some(Self::Lut),
            _ => None,
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            Self::Cube => "cube",
            Self::ThreeDl => "3dl",
            Self::Lut => "lut",
        }
    }
}

impl fmt::Display for LutFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

/// A cubic lattice of `size³` RGB entries, red varying fastest, then green,
/// then blue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawLutData")]
pub struct LutData {
    pub size: usize,
    /// Flat `[r, g, b, r, g, b, ...]`, `size³ × 3` values.
    pub data: Vec<f32>,
    pub format: LutFormat,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

/// Unchecked wire form; deserialized lattices go through [`LutData::new`].
#[derive(Deserialize)]
struct RawLutData {
    size: usize,
    data: Vec<f32>,
    format: LutFormat,
    #[serde(default)]
    title: Option<String>,
}

impl TryFrom<RawLutData> for LutData {
    type Error = LutParseError;

    fn try_from(raw: RawLutData) -> Result<Self, Self::Error> {
        if !(2..=256).contains(&raw.size) {
            return Err(LutParseError::InvalidSize(raw.size.to_string()));
        }
        let mut lut = LutData::new(raw.size, raw.data, raw.format)?;
        lut.title = raw.title;
        Ok(lut)
    }
}

impl LutData {
    /// Wrap a flat lattice, checking the length invariant.
    pub fn new(size: usize, data: Vec<f32>, format: LutFormat) -> Result<Self, LutParseError> {
        if size == 0 {
            return Err(LutParseError::InvalidSize("size must be positive".into()));
        }
        let expected = size * size * size;
        if data.len() != expected * 3 {
            return Err(LutParseError::SizeMismatch {
                expected,
                got: data.len() / 3,
            });
        }
        Ok(Self {
            size,
            data,
            format,
            title: None,
        })
    }

    /// Lattice where every entry maps to itself.
    pub fn identity(size: usize) -> Self {
        let size = size.max(2);
        let n = (size - 1) as f32;
        let mut data = Vec::with_capacity(size * size * size * 3);
        for b in 0..size {
            for g in 0..size {
                for r in 0..size {
                    data.extend_from_slice(&[r as f32 / n, g as f32 / n, b as f32 / n]);
                }
            }
        }
        Self {
            size,
            data,
            format: LutFormat::Cube,
            title: Some("Identity".into()),
        }
    }

    pub fn entries(&self) -> usize {
        self.data.len() / 3
    }

    /// Flat entry index, shared with the shader's texel addressing.
    #[inline]
    pub fn texture_index(&self, r: usize, g: usize, b: usize) -> usize {
        b * self.size * self.size + g * self.size + r
    }

    #[inline]
    pub fn entry(&self, r: usize, g: usize, b: usize) -> [f32; 3] {
        let i = self.texture_index(r, g, b) * 3;
        [self.data[i], self.data[i + 1], self.data[i + 2]]
    }

    /// Trilinear lookup. Inputs are clamped to [0, 1]; interpolation runs
    /// along red, then green, then blue.
    pub fn sample(&self, r: f32, g: f32, b: f32) -> [f32; 3] {
        if self.size < 2 {
            return self.entry(0, 0, 0);
        }
        let n = (self.size - 1) as f32;
        let cr = clamp_unit(r) * n;
        let cg = clamp_unit(g) * n;
        let cb = clamp_unit(b) * n;

        let r0 = (cr.floor() as usize).min(self.size - 2);
        let g0 = (cg.floor() as usize).min(self.size - 2);
        let b0 = (cb.floor() as usize).min(self.size - 2);
        let fr = cr - r0 as f32;
        let fg = cg - g0 as f32;
        let fb = cb - b0 as f32;

        let c000 = self.entry(r0, g0, b0);
        let c100 = self.entry(r0 + 1, g0, b0);
        let c010 = self.entry(r0, g0 + 1, b0);
        let c110 = self.entry(r0 + 1, g0 + 1, b0);
        let c001 = self.entry(r0, g0, b0 + 1);
        let c101 = self.entry(r0 + 1, g0, b0 + 1);
        let c011 = self.entry(r0, g0 + 1, b0 + 1);
        let c111 = self.entry(r0 + 1, g0 + 1, b0 + 1);

        let mut out = [0.0f32; 3];
        for c in 0..3 {
            let c00 = lerp(c000[c], c100[c], fr);
            let c10 = lerp(c010[c], c110[c], fr);
            let c01 = lerp(c001[c], c101[c], fr);
            let c11 = lerp(c011[c], c111[c], fr);
            let c0 = lerp(c00, c10, fg);
            let c1 = lerp(c01, c11, fg);
            out[c] = lerp(c0, c1, fb);
        }
        out
    }

    /// Flatten into an RGBA float texture `size²` wide and `size` tall: row
    /// `b` holds one blue slice, texel `g * size + r` within it.
    pub fn pack_texture(&self) -> (u32, u32, Vec<f32>) {
        let width = (self.size * self.size) as u32;
        let height = self.size as u32;
        let mut texels = Vec::with_capacity(self.entries() * 4);
        for rgb in self.data.chunks_exact(3) {
            texels.extend_from_slice(&[rgb[0], rgb[1], rgb[2], 1.0]);
        }
        (width, height, texels)
    }

    /// Serialize as a `.cube` file.
    pub fn to_cube_string(&self) -> String {
        let mut out = String::with_capacity(self.data.len() * 10 + 64);
        if let Some(title) = &self.title {
            out.push_str(&format!("TITLE \"{title}\"\n"));
        }
        out.push_str(&format!("LUT_3D_SIZE {}\n", self.size));
        for rgb in self.data.chunks_exact(3) {
            out.push_str(&format!("{:.6} {:.6} {:.6}\n", rgb[0], rgb[1], rgb[2]));
        }
        out
    }
}

#[inline]
fn clamp_unit(v: f32) -> f32 {
    if v.is_nan() {
        0.0
    } else {
        v.clamp(0.0, 1.0)
    }
}

#[inline]
fn lerp(a: f32, b: f32, t: f32) -> f32 {
    a * (1.0 - t) + b * t
}

/// Free-function form of [`LutData::sample`].
pub fn sample(lut: &LutData, r: f32, g: f32, b: f32) -> [f32; 3] {
    lut.sample(r, g, b)
}

/// True when the file name carries a supported LUT extension (any case).
pub fn validate_lut_file(filename: &str) -> bool {
    Path::new(filename)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| SUPPORTED_LUT_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

/// Parse LUT text, choosing the reader from the file extension.
pub fn load_lut(contents: &str, extension: &str) -> Result<LutData, LutParseError> {
    let format = LutFormat::from_extension(extension)
        .ok_or_else(|| LutParseError::UnsupportedFormat(extension.to_string()))?;
    let lut = match format {
        LutFormat::Cube => parse_cube(contents)?,
        LutFormat::ThreeDl => parse_3dl(contents)?,
        LutFormat::Lut => parse_generic(contents)?,
    };
    debug!(format = %format, size = lut.size, "loaded LUT");
    Ok(lut)
}

pub fn load_lut_file(path: &Path) -> Result<LutData, LutParseError> {
    let ext = path
        .extension()
        .and_then(|ext| ext.to_str())
        .ok_or_else(|| LutParseError::UnsupportedFormat(path.display().to_string()))?;
    if LutFormat::from_extension(ext).is_none() {
        return Err(LutParseError::UnsupportedFormat(ext.to_string()));
    }
    let contents = fs::read_to_string(path)?;
    let mut lut = load_lut(&contents, ext)?;
    if lut.title.is_none() {
        lut.title = path
            .file_stem()
            .map(|stem| stem.to_string_lossy().to_string());
    }
    Ok(lut)
}

fn parse_number(token: &str, line: usize) -> Result<f32, LutParseError> {
    token
        .parse::<f32>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or_else(|| LutParseError::InvalidNumber {
            line,
            token: token.to_string(),
        })
}

fn parse_size(token: Option<&str>) -> Result<usize, LutParseError> {
    let token = token.ok_or(LutParseError::MissingSize)?;
    let size: usize = token
        .parse()
        .map_err(|_| LutParseError::InvalidSize(token.to_string()))?;
    if size < 2 || size > 256 {
        return Err(LutParseError::InvalidSize(token.to_string()));
    }
    Ok(size)
}

fn starts_numeric(token: &str) -> bool {
    token
        .chars()
        .next()
        .map(|c| c.is_ascii_digit() || matches!(c, '-' | '+' | '.'))
        .unwrap_or(false)
}

/// Cut a `#` comment that starts the line or follows whitespace, ignoring
/// any `#` inside double quotes.
fn strip_cube_comment(line: &str) -> &str {
    let mut quoted = false;
    let mut prev_blank = true;
    for (i, c) in line.char_indices() {
        match c {
            '"' => quoted = !quoted,
            '#' if !quoted && prev_blank => return &line[..i],
            _ => {}
        }
        prev_blank = c.is_whitespace();
    }
    line
}

fn parse_cube(contents: &str) -> Result<LutData, LutParseError> {
    let mut size: Option<usize> = None;
    let mut title = None;
    let mut data = Vec::new();

    for (idx, raw) in contents.lines().enumerate() {
        let line_no = idx + 1;
        let line = strip_cube_comment(raw).trim();
        if line.is_empty() {
            continue;
        }
        let mut tokens = line.split_whitespace();
        let Some(first) = tokens.next() else {
            continue;
        };

        if !starts_numeric(first) {
            match first {
                "LUT_3D_SIZE" => size = Some(parse_size(tokens.next())?),
                "LUT_1D_SIZE" => return Err(LutParseError::OneDimensional),
                "TITLE" => {
                    let rest = line["TITLE".len()..].trim().trim_matches('"');
                    title = Some(rest.to_string());
                }
                other => debug!(line = line_no, directive = other, "skipping .cube directive"),
            }
            continue;
        }

        let values = line
            .split_whitespace()
            .map(|t| parse_number(t, line_no))
            .collect::<Result<Vec<_>, _>>()?;
        if values.len() != 3 {
            return Err(LutParseError::MalformedRow {
                line: line_no,
                got: values.len(),
            });
        }
        data.extend_from_slice(&values);
    }

    let size = size.ok_or(LutParseError::MissingSize)?;
    let mut lut = LutData::new(size, data, LutFormat::Cube)?;
    lut.title = title;
    Ok(lut)
}

fn parse_3dl(contents: &str) -> Result<LutData, LutParseError> {
    let is_mesh_line = |line: &str| line.contains("Mesh") || line.contains("3DMESH");
    let has_mesh = contents.lines().any(is_mesh_line);
    let mut size: Option<usize> = None;
    let mut out_depth: Option<f32> = None;
    let mut in_data = !has_mesh;
    let mut expect_shaper = false;
    let mut shaper_done = false;
    let mut rows: Vec<[f32; 3]> = Vec::new();

    for (idx, raw) in contents.lines().enumerate() {
        let line_no = idx + 1;
        let line = raw.split('#').next().unwrap_or_default().trim();
        if line.is_empty() {
            continue;
        }

        if is_mesh_line(line) {
            in_data = true;
            let bits: Vec<u32> = line
                .split_whitespace()
                .filter_map(|t| t.parse().ok())
                .collect();
            if let [in_bits, out_bits, ..] = bits[..] {
                if size.is_none() && (1..=8).contains(&in_bits) {
                    size = Some((1usize << in_bits) + 1);
                }
                if (1..=16).contains(&out_bits) {
                    out_depth = Some(((1u32 << out_bits) - 1) as f32);
                }
                expect_shaper = true;
            }
            continue;
        }
        if line.contains("3D") {
            if size.is_none() {
                size = line
                    .split_whitespace()
                    .find_map(|t| t.parse::<usize>().ok())
                    .filter(|n| *n >= 2);
            }
            continue;
        }

        let tokens: Vec<&str> = line.split_whitespace().collect();
        if !in_data || !tokens.first().copied().map(starts_numeric).unwrap_or(false) {
            continue;
        }
        let values = tokens
            .iter()
            .map(|t| parse_number(t, line_no))
            .collect::<Result<Vec<_>, _>>()?;

        // At most one shaper line of integer input positions, ahead of the
        // lattice rows.
        let integral = tokens.iter().all(|t| t.parse::<i64>().is_ok());
        if !shaper_done && rows.is_empty() && integral && (expect_shaper || values.len() > 3) {
            shaper_done = true;
            if size.is_none() {
                size = Some(values.len());
            }
            continue;
        }
        if values.len() < 3 {
            return Err(LutParseError::MalformedRow {
                line: line_no,
                got: values.len(),
            });
        }
        rows.push([values[0], values[1], values[2]]);
    }

    let size = match size {
        Some(size) => size,
        None => infer_size(rows.len())?,
    };
    let expected = size * size * size;
    if rows.len() != expected {
        return Err(LutParseError::SizeMismatch {
            expected,
            got: rows.len(),
        });
    }

    let depth = out_depth.unwrap_or_else(|| infer_depth(&rows));
    // Files store blue fastest; the lattice stores red fastest.
    let mut data = vec![0.0f32; expected * 3];
    for (i, rgb) in rows.iter().enumerate() {
        let r = i / (size * size);
        let g = (i / size) % size;
        let b = i % size;
        let dst = (b * size * size + g * size + r) * 3;
        data[dst] = rgb[0] / depth;
        data[dst + 1] = rgb[1] / depth;
        data[dst + 2] = rgb[2] / depth;
    }
    LutData::new(size, data, LutFormat::ThreeDl)
}

fn infer_depth(rows: &[[f32; 3]]) -> f32 {
    let max = rows
        .iter()
        .flat_map(|rgb| rgb.iter().copied())
        .fold(0.0f32, f32::max);
    if max <= 1.0 {
        1.0
    } else if max <= 1023.0 {
        1023.0
    } else if max <= 4095.0 {
        4095.0
    } else {
        65535.0
    }
}

fn infer_size(count: usize) -> Result<usize, LutParseError> {
    if count == 0 {
        return Err(LutParseError::MissingSize);
    }
    let size = (count as f64).cbrt().round() as usize;
    if size < 2 {
        return Err(LutParseError::InvalidSize(size.to_string()));
    }
    Ok(size)
}

fn parse_generic(contents: &str) -> Result<LutData, LutParseError> {
    let mut data = Vec::new();

    for (idx, raw) in contents.lines().enumerate() {
        let line_no = idx + 1;
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') || line.starts_with("//") {
            continue;
        }
        let tokens: Vec<&str> = line.split_whitespace().collect();
        if tokens.len() < 3 || !tokens.iter().all(|t| starts_numeric(t)) {
            continue;
        }
        let values = tokens
            .iter()
            .take(3)
            .map(|t| parse_number(t, line_no))
            .collect::<Result<Vec<_>, _>>()?;
        data.extend_from_slice(&values);
    }

    let size = infer_size(data.len() / 3)?;
    LutData::new(size, data, LutFormat::Lut)
}

/// Render a `size × size` swatch: pixel `(x, y)` shows the LUT applied to
/// `(x / (size - 1), y / (size - 1), 0.5)`.
pub fn generate_preview(lut: &LutData, size: u32) -> RgbaImage {
    let size = size.max(1);
    let denom = (size.saturating_sub(1)).max(1) as f32;
    RgbaImage::from_fn(size, size, |x, y| {
        let rgb = lut.sample(x as f32 / denom, y as f32 / denom, 0.5);
        Rgba([to_u8(rgb[0]), to_u8(rgb[1]), to_u8(rgb[2]), 255])
    })
}

fn to_u8(v: f32) -> u8 {
    (clamp_unit(v) * 255.0).round() as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity_cube(size: usize) -> String {
        LutData::identity(size).to_cube_string()
    }

    #[test]
    fn cube_identity_round_trips_lattice_points() {
        let lut = load_lut(&identity_cube(5), "cube").unwrap();
        assert_eq!(lut.size, 5);
        assert_eq!(lut.format, LutFormat::Cube);
        for b in 0..5 {
            for g in 0..5 {
                for r in 0..5 {
                    let input = [r as f32 / 4.0, g as f32 / 4.0, b as f32 / 4.0];
                    let out = lut.sample(input[0], input[1], input[2]);
                    for c in 0..3 {
                        assert!((out[c] - input[c]).abs() < 1e-5);
                    }
                }
            }
        }
    }

    #[test]
    fn interpolation_is_monotonic_between_lattice_points() {
        let lut = load_lut(&identity_cube(3), "cube").unwrap();
        let mut prev = -1.0;
        for i in 0..=100 {
            let v = i as f32 / 100.0;
            let out = lut.sample(v, 0.2, 0.7);
            assert!(out[0] >= prev);
            assert!((out[0] - v).abs() < 1e-5);
            prev = out[0];
        }
    }

    #[test]
    fn cube_size_two_requires_exactly_eight_rows() {
        let header = "# comment\nTITLE \"t\"\nDOMAIN_MIN 0 0 0\nDOMAIN_MAX 1 1 1\nLUT_3D_SIZE 2\n";
        let row = "0.0 0.5 1.0\n";
        let ok = format!("{header}{}", row.repeat(8));
        let lut = load_lut(&ok, ".cube").unwrap();
        assert_eq!(lut.data.len(), 24);
        assert_eq!(lut.title.as_deref(), Some("t"));

        for n in [7, 9] {
            let bad = format!("{header}{}", row.repeat(n));
            assert!(matches!(
                load_lut(&bad, "cube"),
                Err(LutParseError::SizeMismatch { expected: 8, .. })
            ));
        }
    }

    #[test]
    fn cube_title_keeps_hash_inside_quotes() {
        let text = format!(
            "TITLE \"Look #2\" # trailing note\n{}",
            identity_cube(2).lines().skip(1).collect::<Vec<_>>().join("\n")
        );
        let lut = load_lut(&text, "cube").unwrap();
        assert_eq!(lut.title.as_deref(), Some("Look #2"));
        assert_eq!(strip_cube_comment("0 0 0 # note"), "0 0 0 ");
        assert_eq!(strip_cube_comment("# whole line"), "");
    }

    #[test]
    fn deserialize_rejects_lattice_with_wrong_length() {
        let short = r#"{"size":4,"data":[0.1,0.2,0.3],"format":"cube"}"#;
        assert!(serde_json::from_str::<LutData>(short).is_err());
        let tiny = r#"{"size":1,"data":[0.1,0.2,0.3],"format":"cube"}"#;
        assert!(serde_json::from_str::<LutData>(tiny).is_err());

        let lut = LutData::identity(2);
        let json = serde_json::to_string(&lut).unwrap();
        assert_eq!(serde_json::from_str::<LutData>(&json).unwrap(), lut);
    }

    #[test]
    fn cube_rejects_bad_tokens_and_missing_size() {
        let bad = "LUT_3D_SIZE 2\n0 0 zero\n";
        assert!(matches!(
            load_lut(bad, "cube"),
            Err(LutParseError::InvalidNumber { line: 2, .. })
        ));
        assert!(matches!(
            load_lut("0 0 0\n", "cube"),
            Err(LutParseError::MissingSize)
        ));
        assert!(matches!(
            load_lut("LUT_1D_SIZE 2\n0 0 0\n1 1 1\n", "cube"),
            Err(LutParseError::OneDimensional)
        ));
    }

    #[test]
    fn unsupported_extension_fails() {
        assert!(matches!(
            load_lut("LUT_3D_SIZE 2", "txt"),
            Err(LutParseError::UnsupportedFormat(_))
        ));
    }

    #[test]
    fn validate_lut_file_checks_extension_case_insensitively() {
        assert!(validate_lut_file("film.cube"));
        assert!(validate_lut_file("FILM.CUBE"));
        assert!(validate_lut_file("look.3DL"));
        assert!(validate_lut_file("dir/look.lut"));
        assert!(!validate_lut_file("notes.txt"));
        assert!(!validate_lut_file("cube"));
    }

    #[test]
    fn threedl_mesh_header_sets_size_and_depth() {
        // Mesh 1 10: 3 steps per axis, 10-bit output. Blue varies fastest.
        let mut text = String::from("3DMESH\nMesh 1 10\n0 512 1023\n");
        for r in 0..3 {
            for g in 0..3 {
                for b in 0..3 {
                    text.push_str(&format!("{} {} {}\n", r * 511, g * 511, b * 511));
                }
            }
        }
        let lut = load_lut(&text, "3dl").unwrap();
        assert_eq!(lut.size, 3);
        assert_eq!(lut.format, LutFormat::ThreeDl);
        let e = lut.entry(2, 0, 1);
        assert!((e[0] - 1022.0 / 1023.0).abs() < 1e-6);
        assert_eq!(e[1], 0.0);
        assert!((e[2] - 511.0 / 1023.0).abs() < 1e-6);
    }

    #[test]
    fn threedl_size_from_3d_line() {
        let mut text = String::from("LUT_3D_SIZE 2\nMesh\n");
        for _ in 0..8 {
            text.push_str("0.25 0.5 0.75 1.0\n");
        }
        let lut = load_lut(&text, "3dl").unwrap();
        assert_eq!(lut.size, 2);
        assert_eq!(lut.entries(), 8);
        assert_eq!(lut.entry(1, 1, 1), [0.25, 0.5, 0.75]);
    }

    #[test]
    fn threedl_float_rows_with_extra_columns() {
        let mut text = String::new();
        for i in 0..27 {
            let v = i as f32 / 26.0;
            text.push_str(&format!("{v} {v} {v} 0.5 0.5\n"));
        }
        let lut = load_lut(&text, "3dl").unwrap();
        assert_eq!(lut.size, 3);
        assert_eq!(lut.entries(), 27);
        assert_eq!(lut.entry(0, 0, 0), [0.0, 0.0, 0.0]);
        assert_eq!(lut.entry(2, 2, 2), [1.0, 1.0, 1.0]);
    }

    #[test]
    fn threedl_integer_shaper_without_mesh_header() {
        let mut text = String::from("0 511 767 1023\n");
        for r in 0..4 {
            for g in 0..4 {
                for b in 0..4 {
                    text.push_str(&format!("{} {} {}\n", r * 341, g * 341, b * 341));
                }
            }
        }
        let lut = load_lut(&text, "3dl").unwrap();
        assert_eq!(lut.size, 4);
        assert_eq!(lut.entries(), 64);
        assert_eq!(lut.entry(3, 0, 0), [1.0, 0.0, 0.0]);
        assert_eq!(lut.entry(0, 3, 0), [0.0, 1.0, 0.0]);
    }

    #[test]
    fn threedl_plain_integer_rows_are_all_lattice() {
        let mut text = String::new();
        for r in 0..2 {
            for g in 0..2 {
                for b in 0..2 {
                    text.push_str(&format!("{} {} {}\n", r * 4095, g * 4095, b * 4095));
                }
            }
        }
        let lut = load_lut(&text, "3dl").unwrap();
        assert_eq!(lut.size, 2);
        assert_eq!(lut.entry(1, 0, 1), [1.0, 0.0, 1.0]);
    }

    #[test]
    fn threedl_only_one_shaper_line_is_skipped() {
        let mut text = String::from("LUT_3D_SIZE 2\n0 1 2 3\n");
        for _ in 0..8 {
            text.push_str("1 2 3 4\n");
        }
        let lut = load_lut(&text, "3dl").unwrap();
        assert_eq!(lut.entries(), 8);
    }

    #[test]
    fn generic_lut_infers_size_from_cube_root() {
        let mut text = String::from("// generic\n# also a comment\nheader line\n");
        for _ in 0..27 {
            text.push_str("0.1 0.2 0.3 extra\n");
        }
        // tokens beyond the third are ignored, but all must look numeric
        let text = text.replace(" extra", " 9");
        let lut = load_lut(&text, "lut").unwrap();
        assert_eq!(lut.size, 3);
        assert_eq!(lut.data.len(), 81);
    }

    #[test]
    fn generic_lut_rejects_non_cube_counts() {
        let text = "0 0 0\n".repeat(10);
        assert!(matches!(
            load_lut(&text, "lut"),
            Err(LutParseError::SizeMismatch { .. })
        ));
    }

    #[test]
    fn texture_packing_matches_index_formula() {
        let lut = LutData::identity(3);
        let (w, h, texels) = lut.pack_texture();
        assert_eq!((w, h), (9, 3));
        let (r, g, b) = (2, 1, 2);
        let idx = lut.texture_index(r, g, b);
        assert_eq!(idx, b * 9 + g * 3 + r);
        let x = g * 3 + r;
        let y = b;
        let t = (y * w as usize + x) * 4;
        assert_eq!(&texels[t..t + 3], &lut.entry(r, g, b));
        assert_eq!(texels[t + 3], 1.0);
    }

    #[test]
    fn preview_of_identity_is_a_gradient() {
        let lut = LutData::identity(9);
        let img = generate_preview(&lut, 16);
        assert_eq!(img.dimensions(), (16, 16));
        assert_eq!(img.get_pixel(0, 0).0, [0, 0, 128, 255]);
        assert_eq!(img.get_pixel(15, 15).0, [255, 255, 128, 255]);
        assert!(img.get_pixel(8, 0).0[0] > img.get_pixel(4, 0).0[0]);
    }
}
