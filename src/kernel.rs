//! Per-pixel grading maths shared by both engines.
//!
//! Settings are reduced once per frame to [`GradeUniforms`] plus a baked tone
//! curve table. The CPU engine feeds them to [`grade_pixel`]; the GPU engine
//! uploads the same bytes to `grade.wgsl`, which mirrors this file step for
//! step. Keep the two in sync.

use std::sync::Arc;

use bytemuck::{Pod, Zeroable};

use crate::lut::LutData;
use crate::models::{
    ColorGradingSettings, ColorWheelSettings, CurvePoint, WorkingSpace, DEFAULT_TEMPERATURE,
    MAX_TEMPERATURE, MIN_TEMPERATURE,
};

pub const CURVE_SAMPLES: usize = 256;
/// Half-width of the box used for the clarity/dehaze local mean.
pub const LOCAL_RADIUS: i32 = 2;

const WHEEL_CHROMA_GAIN: f32 = 0.15;
const WHEEL_LUMA_GAIN: f32 = 0.25;

/// Uniform block, laid out as vec4s to match WGSL alignment.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct GradeUniforms {
    /// exposure multiplier, contrast, highlights, shadows
    pub basic: [f32; 4],
    /// whites, blacks, temperature shift, tint shift
    pub range: [f32; 4],
    /// hue (turns), saturation, vibrance, lightness
    pub hsl: [f32; 4],
    /// clarity, dehaze, LUT intensity, LUT size
    pub local: [f32; 4],
    /// algorithm index, exposure multiplier, white point, HSL active
    pub tone_map: [f32; 4],
    /// amount, midpoint, roundness, feather
    pub vignette: [f32; 4],
    pub wheel_shadows: [f32; 4],
    pub wheel_midtones: [f32; 4],
    pub wheel_highlights: [f32; 4],
    /// width, height, local pass active, linear working space
    pub frame: [f32; 4],
}

/// Everything a kernel needs for one frame.
#[derive(Debug, Clone)]
pub struct GradeParams {
    pub uniforms: GradeUniforms,
    /// `(shadows, midtones, highlights, 0)` per sample.
    pub curve: Vec<[f32; 4]>,
    pub lut: Option<Arc<LutData>>,
}

impl GradeParams {
    pub fn new(settings: &ColorGradingSettings, width: u32, height: u32, space: WorkingSpace) -> Self {
        let s = settings.clamped();
        let flag = |on: bool| if on { 1.0 } else { 0.0 };

        let hsl_active =
            s.hue != 0.0 || s.saturation != 0.0 || s.vibrance != 0.0 || s.lightness != 0.0;
        let local_active = s.clarity != 0.0 || s.dehaze != 0.0;
        let (lut, lut_intensity, lut_size) = match &s.lut {
            Some(l) => (Some(Arc::clone(&l.data)), l.intensity, l.data.size as f32),
            None => (None, 0.0, 0.0),
        };

        let uniforms = GradeUniforms {
            basic: [2f32.powf(s.exposure), s.contrast, s.highlights, s.shadows],
            range: [s.whites, s.blacks, temperature_shift(s.temperature), s.tint / 100.0],
            hsl: [s.hue / 360.0, s.saturation, s.vibrance, s.lightness],
            local: [s.clarity, s.dehaze, lut_intensity, lut_size],
            tone_map: [
                s.tone_mapping.algorithm.index() as f32,
                2f32.powf(s.tone_mapping.exposure),
                s.tone_mapping.white_point,
                flag(hsl_active),
            ],
            vignette: [
                s.vignette.amount,
                s.vignette.midpoint,
                s.vignette.roundness,
                s.vignette.feather,
            ],
            wheel_shadows: wheel_offset(&s.color_wheels.shadows),
            wheel_midtones: wheel_offset(&s.color_wheels.midtones),
            wheel_highlights: wheel_offset(&s.color_wheels.highlights),
            frame: [
                width as f32,
                height as f32,
                flag(local_active),
                flag(space == WorkingSpace::Linear),
            ],
        };

        let shadows = bake_curve(&s.tone_curve.shadows, CURVE_SAMPLES);
        let midtones = bake_curve(&s.tone_curve.midtones, CURVE_SAMPLES);
        let highlights = bake_curve(&s.tone_curve.highlights, CURVE_SAMPLES);
        let curve = (0..CURVE_SAMPLES)
            .map(|i| [shadows[i], midtones[i], highlights[i], 0.0])
            .collect();

        Self {
            uniforms,
            curve,
            lut,
        }
    }

    pub fn local_active(&self) -> bool {
        self.uniforms.frame[2] > 0.5
    }

    pub fn linear_space(&self) -> bool {
        self.uniforms.frame[3] > 0.5
    }
}

/// Maps Kelvin to [-1, 1]; positive warms the image.
fn temperature_shift(kelvin: f32) -> f32 {
    if kelvin >= DEFAULT_TEMPERATURE {
        (kelvin - DEFAULT_TEMPERATURE) / (MAX_TEMPERATURE - DEFAULT_TEMPERATURE)
    } else {
        (kelvin - DEFAULT_TEMPERATURE) / (DEFAULT_TEMPERATURE - MIN_TEMPERATURE)
    }
}

fn wheel_offset(wheel: &ColorWheelSettings) -> [f32; 4] {
    let tint = hsl_to_rgb([wheel.hue / 360.0, 1.0, 0.5]);
    let l = luminance(tint);
    let mut out = [0.0; 4];
    for c in 0..3 {
        out[c] = (tint[c] - l) * wheel.saturation * WHEEL_CHROMA_GAIN
            + wheel.luminance * WHEEL_LUMA_GAIN;
    }
    out
}

/// Bake control points into `size` evenly spaced samples using Catmull-Rom
/// segments with mirrored end tangents.
pub fn bake_curve(points: &[CurvePoint], size: usize) -> Vec<f32> {
    let denom = (size.max(2) - 1) as f32;
    (0..size)
        .map(|i| evaluate_curve(points, i as f32 / denom).clamp(0.0, 1.0))
        .collect()
}

fn evaluate_curve(pts: &[CurvePoint], t: f32) -> f32 {
    if pts.len() < 2 {
        return t;
    }
    let last = pts.len() - 1;
    if t <= pts[0].x {
        return pts[0].y;
    }
    if t >= pts[last].x {
        return pts[last].y;
    }

    let mut lo = 0;
    let mut hi = last;
    while hi - lo > 1 {
        let mid = (lo + hi) / 2;
        if pts[mid].x <= t {
            lo = mid;
        } else {
            hi = mid;
        }
    }

    let p1 = pts[lo];
    let p2 = pts[hi];
    let p0 = if lo > 0 { pts[lo - 1].y } else { 2.0 * p1.y - p2.y };
    let p3 = if hi < last { pts[hi + 1].y } else { 2.0 * p2.y - p1.y };
    let span = p2.x - p1.x;
    let u = if span.abs() < 1e-10 { 0.5 } else { (t - p1.x) / span };

    let u2 = u * u;
    let u3 = u2 * u;
    0.5 * ((2.0 * p1.y)
        + (-p0 + p2.y) * u
        + (2.0 * p0 - 5.0 * p1.y + 4.0 * p2.y - p3) * u2
        + (-p0 + 3.0 * p1.y - 3.0 * p2.y + p3) * u3)
}

#[inline]
pub fn luminance(c: [f32; 3]) -> f32 {
    0.2126 * c[0] + 0.7152 * c[1] + 0.0722 * c[2]
}

#[inline]
fn clamp01(v: f32) -> f32 {
    v.clamp(0.0, 1.0)
}

#[inline]
fn smoothstep(e0: f32, e1: f32, x: f32) -> f32 {
    let t = clamp01((x - e0) / (e1 - e0));
    t * t * (3.0 - 2.0 * t)
}

/// Shadow, midtone and highlight weights; they sum to one.
#[inline]
pub fn zone_weights(l: f32) -> [f32; 3] {
    let shadows = 1.0 - smoothstep(0.0, 0.5, l);
    let highlights = smoothstep(0.5, 1.0, l);
    [shadows, 1.0 - shadows - highlights, highlights]
}

pub fn srgb_to_linear(v: f32) -> f32 {
    if v <= 0.04045 {
        v / 12.92
    } else {
        ((v + 0.055) / 1.055).powf(2.4)
    }
}

pub fn linear_to_srgb(v: f32) -> f32 {
    if v <= 0.0031308 {
        v * 12.92
    } else {
        1.055 * v.powf(1.0 / 2.4) - 0.055
    }
}

pub fn rgb_to_hsl(c: [f32; 3]) -> [f32; 3] {
    let max = c[0].max(c[1]).max(c[2]);
    let min = c[0].min(c[1]).min(c[2]);
    let l = (max + min) * 0.5;
    let d = max - min;
    if d < 1e-6 {
        return [0.0, 0.0, l];
    }
    let s = if l > 0.5 {
        d / (2.0 - max - min)
    } else {
        d / (max + min)
    };
    let mut h = if max == c[0] {
        (c[1] - c[2]) / d + if c[1] < c[2] { 6.0 } else { 0.0 }
    } else if max == c[1] {
        (c[2] - c[0]) / d + 2.0
    } else {
        (c[0] - c[1]) / d + 4.0
    };
    h /= 6.0;
    [h, s, l]
}

fn hue_to_channel(p: f32, q: f32, t: f32) -> f32 {
    let t = t - t.floor();
    if t < 1.0 / 6.0 {
        p + (q - p) * 6.0 * t
    } else if t < 0.5 {
        q
    } else if t < 2.0 / 3.0 {
        p + (q - p) * (2.0 / 3.0 - t) * 6.0
    } else {
        p
    }
}

pub fn hsl_to_rgb(hsl: [f32; 3]) -> [f32; 3] {
    let [h, s, l] = hsl;
    if s <= 0.0 {
        return [l, l, l];
    }
    let q = if l < 0.5 { l * (1.0 + s) } else { l + s - l * s };
    let p = 2.0 * l - q;
    [
        hue_to_channel(p, q, h + 1.0 / 3.0),
        hue_to_channel(p, q, h),
        hue_to_channel(p, q, h - 1.0 / 3.0),
    ]
}

fn aces(x: f32) -> f32 {
    ((x * (2.51 * x + 0.03)) / (x * (2.43 * x + 0.59) + 0.14)).clamp(0.0, 1.0)
}

fn uncharted2_partial(x: f32) -> f32 {
    let (a, b, c, d, e, f) = (0.15, 0.50, 0.10, 0.20, 0.02, 0.30);
    ((x * (a * x + c * b) + d * e) / (x * (a * x + b) + d * f)) - e / f
}

/// Tone-map one channel. `x` is already scaled by the tone-mapping exposure.
pub fn tone_map(algorithm: u32, x: f32, white: f32) -> f32 {
    let x = x.max(0.0);
    match algorithm {
        1 => x * (1.0 + x / (white * white)) / (1.0 + x),
        2 => aces(x) / aces(white),
        3 => uncharted2_partial(2.0 * x) / uncharted2_partial(white),
        _ => x,
    }
}

/// Linear interpolation into the baked curve table.
pub fn curve_lookup(curve: &[[f32; 4]], l: f32) -> [f32; 3] {
    let last = curve.len() - 1;
    let x = clamp01(l) * last as f32;
    let i0 = (x.floor() as usize).min(last - 1);
    let f = x - i0 as f32;
    let a = curve[i0];
    let b = curve[i0 + 1];
    [
        a[0] * (1.0 - f) + b[0] * f,
        a[1] * (1.0 - f) + b[1] * f,
        a[2] * (1.0 - f) + b[2] * f,
    ]
}

/// Source luminance in the working space, used by the local-contrast step.
#[inline]
pub fn source_luminance(px: [u8; 4], linear: bool) -> f32 {
    luminance(decode(px, linear))
}

#[inline]
pub fn decode(px: [u8; 4], linear: bool) -> [f32; 3] {
    let mut c = [
        px[0] as f32 / 255.0,
        px[1] as f32 / 255.0,
        px[2] as f32 / 255.0,
    ];
    if linear {
        for v in c.iter_mut() {
            *v = srgb_to_linear(*v);
        }
    }
    c
}

/// Neighbourhood of one pixel for clarity/dehaze: its own source luminance
/// and the local mean around it.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalStats {
    pub luminance: f32,
    pub mean: f32,
}

/// Run steps 2 through 13 on one pixel. `(x, y)` is the pixel centre in
/// pixel units.
pub fn grade_pixel(
    p: &GradeParams,
    input: [f32; 3],
    local: LocalStats,
    x: f32,
    y: f32,
) -> [f32; 3] {
    let u = &p.uniforms;
    let mut c = input;

    // exposure
    for v in c.iter_mut() {
        *v *= u.basic[0];
    }

    // contrast around mid grey
    for v in c.iter_mut() {
        *v = 0.5 + (*v - 0.5) * (1.0 + u.basic[1]);
    }

    // highlights / shadows / whites / blacks
    let l = clamp01(luminance(c));
    let shadow_w = 1.0 - smoothstep(0.0, 0.5, l);
    let highlight_w = smoothstep(0.5, 1.0, l);
    let black_w = 1.0 - smoothstep(0.0, 0.25, l);
    let white_w = smoothstep(0.75, 1.0, l);
    let delta = 0.5 * (u.basic[3] * shadow_w + u.basic[2] * highlight_w)
        + 0.25 * (u.range[0] * white_w + u.range[1] * black_w);
    for v in c.iter_mut() {
        *v += delta;
    }

    // white balance
    let (temp, tint) = (u.range[2], u.range[3]);
    c[0] *= 1.0 + 0.3 * temp + 0.1 * tint;
    c[1] *= 1.0 - 0.2 * tint;
    c[2] *= 1.0 - 0.3 * temp + 0.1 * tint;

    // hue / saturation / vibrance / lightness
    if u.tone_map[3] > 0.5 {
        let mut hsl = rgb_to_hsl([clamp01(c[0]), clamp01(c[1]), clamp01(c[2])]);
        hsl[0] = (hsl[0] + u.hsl[0]).rem_euclid(1.0);
        let mut s = hsl[1];
        s *= 1.0 + u.hsl[2] * (1.0 - s);
        s *= 1.0 + u.hsl[1];
        hsl[1] = clamp01(s);
        let lightness = u.hsl[3];
        hsl[2] = if lightness >= 0.0 {
            hsl[2] + (1.0 - hsl[2]) * lightness
        } else {
            hsl[2] * (1.0 + lightness)
        };
        c = hsl_to_rgb(hsl);
    }

    // tone curve
    let l = clamp01(luminance(c));
    let w = zone_weights(l);
    let curve = curve_lookup(&p.curve, l);
    let target = w[0] * curve[0] + w[1] * curve[1] + w[2] * curve[2];
    for v in c.iter_mut() {
        *v += target - l;
    }

    // colour wheels
    let w = zone_weights(clamp01(luminance(c)));
    for (i, v) in c.iter_mut().enumerate() {
        *v += w[0] * u.wheel_shadows[i] + w[1] * u.wheel_midtones[i] + w[2] * u.wheel_highlights[i];
    }

    // clarity / dehaze
    if u.frame[2] > 0.5 {
        let detail = local.luminance - local.mean;
        let l = clamp01(luminance(c));
        let mid_w = 1.0 - (2.0 * l - 1.0).abs();
        let clarity = u.local[0] * detail * mid_w * 2.0;
        let haze = u.local[1] * (1.0 - (detail.abs() * 8.0).min(1.0));
        for v in c.iter_mut() {
            *v += clarity;
            *v = local.mean + (*v - local.mean) * (1.0 + 0.5 * haze);
        }
        let l = luminance(c);
        for v in c.iter_mut() {
            *v = l + (*v - l) * (1.0 + 0.3 * haze);
        }
    }

    // LUT
    if let Some(lut) = p.lut.as_deref() {
        let k = u.local[2];
        if k > 0.0 {
            let s = lut.sample(c[0], c[1], c[2]);
            for i in 0..3 {
                c[i] = c[i] * (1.0 - k) + s[i] * k;
            }
        }
    }

    // tone mapping
    let algorithm = u.tone_map[0] as u32;
    for v in c.iter_mut() {
        *v = tone_map(algorithm, *v * u.tone_map[1], u.tone_map[2]);
    }

    // vignette
    let amount = u.vignette[0];
    if amount != 0.0 {
        let (w, h) = (u.frame[0], u.frame[1]);
        let sx = 1.0 + (w / h - 1.0) * u.vignette[2];
        let dx = ((x / w) * 2.0 - 1.0) * sx;
        let dy = (y / h) * 2.0 - 1.0;
        let dist = (dx * dx + dy * dy).sqrt() / (sx * sx + 1.0).sqrt();
        let e0 = u.vignette[1];
        let mask = smoothstep(e0, e0 + u.vignette[3].max(0.01), dist);
        for v in c.iter_mut() {
            *v = if amount < 0.0 {
                *v * (1.0 + amount * mask)
            } else {
                *v + (1.0 - *v) * amount * mask
            };
        }
    }

    for v in c.iter_mut() {
        *v = clamp01(*v);
        if u.frame[3] > 0.5 {
            *v = linear_to_srgb(*v);
        }
    }
    c
}

#[inline]
pub fn encode(v: f32) -> u8 {
    (clamp01(v) * 255.0).round() as u8
}
