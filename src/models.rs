use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use crate::lut::LutData;

pub const DEFAULT_TEMPERATURE: f32 = 5500.0;
pub const MIN_TEMPERATURE: f32 = 2000.0;
pub const MAX_TEMPERATURE: f32 = 10000.0;

// NaN falls back to the neutral value.
fn clamp_or(value: f32, min: f32, max: f32, neutral: f32) -> f32 {
    if value.is_nan() {
        neutral
    } else {
        value.clamp(min, max)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CurvePoint {
    pub x: f32,
    pub y: f32,
}

impl CurvePoint {
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

fn identity_curve() -> Vec<CurvePoint> {
    vec![CurvePoint::new(0.0, 0.0), CurvePoint::new(1.0, 1.0)]
}

/// Luminance curves, one per tonal zone.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ToneCurve {
    pub shadows: Vec<CurvePoint>,
    pub midtones: Vec<CurvePoint>,
    pub highlights: Vec<CurvePoint>,
}

impl Default for ToneCurve {
    fn default() -> Self {
        Self {
            shadows: identity_curve(),
            midtones: identity_curve(),
            highlights: identity_curve(),
        }
    }
}

fn clamp_curve(points: &[CurvePoint]) -> Vec<CurvePoint> {
    let mut out: Vec<CurvePoint> = points
        .iter()
        .filter(|p| p.x.is_finite() && p.y.is_finite())
        .map(|p| CurvePoint::new(p.x.clamp(0.0, 1.0), p.y.clamp(0.0, 1.0)))
        .collect();
    out.sort_by(|a, b| a.x.total_cmp(&b.x));
    out.dedup_by(|a, b| (a.x - b.x).abs() < 1e-6);
    if out.len() < 2 {
        return identity_curve();
    }
    out
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ColorWheelSettings {
    /// Degrees.
    pub hue: f32,
    /// 0..2
    pub saturation: f32,
    /// -1..1
    pub luminance: f32,
}

impl Default for ColorWheelSettings {
    fn default() -> Self {
        Self {
            hue: 0.0,
            saturation: 0.0,
            luminance: 0.0,
        }
    }
}

impl ColorWheelSettings {
    pub const fn new(hue: f32, saturation: f32, luminance: f32) -> Self {
        Self {
            hue,
            saturation,
            luminance,
        }
    }

    fn clamped(&self) -> Self {
        let hue = if self.hue.is_finite() {
            self.hue.rem_euclid(360.0)
        } else {
            0.0
        };
        Self {
            hue,
            saturation: clamp_or(self.saturation, 0.0, 2.0, 0.0),
            luminance: clamp_or(self.luminance, -1.0, 1.0, 0.0),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ColorWheels {
    pub shadows: ColorWheelSettings,
    pub midtones: ColorWheelSettings,
    pub highlights: ColorWheelSettings,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct VignetteSettings {
    pub amount: f32,
    pub midpoint: f32,
    pub roundness: f32,
    pub feather: f32,
}

impl Default for VignetteSettings {
    fn default() -> Self {
        Self {
            amount: 0.0,
            midpoint: 0.5,
            roundness: 0.5,
            feather: 0.5,
        }
    }
}

/// A loaded lattice plus its blend strength. The lattice is shared so history
/// snapshots do not copy it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LutSettings {
    pub data: Arc<LutData>,
    pub intensity: f32,
}

impl LutSettings {
    pub fn new(data: LutData, intensity: f32) -> Self {
        Self {
            data: Arc::new(data),
            intensity,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToneMapAlgorithm {
    Reinhard,
    Aces,
    Uncharted2,
    #[default]
    Linear,
}

impl ToneMapAlgorithm {
    /// Index used in the packed shader parameters.
    pub fn index(&self) -> u32 {
        match self {
            Self::Linear => 0,
            Self::Reinhard => 1,
            Self::Aces => 2,
            Self::Uncharted2 => 3,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Self::Reinhard => "Reinhard",
            Self::Aces => "ACES Filmic",
            Self::Uncharted2 => "Uncharted 2",
            Self::Linear => "Linear",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ToneMappingSettings {
    pub algorithm: ToneMapAlgorithm,
    /// Stops applied before the curve.
    pub exposure: f32,
    /// Input level mapped to display white; at least 1.0.
    pub white_point: f32,
}

impl Default for ToneMappingSettings {
    fn default() -> Self {
        Self {
            algorithm: ToneMapAlgorithm::Linear,
            exposure: 0.0,
            white_point: 4.0,
        }
    }
}

/// Colour space the pipeline does its arithmetic in.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum WorkingSpace {
    /// Operate on the stored (sRGB-encoded) values directly.
    #[default]
    Display,
    /// Decode to linear light first and re-encode at the end.
    Linear,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ColorGradingSettings {
    pub exposure: f32,
    pub contrast: f32,
    pub highlights: f32,
    pub shadows: f32,
    pub whites: f32,
    pub blacks: f32,
    /// Kelvin.
    pub temperature: f32,
    pub tint: f32,
    pub vibrance: f32,
    pub saturation: f32,
    /// Degrees.
    pub hue: f32,
    pub lightness: f32,
    pub clarity: f32,
    pub dehaze: f32,
    pub tone_curve: ToneCurve,
    pub color_wheels: ColorWheels,
    pub vignette: VignetteSettings,
    pub lut: Option<LutSettings>,
    pub tone_mapping: ToneMappingSettings,
}

impl Default for ColorGradingSettings {
    fn default() -> Self {
        Self {
            exposure: 0.0,
            contrast: 0.0,
            highlights: 0.0,
            shadows: 0.0,
            whites: 0.0,
            blacks: 0.0,
            temperature: DEFAULT_TEMPERATURE,
            tint: 0.0,
            vibrance: 0.0,
            saturation: 0.0,
            hue: 0.0,
            lightness: 0.0,
            clarity: 0.0,
            dehaze: 0.0,
            tone_curve: ToneCurve::default(),
            color_wheels: ColorWheels::default(),
            vignette: VignetteSettings::default(),
            lut: None,
            tone_mapping: ToneMappingSettings::default(),
        }
    }
}

impl ColorGradingSettings {
    /// Copy with every value forced into its documented range.
    pub fn clamped(&self) -> Self {
        let lut = self.lut.as_ref().and_then(|lut| {
            let intensity = clamp_or(lut.intensity, 0.0, 1.0, 0.0);
            (intensity > 0.0).then(|| LutSettings {
                data: Arc::clone(&lut.data),
                intensity,
            })
        });
        Self {
            exposure: clamp_or(self.exposure, -2.0, 2.0, 0.0),
            contrast: clamp_or(self.contrast, -1.0, 1.0, 0.0),
            highlights: clamp_or(self.highlights, -1.0, 1.0, 0.0),
            shadows: clamp_or(self.shadows, -1.0, 1.0, 0.0),
            whites: clamp_or(self.whites, -1.0, 1.0, 0.0),
            blacks: clamp_or(self.blacks, -1.0, 1.0, 0.0),
            temperature: clamp_or(
                self.temperature,
                MIN_TEMPERATURE,
                MAX_TEMPERATURE,
                DEFAULT_TEMPERATURE,
            ),
            tint: clamp_or(self.tint, -100.0, 100.0, 0.0),
            vibrance: clamp_or(self.vibrance, -1.0, 1.0, 0.0),
            saturation: clamp_or(self.saturation, -1.0, 1.0, 0.0),
            hue: clamp_or(self.hue, -180.0, 180.0, 0.0),
            lightness: clamp_or(self.lightness, -1.0, 1.0, 0.0),
            clarity: clamp_or(self.clarity, -1.0, 1.0, 0.0),
            dehaze: clamp_or(self.dehaze, -1.0, 1.0, 0.0),
            tone_curve: ToneCurve {
                shadows: clamp_curve(&self.tone_curve.shadows),
                midtones: clamp_curve(&self.tone_curve.midtones),
                highlights: clamp_curve(&self.tone_curve.highlights),
            },
            color_wheels: ColorWheels {
                shadows: self.color_wheels.shadows.clamped(),
                midtones: self.color_wheels.midtones.clamped(),
                highlights: self.color_wheels.highlights.clamped(),
            },
            vignette: VignetteSettings {
                amount: clamp_or(self.vignette.amount, -1.0, 1.0, 0.0),
                midpoint: clamp_or(self.vignette.midpoint, 0.0, 1.0, 0.5),
                roundness: clamp_or(self.vignette.roundness, 0.0, 1.0, 0.5),
                feather: clamp_or(self.vignette.feather, 0.0, 1.0, 0.5),
            },
            lut,
            tone_mapping: ToneMappingSettings {
                algorithm: self.tone_mapping.algorithm,
                exposure: clamp_or(self.tone_mapping.exposure, -4.0, 4.0, 0.0),
                white_point: clamp_or(self.tone_mapping.white_point, 1.0, 64.0, 4.0),
            },
        }
    }

    /// True when grading with these settings leaves every pixel unchanged.
    pub fn is_identity(&self) -> bool {
        let c = self.clamped();
        let neutral = Self::default();
        c.lut.is_none()
            && c.exposure == 0.0
            && c.contrast == 0.0
            && c.highlights == 0.0
            && c.shadows == 0.0
            && c.whites == 0.0
            && c.blacks == 0.0
            && c.temperature == DEFAULT_TEMPERATURE
            && c.tint == 0.0
            && c.vibrance == 0.0
            && c.saturation == 0.0
            && c.hue == 0.0
            && c.lightness == 0.0
            && c.clarity == 0.0
            && c.dehaze == 0.0
            && c.tone_curve == neutral.tone_curve
            && c.color_wheels.shadows.saturation == 0.0
            && c.color_wheels.shadows.luminance == 0.0
            && c.color_wheels.midtones.saturation == 0.0
            && c.color_wheels.midtones.luminance == 0.0
            && c.color_wheels.highlights.saturation == 0.0
            && c.color_wheels.highlights.luminance == 0.0
            && c.vignette.amount == 0.0
            && c.tone_mapping.algorithm == ToneMapAlgorithm::Linear
            && c.tone_mapping.exposure == 0.0
    }

    /// New settings value with the patch's fields overriding this one.
    pub fn apply_patch(&self, patch: &SettingsPatch) -> Self {
        let mut next = self.clone();
        macro_rules! merge {
            ($($field:ident),* $(,)?) => {
                $(if let Some(v) = &patch.$field { next.$field = v.clone(); })*
            };
        }
        merge!(
            exposure,
            contrast,
            highlights,
            shadows,
            whites,
            blacks,
            temperature,
            tint,
            vibrance,
            saturation,
            hue,
            lightness,
            clarity,
            dehaze,
            tone_curve,
            color_wheels,
            vignette,
            lut,
            tone_mapping,
        );
        next
    }
}

// Distinguishes an absent field from an explicit `null`.
fn explicit_option<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

/// Partial settings change. `None` leaves a field untouched; for `lut`,
/// `Some(None)` removes the LUT.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SettingsPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exposure: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contrast: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub highlights: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shadows: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub whites: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub blacks: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tint: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vibrance: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub saturation: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hue: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lightness: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub clarity: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dehaze: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tone_curve: Option<ToneCurve>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color_wheels: Option<ColorWheels>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vignette: Option<VignetteSettings>,
    #[serde(
        skip_serializing_if = "Option::is_none",
        deserialize_with = "explicit_option"
    )]
    pub lut: Option<Option<LutSettings>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tone_mapping: Option<ToneMappingSettings>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PresetCategory {
    Portrait,
    Landscape,
    Vintage,
    Cinematic,
    #[default]
    Custom,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColorGradingPreset {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub settings: ColorGradingSettings,
    #[serde(default)]
    pub category: PresetCategory,
    #[serde(default)]
    pub tags: BTreeSet<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

pub const BUILTIN_PRESET_PREFIX: &str = "builtin-";

impl ColorGradingPreset {
    pub fn is_builtin(&self) -> bool {
        self.id.starts_with(BUILTIN_PRESET_PREFIX)
    }
}

/// Timing and memory figures for the most recent frame.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PerformanceMetrics {
    /// Milliseconds.
    pub processing_time: f64,
    pub fps: f64,
    /// Megabytes.
    pub memory_usage: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gpu_utilization: Option<f64>,
}

impl PerformanceMetrics {
    pub fn from_frame(processing_time: f64, memory_bytes: u64, gpu_utilization: Option<f64>) -> Self {
        let fps = if processing_time > 0.0 {
            1000.0 / processing_time
        } else {
            0.0
        };
        Self {
            processing_time,
            fps,
            memory_usage: memory_bytes as f64 / (1024.0 * 1024.0),
            gpu_utilization,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_identity() {
        assert!(ColorGradingSettings::default().is_identity());
    }

    #[test]
    fn clamping_pins_out_of_range_values() {
        let settings = ColorGradingSettings {
            exposure: 9.0,
            contrast: -4.0,
            temperature: 100.0,
            hue: f32::NAN,
            ..Default::default()
        };
        let c = settings.clamped();
        assert_eq!(c.exposure, 2.0);
        assert_eq!(c.contrast, -1.0);
        assert_eq!(c.temperature, MIN_TEMPERATURE);
        assert_eq!(c.hue, 0.0);
    }

    #[test]
    fn degenerate_curves_fall_back_to_identity() {
        let mut settings = ColorGradingSettings::default();
        settings.tone_curve.shadows = vec![CurvePoint::new(0.3, 0.3)];
        settings.tone_curve.midtones = vec![
            CurvePoint::new(1.0, 1.0),
            CurvePoint::new(0.0, 0.0),
            CurvePoint::new(1.0, 0.9),
        ];
        let c = settings.clamped();
        assert_eq!(c.tone_curve.shadows, identity_curve());
        assert_eq!(c.tone_curve.midtones.len(), 2);
        assert_eq!(c.tone_curve.midtones[0].x, 0.0);
    }

    #[test]
    fn patch_overrides_only_present_fields() {
        let base = ColorGradingSettings {
            contrast: 0.3,
            ..Default::default()
        };
        let patch = SettingsPatch {
            exposure: Some(1.0),
            ..Default::default()
        };
        let next = base.apply_patch(&patch);
        assert_eq!(next.exposure, 1.0);
        assert_eq!(next.contrast, 0.3);
        assert_eq!(base.exposure, 0.0);
    }

    #[test]
    fn patch_json_distinguishes_null_lut() {
        let clear: SettingsPatch = serde_json::from_str(r#"{"lut": null}"#).unwrap();
        assert_eq!(clear.lut, Some(None));
        let untouched: SettingsPatch = serde_json::from_str(r#"{"exposure": 0.5}"#).unwrap();
        assert_eq!(untouched.lut, None);
        assert_eq!(untouched.exposure, Some(0.5));
    }

    #[test]
    fn settings_json_uses_camel_case() {
        let json = serde_json::to_value(ColorGradingSettings::default()).unwrap();
        assert!(json.get("toneCurve").is_some());
        assert_eq!(json["toneMapping"]["algorithm"], "linear");
        assert_eq!(json["temperature"], 5500.0);
    }
}
