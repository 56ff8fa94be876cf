//! Built-in looks plus user presets, optionally mirrored to a directory.

use std::collections::BTreeSet;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use serde_json::Value;
use tracing::info;
use uuid::Uuid;

use crate::error::{GradingError, Result};
use crate::models::{
    ColorGradingPreset, ColorGradingSettings, ColorWheelSettings, CurvePoint, PresetCategory,
    ToneMapAlgorithm, ToneMappingSettings, BUILTIN_PRESET_PREFIX,
};
use crate::preset_io;

pub const IMPORTED_SUFFIX: &str = " (Imported)";

fn builtin(
    slug: &str,
    name: &str,
    description: &str,
    category: PresetCategory,
    tags: &[&str],
    settings: ColorGradingSettings,
) -> ColorGradingPreset {
    // 2024-01-01T00:00:00Z
    let at = DateTime::<Utc>::from_timestamp(1_704_067_200, 0).unwrap_or_default();
    ColorGradingPreset {
        id: format!("{BUILTIN_PRESET_PREFIX}{slug}"),
        name: name.to_string(),
        description: Some(description.to_string()),
        settings,
        category,
        tags: tags.iter().map(|t| t.to_string()).collect(),
        created_at: at,
        updated_at: at,
    }
}

static BUILTIN_PRESETS: Lazy<Vec<ColorGradingPreset>> = Lazy::new(|| {
    let mut vintage = ColorGradingSettings {
        contrast: -0.15,
        saturation: -0.25,
        temperature: 6000.0,
        blacks: 0.2,
        ..Default::default()
    };
    vintage.tone_curve.midtones = vec![
        CurvePoint::new(0.0, 0.08),
        CurvePoint::new(0.5, 0.52),
        CurvePoint::new(1.0, 0.94),
    ];
    vintage.color_wheels.shadows = ColorWheelSettings::new(200.0, 0.3, 0.0);
    vintage.color_wheels.highlights = ColorWheelSettings::new(40.0, 0.3, 0.0);
    vintage.vignette.amount = -0.3;

    let mut cinematic = ColorGradingSettings {
        contrast: 0.2,
        saturation: 0.05,
        tone_mapping: ToneMappingSettings {
            algorithm: ToneMapAlgorithm::Aces,
            exposure: 0.3,
            white_point: 4.0,
        },
        ..Default::default()
    };
    cinematic.color_wheels.shadows = ColorWheelSettings::new(190.0, 0.5, -0.05);
    cinematic.color_wheels.highlights = ColorWheelSettings::new(30.0, 0.4, 0.0);
    cinematic.vignette.amount = -0.2;

    vec![
        builtin(
            "portrait",
            "Warm Portrait",
            "Soft warm skin tones with lifted shadows",
            PresetCategory::Portrait,
            &["warm", "skin"],
            ColorGradingSettings {
                temperature: 6200.0,
                tint: 5.0,
                shadows: 0.15,
                highlights: -0.1,
                vibrance: 0.15,
                saturation: -0.05,
                clarity: -0.1,
                ..Default::default()
            },
        ),
        builtin(
            "landscape",
            "Vivid Landscape",
            "Punchy colour and recovered skies",
            PresetCategory::Landscape,
            &["vivid", "outdoor"],
            ColorGradingSettings {
                contrast: 0.15,
                highlights: -0.2,
                shadows: 0.2,
                vibrance: 0.35,
                saturation: 0.1,
                clarity: 0.25,
                dehaze: 0.15,
                ..Default::default()
            },
        ),
        builtin(
            "vintage",
            "Faded Film",
            "Lifted blacks, muted colour and split toning",
            PresetCategory::Vintage,
            &["film", "faded"],
            vintage,
        ),
        builtin(
            "cinematic",
            "Teal & Orange",
            "Filmic tone mapping with teal shadows and warm highlights",
            PresetCategory::Cinematic,
            &["film", "teal-orange"],
            cinematic,
        ),
    ]
});

pub fn builtin_presets() -> &'static [ColorGradingPreset] {
    &BUILTIN_PRESETS
}

/// User presets in creation order. Built-ins are listed first and cannot be
/// replaced or removed.
#[derive(Debug, Default)]
pub struct PresetStore {
    user: Vec<ColorGradingPreset>,
    dir: Option<PathBuf>,
}

impl PresetStore {
    /// In-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Store backed by `dir`; existing preset files are loaded.
    pub fn open(dir: PathBuf) -> Result<Self> {
        let user = preset_io::load_preset_dir(&dir)?;
        info!(dir = %dir.display(), count = user.len(), "loaded user presets");
        Ok(Self {
            user,
            dir: Some(dir),
        })
    }

    pub fn list(&self) -> Vec<ColorGradingPreset> {
        builtin_presets()
            .iter()
            .chain(self.user.iter())
            .cloned()
            .collect()
    }

    pub fn get(&self, id: &str) -> Option<&ColorGradingPreset> {
        builtin_presets()
            .iter()
            .chain(self.user.iter())
            .find(|p| p.id == id)
    }

    pub fn create(
        &mut self,
        name: &str,
        description: Option<String>,
        category: PresetCategory,
        settings: ColorGradingSettings,
    ) -> Result<ColorGradingPreset> {
        let now = Utc::now();
        let preset = ColorGradingPreset {
            id: Uuid::new_v4().to_string(),
            name: name.to_string(),
            description,
            settings,
            category,
            tags: BTreeSet::new(),
            created_at: now,
            updated_at: now,
        };
        self.upsert(preset.clone())?;
        Ok(preset)
    }

    /// Insert or overwrite by id.
    pub fn upsert(&mut self, preset: ColorGradingPreset) -> Result<()> {
        if preset.is_builtin() {
            return Err(GradingError::BuiltinPreset(preset.id));
        }
        if let Some(dir) = &self.dir {
            preset_io::save_preset_file(dir, &preset)?;
        }
        match self.user.iter_mut().find(|p| p.id == preset.id) {
            Some(existing) => *existing = preset,
            None => self.user.push(preset),
        }
        Ok(())
    }

    /// False for unknown ids and built-ins.
    pub fn delete(&mut self, id: &str) -> Result<bool> {
        let Some(pos) = self.user.iter().position(|p| p.id == id) else {
            return Ok(false);
        };
        if let Some(dir) = &self.dir {
            preset_io::delete_preset_file(dir, id)?;
        }
        self.user.remove(pos);
        Ok(true)
    }

    pub fn export(&self, id: &str) -> Result<Option<String>> {
        match self.get(id) {
            Some(preset) => Ok(Some(serde_json::to_string_pretty(preset)?)),
            None => Ok(None),
        }
    }

    /// Accept an exported preset. It gets a fresh id and timestamps, and its
    /// name is suffixed so it never shadows the original.
    pub fn import(&mut self, json: &str) -> Result<ColorGradingPreset> {
        let value: Value = serde_json::from_str(json)
            .map_err(|e| GradingError::InvalidPreset(format!("not JSON: {e}")))?;
        let name = value
            .get("name")
            .and_then(Value::as_str)
            .ok_or_else(|| GradingError::InvalidPreset("missing name".to_string()))?;
        let settings = value
            .get("settings")
            .cloned()
            .ok_or_else(|| GradingError::InvalidPreset("missing settings".to_string()))?;
        let settings: ColorGradingSettings = serde_json::from_value(settings)
            .map_err(|e| GradingError::InvalidPreset(format!("bad settings: {e}")))?;
        let description = value
            .get("description")
            .and_then(Value::as_str)
            .map(str::to_string);
        let category = value
            .get("category")
            .cloned()
            .and_then(|c| serde_json::from_value(c).ok())
            .unwrap_or_default();
        let tags: BTreeSet<String> = value
            .get("tags")
            .cloned()
            .and_then(|t| serde_json::from_value(t).ok())
            .unwrap_or_default();

        let now = Utc::now();
        let preset = ColorGradingPreset {
            id: Uuid::new_v4().to_string(),
            name: format!("{name}{IMPORTED_SUFFIX}"),
            description,
            settings: settings.clamped(),
            category,
            tags,
            created_at: now,
            updated_at: now,
        };
        self.upsert(preset.clone())?;
        Ok(preset)
    }

    pub fn user_count(&self) -> usize {
        self.user.len()
    }
}
