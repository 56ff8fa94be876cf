//! Preset files on disk, one pretty-printed JSON document per preset.

use std::fs;
use std::path::Path;

use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::error::Result;
use crate::models::ColorGradingPreset;
use crate::paths::{is_valid_preset_id, preset_path};

pub fn save_preset_file(dir: &Path, preset: &ColorGradingPreset) -> Result<()> {
    fs::create_dir_all(dir)?;
    let path = preset_path(dir, &preset.id)?;
    let serialized = serde_json::to_string_pretty(preset)?;
    fs::write(&path, serialized)?;
    debug!(id = %preset.id, path = %path.display(), "preset written");
    Ok(())
}

/// Returns whether a file was removed.
pub fn delete_preset_file(dir: &Path, preset_id: &str) -> Result<bool> {
    let path = preset_path(dir, preset_id)?;
    if !path.exists() {
        return Ok(false);
    }
    fs::remove_file(&path)?;
    Ok(true)
}

pub fn load_preset_file(path: &Path) -> Result<ColorGradingPreset> {
    let data = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&data)?)
}

/// Read every `*.json` preset directly inside `dir`, oldest first. Files that
/// fail to parse are skipped with a warning.
pub fn load_preset_dir(dir: &Path) -> Result<Vec<ColorGradingPreset>> {
    if !dir.exists() {
        return Ok(Vec::new());
    }
    let mut presets = Vec::new();
    for entry in WalkDir::new(dir).min_depth(1).max_depth(1) {
        let entry = match entry {
            Ok(e) => e,
            Err(e) => {
                warn!(error = %e, "skipping unreadable preset entry");
                continue;
            }
        };
        let path = entry.path();
        let is_json = path
            .extension()
            .map(|ext| ext.eq_ignore_ascii_case("json"))
            .unwrap_or(false);
        if !entry.file_type().is_file() || !is_json {
            continue;
        }
        match load_preset_file(path) {
            Ok(preset) if !is_valid_preset_id(&preset.id) => {
                warn!(path = %path.display(), id = %preset.id, "skipping preset with unusable id")
            }
            Ok(preset) if !preset.is_builtin() => presets.push(preset),
            Ok(preset) => warn!(id = %preset.id, "ignoring stored copy of a built-in preset"),
            Err(e) => warn!(path = %path.display(), error = %e, "skipping invalid preset file"),
        }
    }
    presets.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
    Ok(presets)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ColorGradingSettings, PresetCategory};
    use chrono::{Duration, Utc};

    fn preset(id: &str, offset_secs: i64) -> ColorGradingPreset {
        let at = Utc::now() + Duration::seconds(offset_secs);
        ColorGradingPreset {
            id: id.to_string(),
            name: format!("Preset {id}"),
            description: None,
            settings: ColorGradingSettings {
                contrast: 0.25,
                ..Default::default()
            },
            category: PresetCategory::Custom,
            tags: Default::default(),
            created_at: at,
            updated_at: at,
        }
    }

    #[test]
    fn write_scan_delete() {
        let dir = tempfile::tempdir().unwrap();
        save_preset_file(dir.path(), &preset("b", 10)).unwrap();
        save_preset_file(dir.path(), &preset("a", 0)).unwrap();
        fs::write(dir.path().join("notes.txt"), "ignored").unwrap();
        fs::write(dir.path().join("broken.json"), "{").unwrap();

        let loaded = load_preset_dir(dir.path()).unwrap();
        let ids: Vec<_> = loaded.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, ["a", "b"]);
        assert_eq!(loaded[0].settings.contrast, 0.25);

        assert!(delete_preset_file(dir.path(), "a").unwrap());
        assert!(!delete_preset_file(dir.path(), "a").unwrap());
        assert_eq!(load_preset_dir(dir.path()).unwrap().len(), 1);
    }

    #[test]
    fn scan_skips_bad_ids_and_broken_lattices() {
        let dir = tempfile::tempdir().unwrap();
        save_preset_file(dir.path(), &preset("good", 0)).unwrap();

        let mut escaping = serde_json::to_value(preset("x", 1)).unwrap();
        escaping["id"] = "../x".into();
        fs::write(dir.path().join("escaping.json"), escaping.to_string()).unwrap();

        let mut short_lut = serde_json::to_value(preset("short", 2)).unwrap();
        short_lut["settings"]["lut"] = serde_json::json!({
            "data": {"size": 4, "data": [0.1, 0.2, 0.3], "format": "cube"},
            "intensity": 1.0
        });
        fs::write(dir.path().join("short.json"), short_lut.to_string()).unwrap();

        let loaded = load_preset_dir(dir.path()).unwrap();
        let ids: Vec<_> = loaded.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, ["good"]);

        assert!(save_preset_file(dir.path(), &preset("../x", 0)).is_err());
        assert!(delete_preset_file(dir.path(), "../good").is_err());
        assert!(dir.path().join("good.json").exists());
    }

    #[test]
    fn missing_dir_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let none = load_preset_dir(&dir.path().join("nope")).unwrap();
        assert!(none.is_empty());
    }
}
