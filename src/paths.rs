use std::fs;
use std::path::{Path, PathBuf};

use dirs::data_dir;

use crate::error::{GradingError, Result};

pub fn data_root() -> Result<PathBuf> {
    let base = data_dir()
        .ok_or_else(|| GradingError::Config("Unable to resolve data directory".to_string()))?;
    Ok(base.join("lumagrade"))
}

/// Per-user preset directory, created on first use.
pub fn default_presets_dir() -> Result<PathBuf> {
    let dir = data_root()?.join("presets");
    fs::create_dir_all(&dir)?;
    Ok(dir)
}

/// Ids name files directly inside the preset directory, so they may not
/// carry path separators or parent references.
pub fn is_valid_preset_id(preset_id: &str) -> bool {
    !preset_id.is_empty()
        && preset_id != "."
        && preset_id != ".."
        && !preset_id.contains(['/', '\\', '\0'])
}

pub fn preset_path(dir: &Path, preset_id: &str) -> Result<PathBuf> {
    if !is_valid_preset_id(preset_id) {
        return Err(GradingError::InvalidPreset(format!(
            "unusable preset id {preset_id:?}"
        )));
    }
    Ok(dir.join(format!("{preset_id}.json")))
}
