//! Preset files: a unit's opaque configuration blob, wrapped in a small
//! named envelope and written as JSON.

use std::fs;
use std::path::{Path, PathBuf};

use log::debug;
use serde::{Deserialize, Serialize};

use crate::engine::EngineError;
use crate::graph::AudioUnit;

/// The on-disk envelope around a unit's class data.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PresetFile {
    pub name: String,
    pub data: Vec<u8>,
}

/// Extension presets get when saved by name.
pub const PRESET_EXTENSION: &str = "aupreset";

fn read_file(path: &Path) -> Result<Vec<u8>, EngineError> {
    fs::read(path).map_err(|source| EngineError::FileOpen {
        path: path.to_path_buf(),
        source,
    })
}

fn write_file(path: &Path, bytes: &[u8]) -> Result<(), EngineError> {
    fs::write(path, bytes).map_err(|source| EngineError::FileOpen {
        path: path.to_path_buf(),
        source,
    })
}

fn named_path(directory: &Path, name: &str) -> PathBuf {
    directory.join(name).with_extension(PRESET_EXTENSION)
}

impl AudioUnit {
    /// Capture the unit's current configuration into a preset file at
    /// `path`.
    pub fn save_preset<P: AsRef<Path>>(&self, path: P) -> Result<(), EngineError> {
        let path = path.as_ref();
        let name = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let preset = PresetFile {
            name,
            data: self.class_data()?,
        };
        let bytes = serde_json::to_vec_pretty(&preset)
            .map_err(|e| EngineError::BadPresetData(e.to_string()))?;
        write_file(path, &bytes)?;
        debug!("saved preset {}", path.display());
        Ok(())
    }

    /// Restore a configuration previously captured by
    /// [`AudioUnit::save_preset`]. The unit is unchanged if the file cannot
    /// be read or parsed.
    pub fn load_preset<P: AsRef<Path>>(&self, path: P) -> Result<(), EngineError> {
        let path = path.as_ref();
        let bytes = read_file(path)?;
        let preset: PresetFile = serde_json::from_slice(&bytes)
            .map_err(|e| EngineError::BadPresetData(e.to_string()))?;
        self.set_class_data(&preset.data)
    }

    /// Save under `directory` as `<name>.aupreset`.
    pub fn save_custom_preset<P: AsRef<Path>>(
        &self,
        directory: P,
        name: &str,
    ) -> Result<(), EngineError> {
        self.save_preset(named_path(directory.as_ref(), name))
    }

    /// Load `<name>.aupreset` from `directory`.
    pub fn load_custom_preset<P: AsRef<Path>>(
        &self,
        directory: P,
        name: &str,
    ) -> Result<(), EngineError> {
        self.load_preset(named_path(directory.as_ref(), name))
    }

    fn class_data(&self) -> Result<Vec<u8>, EngineError> {
        self.engine().class_data(self.handle.id())
    }

    fn set_class_data(&self, data: &[u8]) -> Result<(), EngineError> {
        self.engine().set_class_data(self.handle.id(), data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::descriptor::{param, subtype, Scope, UnitDescriptor, UnitType};
    use crate::engine::SoftwareEngine;
    use std::sync::Arc;

    fn level_unit(engine: &Arc<SoftwareEngine>) -> AudioUnit {
        AudioUnit::new(
            engine.clone(),
            UnitDescriptor::new(UnitType::Generator, subtype::LEVEL_GENERATOR),
        )
        .unwrap()
    }

    #[test]
    fn presets_round_trip_between_units() {
        let engine = Arc::new(SoftwareEngine::new());
        let dir = tempfile::tempdir().unwrap();

        let a = level_unit(&engine);
        a.set_parameter(param::generator::LEVEL, Scope::Global, 0.75, 0)
            .unwrap();
        a.save_custom_preset(dir.path(), "bright").unwrap();

        let b = level_unit(&engine);
        b.load_custom_preset(dir.path(), "bright").unwrap();
        assert_eq!(
            b.get_parameter(param::generator::LEVEL, Scope::Global, 0)
                .unwrap(),
            0.75
        );
    }

    #[test]
    fn named_presets_get_the_extension() {
        let engine = Arc::new(SoftwareEngine::new());
        let dir = tempfile::tempdir().unwrap();
        let unit = level_unit(&engine);
        unit.save_custom_preset(dir.path(), "warm").unwrap();
        assert!(dir.path().join("warm.aupreset").exists());
    }

    #[test]
    fn malformed_preset_files_leave_the_unit_unchanged() {
        let engine = Arc::new(SoftwareEngine::new());
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.aupreset");
        std::fs::write(&path, b"not a preset").unwrap();

        let unit = level_unit(&engine);
        unit.set_parameter(param::generator::LEVEL, Scope::Global, 0.25, 0)
            .unwrap();
        assert!(matches!(
            unit.load_preset(&path),
            Err(EngineError::BadPresetData(_))
        ));
        assert_eq!(
            unit.get_parameter(param::generator::LEVEL, Scope::Global, 0)
                .unwrap(),
            0.25
        );
    }

    #[test]
    fn loading_a_missing_preset_fails_with_the_path() {
        let engine = Arc::new(SoftwareEngine::new());
        let unit = level_unit(&engine);
        assert!(matches!(
            unit.load_preset("/no/such/preset.aupreset"),
            Err(EngineError::FileOpen { .. })
        ));
    }
}
