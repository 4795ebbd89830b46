use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

pub const MANIFEST_FILE: &str = "map.json";

/// Map description loaded from `assets/map.json`. Defaults match the shipped
/// overworld: a 10560x6080 world cut into 512px tiles, with a 4x downscaled
/// collision bitmap.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MapManifest {
    pub map_width: u32,
    pub map_height: u32,
    pub tile_size: u32,
    pub tile_dir: String,
    pub tile_extension: String,
    pub collision_path: String,
    pub collision_scale: u32,
    pub sprite_sheet_path: String,
    pub sprite_frame_width: u32,
    pub sprite_frame_height: u32,
}

impl Default for MapManifest {
    fn default() -> Self {
        Self {
            map_width: 10560,
            map_height: 6080,
            tile_size: 512,
            tile_dir: "tiles".to_string(),
            tile_extension: "png".to_string(),
            collision_path: "map-collision.png".to_string(),
            collision_scale: 4,
            sprite_sheet_path: "character.png".to_string(),
            sprite_frame_width: 68,
            sprite_frame_height: 72,
        }
    }
}

#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("failed to read map manifest '{path}': {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to parse map manifest '{path}': {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("invalid map manifest '{path}': {reason}")]
    Invalid { path: PathBuf, reason: String },
}

impl MapManifest {
    pub fn load(path: &Path) -> Result<Self, ManifestError> {
        let raw = fs::read_to_string(path).map_err(|source| ManifestError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let manifest: Self =
            serde_json::from_str(&raw).map_err(|source| ManifestError::Parse {
                path: path.to_path_buf(),
                source,
            })?;
        manifest.validate(path)?;
        Ok(manifest)
    }

    /// Missing manifest is not an error: a default map description keeps the
    /// app bootable against the shipped asset layout. A present-but-broken
    /// manifest still fails startup.
    pub fn load_or_default(path: &Path) -> Result<Self, ManifestError> {
        match Self::load(path) {
            Ok(manifest) => Ok(manifest),
            Err(ManifestError::Read { source, .. }) if source.kind() == io::ErrorKind::NotFound => {
                info!(path = %path.display(), "map_manifest_missing_using_defaults");
                Ok(Self::default())
            }
            Err(error) => Err(error),
        }
    }

    fn validate(&self, path: &Path) -> Result<(), ManifestError> {
        let fail = |reason: String| ManifestError::Invalid {
            path: path.to_path_buf(),
            reason,
        };
        if self.map_width == 0 || self.map_height == 0 {
            return Err(fail(format!(
                "map dimensions must be non-zero, got {}x{}",
                self.map_width, self.map_height
            )));
        }
        if self.tile_size == 0 {
            return Err(fail("tile_size must be non-zero".to_string()));
        }
        if self.collision_scale == 0 {
            return Err(fail("collision_scale must be non-zero".to_string()));
        }
        if self.sprite_frame_width == 0 || self.sprite_frame_height == 0 {
            return Err(fail(format!(
                "sprite frame must be non-zero, got {}x{}",
                self.sprite_frame_width, self.sprite_frame_height
            )));
        }
        if self.tile_extension.is_empty() {
            return Err(fail("tile_extension must not be empty".to_string()));
        }
        Ok(())
    }

    pub fn tiles_x(&self) -> i32 {
        self.map_width.div_ceil(self.tile_size) as i32
    }

    pub fn tiles_y(&self) -> i32 {
        self.map_height.div_ceil(self.tile_size) as i32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_describe_shipped_map() {
        let manifest = MapManifest::default();
        assert_eq!(manifest.map_width, 10560);
        assert_eq!(manifest.map_height, 6080);
        assert_eq!(manifest.tiles_x(), 21);
        assert_eq!(manifest.tiles_y(), 12);
    }

    #[test]
    fn load_round_trips_through_json() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join(MANIFEST_FILE);
        let original = MapManifest {
            map_width: 2048,
            map_height: 1024,
            tile_size: 256,
            ..MapManifest::default()
        };
        fs::write(
            &path,
            serde_json::to_string_pretty(&original).expect("encode"),
        )
        .expect("write");

        let loaded = MapManifest::load(&path).expect("load");
        assert_eq!(loaded, original);
        assert_eq!(loaded.tiles_x(), 8);
        assert_eq!(loaded.tiles_y(), 4);
    }

    #[test]
    fn load_or_default_falls_back_when_missing() {
        let dir = tempfile::tempdir().expect("tempdir");
        let loaded = MapManifest::load_or_default(&dir.path().join(MANIFEST_FILE)).expect("load");
        assert_eq!(loaded, MapManifest::default());
    }

    #[test]
    fn zero_tile_size_is_rejected() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join(MANIFEST_FILE);
        fs::write(&path, r#"{"tile_size": 0}"#).expect("write");

        let error = MapManifest::load(&path).expect_err("must reject");
        assert!(matches!(error, ManifestError::Invalid { .. }));
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join(MANIFEST_FILE);
        fs::write(&path, r#"{"map_widht": 100}"#).expect("write");

        let error = MapManifest::load(&path).expect_err("must reject");
        assert!(matches!(error, ManifestError::Parse { .. }));
    }

    #[test]
    fn partial_tiles_round_up() {
        let manifest = MapManifest {
            map_width: 1000,
            map_height: 500,
            tile_size: 512,
            ..MapManifest::default()
        };
        assert_eq!(manifest.tiles_x(), 2);
        assert_eq!(manifest.tiles_y(), 1);
    }
}
