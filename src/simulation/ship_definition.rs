use crate::floating_type_mod::FT;
use crate::simulation::materials::GameError;
use crate::simulation::{vec2f, V2};
use image::{RgbImage, RgbaImage};
use serde::Deserialize;
use std::path::{Path, PathBuf};

// Larger layers would make the particle count explode
pub const MAX_SHIP_IMAGE_DIMENSION: u32 = 2048;

#[derive(Debug, Clone)]
pub struct ShipMetadata {
    pub ship_name: String,
    pub author: Option<String>,
    pub offset: V2,
}

#[derive(Debug, Deserialize)]
struct ShipManifest {
    structural_layer: PathBuf,
    #[serde(default)]
    ropes_layer: Option<PathBuf>,
    #[serde(default)]
    electrical_layer: Option<PathBuf>,
    #[serde(default)]
    texture_layer: Option<PathBuf>,
    #[serde(default)]
    ship_name: Option<String>,
    #[serde(default)]
    author: Option<String>,
    #[serde(default)]
    offset_x: FT,
    #[serde(default)]
    offset_y: FT,
}

/// A ship definition: the layer images plus metadata, either from a
/// manifest or synthesized from a bare structural image.
pub struct ShipDefinition {
    pub structural_layer: RgbImage,
    pub ropes_layer: Option<RgbImage>,
    pub electrical_layer: Option<RgbImage>,
    pub texture_layer: Option<RgbaImage>,
    pub metadata: ShipMetadata,
}

impl ShipDefinition {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, GameError> {
        let path = path.as_ref();
        match path.extension().and_then(|e| e.to_str()) {
            Some("shp") | Some("yaml") | Some("yml") => Self::load_from_manifest(path),
            _ => Self::load_from_bare_image(path),
        }
    }

    fn load_from_manifest(path: &Path) -> Result<Self, GameError> {
        let manifest: ShipManifest = serde_yaml::from_str(&std::fs::read_to_string(path)?)?;
        let base_dir = path.parent().unwrap_or_else(|| Path::new("."));

        let resolve = |p: &Path| -> PathBuf {
            if p.is_absolute() {
                p.to_path_buf()
            } else {
                base_dir.join(p)
            }
        };

        let structural_layer = load_rgb_layer(&resolve(&manifest.structural_layer))?;

        let ropes_layer = manifest
            .ropes_layer
            .as_deref()
            .map(|p| load_rgb_layer(&resolve(p)))
            .transpose()?;
        let electrical_layer = manifest
            .electrical_layer
            .as_deref()
            .map(|p| load_rgb_layer(&resolve(p)))
            .transpose()?;
        let texture_layer = manifest
            .texture_layer
            .as_deref()
            .map(|p| -> Result<RgbaImage, GameError> {
                let image = image::open(resolve(p))?.into_rgba8();
                check_dimensions(image.width(), image.height())?;
                Ok(image)
            })
            .transpose()?;

        let ship_name = manifest
            .ship_name
            .unwrap_or_else(|| name_from_file(&manifest.structural_layer));

        Ok(ShipDefinition {
            structural_layer,
            ropes_layer,
            electrical_layer,
            texture_layer,
            metadata: ShipMetadata {
                ship_name,
                author: manifest.author,
                offset: vec2f(manifest.offset_x, manifest.offset_y),
            },
        })
    }

    fn load_from_bare_image(path: &Path) -> Result<Self, GameError> {
        let structural_layer = load_rgb_layer(path)?;

        Ok(ShipDefinition {
            structural_layer,
            ropes_layer: None,
            electrical_layer: None,
            texture_layer: None,
            metadata: ShipMetadata {
                ship_name: name_from_file(path),
                author: None,
                offset: vec2f(0., 0.),
            },
        })
    }

    /// In-memory construction; also the seam tests build ships through.
    pub fn from_images(
        structural_layer: RgbImage,
        ropes_layer: Option<RgbImage>,
        electrical_layer: Option<RgbImage>,
        metadata: ShipMetadata,
    ) -> Self {
        ShipDefinition {
            structural_layer,
            ropes_layer,
            electrical_layer,
            texture_layer: None,
            metadata,
        }
    }
}

fn load_rgb_layer(path: &Path) -> Result<RgbImage, GameError> {
    let image = image::open(path)?.into_rgb8();
    check_dimensions(image.width(), image.height())?;
    Ok(image)
}

fn check_dimensions(width: u32, height: u32) -> Result<(), GameError> {
    if width > MAX_SHIP_IMAGE_DIMENSION || height > MAX_SHIP_IMAGE_DIMENSION {
        Err(GameError::ImageTooLarge(width, height, MAX_SHIP_IMAGE_DIMENSION))
    } else {
        Ok(())
    }
}

fn name_from_file(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().replace('_', " "))
        .unwrap_or_else(|| "Unnamed Ship".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metadata_name_is_synthesized_from_the_file_name() {
        assert_eq!(name_from_file(Path::new("/ships/so_long_marianne.png")), "so long marianne");
    }

    #[test]
    fn oversized_layers_are_rejected() {
        assert!(check_dimensions(2048, 2048).is_ok());
        assert!(matches!(
            check_dimensions(2049, 16),
            Err(GameError::ImageTooLarge(2049, 16, _))
        ));
    }
}
