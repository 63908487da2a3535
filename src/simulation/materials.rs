use crate::floating_type_mod::FT;
use crate::simulation::{vec4f, V4};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use thiserror::Error;

/// Everything that can go wrong while bringing a world up: material
/// databases, ship definition files, layer images. The tick loop itself has
/// no fallible operations; a failed load leaves the previous world in place.
#[derive(Debug, Error)]
pub enum GameError {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed database or manifest: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("malformed image: {0}")]
    Image(#[from] image::ImageError),

    #[error("invalid color key `{0}`")]
    InvalidColorKey(String),

    #[error("no structural material with color {0} (pixel at {1}, {2})")]
    MaterialNotFound(ColorKey, u32, u32),

    #[error("no electrical material with color {0} (pixel at {1}, {2})")]
    ElectricalMaterialNotFound(ColorKey, u32, u32),

    #[error("electrical material at ({0}, {1}) sits on a background pixel")]
    ElectricalOnBackground(u32, u32),

    #[error("rope layer color {0} has {1} endpoints, exactly 2 required")]
    MalformedRopeSegment(ColorKey, usize),

    #[error("the structural database has no rope material")]
    MissingRopeMaterial,

    #[error("the structural database has no background color")]
    MissingBackgroundColor,

    #[error("duplicate material color {0}")]
    DuplicateMaterialColor(ColorKey),

    #[error("image is too large: {0}x{1} (max {2}x{2})")]
    ImageTooLarge(u32, u32, u32),

    #[error("{0}")]
    Other(String),
}

/// Opaque color-like key identifying a material. Pixels of the structural
/// and electrical layers are looked up by exact key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ColorKey {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl ColorKey {
    pub fn new(r: u8, g: u8, b: u8) -> Self {
        ColorKey { r, g, b }
    }

    pub fn render_color(&self) -> V4 {
        vec4f(
            self.r as FT / 255.,
            self.g as FT / 255.,
            self.b as FT / 255.,
            1.,
        )
    }
}

impl TryFrom<String> for ColorKey {
    type Error = GameError;

    fn try_from(s: String) -> Result<Self, GameError> {
        let hex = s.strip_prefix('#').unwrap_or(&s);
        if hex.len() != 6 {
            return Err(GameError::InvalidColorKey(s));
        }
        let parse = |r: &str| u8::from_str_radix(r, 16).map_err(|_| GameError::InvalidColorKey(s.to_string()));
        Ok(ColorKey {
            r: parse(&hex[0..2])?,
            g: parse(&hex[2..4])?,
            b: parse(&hex[4..6])?,
        })
    }
}

impl From<ColorKey> for String {
    fn from(c: ColorKey) -> String {
        format!("#{:02x}{:02x}{:02x}", c.r, c.g, c.b)
    }
}

impl std::fmt::Display for ColorKey {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }
}

/// A structural material. Immutable and process-wide once the database is
/// loaded; particles keep an index into the database for their whole life.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StructuralMaterial {
    pub name: String,
    pub color: ColorKey,

    pub mass: FT,
    pub stiffness: FT,
    pub strength: FT,
    pub is_hull: bool,

    pub water_volume_fill: FT,
    pub water_intake: FT,
    pub water_retention: FT,
    pub water_diffusion_speed: FT,

    pub wind_receptivity: FT,
    pub rust_receptivity: FT,

    pub heat_capacity: FT,
    pub thermal_conductivity: FT,
    pub ignition_temperature: FT,

    #[serde(default)]
    pub render_color: Option<ColorKey>,

    #[serde(default)]
    pub is_rope: bool,
    #[serde(default)]
    pub is_background: bool,
}

impl StructuralMaterial {
    pub fn render_color(&self) -> V4 {
        self.render_color.unwrap_or(self.color).render_color()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SwitchKind {
    Push,
    Toggle,
    Automatic,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PowerProbeKind {
    Engine,
    Generator,
    Monitor,
}

/// The electrical role of a material, with its per-kind parameters.
/// Dispatch inside the electrical subsystem is on this tag; there are no
/// per-element virtual calls.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ElectricalKind {
    Lamp {
        luminiscence: FT,
        #[serde(default)]
        is_self_powered: bool,
    },
    Switch {
        switch_kind: SwitchKind,
    },
    PowerProbe {
        probe_kind: PowerProbeKind,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ElectricalMaterial {
    pub name: String,
    pub color: ColorKey,

    #[serde(flatten)]
    pub kind: ElectricalKind,

    #[serde(default)]
    pub heat_generated: FT,
    #[serde(default)]
    pub is_waterproof: bool,
}

pub type StructuralMaterialId = u32;
pub type ElectricalMaterialId = u32;

/// The immutable material catalog: structural and electrical materials
/// keyed by color. Shared freely; nothing in it mutates after load.
pub struct MaterialDatabase {
    structural: Vec<StructuralMaterial>,
    electrical: Vec<ElectricalMaterial>,

    structural_by_color: HashMap<ColorKey, StructuralMaterialId>,
    electrical_by_color: HashMap<ColorKey, ElectricalMaterialId>,

    background_color: ColorKey,
    rope_material_id: StructuralMaterialId,
}

impl MaterialDatabase {
    pub fn load(
        structural_path: impl AsRef<Path>,
        electrical_path: impl AsRef<Path>,
    ) -> Result<Self, GameError> {
        let structural_yaml = std::fs::read_to_string(structural_path)?;
        let electrical_yaml = std::fs::read_to_string(electrical_path)?;
        Self::from_yaml(&structural_yaml, &electrical_yaml)
    }

    pub fn from_yaml(structural_yaml: &str, electrical_yaml: &str) -> Result<Self, GameError> {
        let structural: Vec<StructuralMaterial> = serde_yaml::from_str(structural_yaml)?;
        let electrical: Vec<ElectricalMaterial> = serde_yaml::from_str(electrical_yaml)?;
        Self::new(structural, electrical)
    }

    pub fn new(
        structural: Vec<StructuralMaterial>,
        electrical: Vec<ElectricalMaterial>,
    ) -> Result<Self, GameError> {
        let mut structural_by_color = HashMap::new();
        for (id, material) in structural.iter().enumerate() {
            if structural_by_color
                .insert(material.color, id as StructuralMaterialId)
                .is_some()
            {
                return Err(GameError::DuplicateMaterialColor(material.color));
            }
        }

        let mut electrical_by_color = HashMap::new();
        for (id, material) in electrical.iter().enumerate() {
            if electrical_by_color
                .insert(material.color, id as ElectricalMaterialId)
                .is_some()
            {
                return Err(GameError::DuplicateMaterialColor(material.color));
            }
        }

        let background_color = structural
            .iter()
            .find(|m| m.is_background)
            .map(|m| m.color)
            .ok_or(GameError::MissingBackgroundColor)?;

        let rope_material_id = structural
            .iter()
            .position(|m| m.is_rope)
            .map(|p| p as StructuralMaterialId)
            .ok_or(GameError::MissingRopeMaterial)?;

        Ok(MaterialDatabase {
            structural,
            electrical,
            structural_by_color,
            electrical_by_color,
            background_color,
            rope_material_id,
        })
    }

    pub fn structural(&self, id: StructuralMaterialId) -> &StructuralMaterial {
        &self.structural[id as usize]
    }

    pub fn electrical(&self, id: ElectricalMaterialId) -> &ElectricalMaterial {
        &self.electrical[id as usize]
    }

    pub fn structural_by_color(&self, color: ColorKey) -> Option<StructuralMaterialId> {
        self.structural_by_color.get(&color).copied()
    }

    pub fn electrical_by_color(&self, color: ColorKey) -> Option<ElectricalMaterialId> {
        self.electrical_by_color.get(&color).copied()
    }

    pub fn background_color(&self) -> ColorKey {
        self.background_color
    }

    pub fn rope_material_id(&self) -> StructuralMaterialId {
        self.rope_material_id
    }

    pub fn rope_material(&self) -> &StructuralMaterial {
        self.structural(self.rope_material_id)
    }

    /// The material air bubbles are made of: the least dense non-background
    /// structural material. Kept stable by database order on ties.
    pub fn air_bubble_material_id(&self) -> StructuralMaterialId {
        self.structural
            .iter()
            .enumerate()
            .filter(|(_, m)| !m.is_background)
            .min_by(|(_, a), (_, b)| a.mass.partial_cmp(&b.mass).unwrap())
            .map(|(id, _)| id as StructuralMaterialId)
            .unwrap_or(self.rope_material_id)
    }
}

#[cfg(test)]
pub(crate) mod test_fixtures {
    use super::*;

    pub const STRUCTURAL_YAML: &str = r##"
- name: Background
  color: "#000000"
  mass: 1.0
  stiffness: 1.0
  strength: 1.0
  is_hull: false
  water_volume_fill: 0.0
  water_intake: 0.0
  water_retention: 0.0
  water_diffusion_speed: 0.0
  wind_receptivity: 0.0
  rust_receptivity: 0.0
  heat_capacity: 1000.0
  thermal_conductivity: 50.0
  ignition_temperature: 1000.0
  is_background: true
- name: Iron Hull
  color: "#404050"
  mass: 750.0
  stiffness: 1.0
  strength: 0.055
  is_hull: true
  water_volume_fill: 1.0
  water_intake: 1.0
  water_retention: 0.1
  water_diffusion_speed: 0.5
  wind_receptivity: 0.0
  rust_receptivity: 1.0
  heat_capacity: 449.0
  thermal_conductivity: 80.2
  ignition_temperature: 1783.15
- name: Wood
  color: "#c29a5b"
  mass: 400.0
  stiffness: 1.0
  strength: 0.025
  is_hull: false
  water_volume_fill: 1.0
  water_intake: 1.0
  water_retention: 0.05
  water_diffusion_speed: 0.5
  wind_receptivity: 0.5
  rust_receptivity: 0.0
  heat_capacity: 1700.0
  thermal_conductivity: 0.4
  ignition_temperature: 573.15
- name: Rope
  color: "#703f0a"
  mass: 140.0
  stiffness: 1.0
  strength: 0.1
  is_hull: false
  water_volume_fill: 1.0
  water_intake: 1.0
  water_retention: 0.0
  water_diffusion_speed: 0.5
  wind_receptivity: 1.0
  rust_receptivity: 0.2
  heat_capacity: 2000.0
  thermal_conductivity: 0.3
  ignition_temperature: 423.15
  is_rope: true
"##;

    pub const ELECTRICAL_YAML: &str = r##"
- name: Lamp
  color: "#ffff80"
  kind: lamp
  luminiscence: 1.0
- name: Generator
  color: "#5b8731"
  kind: power_probe
  probe_kind: generator
- name: Toggle Switch
  color: "#bf4a20"
  kind: switch
  switch_kind: toggle
"##;

    pub fn test_database() -> MaterialDatabase {
        MaterialDatabase::from_yaml(STRUCTURAL_YAML, ELECTRICAL_YAML).unwrap()
    }
}

#[cfg(test)]
mod tests {
    use super::test_fixtures::*;
    use super::*;

    #[test]
    fn loads_and_indexes_by_color() {
        let db = test_database();
        let hull_id = db.structural_by_color(ColorKey::new(0x40, 0x40, 0x50)).unwrap();
        assert_eq!(db.structural(hull_id).name, "Iron Hull");
        assert!(db.structural(hull_id).is_hull);
        assert_eq!(db.background_color(), ColorKey::new(0, 0, 0));
        assert!(db.rope_material().is_rope);
    }

    #[test]
    fn electrical_kinds_parse_with_parameters() {
        let db = test_database();
        let lamp_id = db.electrical_by_color(ColorKey::new(0xff, 0xff, 0x80)).unwrap();
        match db.electrical(lamp_id).kind {
            ElectricalKind::Lamp { luminiscence, .. } => assert_eq!(luminiscence, 1.0),
            _ => panic!("expected a lamp"),
        }
        let gen_id = db.electrical_by_color(ColorKey::new(0x5b, 0x87, 0x31)).unwrap();
        assert_eq!(
            db.electrical(gen_id).kind,
            ElectricalKind::PowerProbe {
                probe_kind: PowerProbeKind::Generator
            }
        );
    }

    #[test]
    fn missing_rope_material_is_rejected() {
        let no_rope = STRUCTURAL_YAML.replace("is_rope: true", "is_rope: false");
        let result = MaterialDatabase::from_yaml(&no_rope, ELECTRICAL_YAML);
        assert!(matches!(result, Err(GameError::MissingRopeMaterial)));
    }

    #[test]
    fn color_key_roundtrip() {
        let key = ColorKey::try_from("#a1B2c3".to_string()).unwrap();
        assert_eq!(key, ColorKey::new(0xa1, 0xb2, 0xc3));
        assert_eq!(String::from(key), "#a1b2c3");
        assert!(ColorKey::try_from("#12345".to_string()).is_err());
    }

    #[test]
    fn air_bubble_material_is_lightest() {
        let db = test_database();
        let id = db.air_bubble_material_id();
        assert_eq!(db.structural(id).name, "Rope");
    }
}
