pub mod bombs;
pub mod concurrency;
pub mod electrical_elements;
pub mod events;
pub mod fixed_vec;
pub mod game_controller;
pub mod game_parameters;
pub mod materials;
pub mod ocean_floor;
pub mod ocean_surface;
pub mod parameter_smoother;
pub mod pinned_points;
pub mod points;
pub mod preview;
pub mod random;
pub mod reordering;
pub mod ship;
pub mod ship_builder;
pub mod ship_definition;
pub mod springs;
pub mod triangles;
pub mod view_model;
pub mod wind;
pub mod world;

use crate::floating_type_mod::FT;

use nalgebra::SVector;
use num_traits::Float;
use std::fmt::Display;

pub type V<T, const D: usize> = SVector<T, D>;
pub type VF<const D: usize> = V<FT, D>;

pub type V2 = V<FT, 2>;
pub type V4 = V<FT, 4>;

pub fn vec2f(x: FT, y: FT) -> V2 {
    [x, y].into()
}

pub fn vec4f(x: FT, y: FT, z: FT, w: FT) -> V4 {
    [x, y, z, w].into()
}

/// Index of an element (particle, spring, triangle, electrical element)
/// inside its structure-of-arrays container. All cross-references between
/// containers are these indices; there are no owning pointers.
pub type ElementIndex = u32;

pub const NONE_ELEMENT_INDEX: ElementIndex = ElementIndex::MAX;

pub type PlaneId = u32;
pub type ConnectedComponentId = u32;

pub const NONE_PLANE_ID: PlaneId = PlaneId::MAX;
pub const NONE_CONNECTED_COMPONENT_ID: ConnectedComponentId = ConnectedComponentId::MAX;

pub fn smooth_step(lo: FT, hi: FT, x: FT) -> FT {
    let t = ((x - lo) / (hi - lo)).clamp(0., 1.);
    t * t * (3. - 2. * t)
}

pub fn assert_ft_approx_eq<F: Float + Display>(a: F, b: F, tolerance: F, s: impl FnOnce() -> String) {
    if (a - b).abs() > tolerance {
        panic!("Assertion '{} ~= {}' failed ({})", a, b, s());
    }
}

pub use events::*;
pub use game_controller::*;
pub use game_parameters::*;
pub use materials::*;
pub use ship_definition::*;
pub use world::*;
