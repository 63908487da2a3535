use crate::floating_type_mod::{FT, TAU};
use crate::simulation::events::{GameEvent, GameEventDispatcher};
use crate::simulation::fixed_vec::FixedVec;
use crate::simulation::game_parameters::*;
use crate::simulation::materials::{ElectricalMaterialId, StructuralMaterial, StructuralMaterialId};
use crate::simulation::ocean_surface::OceanSurface;
use crate::simulation::random::GameRandomEngine;
use crate::simulation::{smooth_step, ConnectedComponentId, ElementIndex, PlaneId, V2, V4};
use crate::simulation::{NONE_CONNECTED_COMPONENT_ID, NONE_ELEMENT_INDEX, NONE_PLANE_ID};
use nalgebra::zero;

/// The combustion state machine of one particle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CombustionStateType {
    NotBurning,
    Developing1,
    Developing2,
    Burning,
    ExtinguishingConsumed,
    ExtinguishingSmothered,
}

#[derive(Debug, Clone, Copy)]
pub struct CombustionState {
    pub state: CombustionStateType,
    pub flame_development: FT,
    pub max_flame_development: FT,
    /// Random number in [0, 1]; rendering uses it as flame noise.
    pub personality: FT,
}

impl Default for CombustionState {
    fn default() -> Self {
        CombustionState {
            state: CombustionStateType::NotBurning,
            flame_development: 0.,
            max_flame_development: 0.,
            personality: 0.,
        }
    }
}

impl CombustionState {
    pub fn is_burning_or_developing(&self) -> bool {
        matches!(
            self.state,
            CombustionStateType::Developing1 | CombustionStateType::Developing2 | CombustionStateType::Burning
        )
    }
}

/// The per-kind state of ephemeral particles. `None` marks a free pool slot.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum EphemeralState {
    None,
    AirBubble {
        vortex_amplitude: FT,
        normalized_vortex_angular_velocity: FT,
        current_delta_y: FT,
        progress: FT,
        last_vortex_value: FT,
    },
    Debris,
    Sparkle {
        frame_index: u32,
        progress: FT,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EphemeralType {
    None,
    AirBubble,
    Debris,
    Sparkle,
}

impl EphemeralState {
    pub fn kind(&self) -> EphemeralType {
        match self {
            EphemeralState::None => EphemeralType::None,
            EphemeralState::AirBubble { .. } => EphemeralType::AirBubble,
            EphemeralState::Debris => EphemeralType::Debris,
            EphemeralState::Sparkle { .. } => EphemeralType::Sparkle,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ConnectedSpring {
    pub spring_index: ElementIndex,
    pub other_endpoint_index: ElementIndex,
}

impl Default for ConnectedSpring {
    fn default() -> Self {
        ConnectedSpring {
            spring_index: NONE_ELEMENT_INDEX,
            other_endpoint_index: NONE_ELEMENT_INDEX,
        }
    }
}

/// The springs connected to a point, with springs owned by this point kept
/// first so rendering can walk owned springs without visiting each twice.
#[derive(Debug, Clone, Default)]
pub struct ConnectedSprings {
    pub springs: FixedVec<ConnectedSpring, MAX_SPRINGS_PER_POINT>,
    pub owned_count: usize,
}

impl ConnectedSprings {
    pub fn connect(&mut self, spring_index: ElementIndex, other_endpoint_index: ElementIndex, at_owner: bool) {
        let entry = ConnectedSpring {
            spring_index,
            other_endpoint_index,
        };
        if at_owner {
            self.springs.push_front(entry);
            self.owned_count += 1;
        } else {
            self.springs.push_back(entry);
        }
    }

    pub fn disconnect(&mut self, spring_index: ElementIndex, at_owner: bool) {
        let found = self.springs.erase_first(|c| c.spring_index == spring_index);
        assert!(found);
        if at_owner {
            assert!(self.owned_count > 0);
            self.owned_count -= 1;
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ConnectedTriangles {
    pub triangles: FixedVec<ElementIndex, MAX_TRIANGLES_PER_POINT>,
    pub owned_count: usize,
}

impl ConnectedTriangles {
    pub fn connect(&mut self, triangle_index: ElementIndex, at_owner: bool) {
        if at_owner {
            self.triangles.push_front(triangle_index);
            self.owned_count += 1;
        } else {
            self.triangles.push_back(triangle_index);
        }
    }

    pub fn disconnect(&mut self, triangle_index: ElementIndex, at_owner: bool) {
        let found = self.triangles.erase_first(|&t| t == triangle_index);
        assert!(found);
        if at_owner {
            assert!(self.owned_count > 0);
            self.owned_count -= 1;
        }
    }
}

macro_rules! decl_soa_store {
    (pub struct $struct_name:ident { $(pub $field_name:ident: Vec<$field_type:ty> | $default_value:expr),*$(,)? }) => {
        pub struct $struct_name {
            $(
                pub $field_name: Vec<$field_type>,
            )*
        }

        impl $struct_name {
            pub fn with_len(len: usize) -> Self {
                Self {
                    $(
                        $field_name: (0..len).map(|_| $default_value).collect::<Vec<$field_type>>(),
                    )*
                }
            }

            #[allow(dead_code)]
            pub fn swap(&mut self, i: usize, j: usize) {
                $(
                    self.$field_name.swap(i, j);
                )*
            }
        }
    }
}

pub(crate) use decl_soa_store;

decl_soa_store! {
    pub struct PointVec {
        // Materials
        pub structural_material: Vec<StructuralMaterialId> | 0,
        pub electrical_material: Vec<Option<ElectricalMaterialId>> | None,
        pub is_rope: Vec<bool> | false,

        // Mechanical dynamics
        pub position: Vec<V2> | zero(),
        pub velocity: Vec<V2> | zero(),
        pub force: Vec<V2> | zero(),
        pub material_mass: Vec<FT> | 1.,
        pub augmented_material_mass: Vec<FT> | 1.,
        pub mass: Vec<FT> | 1.,
        pub decay: Vec<FT> | 1.,
        pub integration_factor_time_coefficient: Vec<FT> | 0.,
        pub integration_factor: Vec<FT> | 0.,

        // Water dynamics
        pub material_is_hull: Vec<bool> | false,
        pub material_water_volume_fill: Vec<FT> | 0.,
        pub material_water_intake: Vec<FT> | 0.,
        pub material_water_restitution: Vec<FT> | 0.,
        pub material_water_diffusion_speed: Vec<FT> | 0.,
        pub water: Vec<FT> | 0.,
        pub water_velocity: Vec<V2> | zero(),
        pub water_momentum: Vec<V2> | zero(),
        pub cumulated_intaken_water: Vec<FT> | 0.,
        pub is_leaking: Vec<bool> | false,
        pub factory_is_leaking: Vec<bool> | false,

        // Heat dynamics
        pub temperature: Vec<FT> | INITIAL_TEMPERATURE,
        pub material_heat_capacity: Vec<FT> | 1.,
        pub material_thermal_conductivity: Vec<FT> | 0.,
        pub material_ignition_temperature: Vec<FT> | 0.,
        pub combustion: Vec<CombustionState> | CombustionState::default(),

        // Electrical dynamics
        pub electrical_element: Vec<ElementIndex> | NONE_ELEMENT_INDEX,
        pub light: Vec<FT> | 0.,

        // Wind and rust dynamics
        pub material_wind_receptivity: Vec<FT> | 0.,
        pub material_rust_receptivity: Vec<FT> | 0.,

        // Ephemeral particles
        pub ephemeral_state: Vec<EphemeralState> | EphemeralState::None,
        pub ephemeral_start_time: Vec<FT> | 0.,
        pub ephemeral_max_lifetime: Vec<FT> | 0.,

        // Structure
        pub connected_springs: Vec<ConnectedSprings> | ConnectedSprings::default(),
        pub factory_connected_springs: Vec<ConnectedSprings> | ConnectedSprings::default(),
        pub connected_triangles: Vec<ConnectedTriangles> | ConnectedTriangles::default(),
        pub factory_connected_triangles: Vec<ConnectedTriangles> | ConnectedTriangles::default(),

        // Connected component and plane
        pub connected_component_id: Vec<ConnectedComponentId> | NONE_CONNECTED_COMPONENT_ID,
        pub plane_id: Vec<PlaneId> | NONE_PLANE_ID,

        // Pinning
        pub is_pinned: Vec<bool> | false,

        // Immutable render attributes
        pub color: Vec<V4> | zero(),
        pub texture_coordinates: Vec<V2> | zero(),
    }
}

/// The authoritative SoA state for all point-like entities.
///
/// Indices [0, ship_point_count) are ship mass points: their material and
/// factory connectivity never change, only their state does. Indices
/// [ship_point_count, all_point_count) are the ephemeral pool: slots cycle
/// through free/live but never leave the region.
pub struct Points {
    pub v: PointVec,

    ship_point_count: usize,
    all_point_count: usize,
    construction_cursor: usize,

    current_num_mechanical_dynamics_iterations: FT,
    current_cumulated_intaken_water_threshold_for_air_bubbles: FT,

    // (index, normalized ignition temperature delta) candidates, rebuilt
    // each low-frequency pass
    ignition_candidates: Vec<(ElementIndex, FT)>,

    // All points in Developing/Burning/Extinguishing states, ordered by
    // plane id so flame upload respects depth
    burning_points: Vec<ElementIndex>,

    free_ephemeral_particle_search_start: usize,

    // Render dirtyness
    pub is_whole_color_buffer_dirty: bool,
    pub is_decay_buffer_dirty: bool,
    pub is_plane_id_buffer_non_ephemeral_dirty: bool,
    pub is_plane_id_buffer_ephemeral_dirty: bool,
    pub are_ephemeral_points_dirty: bool,
}

impl Points {
    pub fn new(ship_point_count: usize, game_parameters: &GameParameters) -> Self {
        let all_point_count = ship_point_count + MAX_EPHEMERAL_PARTICLES;
        Points {
            v: PointVec::with_len(all_point_count),
            ship_point_count,
            all_point_count,
            construction_cursor: 0,
            current_num_mechanical_dynamics_iterations: game_parameters.num_mechanical_dynamics_iterations() as FT,
            current_cumulated_intaken_water_threshold_for_air_bubbles: game_parameters
                .cumulated_intaken_water_threshold_for_air_bubbles,
            ignition_candidates: Vec::new(),
            burning_points: Vec::new(),
            free_ephemeral_particle_search_start: ship_point_count,
            is_whole_color_buffer_dirty: true,
            is_decay_buffer_dirty: true,
            is_plane_id_buffer_non_ephemeral_dirty: true,
            is_plane_id_buffer_ephemeral_dirty: true,
            are_ephemeral_points_dirty: false,
        }
    }

    pub fn ship_point_count(&self) -> usize {
        self.ship_point_count
    }

    pub fn all_point_count(&self) -> usize {
        self.all_point_count
    }

    pub fn ship_points(&self) -> impl Iterator<Item = ElementIndex> {
        0..self.ship_point_count as ElementIndex
    }

    pub fn ephemeral_points(&self) -> impl Iterator<Item = ElementIndex> {
        self.ship_point_count as ElementIndex..self.all_point_count as ElementIndex
    }

    pub fn is_ephemeral(&self, point_index: ElementIndex) -> bool {
        point_index as usize >= self.ship_point_count
    }

    /// Active points are all ship points plus non-expired ephemerals.
    pub fn is_active(&self, point_index: ElementIndex) -> bool {
        (point_index as usize) < self.ship_point_count
            || self.v.ephemeral_state[point_index as usize].kind() != EphemeralType::None
    }

    pub fn burning_points(&self) -> &[ElementIndex] {
        &self.burning_points
    }

    fn calculate_integration_factor_time_coefficient(num_mechanical_dynamics_iterations: FT) -> FT {
        let dt = SIMULATION_STEP_TIME_DURATION / num_mechanical_dynamics_iterations;
        dt * dt
    }

    //
    // Construction (ship region)
    //

    /// Appends one ship particle. Only valid during ship construction,
    /// before the first tick.
    #[allow(clippy::too_many_arguments)]
    pub fn add_ship_particle(
        &mut self,
        position: V2,
        structural_material_id: StructuralMaterialId,
        structural_material: &StructuralMaterial,
        electrical_material_id: Option<ElectricalMaterialId>,
        is_rope: bool,
        is_leaking: bool,
        color: V4,
        texture_coordinates: V2,
    ) -> ElementIndex {
        assert!(self.construction_cursor < self.ship_point_count);
        let i = self.construction_cursor;
        self.construction_cursor += 1;

        self.v.structural_material[i] = structural_material_id;
        self.v.electrical_material[i] = electrical_material_id;
        self.v.is_rope[i] = is_rope;

        self.v.position[i] = position;
        self.v.material_mass[i] = structural_material.mass;
        self.v.augmented_material_mass[i] = structural_material.mass;
        self.v.mass[i] = structural_material.mass;
        self.v.integration_factor_time_coefficient[i] =
            Self::calculate_integration_factor_time_coefficient(self.current_num_mechanical_dynamics_iterations);

        self.v.material_is_hull[i] = structural_material.is_hull;
        self.v.material_water_volume_fill[i] = structural_material.water_volume_fill;
        self.v.material_water_intake[i] = structural_material.water_intake;
        self.v.material_water_restitution[i] = 1.0 - structural_material.water_retention;
        self.v.material_water_diffusion_speed[i] = structural_material.water_diffusion_speed;
        self.v.is_leaking[i] = is_leaking;
        self.v.factory_is_leaking[i] = is_leaking;

        self.v.material_heat_capacity[i] = structural_material.heat_capacity;
        self.v.material_thermal_conductivity[i] = structural_material.thermal_conductivity;
        self.v.material_ignition_temperature[i] = structural_material.ignition_temperature;

        self.v.material_wind_receptivity[i] = structural_material.wind_receptivity;
        self.v.material_rust_receptivity[i] = structural_material.rust_receptivity;

        self.v.color[i] = color;
        self.v.texture_coordinates[i] = texture_coordinates;

        i as ElementIndex
    }

    //
    // Ephemeral particles
    //

    #[allow(clippy::too_many_arguments)]
    pub fn create_ephemeral_particle_air_bubble(
        &mut self,
        position: V2,
        vortex_amplitude: FT,
        vortex_period: FT,
        structural_material_id: StructuralMaterialId,
        structural_material: &StructuralMaterial,
        current_simulation_time: FT,
        plane_id: PlaneId,
    ) -> Option<ElementIndex> {
        // Don't steal a slot for a bubble
        let point_index = self.find_free_ephemeral_particle(current_simulation_time, false)?;
        let i = point_index as usize;

        self.init_ephemeral_common(i, position, zero(), structural_material_id, structural_material);

        self.v.material_water_volume_fill[i] = structural_material.water_volume_fill;
        self.v.material_wind_receptivity[i] = 0.0;

        self.v.ephemeral_state[i] = EphemeralState::AirBubble {
            vortex_amplitude,
            // (2PI/vortexPeriod)/2PI
            normalized_vortex_angular_velocity: 1.0 / vortex_period,
            current_delta_y: 0.,
            progress: 0.,
            last_vortex_value: 0.,
        };
        self.v.ephemeral_start_time[i] = current_simulation_time;
        self.v.ephemeral_max_lifetime[i] = FT::MAX;

        self.v.plane_id[i] = plane_id;
        self.is_plane_id_buffer_ephemeral_dirty = true;

        Some(point_index)
    }

    #[allow(clippy::too_many_arguments)]
    pub fn create_ephemeral_particle_debris(
        &mut self,
        position: V2,
        velocity: V2,
        structural_material_id: StructuralMaterialId,
        structural_material: &StructuralMaterial,
        current_simulation_time: FT,
        max_lifetime: FT,
        plane_id: PlaneId,
    ) -> ElementIndex {
        // Steal a slot if necessary
        let point_index = self
            .find_free_ephemeral_particle(current_simulation_time, true)
            .expect("forced ephemeral allocation cannot fail");
        let i = point_index as usize;

        self.init_ephemeral_common(i, position, velocity, structural_material_id, structural_material);

        self.v.material_water_volume_fill[i] = 0.0; // No buoyancy
        self.v.material_wind_receptivity[i] = 3.0; // Debris are susceptible to wind

        self.v.ephemeral_state[i] = EphemeralState::Debris;
        self.v.ephemeral_start_time[i] = current_simulation_time;
        self.v.ephemeral_max_lifetime[i] = max_lifetime;

        self.v.plane_id[i] = plane_id;
        self.is_plane_id_buffer_ephemeral_dirty = true;
        self.are_ephemeral_points_dirty = true;

        point_index
    }

    #[allow(clippy::too_many_arguments)]
    pub fn create_ephemeral_particle_sparkle(
        &mut self,
        position: V2,
        velocity: V2,
        structural_material_id: StructuralMaterialId,
        structural_material: &StructuralMaterial,
        current_simulation_time: FT,
        max_lifetime: FT,
        plane_id: PlaneId,
        rng: &mut GameRandomEngine,
    ) -> ElementIndex {
        // Steal a slot if necessary
        let point_index = self
            .find_free_ephemeral_particle(current_simulation_time, true)
            .expect("forced ephemeral allocation cannot fail");
        let i = point_index as usize;

        self.init_ephemeral_common(i, position, velocity, structural_material_id, structural_material);

        self.v.material_water_volume_fill[i] = 0.0; // No buoyancy
        self.v.material_wind_receptivity[i] = 5.0; // Sparkles are susceptible to wind
        self.v.temperature[i] = 773.15; // 500 Celsius, arbitrary

        self.v.ephemeral_state[i] = EphemeralState::Sparkle {
            frame_index: rng.choose(2),
            progress: 0.,
        };
        self.v.ephemeral_start_time[i] = current_simulation_time;
        self.v.ephemeral_max_lifetime[i] = max_lifetime;

        self.v.plane_id[i] = plane_id;
        self.is_plane_id_buffer_ephemeral_dirty = true;
        self.are_ephemeral_points_dirty = true;

        point_index
    }

    fn init_ephemeral_common(
        &mut self,
        i: usize,
        position: V2,
        velocity: V2,
        structural_material_id: StructuralMaterialId,
        structural_material: &StructuralMaterial,
    ) {
        self.v.position[i] = position;
        self.v.velocity[i] = velocity;
        self.v.force[i] = zero();
        self.v.structural_material[i] = structural_material_id;
        self.v.electrical_material[i] = None;
        self.v.material_mass[i] = structural_material.mass;
        self.v.augmented_material_mass[i] = structural_material.mass;
        self.v.mass[i] = structural_material.mass;
        self.v.decay[i] = 1.0;
        self.v.integration_factor_time_coefficient[i] =
            Self::calculate_integration_factor_time_coefficient(self.current_num_mechanical_dynamics_iterations);

        self.v.material_water_intake[i] = structural_material.water_intake;
        self.v.material_water_restitution[i] = 1.0 - structural_material.water_retention;
        self.v.material_water_diffusion_speed[i] = structural_material.water_diffusion_speed;
        self.v.water[i] = 0.0;
        debug_assert!(!self.v.is_leaking[i]);

        self.v.temperature[i] = INITIAL_TEMPERATURE;
        self.v.material_heat_capacity[i] = structural_material.heat_capacity;
        self.v.material_thermal_conductivity[i] = structural_material.thermal_conductivity;
        self.v.material_ignition_temperature[i] = structural_material.ignition_temperature;
        self.v.combustion[i] = CombustionState::default();

        self.v.light[i] = 0.0;
        self.v.material_rust_receptivity[i] = 0.0;

        self.v.connected_component_id[i] = NONE_CONNECTED_COMPONENT_ID;
        debug_assert!(!self.v.is_pinned[i]);

        self.v.color[i] = structural_material.render_color();
    }

    /// Expires the particle and fires the destroy notification.
    pub fn destroy_ephemeral_particle(
        &mut self,
        point_index: ElementIndex,
        material_name: &str,
        underwater: bool,
        events: &mut GameEventDispatcher,
    ) {
        events.push(GameEvent::Destroy {
            material_name: material_name.to_string(),
            underwater,
            count: 1,
        });

        self.expire_ephemeral_particle(point_index);
    }

    pub fn expire_ephemeral_particle(&mut self, point_index: ElementIndex) {
        let i = point_index as usize;
        assert!(i >= self.ship_point_count);
        self.v.ephemeral_state[i] = EphemeralState::None;
        self.v.velocity[i] = zero();
        self.v.force[i] = zero();
        self.v.is_pinned[i] = false;
    }

    fn find_free_ephemeral_particle(&mut self, current_simulation_time: FT, force: bool) -> Option<ElementIndex> {
        //
        // Search for the first free slot; if none is found, optionally
        // reuse the oldest particle
        //

        let mut oldest_particle: usize = usize::MAX;
        let mut oldest_particle_lifetime: FT = 0.0;

        debug_assert!(
            self.free_ephemeral_particle_search_start >= self.ship_point_count
                && self.free_ephemeral_particle_search_start < self.all_point_count
        );

        let mut p = self.free_ephemeral_particle_search_start;
        loop {
            if self.v.ephemeral_state[p].kind() == EphemeralType::None {
                // Found! Remember to start after this one next time
                self.free_ephemeral_particle_search_start = p + 1;
                if self.free_ephemeral_particle_search_start >= self.all_point_count {
                    self.free_ephemeral_particle_search_start = self.ship_point_count;
                }

                return Some(p as ElementIndex);
            }

            let lifetime = current_simulation_time - self.v.ephemeral_start_time[p];
            if lifetime >= oldest_particle_lifetime {
                oldest_particle = p;
                oldest_particle_lifetime = lifetime;
            }

            p += 1;
            if p >= self.all_point_count {
                p = self.ship_point_count;
            }
            if p == self.free_ephemeral_particle_search_start {
                // Went around
                break;
            }
        }

        if !force {
            return None;
        }

        // Steal the oldest
        assert!(oldest_particle != usize::MAX);
        self.free_ephemeral_particle_search_start = oldest_particle + 1;
        if self.free_ephemeral_particle_search_start >= self.all_point_count {
            self.free_ephemeral_particle_search_start = self.ship_point_count;
        }

        Some(oldest_particle as ElementIndex)
    }

    //
    // Detachment
    //

    /// Imprints the detach velocity. The caller (the ship) has already
    /// severed this point's springs and triangles.
    pub fn detach(&mut self, point_index: ElementIndex, velocity: V2) {
        if !self.v.is_pinned[point_index as usize] {
            self.v.velocity[point_index as usize] = velocity;
        }
    }

    pub fn on_orphaned(&mut self, point_index: ElementIndex, rng: &mut GameRandomEngine) {
        // If we're in flames, make the flame tiny
        let combustion = &mut self.v.combustion[point_index as usize];
        if combustion.state == CombustionStateType::Burning {
            combustion.flame_development = rng.generate_real(0.1, 0.14);
        }
    }

    //
    // Leaking & water bookkeeping
    //

    pub fn set_leaking(&mut self, point_index: ElementIndex, rng: &mut GameRandomEngine) {
        let i = point_index as usize;
        if !self.v.is_leaking[i] {
            self.v.is_leaking[i] = true;
            self.v.cumulated_intaken_water[i] = self.randomize_cumulated_intaken_water(
                self.current_cumulated_intaken_water_threshold_for_air_bubbles,
                rng,
            );
        }
    }

    pub fn randomize_cumulated_intaken_water(&self, threshold: FT, rng: &mut GameRandomEngine) -> FT {
        rng.generate_real(0., threshold / 2.)
    }

    //
    // Masses
    //

    /// Adds a transient offset to a particle's material mass (used by
    /// pinning and attached bombs) and notifies the connected springs so
    /// they can recompute their mass-dependent coefficients.
    pub fn augment_material_mass(
        &mut self,
        point_index: ElementIndex,
        offset: FT,
        springs: &mut crate::simulation::springs::Springs,
    ) {
        let i = point_index as usize;
        self.v.augmented_material_mass[i] = self.v.material_mass[i] + offset;

        let connected: Vec<ElementIndex> = self.v.connected_springs[i]
            .springs
            .iter()
            .map(|c| c.spring_index)
            .collect();
        for spring_index in connected {
            springs.update_for_mass(spring_index, self);
        }
    }

    /// Recomputes current mass (augmented material mass + contained water
    /// mass) and the per-particle integration factor. Runs before the
    /// mechanical dynamics of every tick.
    pub fn update_masses(&mut self, game_parameters: &GameParameters) {
        let density_adjusted_water_mass = WATER_MASS * game_parameters.water_density_adjustment;

        for i in 0..self.all_point_count {
            let mass = self.v.augmented_material_mass[i]
                + self.v.water[i].min(self.v.material_water_volume_fill[i]) * density_adjusted_water_mass;

            debug_assert!(mass > 0.0);

            self.v.mass[i] = mass;
            self.v.integration_factor[i] = self.v.integration_factor_time_coefficient[i] / mass;
        }
    }

    pub fn update_for_game_parameters(&mut self, game_parameters: &GameParameters, rng: &mut GameRandomEngine) {
        let num_iterations = game_parameters.num_mechanical_dynamics_iterations() as FT;
        if num_iterations != self.current_num_mechanical_dynamics_iterations {
            let coefficient = Self::calculate_integration_factor_time_coefficient(num_iterations);
            for c in self.v.integration_factor_time_coefficient.iter_mut() {
                *c = coefficient;
            }
            self.current_num_mechanical_dynamics_iterations = num_iterations;
        }

        let threshold = game_parameters.cumulated_intaken_water_threshold_for_air_bubbles;
        if threshold != self.current_cumulated_intaken_water_threshold_for_air_bubbles {
            for i in 0..self.ship_point_count {
                if self.v.is_leaking[i] {
                    self.v.cumulated_intaken_water[i] = rng.generate_real(0., threshold / 2.);
                }
            }
            self.current_cumulated_intaken_water_threshold_for_air_bubbles = threshold;
        }
    }

    //
    // Combustion
    //

    /// Ignition and burning decay. Visits the sub-population
    /// `{p : p ≡ offset (mod stride)}`; each ship particle is observed once
    /// per low-frequency period.
    pub fn update_combustion_low_frequency(
        &mut self,
        point_offset: usize,
        point_stride: usize,
        ocean_surface: &OceanSurface,
        dt: FT,
        game_parameters: &GameParameters,
        rng: &mut GameRandomEngine,
        events: &mut GameEventDispatcher,
    ) {
        self.ignition_candidates.clear();

        // The higher this value, the slower fire consumes materials
        let effective_combustion_decay_rate = 90.0 / (game_parameters.combustion_speed_adjustment * dt);

        let mut point_index = point_offset;
        while point_index < self.ship_point_count {
            let i = point_index;
            match self.v.combustion[i].state {
                CombustionStateType::NotBurning => {
                    let effective_ignition_temperature =
                        self.v.material_ignition_temperature[i] * game_parameters.ignition_temperature_adjustment;

                    if self.v.temperature[i]
                        >= effective_ignition_temperature + IGNITION_TEMPERATURE_HIGH_WATERMARK
                        && !ocean_surface.is_underwater(&self.v.position[i])
                        && self.v.water[i] < SMOTHERING_WATER_LOW_WATERMARK
                        && self.v.decay[i] > SMOTHERING_DECAY_HIGH_WATERMARK
                    {
                        self.ignition_candidates.push((
                            i as ElementIndex,
                            (self.v.temperature[i] - effective_ignition_temperature) / effective_ignition_temperature,
                        ));
                    }
                }

                CombustionStateType::Burning => {
                    let effective_ignition_temperature =
                        self.v.material_ignition_temperature[i] * game_parameters.ignition_temperature_adjustment;

                    if self.v.temperature[i] <= effective_ignition_temperature + IGNITION_TEMPERATURE_LOW_WATERMARK
                        || self.v.decay[i] < SMOTHERING_DECAY_LOW_WATERMARK
                    {
                        // Consumed
                        self.v.combustion[i].state = CombustionStateType::ExtinguishingConsumed;
                    } else {
                        //
                        // Decay, proportionally to mass: the reference mass
                        // reaches 0.01 in ~30 simulated seconds, smaller
                        // masses sooner but never instantly
                        //

                        let mass_multiplier =
                            (self.v.material_mass[i] / COMBUSTION_DECAY_REFERENCE_MASS).powf(0.15);
                        let total_decay_steps = effective_combustion_decay_rate * mass_multiplier;

                        // decay(@ step T) = min_decay  =>  alpha = min_decay^(1/T)
                        let decay_alpha: FT = (0.01 as FT).powf(1.0 / total_decay_steps);

                        self.v.decay[i] *= decay_alpha;

                        // Decay neighbors as well
                        for k in 0..self.v.connected_springs[i].springs.len() {
                            let other = self.v.connected_springs[i].springs[k].other_endpoint_index;
                            self.v.decay[other as usize] *= decay_alpha;
                        }

                        self.is_decay_buffer_dirty = true;
                    }
                }

                _ => {}
            }

            point_index += point_stride;
        }

        //
        // Pick candidates for ignition
        //

        let burning_budget = game_parameters
            .max_burning_particles
            .saturating_sub(self.burning_points.len());
        let max_points = (4 + rng.choose(6) as usize)
            .min(burning_budget)
            .min(self.ignition_candidates.len());

        if max_points > 0 {
            // Partial sort: top N candidates by ignition temperature delta
            self.ignition_candidates
                .select_nth_unstable_by(max_points - 1, |t1, t2| t2.1.partial_cmp(&t1.1).unwrap());

            for c in 0..max_points {
                let (point_index, delta) = self.ignition_candidates[c];
                let i = point_index as usize;

                //
                // Ignite!
                //

                self.v.combustion[i].state = CombustionStateType::Developing1;

                // Initial development depends on how deep this particle is
                // in its burning zone
                self.v.combustion[i].flame_development = 0.1 + 0.5 * smooth_step(0.0, 2.0, delta);

                self.v.combustion[i].personality = rng.generate_normalized_real();

                // Max development: random and depending on the number of
                // connected springs, so chains carry smaller flames
                let delta_size_due_to_connected_springs =
                    self.v.connected_springs[i].springs.len() as FT * 0.0625;
                self.v.combustion[i].max_flame_development = (0.25
                    + delta_size_due_to_connected_springs
                    + 0.5 * self.v.combustion[i].personality)
                    .max(self.v.combustion[i].flame_development);

                // Insert into the burning set, keeping it sorted by plane
                // id; earlier than others at the same plane, so the new
                // flame is drawn behind them
                debug_assert!(!self.burning_points.contains(&point_index));
                let insert_at = self
                    .burning_points
                    .partition_point(|&p| self.v.plane_id[p as usize] < self.v.plane_id[i]);
                self.burning_points.insert(insert_at, point_index);

                events.push(GameEvent::CombustionBegin);
            }
        }
    }

    /// Flame development state machines and burning heat deposition; runs
    /// every tick over the burning set only.
    pub fn update_combustion_high_frequency(
        &mut self,
        ocean_surface: &OceanSurface,
        dt: FT,
        game_parameters: &GameParameters,
        events: &mut GameEventDispatcher,
    ) {
        let effective_combustion_heat = COMBUSTION_HEAT * dt * game_parameters.combustion_heat_adjustment;

        let burning_snapshot: Vec<ElementIndex> = self.burning_points.clone();
        for &point_index in &burning_snapshot {
            let i = point_index as usize;
            let current_state = self.v.combustion[i].state;

            if matches!(
                current_state,
                CombustionStateType::Developing1
                    | CombustionStateType::Developing2
                    | CombustionStateType::Burning
                    | CombustionStateType::ExtinguishingConsumed
            ) && (ocean_surface.is_underwater(&self.v.position[i])
                || self.v.water[i] > SMOTHERING_WATER_HIGH_WATERMARK)
            {
                self.v.combustion[i].state = CombustionStateType::ExtinguishingSmothered;
            } else if current_state == CombustionStateType::Burning {
                //
                // Generate heat: the point itself is held at ignition
                // temperature + 10%, neighbors receive combustion heat
                // scaled by a directional coefficient that prefers upwards
                // (0.2 S, 1.7 W/E, 3.2 N)
                //

                self.v.temperature[i] = self.v.material_ignition_temperature[i]
                    * game_parameters.ignition_temperature_adjustment
                    * 1.1;

                for k in 0..self.v.connected_springs[i].springs.len() {
                    let other = self.v.connected_springs[i].springs[k].other_endpoint_index as usize;

                    let spring_dir = (self.v.position[other] - self.v.position[i]).normalize();
                    let dir_alpha = 0.2 + 1.5 * (1.0 - spring_dir.dot(&gravity_normalized()));
                    // No normalization: with normalization flame does not
                    // propagate along ropes

                    self.v.temperature[other] +=
                        effective_combustion_heat * dir_alpha / self.v.material_heat_capacity[other];
                }
            }

            //
            // Development / extinguishing state machine
            //

            match self.v.combustion[i].state {
                CombustionStateType::Developing1 => {
                    // f(n) = f(n-1) + 0.105*f(n-1): starting from 0.1 it
                    // exceeds 1.2 after ~25 steps (0.5s)
                    self.v.combustion[i].flame_development += 0.105 * self.v.combustion[i].flame_development;

                    if self.v.combustion[i].flame_development > self.v.combustion[i].max_flame_development + 0.2 {
                        self.v.combustion[i].state = CombustionStateType::Developing2;
                    }
                }

                CombustionStateType::Developing2 => {
                    // Decay the overshoot above max: f(n) = f(n-1) - 0.2*f(n-1)
                    let mut extra =
                        self.v.combustion[i].flame_development - self.v.combustion[i].max_flame_development;
                    extra -= 0.2 * extra;

                    self.v.combustion[i].flame_development = self.v.combustion[i].max_flame_development + extra;

                    if extra < 0.02 {
                        self.v.combustion[i].state = CombustionStateType::Burning;
                        self.v.combustion[i].flame_development = self.v.combustion[i].max_flame_development;
                    }
                }

                CombustionStateType::ExtinguishingConsumed | CombustionStateType::ExtinguishingSmothered => {
                    if self.v.combustion[i].state == CombustionStateType::ExtinguishingConsumed {
                        // Slow fade: under 0.02 after ~75 steps from 1
                        self.v.combustion[i].flame_development -= 0.0625
                            * (self.v.combustion[i].max_flame_development - self.v.combustion[i].flame_development
                                + 0.01);
                    } else {
                        // Fast fade: under 0.02 after ~10 steps from 1
                        self.v.combustion[i].flame_development -= 0.3 * self.v.combustion[i].flame_development;
                    }

                    if self.v.combustion[i].flame_development <= 0.02 {
                        //
                        // Stop burning
                        //

                        self.v.combustion[i].state = CombustionStateType::NotBurning;
                        self.v.combustion[i].flame_development = 0.0;

                        let position = self
                            .burning_points
                            .iter()
                            .position(|&p| p == point_index)
                            .expect("extinguished point must be in the burning set");
                        self.burning_points.remove(position);

                        events.push(GameEvent::CombustionEnd);
                    }
                }

                CombustionStateType::Burning | CombustionStateType::NotBurning => {}
            }
        }
    }

    /// Forces an immediate transition to smothered extinguishing (fire
    /// extinguisher tool).
    pub fn smother_combustion(&mut self, point_index: ElementIndex) {
        let i = point_index as usize;
        if self.v.combustion[i].is_burning_or_developing() {
            self.v.combustion[i].state = CombustionStateType::ExtinguishingSmothered;
        }
    }

    /// Re-sorts the burning set after plane ids changed.
    pub fn reorder_burning_points_for_depth(&mut self) {
        let plane_ids = &self.v.plane_id;
        self.burning_points
            .sort_by(|&p1, &p2| plane_ids[p1 as usize].cmp(&plane_ids[p2 as usize]));
    }

    //
    // Ephemeral particle updates
    //

    pub fn update_ephemeral_particles(
        &mut self,
        current_simulation_time: FT,
        ocean_surface: &OceanSurface,
    ) {
        for point_index in self.ship_point_count..self.all_point_count {
            let i = point_index;
            match self.v.ephemeral_state[i] {
                EphemeralState::AirBubble {
                    vortex_amplitude,
                    normalized_vortex_angular_velocity,
                    last_vortex_value,
                    ..
                } => {
                    // Do not advance an air bubble while it's pinned
                    if !self.v.is_pinned[i] {
                        let water_height = ocean_surface.height_at(self.v.position[i].x);
                        let delta_y = water_height - self.v.position[i].y;

                        if delta_y <= 0.0 {
                            // Got to the surface, expire
                            self.expire_ephemeral_particle(i as ElementIndex);
                        } else {
                            let progress = -1.0 / (-1.0 + self.v.position[i].y.min(0.0));

                            let lifetime = current_simulation_time - self.v.ephemeral_start_time[i];
                            let effective_amplitude = vortex_amplitude + progress;
                            let vortex_value = effective_amplitude
                                * (TAU * normalized_vortex_angular_velocity * lifetime).sin();

                            self.v.position[i].x += vortex_value - last_vortex_value;

                            self.v.ephemeral_state[i] = EphemeralState::AirBubble {
                                vortex_amplitude,
                                normalized_vortex_angular_velocity,
                                current_delta_y: delta_y,
                                progress,
                                last_vortex_value: vortex_value,
                            };
                        }
                    }
                }

                EphemeralState::Debris => {
                    let elapsed = current_simulation_time - self.v.ephemeral_start_time[i];
                    if elapsed >= self.v.ephemeral_max_lifetime[i] {
                        self.expire_ephemeral_particle(i as ElementIndex);
                        self.are_ephemeral_points_dirty = true;
                    } else {
                        // Alpha follows remaining lifetime
                        let alpha = (1.0 - elapsed / self.v.ephemeral_max_lifetime[i]).max(0.0);
                        self.v.color[i].w = alpha;
                    }
                }

                EphemeralState::Sparkle { frame_index, .. } => {
                    let elapsed = current_simulation_time - self.v.ephemeral_start_time[i];
                    if elapsed >= self.v.ephemeral_max_lifetime[i] {
                        self.expire_ephemeral_particle(i as ElementIndex);
                    } else {
                        self.v.ephemeral_state[i] = EphemeralState::Sparkle {
                            frame_index,
                            progress: elapsed / self.v.ephemeral_max_lifetime[i],
                        };
                    }
                }

                EphemeralState::None => {}
            }
        }
    }
}
