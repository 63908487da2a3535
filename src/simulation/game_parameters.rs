use crate::floating_type_mod::FT;
use crate::simulation::{vec2f, V2};
use serde::{Deserialize, Serialize};

//
// The dt of each visible simulation step
//

pub const SIMULATION_STEP_TIME_DURATION: FT = 0.02;

/// The dt at which the low-frequency (combustion/rot) passes observe each
/// particle; the work is spread round-robin over the intervening ticks.
pub const LOW_FREQUENCY_SIMULATION_STEP_TIME_DURATION: FT = 1.0;

pub const LOW_FREQUENCY_TICK_STRIDE: u64 =
    (LOW_FREQUENCY_SIMULATION_STEP_TIME_DURATION / SIMULATION_STEP_TIME_DURATION) as u64;

//
// Physical constants
//

pub const GRAVITY_MAGNITUDE: FT = 9.80;

pub fn gravity() -> V2 {
    vec2f(0., -GRAVITY_MAGNITUDE)
}

pub fn gravity_normalized() -> V2 {
    vec2f(0., -1.)
}

pub const AIR_MASS: FT = 1.2754; // Kg
pub const WATER_MASS: FT = 1000.0; // Kg

pub const INITIAL_TEMPERATURE: FT = 298.15; // 25C

//
// Tunable constants
//

// Fraction of a spring's length error removed in one relaxation pass over
// that spring; the remaining error is (1.0 - this fraction).
pub const SPRING_REDUCTION_FRACTION: FT = 0.4;

// The simulation is quite sensitive to this value:
// 0.03 is almost fine (though bodies are sometimes soft), 0.8 makes
// everything explode.
pub const SPRING_DAMPING_COEFFICIENT: FT = 0.03;

pub const GLOBAL_DAMPING: FT = 0.0004;

pub const MAX_EPHEMERAL_PARTICLES: usize = 4096;

pub const MIN_DEBRIS_PARTICLES_PER_EVENT: u32 = 4;
pub const MAX_DEBRIS_PARTICLES_PER_EVENT: u32 = 9;
pub const MIN_DEBRIS_PARTICLES_VELOCITY: FT = 12.5;
pub const MAX_DEBRIS_PARTICLES_VELOCITY: FT = 20.0;
pub const MIN_DEBRIS_PARTICLES_LIFETIME: FT = 0.4;
pub const MAX_DEBRIS_PARTICLES_LIFETIME: FT = 0.9;

pub const MIN_SPARKLE_PARTICLES_PER_EVENT: u32 = 4;
pub const MAX_SPARKLE_PARTICLES_PER_EVENT: u32 = 10;
pub const MIN_SPARKLE_PARTICLES_VELOCITY: FT = 75.0;
pub const MAX_SPARKLE_PARTICLES_VELOCITY: FT = 150.0;
pub const MIN_SPARKLE_PARTICLES_LIFETIME: FT = 0.2;
pub const MAX_SPARKLE_PARTICLES_LIFETIME: FT = 0.5;

pub const MIN_AIR_BUBBLES_VORTEX_AMPLITUDE: FT = 0.05;
pub const MAX_AIR_BUBBLES_VORTEX_AMPLITUDE: FT = 2.0;
pub const MIN_AIR_BUBBLES_VORTEX_PERIOD: FT = 3.0; // seconds
pub const MAX_AIR_BUBBLES_VORTEX_PERIOD: FT = 7.5; // seconds

pub const IGNITION_TEMPERATURE_HIGH_WATERMARK: FT = 0.0;
pub const IGNITION_TEMPERATURE_LOW_WATERMARK: FT = -30.0;

pub const SMOTHERING_WATER_LOW_WATERMARK: FT = 0.05;
pub const SMOTHERING_WATER_HIGH_WATERMARK: FT = 0.1;

pub const SMOTHERING_DECAY_LOW_WATERMARK: FT = 0.0005;
pub const SMOTHERING_DECAY_HIGH_WATERMARK: FT = 0.05;

pub const COMBUSTION_HEAT: FT = 100.0 * 1000.0; // 100KJ

// Reference mass for the combustion decay rate: an iron hull particle
// decays completely in ~30 simulated seconds.
pub const COMBUSTION_DECAY_REFERENCE_MASS: FT = 750.0;

pub const AIR_CONVECTIVE_HEAT_TRANSFER_COEFFICIENT: FT = 100.45; // J/(s*m2*K)
pub const WATER_CONVECTIVE_HEAT_TRANSFER_COEFFICIENT: FT = 2500.0; // J/(s*m2*K)

pub const DRAW_FORCE: FT = 40000.0;
pub const SWIRL_FORCE: FT = 600.0;

pub const BOMB_NEIGHBORHOOD_RADIUS: FT = 3.5;
pub const BOMBS_TEMPERATURE_TRIGGER: FT = 373.15; // 100C

pub const MAX_WORLD_WIDTH: FT = 5000.0;
pub const HALF_MAX_WORLD_WIDTH: FT = MAX_WORLD_WIDTH / 2.0;
pub const MAX_WORLD_HEIGHT: FT = 40000.0;
pub const HALF_MAX_WORLD_HEIGHT: FT = MAX_WORLD_HEIGHT / 2.0;

pub const MAX_BOMBS: usize = 64;
pub const MAX_PINNED_POINTS: usize = 64;
pub const MAX_THANOS_SNAPS: usize = 8;

pub const MAX_SPRINGS_PER_POINT: usize = 8 + 1; // 8 neighbours + 1 rope spring
pub const MAX_TRIANGLES_PER_POINT: usize = 8;

// The basis number of iterations of the mechanical dynamics update per
// simulation step; the actual number is this times the adjustment.
pub const BASIS_NUM_MECHANICAL_DYNAMICS_ITERATIONS: FT = 30.0;

/// The tunable parameters of the simulation. Round-trips through serde so a
/// parameters file can be loaded, overlaid and saved back.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct GameParameters {
    // Dynamics
    pub num_mechanical_dynamics_iterations_adjustment: FT,
    pub num_spring_relaxation_passes: usize,
    pub spring_stiffness_adjustment: FT,
    pub spring_damping_adjustment: FT,
    pub spring_strength_adjustment: FT,
    pub global_damping_adjustment: FT,

    // Water
    pub water_density_adjustment: FT,
    pub water_drag_adjustment: FT,
    pub water_intake_adjustment: FT,
    pub water_diffusion_speed_adjustment: FT,
    pub water_crazyness: FT,

    // Ephemeral particles
    pub do_generate_debris: bool,
    pub do_generate_sparkles_for_cuts: bool,
    pub do_generate_air_bubbles: bool,
    pub cumulated_intaken_water_threshold_for_air_bubbles: FT,

    // Wind
    pub do_modulate_wind: bool,
    pub wind_speed_base: FT,
    pub wind_speed_max_factor: FT,
    pub wind_gust_frequency_adjustment: FT,

    // Waves
    pub tsunami_rate_minutes: FT,
    pub rogue_wave_rate_minutes: FT,

    // Heat and combustion
    pub air_temperature: FT,
    pub water_temperature: FT,
    pub max_burning_particles: usize,
    pub thermal_conductivity_adjustment: FT,
    pub heat_dissipation_adjustment: FT,
    pub ignition_temperature_adjustment: FT,
    pub combustion_speed_adjustment: FT,
    pub combustion_heat_adjustment: FT,
    pub heat_blaster_heat_flow: FT,
    pub heat_blaster_radius: FT,

    // Misc world
    pub sea_depth: FT,
    pub ocean_floor_bumpiness: FT,
    pub ocean_floor_detail_amplification: FT,
    pub ocean_floor_elasticity: FT,
    pub ocean_floor_friction: FT,

    // Interactions
    pub tool_search_radius: FT,
    pub destroy_radius: FT,
    pub bomb_blast_radius: FT,
    pub bomb_blast_force_adjustment: FT,
    pub bomb_blast_heat: FT,
    pub anti_matter_bomb_implosion_strength: FT,
    pub timer_bomb_interval_seconds: FT,
    pub bomb_mass: FT,
    pub flood_radius: FT,
    pub flood_quantity: FT,
    pub fire_extinguisher_radius: FT,
    pub scrub_radius: FT,
    pub is_ultra_violent_mode: bool,
    pub move_tool_inertia: FT,
}

impl Default for GameParameters {
    fn default() -> Self {
        GameParameters {
            num_mechanical_dynamics_iterations_adjustment: 1.0,
            num_spring_relaxation_passes: 1,
            spring_stiffness_adjustment: 1.0,
            spring_damping_adjustment: 1.0,
            spring_strength_adjustment: 1.0,
            global_damping_adjustment: 1.0,

            water_density_adjustment: 1.0,
            water_drag_adjustment: 1.0,
            water_intake_adjustment: 1.0,
            water_diffusion_speed_adjustment: 1.0,
            water_crazyness: 1.0,

            do_generate_debris: true,
            do_generate_sparkles_for_cuts: true,
            do_generate_air_bubbles: true,
            cumulated_intaken_water_threshold_for_air_bubbles: 8.0,

            do_modulate_wind: true,
            wind_speed_base: 20.0,
            wind_speed_max_factor: 2.5,
            wind_gust_frequency_adjustment: 1.0,

            tsunami_rate_minutes: 0.0,
            rogue_wave_rate_minutes: 0.0,

            air_temperature: 298.15,
            water_temperature: 288.15,
            max_burning_particles: 200,
            thermal_conductivity_adjustment: 1.0,
            heat_dissipation_adjustment: 1.0,
            ignition_temperature_adjustment: 1.0,
            combustion_speed_adjustment: 1.0,
            combustion_heat_adjustment: 1.0,
            heat_blaster_heat_flow: 2000.0,
            heat_blaster_radius: 8.0,

            sea_depth: 300.0,
            ocean_floor_bumpiness: 1.0,
            ocean_floor_detail_amplification: 10.0,
            ocean_floor_elasticity: 0.5,
            ocean_floor_friction: 0.25,

            tool_search_radius: 2.0,
            destroy_radius: 25.0,
            bomb_blast_radius: 2.5,
            bomb_blast_force_adjustment: 1.0,
            bomb_blast_heat: 50000.0,
            anti_matter_bomb_implosion_strength: 3.0,
            timer_bomb_interval_seconds: 10.0,
            bomb_mass: 5000.0,
            flood_radius: 0.75,
            flood_quantity: 1.0,
            fire_extinguisher_radius: 5.0,
            scrub_radius: 5.0,
            is_ultra_violent_mode: false,
            move_tool_inertia: 3.0,
        }
    }
}

impl GameParameters {
    pub fn num_mechanical_dynamics_iterations(&self) -> usize {
        (BASIS_NUM_MECHANICAL_DYNAMICS_ITERATIONS * self.num_mechanical_dynamics_iterations_adjustment).round()
            as usize
    }

    /// The dt of a single mechanical sub-iteration.
    pub fn mechanical_simulation_step_time_duration(&self) -> FT {
        SIMULATION_STEP_TIME_DURATION / (self.num_mechanical_dynamics_iterations() as FT).max(1.)
    }

    pub fn effective_global_damping(&self) -> FT {
        GLOBAL_DAMPING * self.global_damping_adjustment
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parameters_roundtrip_through_yaml() {
        let params = GameParameters::default();
        let yaml = serde_yaml::to_string(&params).unwrap();
        let back: GameParameters = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(
            params.num_mechanical_dynamics_iterations(),
            back.num_mechanical_dynamics_iterations()
        );
        assert_eq!(params.max_burning_particles, back.max_burning_particles);
    }

    #[test]
    fn partial_parameters_file_fills_defaults() {
        let params: GameParameters = serde_yaml::from_str("sea_depth: 77.0\n").unwrap();
        assert_eq!(params.sea_depth, 77.0);
        assert_eq!(params.max_burning_particles, GameParameters::default().max_burning_particles);
    }

    #[test]
    fn mechanical_substep_scales_with_iterations() {
        let mut params = GameParameters::default();
        params.num_mechanical_dynamics_iterations_adjustment = 2.0;
        assert_eq!(params.num_mechanical_dynamics_iterations(), 60);
        crate::assert_ft_approx_eq(
            params.mechanical_simulation_step_time_duration(),
            SIMULATION_STEP_TIME_DURATION / 60.,
            1e-9,
            || "substep dt".to_string(),
        );
    }
}
