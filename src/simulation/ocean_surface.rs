use crate::floating_type_mod::{FRAC_PI_2, FT};
use crate::simulation::events::{GameEvent, GameEventDispatcher};
use crate::simulation::game_parameters::*;
use crate::simulation::random::GameRandomEngine;
use crate::simulation::wind::{RunningAverage, Wind};
use crate::simulation::V2;

// The number of render-exposed height samples over the entire world width
pub const SAMPLES_COUNT: usize = 8192;

pub const DX: FT = MAX_WORLD_WIDTH / SAMPLES_COUNT as FT;

//
// SWE layer
//

// The rest height of the height field - indirectly determines the speed of
// waves (via dv/dt <= dh/dx, with dh/dt <= h*dv/dx)
const SWE_HEIGHT_FIELD_OFFSET: FT = 100.0;

// The factor by which height field perturbations are amplified into visible
// wave height; larger values let the field itself stay small, which keeps
// the scheme stable
const SWE_HEIGHT_FIELD_AMPLIFICATION: FT = 50.0;

// Samples set apart at each end of the SWE buffers
const SWE_WAVE_GENERATION_SAMPLES: usize = 1;
const SWE_BOUNDARY_CONDITIONS_SAMPLES: usize = 1;
const SWE_OUTER_LAYER_SAMPLES: usize = SWE_WAVE_GENERATION_SAMPLES + SWE_BOUNDARY_CONDITIONS_SAMPLES;

const SWE_TOTAL_SAMPLES: usize = SWE_OUTER_LAYER_SAMPLES + SAMPLES_COUNT + SWE_OUTER_LAYER_SAMPLES;

const WIND_GUST_RIPPLE_SPATIAL_FREQUENCY: FT = 0.5;

const TSUNAMI_TARGET_WORLD_HEIGHT: FT = 25.0;
const ROGUE_WAVE_MIN_WORLD_HEIGHT: FT = 3.0;
const ROGUE_WAVE_MAX_WORLD_HEIGHT: FT = 8.0;

/// One render-exposed surface sample, with the precomputed delta to the
/// next sample to ease interpolation.
#[derive(Debug, Clone, Copy, Default)]
pub struct OceanSurfaceSample {
    pub value: FT,
    pub delta_to_next: FT,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WavePhase {
    Rise,
    Fall,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReleaseMode {
    /// Falls when released by the user.
    OnCue,
    /// Falls as soon as the rise completes.
    Automatic,
}

/// Drives the height of one wave-generation cell along sin² trajectories:
/// `Rise` toward the target, then `Fall` back to the stored low height.
#[derive(Debug, Clone)]
struct SweWaveStateMachine {
    sample_index: usize,

    low_height: FT,
    current_phase_start_height: FT,
    current_phase_target_height: FT,
    current_height: FT,
    current_progress: FT,
    start_simulation_time: FT,
    wave_phase: WavePhase,
    release_mode: ReleaseMode,
    smoothing_delay: FT,
}

impl SweWaveStateMachine {
    fn new(
        sample_index: usize,
        start_height: FT,
        target_height: FT,
        release_mode: ReleaseMode,
        current_simulation_time: FT,
    ) -> Self {
        let mut sm = SweWaveStateMachine {
            sample_index,
            low_height: start_height,
            current_phase_start_height: start_height,
            current_phase_target_height: target_height,
            current_height: start_height,
            current_progress: 0.,
            start_simulation_time: current_simulation_time,
            wave_phase: WavePhase::Rise,
            release_mode,
            smoothing_delay: 0.,
        };
        sm.smoothing_delay = sm.calculate_smoothing_delay();
        sm
    }

    fn restart(&mut self, restart_height: FT, current_simulation_time: FT) {
        // Rise in any case; the new target is the restart height
        self.current_phase_start_height = self.current_height;
        self.current_phase_target_height = restart_height;
        self.current_progress = 0.;
        self.start_simulation_time = current_simulation_time;
        self.wave_phase = WavePhase::Rise;
        self.smoothing_delay = self.calculate_smoothing_delay();
    }

    fn release(&mut self, current_simulation_time: FT) {
        if self.wave_phase == WavePhase::Rise {
            self.start_fall_phase(current_simulation_time);
        } else {
            // Stop altogether
            self.current_progress = 1.0;
        }
    }

    /// Advances and returns the height to pin at the tagged cell, or `None`
    /// when the wave has completed its fall.
    fn update(&mut self, current_simulation_time: FT) -> Option<FT> {
        if self.current_progress < 1.0 {
            self.current_progress = (current_simulation_time - self.start_simulation_time) / self.smoothing_delay;
        }

        let sin_progress = (FRAC_PI_2 * self.current_progress.min(1.0)).sin();
        let sin2_progress = sin_progress * sin_progress;

        self.current_height = self.current_phase_start_height
            + (self.current_phase_target_height - self.current_phase_start_height) * sin2_progress;

        if self.current_progress >= 1.0 {
            match self.wave_phase {
                WavePhase::Rise => {
                    if self.release_mode == ReleaseMode::Automatic {
                        self.start_fall_phase(current_simulation_time);
                    }
                }
                WavePhase::Fall => {
                    return None;
                }
            }
        }

        Some(self.current_height)
    }

    fn start_fall_phase(&mut self, current_simulation_time: FT) {
        assert!(self.wave_phase == WavePhase::Rise);
        self.current_phase_start_height = self.current_height;
        self.current_phase_target_height = self.low_height;
        self.current_progress = 0.;
        self.start_simulation_time = current_simulation_time;
        self.wave_phase = WavePhase::Fall;
        self.smoothing_delay = self.calculate_smoothing_delay();
    }

    fn calculate_smoothing_delay(&self) -> FT {
        let delta_h = (self.current_phase_target_height - self.current_height)
            .abs()
            .min(SWE_HEIGHT_FIELD_OFFSET / 5.0);

        let delay_ticks: FT = if self.wave_phase == WavePhase::Rise {
            // Calibrated so that DeltaH=0.2 => ~8 ticks, 2.0 => ~150,
            // 4.0 => ~200, and the curve saturates past 4.0
            -19.88881 + (147.403 / 0.6126081) * (1.0 - (-0.6126081 * delta_h).exp())
        } else {
            // DeltaH=0.1 => ~2 ticks, 1.0 => ~7, 2.0 => ~10
            1.220013 + (7.8394 / 0.6485749) * (1.0 - (-0.6485749 * delta_h).exp())
        };

        delay_ticks.max(1.0) * SIMULATION_STEP_TIME_DURATION
    }
}

/// The 1D shallow-water ocean surface: double-buffered height and velocity
/// fields advanced with semi-Lagrangian advection, reflective boundaries,
/// and wave genesis driven by state machines pinned at generation cells.
pub struct OceanSurface {
    samples: Vec<OceanSurfaceSample>,

    height_field_buffers: [Vec<FT>; 2],
    velocity_field_buffers: [Vec<FT>; 2],
    current_buffer: usize,

    // The user-driven wave, if any
    interactive_wave_state_machine: Option<SweWaveStateMachine>,

    // Tsunami / rogue waves currently running
    autonomous_wave_state_machines: Vec<SweWaveStateMachine>,

    wind_incisiveness_running_average: RunningAverage<30>,
}

impl OceanSurface {
    pub fn new(_game_parameters: &GameParameters) -> Self {
        // One extra cell in each buffer just to ease interpolations.
        //
        // Velocity boundary conditions are initialized here once and for
        // all: they stay zero.
        let height = vec![SWE_HEIGHT_FIELD_OFFSET; SWE_TOTAL_SAMPLES + 1];
        let velocity = vec![0.; SWE_TOTAL_SAMPLES + 1];

        OceanSurface {
            samples: vec![OceanSurfaceSample::default(); SAMPLES_COUNT + 1],
            height_field_buffers: [height.clone(), height],
            velocity_field_buffers: [velocity.clone(), velocity],
            current_buffer: 0,
            interactive_wave_state_machine: None,
            autonomous_wave_state_machines: Vec::new(),
            wind_incisiveness_running_average: RunningAverage::new(),
        }
    }

    pub fn samples(&self) -> &[OceanSurfaceSample] {
        &self.samples
    }

    /// The surface height (world y) at the given world x.
    pub fn height_at(&self, x: FT) -> FT {
        let fractional_index = ((x + HALF_MAX_WORLD_WIDTH) / DX).clamp(0., (SAMPLES_COUNT - 1) as FT);
        let index = fractional_index as usize;
        let frac = fractional_index - index as FT;
        self.samples[index].value + frac * self.samples[index].delta_to_next
    }

    pub fn is_underwater(&self, position: &V2) -> bool {
        position.y < self.height_at(position.x)
    }

    pub fn update(&mut self, current_simulation_time: FT, wind: &Wind, game_parameters: &GameParameters) {
        //
        // 1. Wave genesis: state machines pin the height of their cells in
        //    the current field, before advection reads it
        //

        if let Some(sm) = self.interactive_wave_state_machine.as_mut() {
            match sm.update(current_simulation_time) {
                Some(height_value) => {
                    let cell = SWE_OUTER_LAYER_SAMPLES + sm.sample_index;
                    self.height_field_buffers[self.current_buffer][cell] = height_value;
                }
                None => {
                    self.interactive_wave_state_machine = None;
                }
            }
        }

        let current_buffer = self.current_buffer;
        let height_field = &mut self.height_field_buffers[current_buffer];
        self.autonomous_wave_state_machines.retain_mut(|sm| {
            match sm.update(current_simulation_time) {
                Some(height_value) => {
                    height_field[SWE_OUTER_LAYER_SAMPLES + sm.sample_index] = height_value;
                    true
                }
                None => false,
            }
        });

        //
        // 2.-4. Advance the SWE fields: current -> next
        //

        self.advect_height_field();
        self.advect_velocity_field();
        self.update_height_field();
        self.update_velocity_field();

        //
        // 5. Reflective boundary conditions: height mirrors the first
        //    interior sample, velocity is zero
        //

        {
            let next = &mut self.height_field_buffers[1 - self.current_buffer];
            for i in 0..SWE_BOUNDARY_CONDITIONS_SAMPLES {
                next[i] = next[i + SWE_BOUNDARY_CONDITIONS_SAMPLES];
                next[SWE_TOTAL_SAMPLES - 1 - i] = next[SWE_TOTAL_SAMPLES - 1 - SWE_BOUNDARY_CONDITIONS_SAMPLES - i];
            }

            let next_velocity = &self.velocity_field_buffers[1 - self.current_buffer];
            for i in 0..SWE_BOUNDARY_CONDITIONS_SAMPLES {
                debug_assert!(next_velocity[i] == 0.0);
                debug_assert!(next_velocity[SWE_TOTAL_SAMPLES - 1 - i] == 0.0);
            }
        }

        //
        // 6. Swap buffers and generate render samples
        //

        self.current_buffer = 1 - self.current_buffer;

        self.generate_samples(current_simulation_time, wind, game_parameters);
    }

    /// Starts, restarts or releases the user-driven wave. `Some` starts a
    /// rise toward the world y (restarting the wave if one is running);
    /// `None` releases the running wave into its fall phase.
    ///
    /// Only the state machine is touched here: the generation cell is
    /// written at the start of the next update, never mid-tick.
    pub fn adjust_to(&mut self, world_coordinates: Option<V2>, current_simulation_time: FT) {
        match world_coordinates {
            Some(coordinates) => {
                let target_height = coordinates.y / SWE_HEIGHT_FIELD_AMPLIFICATION + SWE_HEIGHT_FIELD_OFFSET;

                match self.interactive_wave_state_machine.as_mut() {
                    None => {
                        // Calculate the nearest sample index
                        let sample_index = (((coordinates.x + HALF_MAX_WORLD_WIDTH) / DX) + 0.5)
                            .clamp(0., SAMPLES_COUNT as FT) as usize;

                        let start_height =
                            self.height_field_buffers[self.current_buffer][SWE_OUTER_LAYER_SAMPLES + sample_index];

                        self.interactive_wave_state_machine = Some(SweWaveStateMachine::new(
                            sample_index,
                            start_height,
                            target_height,
                            ReleaseMode::OnCue,
                            current_simulation_time,
                        ));
                    }
                    Some(sm) => {
                        sm.restart(target_height, current_simulation_time);
                    }
                }
            }
            None => {
                if let Some(sm) = self.interactive_wave_state_machine.as_mut() {
                    sm.release(current_simulation_time);
                }
            }
        }
    }

    pub fn trigger_tsunami(
        &mut self,
        current_simulation_time: FT,
        rng: &mut GameRandomEngine,
        events: &mut GameEventDispatcher,
    ) {
        let x = rng.generate_real(-HALF_MAX_WORLD_WIDTH / 2.0, HALF_MAX_WORLD_WIDTH / 2.0);
        self.start_autonomous_wave(x, TSUNAMI_TARGET_WORLD_HEIGHT, current_simulation_time);
        events.push(GameEvent::Tsunami { x });
    }

    pub fn trigger_rogue_wave(&mut self, current_simulation_time: FT, wind: &Wind, rng: &mut GameRandomEngine) {
        // Rogue waves come from the upwind boundary
        let x = if wind.base_speed_magnitude() >= 0.0 {
            -HALF_MAX_WORLD_WIDTH
        } else {
            HALF_MAX_WORLD_WIDTH
        };
        let height = rng.generate_real(ROGUE_WAVE_MIN_WORLD_HEIGHT, ROGUE_WAVE_MAX_WORLD_HEIGHT);
        self.start_autonomous_wave(x, height, current_simulation_time);
    }

    fn start_autonomous_wave(&mut self, world_x: FT, world_height: FT, current_simulation_time: FT) {
        let sample_index = (((world_x + HALF_MAX_WORLD_WIDTH) / DX) + 0.5).clamp(0., SAMPLES_COUNT as FT) as usize;
        let start_height = self.height_field_buffers[self.current_buffer][SWE_OUTER_LAYER_SAMPLES + sample_index];
        let target_height = world_height / SWE_HEIGHT_FIELD_AMPLIFICATION + SWE_HEIGHT_FIELD_OFFSET;

        self.autonomous_wave_state_machines.push(SweWaveStateMachine::new(
            sample_index,
            start_height,
            target_height,
            ReleaseMode::Automatic,
            current_simulation_time,
        ));
    }

    /// Flattens the surface inside the given band back to rest.
    pub fn apply_thanos_snap(&mut self, left_front_x: FT, right_front_x: FT) {
        let left_cell = (((left_front_x + HALF_MAX_WORLD_WIDTH) / DX) as usize).min(SAMPLES_COUNT - 1);
        let right_cell = (((right_front_x + HALF_MAX_WORLD_WIDTH) / DX) as usize).min(SAMPLES_COUNT - 1);

        let height_field = &mut self.height_field_buffers[self.current_buffer];
        let velocity_field = &mut self.velocity_field_buffers[self.current_buffer];
        for i in left_cell..=right_cell {
            height_field[SWE_OUTER_LAYER_SAMPLES + i] = SWE_HEIGHT_FIELD_OFFSET;
            velocity_field[SWE_OUTER_LAYER_SAMPLES + i] = 0.0;
        }
    }

    //
    // SWE internals
    //

    fn advect_height_field(&mut self) {
        //
        // Semi-Lagrangian method
        //

        let (current, next) = split_current_and_next(&mut self.height_field_buffers, self.current_buffer);
        let current_velocity = &self.velocity_field_buffers[self.current_buffer];

        for i in SWE_BOUNDARY_CONDITIONS_SAMPLES..SWE_TOTAL_SAMPLES - SWE_BOUNDARY_CONDITIONS_SAMPLES {
            // Height values sit at cell centers while velocities sit at
            // cell edges, hence the two neighboring velocities
            let v = (current_velocity[i] + current_velocity[i + 1]) / 2.0;

            // The (fractional) index this height sample had one time step
            // ago, constrained to the grid
            let prev_cell_index = (i as FT - v * SIMULATION_STEP_TIME_DURATION / DX)
                .clamp(0., (SWE_TOTAL_SAMPLES - 1) as FT);

            let prev_cell_index_i = prev_cell_index as usize;
            let prev_cell_index_f = prev_cell_index - prev_cell_index_i as FT;

            next[i] =
                (1.0 - prev_cell_index_f) * current[prev_cell_index_i] + prev_cell_index_f * current[prev_cell_index_i + 1];
        }
    }

    fn advect_velocity_field(&mut self) {
        //
        // Semi-Lagrangian method
        //

        let (current, next) = split_current_and_next(&mut self.velocity_field_buffers, self.current_buffer);

        for i in SWE_BOUNDARY_CONDITIONS_SAMPLES..SWE_TOTAL_SAMPLES - SWE_BOUNDARY_CONDITIONS_SAMPLES {
            // Velocity values are at the edges of the cell
            let v = current[i];

            let prev_cell_index = (i as FT - v * SIMULATION_STEP_TIME_DURATION / DX)
                .clamp(0., (SWE_TOTAL_SAMPLES - 1) as FT);

            let prev_cell_index_i = prev_cell_index as usize;
            let prev_cell_index_f = prev_cell_index - prev_cell_index_i as FT;

            next[i] =
                (1.0 - prev_cell_index_f) * current[prev_cell_index_i] + prev_cell_index_f * current[prev_cell_index_i + 1];
        }
    }

    fn update_height_field(&mut self) {
        let next_buffer = 1 - self.current_buffer;
        let next_velocity = &self.velocity_field_buffers[next_buffer];
        let next_height = &mut self.height_field_buffers[next_buffer];

        for i in SWE_BOUNDARY_CONDITIONS_SAMPLES..SWE_TOTAL_SAMPLES - SWE_BOUNDARY_CONDITIONS_SAMPLES {
            next_height[i] -=
                next_height[i] * (next_velocity[i + 1] - next_velocity[i]) / DX * SIMULATION_STEP_TIME_DURATION;
        }
    }

    fn update_velocity_field(&mut self) {
        let next_buffer = 1 - self.current_buffer;
        let next_height = &self.height_field_buffers[next_buffer];
        let next_velocity = &mut self.velocity_field_buffers[next_buffer];

        for i in SWE_BOUNDARY_CONDITIONS_SAMPLES..SWE_TOTAL_SAMPLES - SWE_BOUNDARY_CONDITIONS_SAMPLES {
            next_velocity[i] +=
                GRAVITY_MAGNITUDE * (next_height[i - 1] - next_height[i]) / DX * SIMULATION_STEP_TIME_DURATION;
        }
    }

    fn generate_samples(&mut self, current_simulation_time: FT, wind: &Wind, game_parameters: &GameParameters) {
        //
        // Sample values combine the SWE height field deviation, amplified,
        // with a wind gust ripple term
        //

        let wind_speed_absolute_magnitude = wind.current_speed().norm();
        let wind_speed_gust_relative_amplitude = wind.max_speed_magnitude() - wind.base_speed_magnitude();
        let raw_wind_normalized_incisiveness = if wind_speed_gust_relative_amplitude == 0.0 {
            0.0
        } else {
            (wind_speed_absolute_magnitude - wind.base_speed_magnitude().abs()).max(0.0)
                / wind_speed_gust_relative_amplitude.abs()
        };

        let wind_ripples_time_frequency: FT = if game_parameters.wind_speed_base >= 0.0 {
            128.0
        } else {
            -128.0
        };

        let smoothed_wind_normalized_incisiveness = self
            .wind_incisiveness_running_average
            .update(raw_wind_normalized_incisiveness);
        let wind_ripples_wave_height = 0.7 * smoothed_wind_normalized_incisiveness;

        let height_field = &self.height_field_buffers[self.current_buffer];

        // Sample index = 0
        let mut previous_sample_value = {
            let ripple_value = (-current_simulation_time * wind_ripples_time_frequency).sin();
            let sample_value = (height_field[SWE_OUTER_LAYER_SAMPLES] - SWE_HEIGHT_FIELD_OFFSET)
                * SWE_HEIGHT_FIELD_AMPLIFICATION
                + ripple_value * wind_ripples_wave_height;
            self.samples[0].value = sample_value;
            sample_value
        };

        // Sample index = 1...SAMPLES_COUNT-1
        let mut x = DX;
        for i in 1..SAMPLES_COUNT {
            let ripple_value =
                (x * WIND_GUST_RIPPLE_SPATIAL_FREQUENCY - current_simulation_time * wind_ripples_time_frequency).sin();
            let sample_value = (height_field[SWE_OUTER_LAYER_SAMPLES + i] - SWE_HEIGHT_FIELD_OFFSET)
                * SWE_HEIGHT_FIELD_AMPLIFICATION
                + ripple_value * wind_ripples_wave_height;

            self.samples[i].value = sample_value;
            self.samples[i - 1].delta_to_next = sample_value - previous_sample_value;

            previous_sample_value = sample_value;
            x += DX;
        }

        self.samples[SAMPLES_COUNT - 1].delta_to_next = 0.0;

        // The extra sample mirrors the last one
        self.samples[SAMPLES_COUNT].value = self.samples[SAMPLES_COUNT - 1].value;
        self.samples[SAMPLES_COUNT].delta_to_next = 0.0;
    }

    #[cfg(test)]
    fn boundary_mirror_holds(&self) -> bool {
        let height_field = &self.height_field_buffers[self.current_buffer];
        let velocity_field = &self.velocity_field_buffers[self.current_buffer];
        height_field[0] == height_field[1]
            && height_field[SWE_TOTAL_SAMPLES - 1] == height_field[SWE_TOTAL_SAMPLES - 2]
            && velocity_field[0] == 0.0
            && velocity_field[SWE_TOTAL_SAMPLES - 1] == 0.0
    }
}

fn split_current_and_next(buffers: &mut [Vec<FT>; 2], current: usize) -> (&[FT], &mut [FT]) {
    let (a, b) = buffers.split_at_mut(1);
    if current == 0 {
        (&a[0], &mut b[0])
    } else {
        (&b[0], &mut a[0])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simulation::vec2f;

    fn quiet_params() -> GameParameters {
        let mut params = GameParameters::default();
        params.do_modulate_wind = false;
        params.wind_speed_base = 0.0;
        params
    }

    fn run_ticks(
        ocean: &mut OceanSurface,
        wind: &mut Wind,
        params: &GameParameters,
        rng: &mut GameRandomEngine,
        start_time: FT,
        ticks: usize,
    ) -> FT {
        let mut t = start_time;
        for _ in 0..ticks {
            t += SIMULATION_STEP_TIME_DURATION;
            wind.update(t, params, rng);
            ocean.update(t, wind, params);
        }
        t
    }

    #[test]
    fn resting_ocean_stays_flat() {
        let params = quiet_params();
        let mut ocean = OceanSurface::new(&params);
        let mut wind = Wind::new();
        let mut rng = GameRandomEngine::new(5);

        run_ticks(&mut ocean, &mut wind, &params, &mut rng, 0.0, 50);

        for sample in ocean.samples() {
            assert!(sample.value.abs() < 1e-3, "sample {} not at rest", sample.value);
        }
    }

    #[test]
    fn boundary_mirror_invariant_holds_every_tick() {
        let params = quiet_params();
        let mut ocean = OceanSurface::new(&params);
        let mut wind = Wind::new();
        let mut rng = GameRandomEngine::new(5);

        // Disturb the surface, then check the invariant across many ticks
        ocean.adjust_to(Some(vec2f(0., 5.)), 0.0);

        let mut t = 0.0;
        for _ in 0..200 {
            t += SIMULATION_STEP_TIME_DURATION;
            wind.update(t, &params, &mut rng);
            ocean.update(t, &wind, &params);
            assert!(ocean.boundary_mirror_holds());
        }
    }

    #[test]
    fn interactive_wave_rises_then_falls_after_release() {
        let params = quiet_params();
        let mut ocean = OceanSurface::new(&params);
        let mut wind = Wind::new();
        let mut rng = GameRandomEngine::new(5);

        ocean.adjust_to(Some(vec2f(0., 5.)), 0.0);
        let t = run_ticks(&mut ocean, &mut wind, &params, &mut rng, 0.0, 25);

        let risen = ocean.height_at(0.);
        assert!(risen > 1.0, "wave did not rise: {}", risen);

        // Release: the wave falls back toward rest and eventually retires
        ocean.adjust_to(None, t);
        run_ticks(&mut ocean, &mut wind, &params, &mut rng, t, 100);

        let fallen = ocean.height_at(0.);
        assert!(fallen < risen * 0.5, "wave did not fall: {} -> {}", risen, fallen);
        assert!(ocean.interactive_wave_state_machine.is_none());
    }

    #[test]
    fn adjust_to_takes_effect_at_the_next_update_only() {
        let params = quiet_params();
        let mut ocean = OceanSurface::new(&params);

        ocean.adjust_to(Some(vec2f(0., 5.)), 0.0);

        // No mid-tick write: the current field is untouched until update
        let height_field = &ocean.height_field_buffers[ocean.current_buffer];
        assert!(height_field.iter().all(|&h| h == SWE_HEIGHT_FIELD_OFFSET));
    }

    #[test]
    fn tsunami_emits_event_and_raises_water() {
        let params = quiet_params();
        let mut ocean = OceanSurface::new(&params);
        let mut wind = Wind::new();
        let mut rng = GameRandomEngine::new(17);
        let mut events = GameEventDispatcher::new();

        ocean.trigger_tsunami(0.0, &mut rng, &mut events);
        assert_eq!(events.pending_count(), 1);

        let mut max_height: FT = 0.0;
        let mut t = 0.0;
        for _ in 0..150 {
            t += SIMULATION_STEP_TIME_DURATION;
            wind.update(t, &params, &mut rng);
            ocean.update(t, &wind, &params);
            max_height = max_height.max(ocean.samples().iter().map(|s| s.value).fold(FT::MIN, FT::max));
        }
        assert!(max_height > 5.0, "tsunami crest too small: {}", max_height);
    }

    #[test]
    fn height_at_interpolates_between_samples() {
        let params = quiet_params();
        let mut ocean = OceanSurface::new(&params);

        // Fabricate a ramp between two adjacent samples
        ocean.samples[0].value = 0.0;
        ocean.samples[0].delta_to_next = 2.0;
        ocean.samples[1].value = 2.0;

        let x0 = -HALF_MAX_WORLD_WIDTH;
        crate::simulation::assert_ft_approx_eq(
            ocean.height_at(x0 + DX * 0.5),
            1.0,
            1e-4,
            || "midpoint interpolation".to_string(),
        );
    }
}
