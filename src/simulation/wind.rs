use crate::floating_type_mod::FT;
use crate::simulation::game_parameters::*;
use crate::simulation::random::GameRandomEngine;
use crate::simulation::{vec2f, V2};

/// Running average over a fixed window; used to smooth noisy per-tick
/// signals (gust incisiveness, frame rates).
pub struct RunningAverage<const N: usize> {
    values: [FT; N],
    cursor: usize,
    populated: usize,
    sum: FT,
}

impl<const N: usize> RunningAverage<N> {
    pub fn new() -> Self {
        RunningAverage {
            values: [0.; N],
            cursor: 0,
            populated: 0,
            sum: 0.,
        }
    }

    pub fn update(&mut self, value: FT) -> FT {
        self.sum -= self.values[self.cursor];
        self.values[self.cursor] = value;
        self.sum += value;
        self.cursor = (self.cursor + 1) % N;
        self.populated = (self.populated + 1).min(N);
        self.average()
    }

    pub fn average(&self) -> FT {
        if self.populated == 0 {
            0.
        } else {
            self.sum / self.populated as FT
        }
    }
}

impl<const N: usize> Default for RunningAverage<N> {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum GustPhase {
    Lull,
    Gusting,
}

/// The wind: a base speed along the horizontal axis, modulated by randomly
/// scheduled gusts that ramp along a half-sine up to the max factor.
pub struct Wind {
    current_speed: V2,

    gust_phase: GustPhase,
    phase_start_time: FT,
    phase_duration: FT,
    gust_amplitude: FT,

    current_base_speed_magnitude: FT,
    current_max_speed_magnitude: FT,
}

// Beaufort-style base speed is stated in km/h
const KMH_TO_MS: FT = 1000.0 / 3600.0;

impl Wind {
    pub fn new() -> Self {
        Wind {
            current_speed: vec2f(0., 0.),
            gust_phase: GustPhase::Lull,
            phase_start_time: 0.,
            phase_duration: 0.,
            gust_amplitude: 0.,
            current_base_speed_magnitude: 0.,
            current_max_speed_magnitude: 0.,
        }
    }

    pub fn update(&mut self, current_simulation_time: FT, game_parameters: &GameParameters, rng: &mut GameRandomEngine) {
        self.current_base_speed_magnitude = game_parameters.wind_speed_base * KMH_TO_MS;
        self.current_max_speed_magnitude = self.current_base_speed_magnitude * game_parameters.wind_speed_max_factor;

        let mut magnitude = self.current_base_speed_magnitude;

        if game_parameters.do_modulate_wind {
            let elapsed = current_simulation_time - self.phase_start_time;
            if elapsed >= self.phase_duration {
                match self.gust_phase {
                    GustPhase::Lull => {
                        self.gust_phase = GustPhase::Gusting;
                        self.phase_start_time = current_simulation_time;
                        self.phase_duration = rng.generate_real(1.0, 3.0);
                        self.gust_amplitude = rng.generate_normalized_real()
                            * (self.current_max_speed_magnitude - self.current_base_speed_magnitude);
                    }
                    GustPhase::Gusting => {
                        self.gust_phase = GustPhase::Lull;
                        self.phase_start_time = current_simulation_time;
                        // Longer lulls with lower gust frequency
                        self.phase_duration =
                            rng.generate_real(2.0, 10.0) / game_parameters.wind_gust_frequency_adjustment;
                        self.gust_amplitude = 0.;
                    }
                }
            }

            if self.gust_phase == GustPhase::Gusting {
                let progress =
                    ((current_simulation_time - self.phase_start_time) / self.phase_duration).clamp(0., 1.);
                magnitude += self.gust_amplitude * (crate::floating_type_mod::PI * progress).sin();
            }
        }

        self.current_speed = vec2f(magnitude, 0.);
    }

    pub fn current_speed(&self) -> V2 {
        self.current_speed
    }

    pub fn base_speed_magnitude(&self) -> FT {
        self.current_base_speed_magnitude
    }

    pub fn max_speed_magnitude(&self) -> FT {
        self.current_max_speed_magnitude
    }
}

impl Default for Wind {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn running_average_over_partial_window() {
        let mut avg: RunningAverage<4> = RunningAverage::new();
        assert_eq!(avg.update(2.0), 2.0);
        assert_eq!(avg.update(4.0), 3.0);
    }

    #[test]
    fn running_average_forgets_old_values() {
        let mut avg: RunningAverage<2> = RunningAverage::new();
        avg.update(100.0);
        avg.update(2.0);
        assert_eq!(avg.update(4.0), 3.0);
    }

    #[test]
    fn wind_stays_within_base_and_max() {
        let mut wind = Wind::new();
        let params = GameParameters::default();
        let mut rng = GameRandomEngine::new(11);

        let base = params.wind_speed_base * KMH_TO_MS;
        let max = base * params.wind_speed_max_factor;

        let mut t = 0.0;
        for _ in 0..10_000 {
            wind.update(t, &params, &mut rng);
            let magnitude = wind.current_speed().x;
            assert!(magnitude >= base - 1e-4);
            assert!(magnitude <= max + 1e-4);
            t += SIMULATION_STEP_TIME_DURATION;
        }
    }

    #[test]
    fn unmodulated_wind_is_constant() {
        let mut wind = Wind::new();
        let mut params = GameParameters::default();
        params.do_modulate_wind = false;
        let mut rng = GameRandomEngine::new(11);

        wind.update(0.5, &params, &mut rng);
        assert_eq!(wind.current_speed().x, params.wind_speed_base * KMH_TO_MS);
        assert_eq!(wind.current_speed().y, 0.0);
    }
}
