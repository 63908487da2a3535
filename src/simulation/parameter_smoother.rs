use crate::floating_type_mod::{FT, PI};
use crate::simulation::game_parameters::GameParameters;

/// The parameters whose user-driven changes are smoothed over a trajectory
/// instead of being applied as a step. Tagged accessors rather than
/// closures, so the smoother bank and the parameters can live side by side.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SmoothedParameter {
    SpringStiffnessAdjustment,
    SpringStrengthAdjustment,
    SeaDepth,
    OceanFloorBumpiness,
    OceanFloorDetailAmplification,
    FlameSizeAdjustment,
}

impl SmoothedParameter {
    fn get(self, parameters: &GameParameters, flame_size_adjustment: &FT) -> FT {
        match self {
            SmoothedParameter::SpringStiffnessAdjustment => parameters.spring_stiffness_adjustment,
            SmoothedParameter::SpringStrengthAdjustment => parameters.spring_strength_adjustment,
            SmoothedParameter::SeaDepth => parameters.sea_depth,
            SmoothedParameter::OceanFloorBumpiness => parameters.ocean_floor_bumpiness,
            SmoothedParameter::OceanFloorDetailAmplification => parameters.ocean_floor_detail_amplification,
            SmoothedParameter::FlameSizeAdjustment => *flame_size_adjustment,
        }
    }

    fn set(self, parameters: &mut GameParameters, flame_size_adjustment: &mut FT, value: FT) {
        match self {
            SmoothedParameter::SpringStiffnessAdjustment => parameters.spring_stiffness_adjustment = value,
            SmoothedParameter::SpringStrengthAdjustment => parameters.spring_strength_adjustment = value,
            SmoothedParameter::SeaDepth => parameters.sea_depth = value,
            SmoothedParameter::OceanFloorBumpiness => parameters.ocean_floor_bumpiness = value,
            SmoothedParameter::OceanFloorDetailAmplification => {
                parameters.ocean_floor_detail_amplification = value
            }
            SmoothedParameter::FlameSizeAdjustment => *flame_size_adjustment = value,
        }
    }
}

/// Moves one parameter from its last snapshot toward the latest target
/// along a sin² curve of fixed trajectory time.
pub struct ParameterSmoother {
    parameter: SmoothedParameter,
    trajectory_time: FT,

    start_value: FT,
    target_value: FT,
    start_time: FT,
    is_active: bool,
}

impl ParameterSmoother {
    pub fn new(parameter: SmoothedParameter, trajectory_time: FT) -> Self {
        ParameterSmoother {
            parameter,
            trajectory_time,
            start_value: 0.,
            target_value: 0.,
            start_time: 0.,
            is_active: false,
        }
    }

    pub fn parameter(&self) -> SmoothedParameter {
        self.parameter
    }

    pub fn set_target(
        &mut self,
        target_value: FT,
        current_time: FT,
        parameters: &GameParameters,
        flame_size_adjustment: &FT,
    ) {
        self.start_value = self.parameter.get(parameters, flame_size_adjustment);
        self.target_value = target_value;
        self.start_time = current_time;
        self.is_active = true;
    }

    pub fn update(
        &mut self,
        current_time: FT,
        parameters: &mut GameParameters,
        flame_size_adjustment: &mut FT,
    ) {
        if !self.is_active {
            return;
        }

        let progress = ((current_time - self.start_time) / self.trajectory_time).clamp(0., 1.);
        let sin_progress = (PI / 2.0 * progress).sin();
        let value = self.start_value + (self.target_value - self.start_value) * sin_progress * sin_progress;

        self.parameter.set(parameters, flame_size_adjustment, value);

        if progress >= 1.0 {
            // Snap exactly onto the target and stop observing
            self.parameter.set(parameters, flame_size_adjustment, self.target_value);
            self.is_active = false;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simulation::assert_ft_approx_eq;

    #[test]
    fn smoother_reaches_its_target_in_trajectory_time() {
        let mut parameters = GameParameters::default();
        let mut flame = 1.0;
        let mut smoother = ParameterSmoother::new(SmoothedParameter::SeaDepth, 1.0);

        smoother.set_target(1000.0, 0.0, &parameters, &flame);

        let mut t = 0.0;
        for _ in 0..49 {
            t += 0.02;
            smoother.update(t, &mut parameters, &mut flame);
        }
        assert!(parameters.sea_depth < 1000.0);

        smoother.update(1.0, &mut parameters, &mut flame);
        assert_eq!(parameters.sea_depth, 1000.0);
    }

    #[test]
    fn trajectory_is_monotonic_and_sin_squared_shaped() {
        let mut parameters = GameParameters::default();
        parameters.sea_depth = 0.0;
        let mut flame = 1.0;
        let mut smoother = ParameterSmoother::new(SmoothedParameter::SeaDepth, 1.0);
        smoother.set_target(100.0, 0.0, &parameters, &flame);

        smoother.update(0.5, &mut parameters, &mut flame);
        // sin²(π/4) = 0.5: halfway in time is halfway in value
        assert_ft_approx_eq(parameters.sea_depth, 50.0, 1e-3, || "midpoint".to_string());

        let mut last = -1.0;
        for k in 1..=20 {
            smoother.update(0.5 + k as FT * 0.025, &mut parameters, &mut flame);
            assert!(parameters.sea_depth >= last);
            last = parameters.sea_depth;
        }
    }

    #[test]
    fn retargeting_restarts_from_the_current_value() {
        let mut parameters = GameParameters::default();
        parameters.sea_depth = 0.0;
        let mut flame = 1.0;
        let mut smoother = ParameterSmoother::new(SmoothedParameter::SeaDepth, 1.0);

        smoother.set_target(100.0, 0.0, &parameters, &flame);
        smoother.update(0.5, &mut parameters, &mut flame);
        let midway = parameters.sea_depth;

        smoother.set_target(0.0, 0.5, &parameters, &flame);
        smoother.update(0.5, &mut parameters, &mut flame);
        assert_ft_approx_eq(parameters.sea_depth, midway, 1e-4, || "restart origin".to_string());

        smoother.update(1.5, &mut parameters, &mut flame);
        assert_eq!(parameters.sea_depth, 0.0);
    }
}
