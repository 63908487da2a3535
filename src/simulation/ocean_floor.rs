use crate::floating_type_mod::FT;
use crate::simulation::game_parameters::*;

// The number of terrain samples for the entire world width; more resolution
// costs cache misses in the collision loop
pub const SAMPLES_COUNT: usize = 2048;

pub const DX: FT = MAX_WORLD_WIDTH / SAMPLES_COUNT as FT;

const FREQUENCY_1: FT = 0.005;
const FREQUENCY_2: FT = 0.015;
const FREQUENCY_3: FT = 0.0005;

/// The ocean floor: sampled terrain composed of three sine components,
/// scaled by the bumpiness and detail-amplification parameters, sunk by the
/// sea depth. User edits persist as offsets on top of the base terrain.
pub struct OceanFloor {
    samples: Vec<FT>,
    user_offsets: Vec<FT>,

    current_sea_depth: FT,
    current_bumpiness: FT,
    current_detail_amplification: FT,
}

impl OceanFloor {
    pub fn new(game_parameters: &GameParameters) -> Self {
        let mut floor = OceanFloor {
            samples: vec![0.; SAMPLES_COUNT + 1],
            user_offsets: vec![0.; SAMPLES_COUNT + 1],
            current_sea_depth: FT::MIN,
            current_bumpiness: FT::MIN,
            current_detail_amplification: FT::MIN,
        };
        floor.update(game_parameters);
        floor
    }

    pub fn update(&mut self, game_parameters: &GameParameters) {
        if game_parameters.sea_depth != self.current_sea_depth
            || game_parameters.ocean_floor_bumpiness != self.current_bumpiness
            || game_parameters.ocean_floor_detail_amplification != self.current_detail_amplification
        {
            let bumpiness = game_parameters.ocean_floor_bumpiness;
            let detail = game_parameters.ocean_floor_detail_amplification;

            // One extra sample avoids wrapping during interpolation
            let mut x = 0.0;
            for i in 0..SAMPLES_COUNT + 1 {
                let c1 = (x * FREQUENCY_1).sin() * 10.0 * bumpiness;
                let c2 = (x * FREQUENCY_2).sin() * 6.0 * bumpiness;
                let c3 = (x * FREQUENCY_3).sin() * 4.5 * detail;

                self.samples[i] = (c1 + c2 - c3) - game_parameters.sea_depth + self.user_offsets[i];
                x += DX;
            }

            self.current_sea_depth = game_parameters.sea_depth;
            self.current_bumpiness = game_parameters.ocean_floor_bumpiness;
            self.current_detail_amplification = game_parameters.ocean_floor_detail_amplification;
        }
    }

    pub fn height_at(&self, x: FT) -> FT {
        let fractional_index = ((x + HALF_MAX_WORLD_WIDTH) / DX).clamp(0., (SAMPLES_COUNT - 1) as FT);
        let index = fractional_index as usize;
        let frac = fractional_index - index as FT;
        self.samples[index] * (1.0 - frac) + self.samples[index + 1] * frac
    }

    /// Rewrites the terrain between two world points as a straight segment.
    /// Returns whether anything changed.
    pub fn adjust_to(&mut self, x1: FT, target_y1: FT, x2: FT, target_y2: FT) -> bool {
        let (x_lo, y_lo, x_hi, y_hi) = if x1 <= x2 {
            (x1, target_y1, x2, target_y2)
        } else {
            (x2, target_y2, x1, target_y1)
        };

        let index_lo = (((x_lo + HALF_MAX_WORLD_WIDTH) / DX).ceil().max(0.)) as usize;
        let index_hi = (((x_hi + HALF_MAX_WORLD_WIDTH) / DX).floor()).min(SAMPLES_COUNT as FT) as usize;
        if index_lo > index_hi {
            return false;
        }

        for i in index_lo..=index_hi {
            let x = i as FT * DX - HALF_MAX_WORLD_WIDTH;
            let t = if x_hi > x_lo { (x - x_lo) / (x_hi - x_lo) } else { 0.0 };
            let target = y_lo + (y_hi - y_lo) * t;

            self.user_offsets[i] += target - self.samples[i];
            self.samples[i] = target;
        }

        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simulation::assert_ft_approx_eq;

    #[test]
    fn floor_sits_around_sea_depth() {
        let mut params = GameParameters::default();
        params.sea_depth = 100.0;
        params.ocean_floor_bumpiness = 1.0;
        params.ocean_floor_detail_amplification = 1.0;
        let floor = OceanFloor::new(&params);

        for k in 0..100 {
            let x = -HALF_MAX_WORLD_WIDTH + k as FT * 37.0;
            let h = floor.height_at(x);
            assert!(h < -70.0 && h > -130.0, "floor {} out of band at {}", h, x);
        }
    }

    #[test]
    fn deeper_sea_lowers_the_floor() {
        let mut params = GameParameters::default();
        params.sea_depth = 100.0;
        let mut floor = OceanFloor::new(&params);
        let before = floor.height_at(0.);

        params.sea_depth = 500.0;
        floor.update(&params);
        assert_ft_approx_eq(floor.height_at(0.), before - 400.0, 1e-2, || "depth delta".to_string());
    }

    #[test]
    fn adjust_to_writes_a_segment_that_survives_regeneration() {
        let mut params = GameParameters::default();
        let mut floor = OceanFloor::new(&params);

        assert!(floor.adjust_to(-10.0, -50.0, 10.0, -50.0));
        assert_ft_approx_eq(floor.height_at(0.), -50.0, 1.0, || "adjusted floor".to_string());

        // A parameter change regenerates the base terrain; the edit is
        // carried as an offset
        params.ocean_floor_bumpiness = 2.0;
        floor.update(&params);
        let after = floor.height_at(0.);
        assert!((after - -50.0).abs() < 25.0, "edit lost after regeneration: {}", after);
    }
}
