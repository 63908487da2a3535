use crate::simulation::game_parameters::MAX_PINNED_POINTS;
use crate::simulation::points::Points;
use crate::simulation::springs::Springs;
use crate::simulation::ElementIndex;
use std::collections::VecDeque;

/// The bounded set of pinned particles. Pinning clamps a particle in place:
/// the integrator and the relaxation passes treat it as infinitely massive.
/// When the set is full, pinning a new point silently unpins the oldest.
pub struct PinnedPoints {
    pinned: VecDeque<ElementIndex>,
}

impl PinnedPoints {
    pub fn new() -> Self {
        PinnedPoints {
            pinned: VecDeque::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.pinned.is_empty()
    }

    /// Pins or unpins the given point. Returns the new pinned state.
    pub fn toggle(&mut self, point_index: ElementIndex, points: &mut Points, springs: &mut Springs) -> bool {
        if let Some(slot) = self.pinned.iter().position(|&p| p == point_index) {
            self.pinned.remove(slot);
            self.unpin(point_index, points, springs);
            false
        } else {
            if self.pinned.len() >= MAX_PINNED_POINTS {
                let oldest = self.pinned.pop_front().unwrap();
                self.unpin(oldest, points, springs);
            }

            self.pinned.push_back(point_index);
            points.v.is_pinned[point_index as usize] = true;
            points.v.velocity[point_index as usize] = nalgebra::zero();
            // Connected springs see an (effectively) infinite endpoint mass
            points.augment_material_mass(point_index, 1e7, springs);
            true
        }
    }

    fn unpin(&mut self, point_index: ElementIndex, points: &mut Points, springs: &mut Springs) {
        points.v.is_pinned[point_index as usize] = false;
        points.augment_material_mass(point_index, 0., springs);
    }
}

impl Default for PinnedPoints {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::floating_type_mod::FT;
    use crate::simulation::game_parameters::GameParameters;
    use crate::simulation::materials::test_fixtures::test_database;
    use crate::simulation::springs::SpringAttributes;
    use crate::simulation::vec2f;
    use nalgebra::zero;

    fn setup(count: usize) -> (Points, Springs) {
        let db = test_database();
        let params = GameParameters::default();
        let mut points = Points::new(count, &params);
        let wood_id = db
            .structural_by_color(crate::simulation::ColorKey::new(0xc2, 0x9a, 0x5b))
            .unwrap();
        let wood = db.structural(wood_id).clone();
        for k in 0..count {
            points.add_ship_particle(
                vec2f(k as FT, 0.),
                wood_id,
                &wood,
                None,
                false,
                false,
                wood.render_color(),
                zero(),
            );
        }
        let springs = Springs::new(Vec::<SpringAttributes>::new(), &points, &params);
        (points, springs)
    }

    #[test]
    fn toggle_pins_and_unpins() {
        let (mut points, mut springs) = setup(4);
        let mut pinned = PinnedPoints::new();

        assert!(pinned.toggle(2, &mut points, &mut springs));
        assert!(points.v.is_pinned[2]);
        assert!(points.v.augmented_material_mass[2] > 1e6);

        assert!(!pinned.toggle(2, &mut points, &mut springs));
        assert!(!points.v.is_pinned[2]);
        assert_eq!(points.v.augmented_material_mass[2], points.v.material_mass[2]);
    }

    #[test]
    fn overflow_unpins_the_oldest() {
        let (mut points, mut springs) = setup(MAX_PINNED_POINTS + 1);
        let mut pinned = PinnedPoints::new();

        for k in 0..=MAX_PINNED_POINTS {
            pinned.toggle(k as ElementIndex, &mut points, &mut springs);
        }

        assert!(!points.v.is_pinned[0]);
        assert!(points.v.is_pinned[MAX_PINNED_POINTS]);
    }
}
