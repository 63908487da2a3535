use crate::floating_type_mod::FT;
use crate::simulation::fixed_vec::FixedVec;
use crate::simulation::game_parameters::*;
use crate::simulation::points::{decl_soa_store, Points};
use crate::simulation::ElementIndex;

decl_soa_store! {
    pub struct SpringVec {
        pub endpoint_a_index: Vec<ElementIndex> | 0,
        pub endpoint_b_index: Vec<ElementIndex> | 0,
        pub is_rope: Vec<bool> | false,

        pub rest_length: Vec<FT> | 1.,

        // Material-derived mechanical attributes
        pub material_stiffness: Vec<FT> | 1.,
        pub material_strength: Vec<FT> | 1.,

        // Fraction of the length error corrected per relaxation pass
        pub stiffness_coefficient: Vec<FT> | 0.,
        // Fraction of the along-axis relative velocity removed per pass
        pub damping_coefficient: Vec<FT> | 0.,
        // Relative strain beyond which the spring breaks
        pub break_strain: Vec<FT> | 1.,

        // Correction shares of the endpoints, from the augmented material
        // masses: a receives m_b/(m_a+m_b), b receives m_a/(m_a+m_b)
        pub mass_factor_a: Vec<FT> | 0.5,
        pub mass_factor_b: Vec<FT> | 0.5,

        // Water and heat coupling
        pub water_permeability: Vec<FT> | 0.,
        pub material_thermal_conductivity: Vec<FT> | 0.,

        // The at-most-two triangles this edge borders
        pub super_triangles: Vec<FixedVec<ElementIndex, 2>> | FixedVec::new(),

        pub is_destroyed: Vec<bool> | false,
        pub is_stressed: Vec<bool> | false,
    }
}

/// The spring (pair constraint) container. A spring is live iff both its
/// endpoints are live; destruction is logical and one-way.
pub struct Springs {
    pub v: SpringVec,

    element_count: usize,
    destroyed_count: usize,

    current_spring_stiffness_adjustment: FT,
    current_spring_damping_adjustment: FT,
    current_spring_strength_adjustment: FT,
}

pub struct SpringAttributes {
    pub endpoint_a_index: ElementIndex,
    pub endpoint_b_index: ElementIndex,
    pub is_rope: bool,
    pub material_stiffness: FT,
    pub material_strength: FT,
    pub water_permeability: FT,
    pub material_thermal_conductivity: FT,
}

impl Springs {
    pub fn new(attributes: Vec<SpringAttributes>, points: &Points, game_parameters: &GameParameters) -> Self {
        let element_count = attributes.len();
        let mut v = SpringVec::with_len(element_count);

        for (i, a) in attributes.into_iter().enumerate() {
            v.endpoint_a_index[i] = a.endpoint_a_index;
            v.endpoint_b_index[i] = a.endpoint_b_index;
            v.is_rope[i] = a.is_rope;
            v.rest_length[i] =
                (points.v.position[a.endpoint_b_index as usize] - points.v.position[a.endpoint_a_index as usize]).norm();
            v.material_stiffness[i] = a.material_stiffness;
            v.material_strength[i] = a.material_strength;
            v.water_permeability[i] = a.water_permeability;
            v.material_thermal_conductivity[i] = a.material_thermal_conductivity;
        }

        let mut springs = Springs {
            v,
            element_count,
            destroyed_count: 0,
            current_spring_stiffness_adjustment: game_parameters.spring_stiffness_adjustment,
            current_spring_damping_adjustment: game_parameters.spring_damping_adjustment,
            current_spring_strength_adjustment: game_parameters.spring_strength_adjustment,
        };

        for i in 0..element_count {
            springs.recalculate_coefficients(i as ElementIndex, points);
        }

        springs
    }

    pub fn element_count(&self) -> usize {
        self.element_count
    }

    pub fn live_spring_count(&self) -> usize {
        self.element_count - self.destroyed_count
    }

    pub fn springs(&self) -> impl Iterator<Item = ElementIndex> {
        0..self.element_count as ElementIndex
    }

    pub fn is_destroyed(&self, spring_index: ElementIndex) -> bool {
        self.v.is_destroyed[spring_index as usize]
    }

    pub fn register_super_triangle(&mut self, spring_index: ElementIndex, triangle_index: ElementIndex) {
        self.v.super_triangles[spring_index as usize].push_back(triangle_index);
    }

    pub fn remove_super_triangle(&mut self, spring_index: ElementIndex, triangle_index: ElementIndex) {
        let removed = self.v.super_triangles[spring_index as usize].erase_first(|&t| t == triangle_index);
        assert!(removed);
    }

    /// Marks the spring destroyed; the caller maintains connectivity.
    pub(crate) fn mark_destroyed(&mut self, spring_index: ElementIndex) {
        let i = spring_index as usize;
        assert!(!self.v.is_destroyed[i]);
        self.v.is_destroyed[i] = true;
        self.v.is_stressed[i] = false;
        self.destroyed_count += 1;
    }

    /// Recomputes the mass-dependent coefficients of one spring; invoked by
    /// the particle store whenever an endpoint's augmented mass changes.
    pub fn update_for_mass(&mut self, spring_index: ElementIndex, points: &Points) {
        self.recalculate_coefficients(spring_index, points);
    }

    pub fn update_for_game_parameters(&mut self, game_parameters: &GameParameters, points: &Points) {
        if game_parameters.spring_stiffness_adjustment != self.current_spring_stiffness_adjustment
            || game_parameters.spring_damping_adjustment != self.current_spring_damping_adjustment
            || game_parameters.spring_strength_adjustment != self.current_spring_strength_adjustment
        {
            self.current_spring_stiffness_adjustment = game_parameters.spring_stiffness_adjustment;
            self.current_spring_damping_adjustment = game_parameters.spring_damping_adjustment;
            self.current_spring_strength_adjustment = game_parameters.spring_strength_adjustment;

            for i in 0..self.element_count {
                if !self.v.is_destroyed[i] {
                    self.recalculate_coefficients(i as ElementIndex, points);
                }
            }
        }
    }

    fn recalculate_coefficients(&mut self, spring_index: ElementIndex, points: &Points) {
        let i = spring_index as usize;
        let m_a = points.v.augmented_material_mass[self.v.endpoint_a_index[i] as usize];
        let m_b = points.v.augmented_material_mass[self.v.endpoint_b_index[i] as usize];

        self.v.mass_factor_a[i] = m_b / (m_a + m_b);
        self.v.mass_factor_b[i] = m_a / (m_a + m_b);

        self.v.stiffness_coefficient[i] = (SPRING_REDUCTION_FRACTION
            * self.current_spring_stiffness_adjustment
            * self.v.material_stiffness[i])
            .clamp(0., 1.);

        self.v.damping_coefficient[i] =
            (SPRING_DAMPING_COEFFICIENT * self.current_spring_damping_adjustment).clamp(0., 1.);

        self.v.break_strain[i] = self.v.material_strength[i] * self.current_spring_strength_adjustment;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simulation::assert_ft_approx_eq;
    use crate::simulation::materials::test_fixtures::test_database;
    use crate::simulation::vec2f;
    use nalgebra::zero;

    fn two_point_setup() -> (Points, Springs) {
        let db = test_database();
        let params = GameParameters::default();
        let mut points = Points::new(2, &params);

        let wood_id = db
            .structural_by_color(crate::simulation::ColorKey::new(0xc2, 0x9a, 0x5b))
            .unwrap();
        let wood = db.structural(wood_id).clone();
        for k in 0..2 {
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

        let springs = Springs::new(
            vec![SpringAttributes {
                endpoint_a_index: 0,
                endpoint_b_index: 1,
                is_rope: false,
                material_stiffness: wood.stiffness,
                material_strength: wood.strength,
                water_permeability: 1.0,
                material_thermal_conductivity: wood.thermal_conductivity,
            }],
            &points,
            &params,
        );

        (points, springs)
    }

    #[test]
    fn rest_length_comes_from_factory_positions() {
        let (_points, springs) = two_point_setup();
        assert_ft_approx_eq(springs.v.rest_length[0], 1.0, 1e-6, || "rest length".to_string());
    }

    #[test]
    fn equal_masses_split_the_correction_evenly() {
        let (_points, springs) = two_point_setup();
        assert_ft_approx_eq(springs.v.mass_factor_a[0], 0.5, 1e-6, || "factor a".to_string());
        assert_ft_approx_eq(springs.v.mass_factor_b[0], 0.5, 1e-6, || "factor b".to_string());
    }

    #[test]
    fn augmenting_mass_rebalances_the_mass_factors() {
        let (mut points, mut springs) = two_point_setup();

        // Endpoint 0 becomes very heavy: corrections shift to endpoint 1
        points.augment_material_mass(0, 3600.0, &mut springs);

        assert!(springs.v.mass_factor_a[0] < 0.1);
        assert!(springs.v.mass_factor_b[0] > 0.9);
        assert_ft_approx_eq(
            springs.v.mass_factor_a[0] + springs.v.mass_factor_b[0],
            1.0,
            1e-6,
            || "factors sum to one".to_string(),
        );
    }

    #[test]
    fn strength_adjustment_rescales_break_strain() {
        let (points, mut springs) = two_point_setup();
        let mut params = GameParameters::default();

        params.spring_strength_adjustment = 0.0;
        springs.update_for_game_parameters(&params, &points);
        assert_eq!(springs.v.break_strain[0], 0.0);

        params.spring_strength_adjustment = 2.0;
        springs.update_for_game_parameters(&params, &points);
        assert_ft_approx_eq(
            springs.v.break_strain[0],
            springs.v.material_strength[0] * 2.0,
            1e-6,
            || "break strain".to_string(),
        );
    }
}
