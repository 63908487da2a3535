use crate::floating_type_mod::FT;
use crate::simulation::bombs::BombKind;
use crate::simulation::events::{GameEvent, GameEventDispatcher, ShipIdType};
use crate::simulation::game_parameters::*;
use crate::simulation::materials::{GameError, MaterialDatabase};
use crate::simulation::ocean_floor::OceanFloor;
use crate::simulation::ocean_surface::OceanSurface;
use crate::simulation::random::GameRandomEngine;
use crate::simulation::ship::{HeatBlasterAction, Ship};
use crate::simulation::ship_builder;
use crate::simulation::ship_definition::{ShipDefinition, ShipMetadata};
use crate::simulation::wind::Wind;
use crate::simulation::{ElementIndex, V2};
use std::sync::Arc;

/// Identifies a particle across ships.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ElementId {
    pub ship_id: ShipIdType,
    pub point_index: ElementIndex,
}

/// The world: ships, ocean, wind, one clock, one random engine. `update`
/// advances everything by one fixed time step, in a total phase order.
pub struct World {
    current_simulation_time: FT,
    tick: u64,

    material_database: Arc<MaterialDatabase>,

    ships: Vec<Ship>,

    wind: Wind,
    ocean_surface: OceanSurface,
    ocean_floor: OceanFloor,

    rng: GameRandomEngine,

    next_tsunami_time: Option<FT>,
    next_rogue_wave_time: Option<FT>,
}

impl World {
    pub fn new(material_database: Arc<MaterialDatabase>, game_parameters: &GameParameters, rng_seed: u64) -> Self {
        World {
            current_simulation_time: 0.,
            tick: 0,
            material_database,
            ships: Vec::new(),
            wind: Wind::new(),
            ocean_surface: OceanSurface::new(game_parameters),
            ocean_floor: OceanFloor::new(game_parameters),
            rng: GameRandomEngine::new(rng_seed),
            next_tsunami_time: None,
            next_rogue_wave_time: None,
        }
    }

    pub fn current_simulation_time(&self) -> FT {
        self.current_simulation_time
    }

    pub fn material_database(&self) -> &MaterialDatabase {
        &self.material_database
    }

    pub fn ocean_surface(&self) -> &OceanSurface {
        &self.ocean_surface
    }

    pub fn ocean_floor(&self) -> &OceanFloor {
        &self.ocean_floor
    }

    pub fn wind(&self) -> &Wind {
        &self.wind
    }

    pub fn ships(&self) -> &[Ship] {
        &self.ships
    }

    pub fn ships_mut(&mut self) -> &mut [Ship] {
        &mut self.ships
    }

    pub fn is_underwater(&self, position: V2) -> bool {
        self.ocean_surface.is_underwater(&position)
    }

    //
    // Ship lifecycle
    //

    pub fn add_ship(
        &mut self,
        definition: &ShipDefinition,
        game_parameters: &GameParameters,
        events: &mut GameEventDispatcher,
    ) -> Result<(ShipIdType, ShipMetadata), GameError> {
        let ship_id = self.ships.len() as ShipIdType;

        let parts = ship_builder::build(definition, &self.material_database, game_parameters)?;
        let metadata = parts.metadata;

        let ship = Ship::new(
            ship_id,
            self.material_database.clone(),
            parts.points,
            parts.springs,
            parts.triangles,
            parts.electrical_elements,
        );

        events.push(GameEvent::ShipLoaded {
            id: ship_id,
            name: metadata.ship_name.clone(),
            author: metadata.author.clone(),
        });
        ship.electrical_elements.announce(&self.material_database, events);

        self.ships.push(ship);

        Ok((ship_id, metadata))
    }

    //
    // Simulation
    //

    pub fn update(&mut self, game_parameters: &GameParameters, events: &mut GameEventDispatcher) {
        self.current_simulation_time += SIMULATION_STEP_TIME_DURATION;
        self.tick += 1;

        // World parts first: ships read the surface the ocean wrote this
        // tick
        self.wind
            .update(self.current_simulation_time, game_parameters, &mut self.rng);
        self.ocean_floor.update(game_parameters);
        self.ocean_surface
            .update(self.current_simulation_time, &self.wind, game_parameters);

        self.update_scheduled_waves(game_parameters, events);

        for ship in self.ships.iter_mut() {
            ship.update(
                self.current_simulation_time,
                self.tick,
                game_parameters,
                &self.ocean_surface,
                &self.ocean_floor,
                &self.wind,
                &mut self.rng,
                events,
            );
        }
    }

    fn update_scheduled_waves(&mut self, game_parameters: &GameParameters, events: &mut GameEventDispatcher) {
        if game_parameters.tsunami_rate_minutes > 0. {
            match self.next_tsunami_time {
                None => {
                    let period = game_parameters.tsunami_rate_minutes * 60.;
                    self.next_tsunami_time =
                        Some(self.current_simulation_time + period * self.rng.generate_real(0.75, 1.25));
                }
                Some(at) if self.current_simulation_time >= at => {
                    self.ocean_surface
                        .trigger_tsunami(self.current_simulation_time, &mut self.rng, events);
                    self.next_tsunami_time = None;
                }
                _ => {}
            }
        } else {
            self.next_tsunami_time = None;
        }

        if game_parameters.rogue_wave_rate_minutes > 0. {
            match self.next_rogue_wave_time {
                None => {
                    let period = game_parameters.rogue_wave_rate_minutes * 60.;
                    self.next_rogue_wave_time =
                        Some(self.current_simulation_time + period * self.rng.generate_real(0.75, 1.25));
                }
                Some(at) if self.current_simulation_time >= at => {
                    self.ocean_surface
                        .trigger_rogue_wave(self.current_simulation_time, &self.wind, &mut self.rng);
                    self.next_rogue_wave_time = None;
                }
                _ => {}
            }
        } else {
            self.next_rogue_wave_time = None;
        }
    }

    //
    // Interactions
    //

    pub fn pick_point_to_move(&self, pick_position: V2, game_parameters: &GameParameters) -> Option<ElementId> {
        for ship in self.ships.iter().rev() {
            if let Some(point_index) = ship.pick_point_to_move(pick_position, game_parameters) {
                return Some(ElementId {
                    ship_id: ship.id(),
                    point_index,
                });
            }
        }
        None
    }

    pub fn move_element_by(
        &mut self,
        element_id: ElementId,
        offset: V2,
        inertial_velocity: V2,
        game_parameters: &GameParameters,
    ) {
        let ship = &mut self.ships[element_id.ship_id as usize];
        ship.move_point_by(element_id.point_index, offset, inertial_velocity, game_parameters);
    }

    pub fn move_ship_by(
        &mut self,
        ship_id: ShipIdType,
        offset: V2,
        inertial_velocity: V2,
        game_parameters: &GameParameters,
    ) {
        self.ships[ship_id as usize].move_by(offset, inertial_velocity, game_parameters);
    }

    pub fn rotate_element_by(
        &mut self,
        element_id: ElementId,
        angle: FT,
        center: V2,
        inertial_angle: FT,
        game_parameters: &GameParameters,
    ) {
        let ship = &mut self.ships[element_id.ship_id as usize];
        ship.rotate_point_by(element_id.point_index, angle, center, inertial_angle, game_parameters);
    }

    pub fn rotate_ship_by(
        &mut self,
        ship_id: ShipIdType,
        angle: FT,
        center: V2,
        inertial_angle: FT,
        game_parameters: &GameParameters,
    ) {
        self.ships[ship_id as usize].rotate_by(angle, center, inertial_angle, game_parameters);
    }

    pub fn destroy_at(
        &mut self,
        target_position: V2,
        radius_fraction: FT,
        game_parameters: &GameParameters,
        events: &mut GameEventDispatcher,
    ) {
        let time = self.current_simulation_time;
        let (ships, ocean, rng) = (&mut self.ships, &self.ocean_surface, &mut self.rng);
        for ship in ships.iter_mut() {
            ship.destroy_at(target_position, radius_fraction, time, game_parameters, ocean, rng, events);
        }
    }

    pub fn saw_through(
        &mut self,
        start_position: V2,
        end_position: V2,
        game_parameters: &GameParameters,
        events: &mut GameEventDispatcher,
    ) {
        let time = self.current_simulation_time;
        for ship in self.ships.iter_mut() {
            ship.saw_through(start_position, end_position, time, game_parameters, &mut self.rng, events);
        }
    }

    pub fn apply_heat_blaster_at(
        &mut self,
        target_position: V2,
        action: HeatBlasterAction,
        radius: FT,
        game_parameters: &GameParameters,
    ) -> bool {
        let mut applied = false;
        for ship in self.ships.iter_mut() {
            applied |= ship.apply_heat_blaster_at(target_position, action, radius, game_parameters);
        }
        applied
    }

    pub fn extinguish_fire_at(&mut self, target_position: V2, radius: FT, game_parameters: &GameParameters) -> bool {
        let mut applied = false;
        for ship in self.ships.iter_mut() {
            applied |= ship.extinguish_fire_at(target_position, radius, game_parameters);
        }
        applied
    }

    pub fn draw_to(&mut self, target_position: V2, strength_fraction: FT) {
        for ship in self.ships.iter_mut() {
            ship.draw_to(target_position, strength_fraction);
        }
    }

    pub fn swirl_at(&mut self, target_position: V2, strength_fraction: FT) {
        for ship in self.ships.iter_mut() {
            ship.swirl_at(target_position, strength_fraction);
        }
    }

    pub fn toggle_pin_at(&mut self, target_position: V2, game_parameters: &GameParameters) -> bool {
        // Stop at the first ship that pins or unpins
        for ship in self.ships.iter_mut().rev() {
            if ship.toggle_pin_at(target_position, game_parameters) {
                return true;
            }
        }
        false
    }

    pub fn inject_bubbles_at(&mut self, target_position: V2) -> bool {
        let time = self.current_simulation_time;
        let (ships, ocean, rng) = (&mut self.ships, &self.ocean_surface, &mut self.rng);
        for ship in ships.iter_mut().rev() {
            if ship.inject_bubbles_at(target_position, time, ocean, rng) {
                return true;
            }
        }
        false
    }

    pub fn flood_at(&mut self, target_position: V2, water_quantity_multiplier: FT, game_parameters: &GameParameters) -> bool {
        let mut flooded = false;
        for ship in self.ships.iter_mut() {
            flooded |= ship.flood_at(target_position, water_quantity_multiplier, game_parameters);
        }
        flooded
    }

    pub fn toggle_bomb_at(&mut self, kind: BombKind, target_position: V2, game_parameters: &GameParameters) -> bool {
        for ship in self.ships.iter_mut().rev() {
            if ship.toggle_bomb_at(kind, target_position, game_parameters) {
                return true;
            }
        }
        false
    }

    pub fn detonate_rc_bombs(&mut self, game_parameters: &GameParameters, events: &mut GameEventDispatcher) {
        let time = self.current_simulation_time;
        let (ships, ocean, rng) = (&mut self.ships, &self.ocean_surface, &mut self.rng);
        for ship in ships.iter_mut() {
            ship.detonate_rc_bombs(time, game_parameters, ocean, rng, events);
        }
    }

    pub fn detonate_anti_matter_bombs(&mut self) {
        for ship in self.ships.iter_mut() {
            ship.detonate_anti_matter_bombs();
        }
    }

    pub fn adjust_ocean_surface_to(&mut self, world_coordinates: Option<V2>) {
        self.ocean_surface
            .adjust_to(world_coordinates, self.current_simulation_time);
    }

    pub fn adjust_ocean_floor_to(&mut self, x1: FT, target_y1: FT, x2: FT, target_y2: FT) -> bool {
        self.ocean_floor.adjust_to(x1, target_y1, x2, target_y2)
    }

    pub fn scrub_through(&mut self, start_position: V2, end_position: V2, game_parameters: &GameParameters) -> bool {
        let mut scrubbed = false;
        for ship in self.ships.iter_mut() {
            scrubbed |= ship.scrub_through(start_position, end_position, game_parameters);
        }
        scrubbed
    }

    #[allow(clippy::too_many_arguments)]
    pub fn apply_thanos_snap(
        &mut self,
        center_x: FT,
        radius: FT,
        left_front_x: FT,
        right_front_x: FT,
        game_parameters: &GameParameters,
        events: &mut GameEventDispatcher,
    ) {
        let (ships, rng) = (&mut self.ships, &mut self.rng);
        for ship in ships.iter_mut() {
            ship.apply_thanos_snap(center_x, radius, left_front_x, right_front_x, game_parameters, rng, events);
        }

        self.ocean_surface.apply_thanos_snap(left_front_x, right_front_x);
    }

    pub fn trigger_tsunami(&mut self, events: &mut GameEventDispatcher) {
        self.ocean_surface
            .trigger_tsunami(self.current_simulation_time, &mut self.rng, events);
    }

    pub fn trigger_rogue_wave(&mut self) {
        self.ocean_surface
            .trigger_rogue_wave(self.current_simulation_time, &self.wind, &mut self.rng);
    }

    pub fn get_nearest_point_at(&self, target_position: V2, radius: FT) -> Option<ElementId> {
        let mut best: Option<(ElementId, FT)> = None;
        for ship in self.ships.iter() {
            if let Some(point_index) = ship.get_nearest_point_at(target_position, radius) {
                let distance_squared =
                    (ship.points.v.position[point_index as usize] - target_position).norm_squared();
                if best.map(|(_, d)| distance_squared < d).unwrap_or(true) {
                    best = Some((
                        ElementId {
                            ship_id: ship.id(),
                            point_index,
                        },
                        distance_squared,
                    ));
                }
            }
        }
        best.map(|(id, _)| id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simulation::assert_ft_approx_eq;
    use crate::simulation::materials::test_fixtures::test_database;
    use crate::simulation::vec2f;
    use image::{Rgb, RgbImage};

    const WOOD: Rgb<u8> = Rgb([0xc2, 0x9a, 0x5b]);

    fn test_definition(width: u32, height: u32, offset: V2) -> ShipDefinition {
        ShipDefinition::from_images(
            RgbImage::from_pixel(width, height, WOOD),
            None,
            None,
            ShipMetadata {
                ship_name: "Raft".to_string(),
                author: Some("nobody".to_string()),
                offset,
            },
        )
    }

    fn quiet_params() -> GameParameters {
        let mut params = GameParameters::default();
        params.do_modulate_wind = false;
        params.wind_speed_base = 0.0;
        params
    }

    #[test]
    fn add_ship_emits_loaded_event_and_announcements() {
        let params = quiet_params();
        let mut world = World::new(Arc::new(test_database()), &params, 7);
        let mut events = GameEventDispatcher::new();

        let (ship_id, metadata) = world
            .add_ship(&test_definition(2, 2, vec2f(0., 100.)), &params, &mut events)
            .unwrap();

        assert_eq!(ship_id, 0);
        assert_eq!(metadata.ship_name, "Raft");
        // ShipLoaded + announcements begin/end
        assert_eq!(events.pending_count(), 3);
    }

    #[test]
    fn update_advances_simulation_time_by_fixed_steps() {
        let params = quiet_params();
        let mut world = World::new(Arc::new(test_database()), &params, 7);
        let mut events = GameEventDispatcher::new();

        for _ in 0..50 {
            world.update(&params, &mut events);
        }
        assert_ft_approx_eq(world.current_simulation_time(), 1.0, 1e-5, || "1 second".to_string());
    }

    #[test]
    fn zero_substeps_and_zero_relaxation_leave_state_bit_exact() {
        let mut params = quiet_params();
        let mut world = World::new(Arc::new(test_database()), &params, 7);
        let mut events = GameEventDispatcher::new();
        world
            .add_ship(&test_definition(3, 3, vec2f(0., 100.)), &params, &mut events)
            .unwrap();

        params.num_mechanical_dynamics_iterations_adjustment = 0.0;
        params.num_spring_relaxation_passes = 0;
        assert_eq!(params.num_mechanical_dynamics_iterations(), 0);

        let ship = &mut world.ships_mut()[0];
        let positions_before = ship.points.v.position.clone();
        let velocities_before = ship.points.v.velocity.clone();

        let ocean = OceanSurface::new(&params);
        let floor = OceanFloor::new(&params);
        let wind = Wind::new();
        let mut rng = GameRandomEngine::new(1);
        ship.update_mechanical_dynamics(&params, &ocean, &floor, &wind, &mut rng, &mut events);

        assert_eq!(ship.points.v.position, positions_before);
        assert_eq!(ship.points.v.velocity, velocities_before);
    }

    #[test]
    fn dropped_ship_falls_during_world_update() {
        let params = quiet_params();
        let mut world = World::new(Arc::new(test_database()), &params, 7);
        let mut events = GameEventDispatcher::new();
        world
            .add_ship(&test_definition(2, 2, vec2f(0., 500.)), &params, &mut events)
            .unwrap();

        let y_before = world.ships()[0].points.v.position[0].y;
        for _ in 0..25 {
            world.update(&params, &mut events);
        }
        let y_after = world.ships()[0].points.v.position[0].y;
        assert!(y_after < y_before - 0.5, "ship did not fall: {} -> {}", y_before, y_after);
    }

    #[test]
    fn floating_wood_takes_in_no_water_without_leaks() {
        let params = quiet_params();
        let mut world = World::new(Arc::new(test_database()), &params, 7);
        let mut events = GameEventDispatcher::new();
        world
            .add_ship(&test_definition(2, 2, vec2f(0., -5.)), &params, &mut events)
            .unwrap();

        for _ in 0..20 {
            world.update(&params, &mut events);
        }

        let ship = &world.ships()[0];
        for p in 0..ship.points.ship_point_count() {
            assert_eq!(ship.points.v.water[p], 0.0);
        }
    }

    #[test]
    fn flooding_adds_water_to_non_hull_points() {
        let params = quiet_params();
        let mut world = World::new(Arc::new(test_database()), &params, 7);
        let mut events = GameEventDispatcher::new();
        world
            .add_ship(&test_definition(2, 2, vec2f(0., 100.)), &params, &mut events)
            .unwrap();

        assert!(world.flood_at(vec2f(0., 100.5), 1.0, &params));
        let ship = &world.ships()[0];
        let total_water: FT = (0..ship.points.ship_point_count()).map(|p| ship.points.v.water[p]).sum();
        assert!(total_water > 0.);
    }
}
