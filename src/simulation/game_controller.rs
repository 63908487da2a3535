use crate::floating_type_mod::{FT, PI};
use crate::simulation::bombs::BombKind;
use crate::simulation::events::{GameEvent, GameEventDispatcher, GameEventSink};
use crate::simulation::game_parameters::*;
use crate::simulation::materials::{GameError, MaterialDatabase};
use crate::simulation::ocean_surface::OceanSurfaceSample;
use crate::simulation::parameter_smoother::{ParameterSmoother, SmoothedParameter};
use crate::simulation::points::EphemeralType;
use crate::simulation::ship::HeatBlasterAction;
use crate::simulation::ship_definition::ShipDefinition;
use crate::simulation::view_model::ViewModel;
use crate::simulation::wind::RunningAverage;
use crate::simulation::world::{ElementId, World};
use crate::simulation::{ElementIndex, PlaneId, V2, V4};
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

const PARAMETER_SMOOTHING_TRAJECTORY_TIME: FT = 1.0; // seconds
const CAMERA_SMOOTHING_TIME: FT = 0.4; // seconds

const THANOS_SNAP_WAVE_SPEED: FT = 75.0; // m/s

//
// Render interface: the host pulls one frame of buffers between ticks.
// Dirty flags tell it which regions actually need re-upload.
//

pub struct ShipPointsUpload<'a> {
    pub positions: &'a [V2],
    pub water: &'a [FT],
    pub light: &'a [FT],
    pub temperature: &'a [FT],
    pub color: &'a [V4],
    pub plane_ids: &'a [PlaneId],
    pub decay: &'a [FT],

    pub is_whole_color_buffer_dirty: bool,
    pub is_decay_buffer_dirty: bool,
    pub is_plane_id_buffer_dirty: bool,
}

pub struct ShipElementsUpload {
    pub springs: Vec<(ElementIndex, ElementIndex)>,
    pub ropes: Vec<(ElementIndex, ElementIndex)>,
    pub triangles: Vec<(ElementIndex, ElementIndex, ElementIndex)>,
    pub stressed_springs: Vec<(ElementIndex, ElementIndex)>,
}

pub struct FlameUpload {
    pub plane_id: PlaneId,
    pub position: V2,
    pub development: FT,
    pub personality: FT,
    pub on_chain: bool,
}

pub struct EphemeralUpload {
    pub kind: EphemeralType,
    pub position: V2,
    pub plane_id: PlaneId,
    pub alpha: FT,
}

pub struct VectorUpload {
    pub position: V2,
    pub vector: V2,
}

pub trait RenderHost {
    fn upload_ocean(&mut self, samples: &[OceanSurfaceSample]);
    fn upload_ship_points(&mut self, ship_id: u32, points: ShipPointsUpload);
    fn upload_ship_elements(&mut self, ship_id: u32, elements: ShipElementsUpload);
    fn upload_ship_flames(&mut self, ship_id: u32, flames: &[FlameUpload]);
    fn upload_ephemerals(&mut self, ship_id: u32, ephemerals: &[EphemeralUpload]);
    fn upload_vectors(&mut self, ship_id: u32, vectors: &[VectorUpload]);
}

/// A host that discards everything; headless runs and tests render into it.
pub struct NullRenderHost;

impl RenderHost for NullRenderHost {
    fn upload_ocean(&mut self, _samples: &[OceanSurfaceSample]) {}
    fn upload_ship_points(&mut self, _ship_id: u32, _points: ShipPointsUpload) {}
    fn upload_ship_elements(&mut self, _ship_id: u32, _elements: ShipElementsUpload) {}
    fn upload_ship_flames(&mut self, _ship_id: u32, _flames: &[FlameUpload]) {}
    fn upload_ephemerals(&mut self, _ship_id: u32, _ephemerals: &[EphemeralUpload]) {}
    fn upload_vectors(&mut self, _ship_id: u32, _vectors: &[VectorUpload]) {}
}

struct ThanosSnapStateMachine {
    center_x: FT,
    radius: FT,
    start_time: FT,
}

struct SmoothedScalar {
    current: FT,
    target: FT,
    starting: FT,
    start_instant: Instant,
}

impl SmoothedScalar {
    fn new(value: FT) -> Self {
        SmoothedScalar {
            current: value,
            target: value,
            starting: value,
            start_instant: Instant::now(),
        }
    }

    fn retarget(&mut self, target: FT) {
        self.starting = self.current;
        self.target = target;
        self.start_instant = Instant::now();
    }

    /// One sin²-shaped increment toward the target; snaps on overshoot.
    fn advance(&mut self) -> FT {
        if self.current != self.target {
            // Summing sin² increments from zero to PI yields PI/2
            let amplitude = (self.target - self.starting) / (PI / 2.0);
            let x = self.start_instant.elapsed().as_secs_f32() as FT * PI / CAMERA_SMOOTHING_TIME;
            let old_current = self.current;
            self.current += amplitude * x.sin() * x.sin();

            if (self.target - old_current) * (self.target - self.current) < 0.0 {
                // Overshot
                self.current = self.target;
            }
        }
        self.current
    }
}

/// The outermost shell of the core: translates screen-space tool gestures
/// into world calls, smooths parameters and the camera, collects per-frame
/// statistics, and hands render buffers to the host.
pub struct GameController {
    world: World,
    game_parameters: GameParameters,
    material_database: Arc<MaterialDatabase>,
    event_dispatcher: GameEventDispatcher,
    view_model: ViewModel,

    is_paused: bool,
    rng_seed: u64,

    // Render-side smoothed value with no home in GameParameters
    flame_size_adjustment: FT,

    parameter_smoothers: Vec<ParameterSmoother>,
    zoom_smoother: SmoothedScalar,
    camera_x_smoother: SmoothedScalar,
    camera_y_smoother: SmoothedScalar,

    thanos_snaps: Vec<ThanosSnapStateMachine>,

    start_instant: Instant,

    // Stats
    update_count: u64,
    render_count: u64,
    last_published_update_count: u64,
    last_published_render_count: u64,
    last_publish_instant: Instant,
    frame_rate_running_average: RunningAverage<30>,
}

impl GameController {
    pub fn new(
        material_database: Arc<MaterialDatabase>,
        canvas_width: u32,
        canvas_height: u32,
        rng_seed: u64,
    ) -> Self {
        let game_parameters = GameParameters::default();
        let world = World::new(material_database.clone(), &game_parameters, rng_seed);

        let parameter_smoothers = vec![
            ParameterSmoother::new(
                SmoothedParameter::SpringStiffnessAdjustment,
                PARAMETER_SMOOTHING_TRAJECTORY_TIME,
            ),
            ParameterSmoother::new(
                SmoothedParameter::SpringStrengthAdjustment,
                PARAMETER_SMOOTHING_TRAJECTORY_TIME,
            ),
            ParameterSmoother::new(SmoothedParameter::SeaDepth, PARAMETER_SMOOTHING_TRAJECTORY_TIME),
            ParameterSmoother::new(
                SmoothedParameter::OceanFloorBumpiness,
                PARAMETER_SMOOTHING_TRAJECTORY_TIME,
            ),
            ParameterSmoother::new(
                SmoothedParameter::OceanFloorDetailAmplification,
                PARAMETER_SMOOTHING_TRAJECTORY_TIME,
            ),
            ParameterSmoother::new(
                SmoothedParameter::FlameSizeAdjustment,
                PARAMETER_SMOOTHING_TRAJECTORY_TIME,
            ),
        ];

        GameController {
            world,
            game_parameters,
            material_database,
            event_dispatcher: GameEventDispatcher::new(),
            view_model: ViewModel::new(canvas_width, canvas_height),
            is_paused: false,
            rng_seed,
            flame_size_adjustment: 1.0,
            parameter_smoothers,
            zoom_smoother: SmoothedScalar::new(1.0),
            camera_x_smoother: SmoothedScalar::new(0.0),
            camera_y_smoother: SmoothedScalar::new(0.0),
            thanos_snaps: Vec::new(),
            start_instant: Instant::now(),
            update_count: 0,
            render_count: 0,
            last_published_update_count: 0,
            last_published_render_count: 0,
            last_publish_instant: Instant::now(),
            frame_rate_running_average: RunningAverage::new(),
        }
    }

    pub fn world(&self) -> &World {
        &self.world
    }

    pub fn game_parameters(&self) -> &GameParameters {
        &self.game_parameters
    }

    pub fn game_parameters_mut(&mut self) -> &mut GameParameters {
        &mut self.game_parameters
    }

    pub fn register_event_sink(&mut self, sink: Box<dyn GameEventSink>) {
        self.event_dispatcher.register_sink(sink);
    }

    pub fn view_model(&self) -> &ViewModel {
        &self.view_model
    }

    pub fn set_canvas_size(&mut self, width: u32, height: u32) {
        self.view_model.set_canvas_size(width, height);
    }

    pub fn set_paused(&mut self, paused: bool) {
        self.is_paused = paused;
    }

    pub fn is_paused(&self) -> bool {
        self.is_paused
    }

    fn wall_time(&self) -> FT {
        self.start_instant.elapsed().as_secs_f32() as FT
    }

    //
    // Ship lifecycle
    //

    /// Replaces the world and loads the given ship; on failure the old
    /// world stays untouched.
    pub fn reset_and_load_ship(&mut self, ship_path: impl AsRef<Path>) -> Result<(), GameError> {
        let definition = ShipDefinition::load(ship_path)?;

        let mut new_world = World::new(self.material_database.clone(), &self.game_parameters, self.rng_seed);

        // Validate the ship against the new world before committing
        let mut staged_events = GameEventDispatcher::new();
        new_world.add_ship(&definition, &self.game_parameters, &mut staged_events)?;

        self.world = new_world;
        self.thanos_snaps.clear();

        self.event_dispatcher.push(GameEvent::GameReset);
        // Re-raise the staged load announcements through the live channel
        for event in staged_events.drain_queue() {
            self.event_dispatcher.push(event);
        }

        Ok(())
    }

    /// Adds a ship to the running world.
    pub fn add_ship(&mut self, ship_path: impl AsRef<Path>) -> Result<(), GameError> {
        let definition = ShipDefinition::load(ship_path)?;
        self.world
            .add_ship(&definition, &self.game_parameters, &mut self.event_dispatcher)?;
        Ok(())
    }

    pub fn add_ship_definition(&mut self, definition: &ShipDefinition) -> Result<(), GameError> {
        self.world
            .add_ship(definition, &self.game_parameters, &mut self.event_dispatcher)?;
        Ok(())
    }

    //
    // One host-visible step
    //

    pub fn update(&mut self) {
        let now = self.wall_time();

        // 1. Parameter smoothers run even while paused
        for smoother in self.parameter_smoothers.iter_mut() {
            smoother.update(now, &mut self.game_parameters, &mut self.flame_size_adjustment);
        }

        if !self.is_paused {
            // 2.-6. The world tick
            self.world.update(&self.game_parameters, &mut self.event_dispatcher);
            self.update_thanos_snaps();
            self.update_count += 1;
        }

        // 7. Flush queued events to the host
        self.event_dispatcher.flush();
    }

    fn update_thanos_snaps(&mut self) {
        let time = self.world.current_simulation_time();
        let mut finished: Vec<usize> = Vec::new();

        for (slot, snap) in self.thanos_snaps.iter().enumerate() {
            let front = (time - snap.start_time) * THANOS_SNAP_WAVE_SPEED;
            let front = front.min(snap.radius);

            self.world.apply_thanos_snap(
                snap.center_x,
                snap.radius,
                snap.center_x - front,
                snap.center_x + front,
                &self.game_parameters,
                &mut self.event_dispatcher,
            );

            if front >= snap.radius {
                finished.push(slot);
            }
        }

        for slot in finished.into_iter().rev() {
            self.thanos_snaps.remove(slot);
        }
    }

    //
    // Rendering
    //

    pub fn render(&mut self, host: &mut dyn RenderHost) {
        // Camera and zoom glide toward their targets on the render cadence
        let zoom = self.zoom_smoother.advance();
        self.view_model.set_zoom(zoom);
        let camera_x = self.camera_x_smoother.advance();
        let camera_y = self.camera_y_smoother.advance();
        self.view_model
            .set_camera_world_position(crate::simulation::vec2f(camera_x, camera_y));

        host.upload_ocean(self.world.ocean_surface().samples());

        for ship in self.world.ships_mut() {
            let ship_id = ship.id();

            let points_upload = ShipPointsUpload {
                positions: &ship.points.v.position,
                water: &ship.points.v.water,
                light: &ship.points.v.light,
                temperature: &ship.points.v.temperature,
                color: &ship.points.v.color,
                plane_ids: &ship.points.v.plane_id,
                decay: &ship.points.v.decay,
                is_whole_color_buffer_dirty: ship.points.is_whole_color_buffer_dirty,
                is_decay_buffer_dirty: ship.points.is_decay_buffer_dirty,
                is_plane_id_buffer_dirty: ship.points.is_plane_id_buffer_non_ephemeral_dirty
                    || ship.points.is_plane_id_buffer_ephemeral_dirty,
            };
            host.upload_ship_points(ship_id, points_upload);

            ship.points.is_whole_color_buffer_dirty = false;
            ship.points.is_decay_buffer_dirty = false;
            ship.points.is_plane_id_buffer_non_ephemeral_dirty = false;
            ship.points.is_plane_id_buffer_ephemeral_dirty = false;

            let mut springs = Vec::new();
            let mut ropes = Vec::new();
            let mut stressed_springs = Vec::new();
            for s in ship.springs.springs() {
                if ship.springs.is_destroyed(s) {
                    continue;
                }
                let pair = (
                    ship.springs.v.endpoint_a_index[s as usize],
                    ship.springs.v.endpoint_b_index[s as usize],
                );
                if ship.springs.v.is_rope[s as usize] {
                    ropes.push(pair);
                } else {
                    springs.push(pair);
                }
                if ship.springs.v.is_stressed[s as usize] {
                    stressed_springs.push(pair);
                }
            }

            let triangles = ship
                .triangles
                .triangles()
                .filter(|&t| !ship.triangles.is_destroyed(t))
                .map(|t| {
                    let [a, b, c] = ship.triangles.endpoints(t);
                    (a, b, c)
                })
                .collect();

            host.upload_ship_elements(
                ship_id,
                ShipElementsUpload {
                    springs,
                    ropes,
                    triangles,
                    stressed_springs,
                },
            );

            let flames: Vec<FlameUpload> = ship
                .points
                .burning_points()
                .iter()
                .map(|&p| {
                    let i = p as usize;
                    FlameUpload {
                        plane_id: ship.points.v.plane_id[i],
                        position: ship.points.v.position[i],
                        development: ship.points.v.combustion[i].flame_development * self.flame_size_adjustment,
                        personality: ship.points.v.combustion[i].personality,
                        on_chain: ship.points.v.is_rope[i],
                    }
                })
                .collect();
            host.upload_ship_flames(ship_id, &flames);

            let ephemerals: Vec<EphemeralUpload> = ship
                .points
                .ephemeral_points()
                .filter(|&p| ship.points.is_active(p))
                .map(|p| {
                    let i = p as usize;
                    EphemeralUpload {
                        kind: ship.points.v.ephemeral_state[i].kind(),
                        position: ship.points.v.position[i],
                        plane_id: ship.points.v.plane_id[i],
                        alpha: ship.points.v.color[i].w,
                    }
                })
                .collect();
            host.upload_ephemerals(ship_id, &ephemerals);

            let vectors: Vec<VectorUpload> = (0..ship.points.ship_point_count())
                .filter(|&i| ship.points.v.water_momentum[i].norm_squared() > 1.0e-6)
                .map(|i| VectorUpload {
                    position: ship.points.v.position[i],
                    vector: ship.points.v.water_momentum[i],
                })
                .collect();
            host.upload_vectors(ship_id, &vectors);
        }

        self.render_count += 1;
        self.publish_stats();
    }

    fn publish_stats(&mut self) {
        let elapsed = self.last_publish_instant.elapsed().as_secs_f32() as FT;
        if elapsed < 1.0 {
            return;
        }

        let frames = (self.render_count - self.last_published_render_count) as FT;
        let updates = (self.update_count - self.last_published_update_count) as FT;

        let last_frame_rate = frames / elapsed;
        let average_frame_rate = self.frame_rate_running_average.update(last_frame_rate);

        self.event_dispatcher.push(GameEvent::FrameRate {
            last: last_frame_rate,
            avg: average_frame_rate,
        });
        if frames > 0. {
            self.event_dispatcher.push(GameEvent::UpdateToRenderRatio {
                last: updates / frames,
            });
        }

        self.last_published_render_count = self.render_count;
        self.last_published_update_count = self.update_count;
        self.last_publish_instant = Instant::now();
    }

    //
    // Camera and zoom
    //

    pub fn set_target_zoom(&mut self, zoom: FT) {
        self.zoom_smoother.retarget(zoom);
    }

    pub fn set_target_camera_world_position(&mut self, position: V2) {
        self.camera_x_smoother.retarget(position.x);
        self.camera_y_smoother.retarget(position.y);
    }

    pub fn pan_by_screen_offset(&mut self, screen_offset: V2) {
        let world_offset = self.view_model.screen_offset_to_world_offset(screen_offset);
        let target = self.view_model.camera_world_position() + world_offset;
        self.set_target_camera_world_position(target);
    }

    pub fn screen_to_world(&self, screen: V2) -> V2 {
        self.view_model.screen_to_world(screen)
    }

    //
    // Smoothed parameter targets
    //

    pub fn set_spring_stiffness_adjustment(&mut self, value: FT) {
        self.set_smoothed_target(SmoothedParameter::SpringStiffnessAdjustment, value);
    }

    pub fn set_spring_strength_adjustment(&mut self, value: FT) {
        self.set_smoothed_target(SmoothedParameter::SpringStrengthAdjustment, value);
    }

    pub fn set_sea_depth(&mut self, value: FT) {
        self.set_smoothed_target(SmoothedParameter::SeaDepth, value);
    }

    pub fn set_ocean_floor_bumpiness(&mut self, value: FT) {
        self.set_smoothed_target(SmoothedParameter::OceanFloorBumpiness, value);
    }

    pub fn set_ocean_floor_detail_amplification(&mut self, value: FT) {
        self.set_smoothed_target(SmoothedParameter::OceanFloorDetailAmplification, value);
    }

    pub fn set_flame_size_adjustment(&mut self, value: FT) {
        self.set_smoothed_target(SmoothedParameter::FlameSizeAdjustment, value);
    }

    fn set_smoothed_target(&mut self, parameter: SmoothedParameter, value: FT) {
        let now = self.wall_time();
        if let Some(smoother) = self
            .parameter_smoothers
            .iter_mut()
            .find(|s| s.parameter() == parameter)
        {
            smoother.set_target(value, now, &self.game_parameters, &self.flame_size_adjustment);
        }
    }

    //
    // Tools (screen coordinates in, world calls out)
    //

    pub fn pick_to_move(&self, screen_position: V2) -> Option<ElementId> {
        let world_position = self.view_model.screen_to_world(screen_position);
        self.world.pick_point_to_move(world_position, &self.game_parameters)
    }

    pub fn move_element_by(&mut self, element_id: ElementId, screen_offset: V2, inertial_screen_velocity: V2) {
        let offset = self.view_model.screen_offset_to_world_offset(screen_offset);
        let inertial_velocity = self.view_model.screen_offset_to_world_offset(inertial_screen_velocity);
        self.world
            .move_element_by(element_id, offset, inertial_velocity, &self.game_parameters);
    }

    pub fn move_ship_by(&mut self, ship_id: u32, screen_offset: V2, inertial_screen_velocity: V2) {
        let offset = self.view_model.screen_offset_to_world_offset(screen_offset);
        let inertial_velocity = self.view_model.screen_offset_to_world_offset(inertial_screen_velocity);
        self.world
            .move_ship_by(ship_id, offset, inertial_velocity, &self.game_parameters);
    }

    pub fn rotate_element_by(&mut self, element_id: ElementId, angle: FT, screen_center: V2, inertial_angle: FT) {
        let center = self.view_model.screen_to_world(screen_center);
        self.world
            .rotate_element_by(element_id, angle, center, inertial_angle, &self.game_parameters);
    }

    pub fn rotate_ship_by(&mut self, ship_id: u32, angle: FT, screen_center: V2, inertial_angle: FT) {
        let center = self.view_model.screen_to_world(screen_center);
        self.world
            .rotate_ship_by(ship_id, angle, center, inertial_angle, &self.game_parameters);
    }

    pub fn destroy_at(&mut self, screen_position: V2, radius_fraction: FT) {
        let world_position = self.view_model.screen_to_world(screen_position);
        self.world.destroy_at(
            world_position,
            radius_fraction,
            &self.game_parameters,
            &mut self.event_dispatcher,
        );
    }

    pub fn saw_through(&mut self, screen_start: V2, screen_end: V2) {
        let start = self.view_model.screen_to_world(screen_start);
        let end = self.view_model.screen_to_world(screen_end);
        self.world
            .saw_through(start, end, &self.game_parameters, &mut self.event_dispatcher);
    }

    pub fn apply_heat_blaster_at(&mut self, screen_position: V2, action: HeatBlasterAction) -> bool {
        let world_position = self.view_model.screen_to_world(screen_position);
        let radius = self.game_parameters.heat_blaster_radius;
        self.world
            .apply_heat_blaster_at(world_position, action, radius, &self.game_parameters)
    }

    pub fn extinguish_fire_at(&mut self, screen_position: V2) -> bool {
        let world_position = self.view_model.screen_to_world(screen_position);
        let radius = self.game_parameters.fire_extinguisher_radius;
        self.world
            .extinguish_fire_at(world_position, radius, &self.game_parameters)
    }

    pub fn draw_to(&mut self, screen_position: V2, strength_fraction: FT) {
        let world_position = self.view_model.screen_to_world(screen_position);
        self.world.draw_to(world_position, strength_fraction);
    }

    pub fn swirl_at(&mut self, screen_position: V2, strength_fraction: FT) {
        let world_position = self.view_model.screen_to_world(screen_position);
        self.world.swirl_at(world_position, strength_fraction);
    }

    pub fn toggle_pin_at(&mut self, screen_position: V2) -> bool {
        let world_position = self.view_model.screen_to_world(screen_position);
        self.world.toggle_pin_at(world_position, &self.game_parameters)
    }

    pub fn inject_bubbles_at(&mut self, screen_position: V2) -> bool {
        let world_position = self.view_model.screen_to_world(screen_position);
        self.world.inject_bubbles_at(world_position)
    }

    pub fn flood_at(&mut self, screen_position: V2, water_quantity_multiplier: FT) -> bool {
        let world_position = self.view_model.screen_to_world(screen_position);
        self.world
            .flood_at(world_position, water_quantity_multiplier, &self.game_parameters)
    }

    pub fn toggle_anti_matter_bomb_at(&mut self, screen_position: V2) -> bool {
        self.toggle_bomb_at(BombKind::AntiMatter, screen_position)
    }

    pub fn toggle_impact_bomb_at(&mut self, screen_position: V2) -> bool {
        self.toggle_bomb_at(BombKind::Impact, screen_position)
    }

    pub fn toggle_rc_bomb_at(&mut self, screen_position: V2) -> bool {
        self.toggle_bomb_at(BombKind::Rc, screen_position)
    }

    pub fn toggle_timer_bomb_at(&mut self, screen_position: V2) -> bool {
        self.toggle_bomb_at(BombKind::Timer, screen_position)
    }

    fn toggle_bomb_at(&mut self, kind: BombKind, screen_position: V2) -> bool {
        let world_position = self.view_model.screen_to_world(screen_position);
        self.world.toggle_bomb_at(kind, world_position, &self.game_parameters)
    }

    pub fn detonate_rc_bombs(&mut self) {
        self.world
            .detonate_rc_bombs(&self.game_parameters, &mut self.event_dispatcher);
    }

    pub fn detonate_anti_matter_bombs(&mut self) {
        self.world.detonate_anti_matter_bombs();
    }

    /// `Some(screen)` raises or re-roots the interactive wave at that
    /// point; `None` releases it.
    pub fn adjust_ocean_surface_to(&mut self, screen_position: Option<V2>) {
        let world_coordinates = screen_position.map(|s| self.view_model.screen_to_world(s));
        self.world.adjust_ocean_surface_to(world_coordinates);
    }

    pub fn adjust_ocean_floor_to(&mut self, screen_start: V2, screen_end: V2) -> bool {
        let start = self.view_model.screen_to_world(screen_start);
        let end = self.view_model.screen_to_world(screen_end);
        self.world.adjust_ocean_floor_to(start.x, start.y, end.x, end.y)
    }

    pub fn scrub_through(&mut self, screen_start: V2, screen_end: V2) -> bool {
        let start = self.view_model.screen_to_world(screen_start);
        let end = self.view_model.screen_to_world(screen_end);
        self.world.scrub_through(start, end, &self.game_parameters)
    }

    pub fn apply_thanos_snap_at(&mut self, screen_position: V2) {
        if self.thanos_snaps.len() >= MAX_THANOS_SNAPS {
            return;
        }
        let world_position = self.view_model.screen_to_world(screen_position);
        self.thanos_snaps.push(ThanosSnapStateMachine {
            center_x: world_position.x,
            radius: HALF_MAX_WORLD_WIDTH,
            start_time: self.world.current_simulation_time(),
        });
    }

    pub fn trigger_tsunami(&mut self) {
        self.world.trigger_tsunami(&mut self.event_dispatcher);
    }

    pub fn trigger_rogue_wave(&mut self) {
        self.world.trigger_rogue_wave();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simulation::materials::test_fixtures::test_database;
    use crate::simulation::ship_definition::ShipMetadata;
    use crate::simulation::vec2f;
    use image::{Rgb, RgbImage};
    use std::cell::RefCell;
    use std::rc::Rc;

    const WOOD: Rgb<u8> = Rgb([0xc2, 0x9a, 0x5b]);

    struct Recorder(Rc<RefCell<Vec<GameEvent>>>);

    impl GameEventSink for Recorder {
        fn on_game_event(&mut self, event: &GameEvent) {
            self.0.borrow_mut().push(event.clone());
        }
    }

    fn controller_with_ship(offset: V2) -> GameController {
        let mut controller = GameController::new(Arc::new(test_database()), 800, 600, 3);
        let definition = ShipDefinition::from_images(
            RgbImage::from_pixel(3, 3, WOOD),
            None,
            None,
            ShipMetadata {
                ship_name: "Raft".to_string(),
                author: None,
                offset,
            },
        );
        controller.add_ship_definition(&definition).unwrap();
        controller
    }

    #[test]
    fn update_flushes_events_to_sinks() {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let mut controller = controller_with_ship(vec2f(0., 100.));
        controller.register_event_sink(Box::new(Recorder(seen.clone())));

        controller.update();

        assert!(seen
            .borrow()
            .iter()
            .any(|e| matches!(e, GameEvent::ShipLoaded { .. })));
    }

    #[test]
    fn pause_freezes_simulation_time_but_still_flushes() {
        let mut controller = controller_with_ship(vec2f(0., 100.));
        controller.update();
        let time = controller.world().current_simulation_time();

        controller.set_paused(true);
        for _ in 0..10 {
            controller.update();
        }
        assert_eq!(controller.world().current_simulation_time(), time);

        controller.set_paused(false);
        controller.update();
        assert!(controller.world().current_simulation_time() > time);
    }

    #[test]
    fn destroy_tool_translates_screen_to_world() {
        let mut controller = controller_with_ship(vec2f(0., 0.));

        // Camera at origin: the ship around world (0, 1) is near screen
        // center
        let springs_before = controller.world().ships()[0].springs.live_spring_count();
        controller.destroy_at(vec2f(400., 300.), 1.0);
        let springs_after = controller.world().ships()[0].springs.live_spring_count();

        assert!(springs_after < springs_before);
    }

    #[test]
    fn render_into_null_host_clears_dirty_flags() {
        let mut controller = controller_with_ship(vec2f(0., 100.));
        assert!(controller.world().ships()[0].points.is_whole_color_buffer_dirty);

        controller.render(&mut NullRenderHost);

        assert!(!controller.world().ships()[0].points.is_whole_color_buffer_dirty);
        assert!(!controller.world().ships()[0].points.is_decay_buffer_dirty);
    }

    #[test]
    fn smoothed_sea_depth_converges_onto_its_target() {
        let mut controller = controller_with_ship(vec2f(0., 100.));
        let initial = controller.game_parameters().sea_depth;
        let target = initial + 500.0;

        controller.set_sea_depth(target);

        let deadline = Instant::now() + std::time::Duration::from_secs(10);
        let mut reached = false;
        while Instant::now() < deadline {
            controller.update();
            let value = controller.game_parameters().sea_depth;
            // Never overshoots
            assert!(value <= target + 1e-3);
            if (value - target).abs() < 1e-3 {
                reached = true;
                break;
            }
        }
        assert!(reached, "sea depth never reached its target");
    }

    #[test]
    fn thanos_snap_tears_the_ship() {
        let mut controller = controller_with_ship(vec2f(0., 100.));
        let springs_before = controller.world().ships()[0].springs.live_spring_count();

        // Snap at screen center; fronts cross the whole ship within a few
        // ticks
        controller.apply_thanos_snap_at(vec2f(400., 300.));
        for _ in 0..10 {
            controller.update();
        }

        assert!(controller.world().ships()[0].springs.live_spring_count() < springs_before);
    }
}
