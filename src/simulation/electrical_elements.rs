use crate::simulation::events::{ElectricalInstanceId, GameEvent, GameEventDispatcher};
use crate::simulation::materials::{ElectricalKind, ElectricalMaterialId, MaterialDatabase, PowerProbeKind, SwitchKind};
use crate::simulation::ocean_surface::OceanSurface;
use crate::simulation::points::Points;
use crate::simulation::{ConnectedComponentId, ElementIndex};
use std::collections::HashSet;

/// One electrical element decorated onto a ship particle.
pub struct ElectricalElement {
    pub point_index: ElementIndex,
    pub material_id: ElectricalMaterialId,
    pub instance_id: ElectricalInstanceId,

    /// Switch: on/off. Power probe: powered. Lamp: lit.
    pub state: bool,
    pub is_enabled: bool,
    pub is_destroyed: bool,
}

/// The electrical elements of one ship: lamps, switches and power probes.
///
/// Power is component-scoped: a connected component is powered when it
/// carries a live generator and its switches (if any) are not all off.
pub struct ElectricalElements {
    elements: Vec<ElectricalElement>,
}

impl ElectricalElements {
    pub fn new(decorations: Vec<(ElementIndex, ElectricalMaterialId)>) -> Self {
        let elements = decorations
            .into_iter()
            .enumerate()
            .map(|(instance_id, (point_index, material_id))| ElectricalElement {
                point_index,
                material_id,
                instance_id: instance_id as ElectricalInstanceId,
                state: false,
                is_enabled: true,
                is_destroyed: false,
            })
            .collect();
        ElectricalElements { elements }
    }

    pub fn element_count(&self) -> usize {
        self.elements.len()
    }

    pub fn elements(&self) -> &[ElectricalElement] {
        &self.elements
    }

    /// Announces all switches and probes to the host, bracketed by the
    /// announcement events. Invoked once right after the ship is loaded.
    pub fn announce(&self, material_database: &MaterialDatabase, events: &mut GameEventDispatcher) {
        events.push(GameEvent::ElectricalElementAnnouncementsBegin);

        for element in &self.elements {
            match material_database.electrical(element.material_id).kind {
                ElectricalKind::Switch { switch_kind } => {
                    events.push(GameEvent::SwitchCreated {
                        id: element.instance_id,
                        kind: switch_kind,
                        state: element.state,
                    });
                }
                ElectricalKind::PowerProbe { probe_kind } => {
                    events.push(GameEvent::PowerProbeCreated {
                        id: element.instance_id,
                        kind: probe_kind,
                        state: element.state,
                    });
                }
                ElectricalKind::Lamp { .. } => {}
            }
        }

        events.push(GameEvent::ElectricalElementAnnouncementsEnd);
    }

    /// Destroys the element riding the given particle, if any.
    pub fn on_point_destroyed(&mut self, point_index: ElementIndex, points: &mut Points) {
        for element in self.elements.iter_mut() {
            if element.point_index == point_index && !element.is_destroyed {
                element.is_destroyed = true;
                element.state = false;
                points.v.light[point_index as usize] = 0.;
            }
        }
    }

    /// Host-driven switch toggle (the switchboard panel).
    pub fn set_switch_state(&mut self, instance_id: ElectricalInstanceId, state: bool, events: &mut GameEventDispatcher) {
        if let Some(element) = self
            .elements
            .iter_mut()
            .find(|e| e.instance_id == instance_id && !e.is_destroyed)
        {
            if element.is_enabled && element.state != state {
                element.state = state;
                events.push(GameEvent::SwitchToggled {
                    id: instance_id,
                    new_state: state,
                });
            }
        }
    }

    pub fn update(
        &mut self,
        points: &mut Points,
        material_database: &MaterialDatabase,
        ocean_surface: &OceanSurface,
        events: &mut GameEventDispatcher,
    ) {
        //
        // 1. Environment-driven state: wet generators fail, automatic
        //    switches sense water, push switches disable underwater
        //

        for element in self.elements.iter_mut() {
            if element.is_destroyed {
                continue;
            }

            let i = element.point_index as usize;
            let material = material_database.electrical(element.material_id);
            let underwater = ocean_surface.is_underwater(&points.v.position[i]);
            let wet = underwater || points.v.water[i] > 0.3;

            match material.kind {
                ElectricalKind::Switch {
                    switch_kind: SwitchKind::Automatic,
                } => {
                    let new_state = wet;
                    if new_state != element.state {
                        element.state = new_state;
                        events.push(GameEvent::SwitchToggled {
                            id: element.instance_id,
                            new_state,
                        });
                    }
                }
                ElectricalKind::Switch {
                    switch_kind: SwitchKind::Push,
                } => {
                    let enabled = material.is_waterproof || !wet;
                    if enabled != element.is_enabled {
                        element.is_enabled = enabled;
                        events.push(GameEvent::SwitchEnabled {
                            id: element.instance_id,
                            enabled,
                        });
                    }
                }
                ElectricalKind::PowerProbe {
                    probe_kind: PowerProbeKind::Generator,
                } => {
                    let new_state = material.is_waterproof || !wet;
                    if new_state != element.state {
                        element.state = new_state;
                        events.push(GameEvent::PowerProbeToggled {
                            id: element.instance_id,
                            state: new_state,
                        });
                    }
                }
                _ => {}
            }
        }

        //
        // 2. Component power: components carrying an active generator,
        //    unless all their switches are off
        //

        let mut generator_components: HashSet<ConnectedComponentId> = HashSet::new();
        let mut switch_components: HashSet<ConnectedComponentId> = HashSet::new();
        let mut closed_switch_components: HashSet<ConnectedComponentId> = HashSet::new();

        for element in self.elements.iter() {
            if element.is_destroyed {
                continue;
            }
            let component = points.v.connected_component_id[element.point_index as usize];
            match material_database.electrical(element.material_id).kind {
                ElectricalKind::PowerProbe {
                    probe_kind: PowerProbeKind::Generator,
                } if element.state => {
                    generator_components.insert(component);
                }
                ElectricalKind::Switch { .. } => {
                    switch_components.insert(component);
                    if element.state {
                        closed_switch_components.insert(component);
                    }
                }
                _ => {}
            }
        }

        let component_powered = |component: ConnectedComponentId| {
            generator_components.contains(&component)
                && (!switch_components.contains(&component) || closed_switch_components.contains(&component))
        };

        //
        // 3. Consumers: monitors report power, lamps light up
        //

        for element in self.elements.iter_mut() {
            if element.is_destroyed {
                continue;
            }

            let i = element.point_index as usize;
            let material = material_database.electrical(element.material_id);
            let component = points.v.connected_component_id[i];

            match material.kind {
                ElectricalKind::PowerProbe {
                    probe_kind: PowerProbeKind::Monitor,
                }
                | ElectricalKind::PowerProbe {
                    probe_kind: PowerProbeKind::Engine,
                } => {
                    let new_state = component_powered(component);
                    if new_state != element.state {
                        element.state = new_state;
                        events.push(GameEvent::PowerProbeToggled {
                            id: element.instance_id,
                            state: new_state,
                        });
                    }
                }
                ElectricalKind::Lamp {
                    luminiscence,
                    is_self_powered,
                } => {
                    let underwater = ocean_surface.is_underwater(&points.v.position[i]);
                    let dead = !material.is_waterproof && underwater;
                    let lit = !dead && (is_self_powered || component_powered(component));
                    element.state = lit;
                    points.v.light[i] = if lit { luminiscence } else { 0. };
                }
                _ => {}
            }

            // Operating elements shed a little heat into their particle
            if element.state && material.heat_generated > 0. {
                points.v.temperature[i] += material.heat_generated / points.v.material_heat_capacity[i];
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::floating_type_mod::FT;
    use crate::simulation::game_parameters::GameParameters;
    use crate::simulation::materials::test_fixtures::test_database;
    use crate::simulation::vec2f;
    use nalgebra::zero;

    fn setup() -> (Points, ElectricalElements, MaterialDatabase) {
        let db = test_database();
        let params = GameParameters::default();
        let mut points = Points::new(3, &params);

        let wood_id = db
            .structural_by_color(crate::simulation::ColorKey::new(0xc2, 0x9a, 0x5b))
            .unwrap();
        let wood = db.structural(wood_id).clone();
        for k in 0..3 {
            points.add_ship_particle(
                vec2f(k as FT, 10.),
                wood_id,
                &wood,
                None,
                false,
                false,
                wood.render_color(),
                zero(),
            );
            points.v.connected_component_id[k] = 0;
        }

        let lamp = db.electrical_by_color(crate::simulation::ColorKey::new(0xff, 0xff, 0x80)).unwrap();
        let generator = db.electrical_by_color(crate::simulation::ColorKey::new(0x5b, 0x87, 0x31)).unwrap();
        let elements = ElectricalElements::new(vec![(0, generator), (1, lamp)]);

        (points, elements, db)
    }

    #[test]
    fn announcement_brackets_created_events() {
        let (_points, elements, db) = setup();
        let mut events = GameEventDispatcher::new();
        elements.announce(&db, &mut events);
        // Begin + generator probe + End (the lamp is not announced)
        assert_eq!(events.pending_count(), 3);
    }

    #[test]
    fn lamp_lights_when_its_component_has_a_live_generator() {
        let (mut points, mut elements, db) = setup();
        let params = GameParameters::default();
        let ocean = OceanSurface::new(&params);
        let mut events = GameEventDispatcher::new();

        elements.update(&mut points, &db, &ocean, &mut events);
        assert!(points.v.light[1] > 0.);

        // Sinking the generator kills the light
        points.v.position[0] = vec2f(0., -100.);
        elements.update(&mut points, &db, &ocean, &mut events);
        assert_eq!(points.v.light[1], 0.);
    }

    #[test]
    fn destroyed_element_goes_dark() {
        let (mut points, mut elements, db) = setup();
        let params = GameParameters::default();
        let ocean = OceanSurface::new(&params);
        let mut events = GameEventDispatcher::new();

        elements.update(&mut points, &db, &ocean, &mut events);
        assert!(points.v.light[1] > 0.);

        elements.on_point_destroyed(1, &mut points);
        assert_eq!(points.v.light[1], 0.);

        elements.update(&mut points, &db, &ocean, &mut events);
        assert_eq!(points.v.light[1], 0.);
    }
}
