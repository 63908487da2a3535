use crate::floating_type_mod::FT;
use crate::simulation::game_parameters::*;
use crate::simulation::points::Points;
use crate::simulation::{ElementIndex, PlaneId, V2};

const ANTI_MATTER_PRE_IMPLOSION_DURATION: FT = 3.0;
const ANTI_MATTER_IMPLOSION_DURATION: FT = 1.0;

// Deceleration (m/s per tick) at which an armed impact bomb goes off
const IMPACT_BOMB_TRIGGER_DELTA_V: FT = 6.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BombKind {
    AntiMatter,
    Impact,
    Rc,
    Timer,
}

#[derive(Debug, Clone, Copy)]
enum BombState {
    /// Timer bomb: counting down its fuse.
    TimerFuse { remaining: FT },
    /// RC bomb: armed, waiting for the detonation command.
    RcIdle,
    /// Impact bomb: armed, waiting for a hard stop of its particle.
    ImpactArmed { last_velocity: V2 },
    /// Anti-matter bomb: contained, then the implosion sequence.
    AntiMatterContained,
    AntiMatterPreImploding { elapsed: FT },
    AntiMatterImploding { elapsed: FT },
}

/// A bomb riding a ship particle. The bomb tracks its particle's position
/// until detonation; when the particle is detached the bomb stays armed and
/// goes along with it.
pub struct Bomb {
    pub kind: BombKind,
    state: BombState,
    pub point_index: ElementIndex,
    pub position: V2,
    pub plane_id: PlaneId,
}

/// What a bomb asks the ship to do this tick. Applied by the ship at a
/// well-defined phase boundary, not mid-update.
pub enum BombAction {
    Explosion {
        center: V2,
        blast_radius: FT,
        blast_force: FT,
        blast_heat: FT,
        plane_id: PlaneId,
    },
    Implosion {
        center: V2,
        strength: FT,
    },
}

/// The bombs of one ship, a bounded set of tagged variants.
pub struct Bombs {
    bombs: Vec<Bomb>,
}

impl Bombs {
    pub fn new() -> Self {
        Bombs { bombs: Vec::new() }
    }

    pub fn bombs(&self) -> &[Bomb] {
        &self.bombs
    }

    /// Removes a bomb of the given kind near the position, or places a new
    /// one on the nearest particle. Returns whether anything happened.
    pub fn toggle_at(
        &mut self,
        kind: BombKind,
        target_position: V2,
        points: &Points,
        game_parameters: &GameParameters,
    ) -> bool {
        // Remove an existing bomb of this kind within the search radius
        let search_radius_squared = game_parameters.tool_search_radius * game_parameters.tool_search_radius;
        if let Some(slot) = self.bombs.iter().position(|b| {
            b.kind == kind && (b.position - target_position).norm_squared() <= search_radius_squared
        }) {
            self.bombs.remove(slot);
            return true;
        }

        if self.bombs.len() >= MAX_BOMBS {
            return false;
        }

        // Attach to the nearest live particle within the bomb neighborhood
        let mut best: Option<(ElementIndex, FT)> = None;
        for p in points.ship_points() {
            if !points.is_active(p) {
                continue;
            }
            let distance_squared = (points.v.position[p as usize] - target_position).norm_squared();
            if distance_squared <= BOMB_NEIGHBORHOOD_RADIUS * BOMB_NEIGHBORHOOD_RADIUS
                && best.map(|(_, d)| distance_squared < d).unwrap_or(true)
            {
                best = Some((p, distance_squared));
            }
        }

        let Some((point_index, _)) = best else {
            return false;
        };

        let state = match kind {
            BombKind::Timer => BombState::TimerFuse {
                remaining: game_parameters.timer_bomb_interval_seconds,
            },
            BombKind::Rc => BombState::RcIdle,
            BombKind::Impact => BombState::ImpactArmed {
                last_velocity: points.v.velocity[point_index as usize],
            },
            BombKind::AntiMatter => BombState::AntiMatterContained,
        };

        self.bombs.push(Bomb {
            kind,
            state,
            point_index,
            position: points.v.position[point_index as usize],
            plane_id: points.v.plane_id[point_index as usize],
        });

        true
    }

    pub fn detonate_rc_bombs(&mut self, points: &Points, game_parameters: &GameParameters, actions: &mut Vec<BombAction>) {
        let mut detonated = Vec::new();
        for (slot, bomb) in self.bombs.iter().enumerate() {
            if bomb.kind == BombKind::Rc {
                actions.push(Self::explosion_action(bomb, points, game_parameters));
                detonated.push(slot);
            }
        }
        for slot in detonated.into_iter().rev() {
            self.bombs.remove(slot);
        }
    }

    pub fn detonate_anti_matter_bombs(&mut self) {
        for bomb in self.bombs.iter_mut() {
            if bomb.kind == BombKind::AntiMatter {
                if let BombState::AntiMatterContained = bomb.state {
                    bomb.state = BombState::AntiMatterPreImploding { elapsed: 0. };
                }
            }
        }
    }

    /// Advances fuses and sequences; appends the blast/implosion actions for
    /// this tick.
    pub fn update(
        &mut self,
        dt: FT,
        points: &Points,
        game_parameters: &GameParameters,
        actions: &mut Vec<BombAction>,
    ) {
        let mut exploded: Vec<usize> = Vec::new();

        for (slot, bomb) in self.bombs.iter_mut().enumerate() {
            // Ride the particle
            bomb.position = points.v.position[bomb.point_index as usize];
            bomb.plane_id = points.v.plane_id[bomb.point_index as usize];

            // Heat cooks off any bomb
            let cooked = points.v.temperature[bomb.point_index as usize] > BOMBS_TEMPERATURE_TRIGGER;

            match bomb.state {
                BombState::TimerFuse { remaining } => {
                    let remaining = remaining - dt;
                    if remaining <= 0.0 || cooked {
                        actions.push(Self::explosion_action(bomb, points, game_parameters));
                        exploded.push(slot);
                    } else {
                        bomb.state = BombState::TimerFuse { remaining };
                    }
                }

                BombState::RcIdle => {
                    if cooked {
                        actions.push(Self::explosion_action(bomb, points, game_parameters));
                        exploded.push(slot);
                    }
                }

                BombState::ImpactArmed { last_velocity } => {
                    let velocity = points.v.velocity[bomb.point_index as usize];
                    let delta_v = (velocity - last_velocity).norm();
                    if delta_v >= IMPACT_BOMB_TRIGGER_DELTA_V || cooked {
                        actions.push(Self::explosion_action(bomb, points, game_parameters));
                        exploded.push(slot);
                    } else {
                        bomb.state = BombState::ImpactArmed { last_velocity: velocity };
                    }
                }

                BombState::AntiMatterContained => {
                    if cooked {
                        bomb.state = BombState::AntiMatterPreImploding { elapsed: 0. };
                    }
                }

                BombState::AntiMatterPreImploding { elapsed } => {
                    let elapsed = elapsed + dt;
                    actions.push(BombAction::Implosion {
                        center: bomb.position,
                        strength: game_parameters.anti_matter_bomb_implosion_strength
                            * (elapsed / ANTI_MATTER_PRE_IMPLOSION_DURATION),
                    });
                    if elapsed >= ANTI_MATTER_PRE_IMPLOSION_DURATION {
                        bomb.state = BombState::AntiMatterImploding { elapsed: 0. };
                    } else {
                        bomb.state = BombState::AntiMatterPreImploding { elapsed };
                    }
                }

                BombState::AntiMatterImploding { elapsed } => {
                    let elapsed = elapsed + dt;
                    actions.push(BombAction::Implosion {
                        center: bomb.position,
                        strength: game_parameters.anti_matter_bomb_implosion_strength * 10.0,
                    });
                    if elapsed >= ANTI_MATTER_IMPLOSION_DURATION {
                        // The final explosion dwarfs a regular blast
                        actions.push(BombAction::Explosion {
                            center: bomb.position,
                            blast_radius: game_parameters.bomb_blast_radius * 4.0,
                            blast_force: DRAW_FORCE * 100.0 * game_parameters.bomb_blast_force_adjustment,
                            blast_heat: game_parameters.bomb_blast_heat * 10.0,
                            plane_id: bomb.plane_id,
                        });
                        exploded.push(slot);
                    } else {
                        bomb.state = BombState::AntiMatterImploding { elapsed };
                    }
                }
            }
        }

        for slot in exploded.into_iter().rev() {
            self.bombs.remove(slot);
        }
    }

    fn explosion_action(bomb: &Bomb, _points: &Points, game_parameters: &GameParameters) -> BombAction {
        let ultra = if game_parameters.is_ultra_violent_mode { 4.0 } else { 1.0 };
        BombAction::Explosion {
            center: bomb.position,
            blast_radius: game_parameters.bomb_blast_radius * ultra,
            blast_force: DRAW_FORCE * 25.0 * game_parameters.bomb_blast_force_adjustment * ultra,
            blast_heat: game_parameters.bomb_blast_heat * ultra,
            plane_id: bomb.plane_id,
        }
    }
}

impl Default for Bombs {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simulation::materials::test_fixtures::test_database;
    use crate::simulation::vec2f;
    use nalgebra::zero;

    fn setup() -> Points {
        let db = test_database();
        let params = GameParameters::default();
        let mut points = Points::new(4, &params);
        let wood_id = db
            .structural_by_color(crate::simulation::ColorKey::new(0xc2, 0x9a, 0x5b))
            .unwrap();
        let wood = db.structural(wood_id).clone();
        for k in 0..4 {
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
        points
    }

    #[test]
    fn toggle_places_then_removes() {
        let points = setup();
        let params = GameParameters::default();
        let mut bombs = Bombs::new();

        assert!(bombs.toggle_at(BombKind::Rc, vec2f(1.2, 0.), &points, &params));
        assert_eq!(bombs.bombs().len(), 1);
        assert_eq!(bombs.bombs()[0].point_index, 1);

        assert!(bombs.toggle_at(BombKind::Rc, vec2f(1.2, 0.), &points, &params));
        assert!(bombs.bombs().is_empty());
    }

    #[test]
    fn timer_bomb_detonates_when_the_fuse_runs_out() {
        let points = setup();
        let mut params = GameParameters::default();
        params.timer_bomb_interval_seconds = 0.1;
        let mut bombs = Bombs::new();
        bombs.toggle_at(BombKind::Timer, vec2f(0., 0.), &points, &params);

        let mut actions = Vec::new();
        for _ in 0..4 {
            bombs.update(0.02, &points, &params, &mut actions);
        }
        assert!(actions.is_empty());

        bombs.update(0.02, &points, &params, &mut actions);
        assert_eq!(actions.len(), 1);
        assert!(bombs.bombs().is_empty());
        assert!(matches!(actions[0], BombAction::Explosion { .. }));
    }

    #[test]
    fn rc_bomb_waits_for_the_command() {
        let points = setup();
        let params = GameParameters::default();
        let mut bombs = Bombs::new();
        bombs.toggle_at(BombKind::Rc, vec2f(0., 0.), &points, &params);

        let mut actions = Vec::new();
        for _ in 0..100 {
            bombs.update(0.02, &points, &params, &mut actions);
        }
        assert!(actions.is_empty());

        bombs.detonate_rc_bombs(&points, &params, &mut actions);
        assert_eq!(actions.len(), 1);
        assert!(bombs.bombs().is_empty());
    }

    #[test]
    fn anti_matter_bomb_implodes_then_explodes() {
        let points = setup();
        let params = GameParameters::default();
        let mut bombs = Bombs::new();
        bombs.toggle_at(BombKind::AntiMatter, vec2f(0., 0.), &points, &params);
        bombs.detonate_anti_matter_bombs();

        let mut actions = Vec::new();
        let total_ticks =
            ((ANTI_MATTER_PRE_IMPLOSION_DURATION + ANTI_MATTER_IMPLOSION_DURATION) / 0.02) as usize + 2;
        for _ in 0..total_ticks {
            bombs.update(0.02, &points, &params, &mut actions);
        }

        assert!(actions.iter().any(|a| matches!(a, BombAction::Implosion { .. })));
        assert!(actions.iter().any(|a| matches!(a, BombAction::Explosion { .. })));
        assert!(bombs.bombs().is_empty());
    }

    #[test]
    fn hot_particle_cooks_off_the_bomb() {
        let mut points = setup();
        let params = GameParameters::default();
        let mut bombs = Bombs::new();
        bombs.toggle_at(BombKind::Rc, vec2f(0., 0.), &points, &params);

        points.v.temperature[0] = 500.0;
        let mut actions = Vec::new();
        bombs.update(0.02, &points, &params, &mut actions);
        assert_eq!(actions.len(), 1);
    }
}
