use crate::floating_type_mod::FT;
use crate::simulation::materials::{PowerProbeKind, SwitchKind};

pub type ElectricalInstanceId = u32;
pub type ShipIdType = u32;

/// Everything the core tells the host. Events raised inside a tick are
/// queued and flushed at the end of the tick, in raise order.
#[derive(Debug, Clone, PartialEq)]
pub enum GameEvent {
    GameReset,
    ShipLoaded {
        id: ShipIdType,
        name: String,
        author: Option<String>,
    },
    Tsunami {
        x: FT,
    },
    Destroy {
        material_name: String,
        underwater: bool,
        count: u32,
    },
    CombustionBegin,
    CombustionEnd,
    SwitchCreated {
        id: ElectricalInstanceId,
        kind: SwitchKind,
        state: bool,
    },
    PowerProbeCreated {
        id: ElectricalInstanceId,
        kind: PowerProbeKind,
        state: bool,
    },
    SwitchToggled {
        id: ElectricalInstanceId,
        new_state: bool,
    },
    SwitchEnabled {
        id: ElectricalInstanceId,
        enabled: bool,
    },
    PowerProbeToggled {
        id: ElectricalInstanceId,
        state: bool,
    },
    FrameRate {
        last: FT,
        avg: FT,
    },
    UpdateToRenderRatio {
        last: FT,
    },
    ElectricalElementAnnouncementsBegin,
    ElectricalElementAnnouncementsEnd,
}

pub trait GameEventSink {
    fn on_game_event(&mut self, event: &GameEvent);
}

/// Queueing dispatcher: subsystems push during the tick, the scheduler
/// flushes at the tick boundary. `Destroy` events for the same material and
/// wetness are folded together so a blast arrives as one notification.
#[derive(Default)]
pub struct GameEventDispatcher {
    queue: Vec<GameEvent>,
    sinks: Vec<Box<dyn GameEventSink>>,
}

impl GameEventDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_sink(&mut self, sink: Box<dyn GameEventSink>) {
        self.sinks.push(sink);
    }

    pub fn push(&mut self, event: GameEvent) {
        if let GameEvent::Destroy {
            ref material_name,
            underwater,
            count,
        } = event
        {
            for queued in self.queue.iter_mut() {
                if let GameEvent::Destroy {
                    material_name: ref queued_name,
                    underwater: queued_underwater,
                    count: ref mut queued_count,
                } = queued
                {
                    if queued_name == material_name && *queued_underwater == underwater {
                        *queued_count += count;
                        return;
                    }
                }
            }
        }

        self.queue.push(event);
    }

    pub fn pending_count(&self) -> usize {
        self.queue.len()
    }

    /// Takes the queued events without delivering them; used to re-raise
    /// events staged against a world that wasn't live yet.
    pub fn drain_queue(&mut self) -> Vec<GameEvent> {
        std::mem::take(&mut self.queue)
    }

    pub fn flush(&mut self) {
        let events = std::mem::take(&mut self.queue);
        for event in &events {
            for sink in self.sinks.iter_mut() {
                sink.on_game_event(event);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    struct Recorder(Rc<RefCell<Vec<GameEvent>>>);

    impl GameEventSink for Recorder {
        fn on_game_event(&mut self, event: &GameEvent) {
            self.0.borrow_mut().push(event.clone());
        }
    }

    #[test]
    fn events_flush_in_raise_order() {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let mut dispatcher = GameEventDispatcher::new();
        dispatcher.register_sink(Box::new(Recorder(seen.clone())));

        dispatcher.push(GameEvent::CombustionBegin);
        dispatcher.push(GameEvent::Tsunami { x: 10.0 });
        assert!(seen.borrow().is_empty());

        dispatcher.flush();
        assert_eq!(
            *seen.borrow(),
            vec![GameEvent::CombustionBegin, GameEvent::Tsunami { x: 10.0 }]
        );
    }

    #[test]
    fn destroy_events_aggregate_within_a_flush() {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let mut dispatcher = GameEventDispatcher::new();
        dispatcher.register_sink(Box::new(Recorder(seen.clone())));

        for _ in 0..3 {
            dispatcher.push(GameEvent::Destroy {
                material_name: "Wood".to_string(),
                underwater: false,
                count: 1,
            });
        }
        dispatcher.push(GameEvent::Destroy {
            material_name: "Wood".to_string(),
            underwater: true,
            count: 1,
        });
        dispatcher.flush();

        assert_eq!(
            *seen.borrow(),
            vec![
                GameEvent::Destroy {
                    material_name: "Wood".to_string(),
                    underwater: false,
                    count: 3,
                },
                GameEvent::Destroy {
                    material_name: "Wood".to_string(),
                    underwater: true,
                    count: 1,
                },
            ]
        );
    }
}
