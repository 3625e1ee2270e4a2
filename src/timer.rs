//! Countdown timer driving the game session state machine.
//!
//! One logical countdown at a time: `start_timer` supersedes whatever was
//! running. Stopping is done with a generation counter rather than task
//! aborts, so a callback that is mid-flight when the game tears down can
//! finish cleanly but nothing fires afterwards.

use futures::future::BoxFuture;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const DEFAULT_TICK_MS: u64 = 1000;

pub type TickCallback = Arc<dyn Fn(u32) -> BoxFuture<'static, ()> + Send + Sync>;
pub type EndedCallback = Arc<dyn Fn() -> BoxFuture<'static, ()> + Send + Sync>;
pub type StopCondition = Arc<dyn Fn() -> BoxFuture<'static, bool> + Send + Sync>;
pub type SpecificCallback = Arc<dyn Fn() -> BoxFuture<'static, ()> + Send + Sync>;

struct TimerShared {
    remaining: u32,
    paused: bool,
    delay: Duration,
    generation: u64,
    on_tick: Option<TickCallback>,
    on_ended: Option<EndedCallback>,
    stop_condition: Option<StopCondition>,
    specific: HashMap<u32, SpecificCallback>,
}

pub struct Timer {
    shared: Arc<Mutex<TimerShared>>,
}

impl Default for Timer {
    fn default() -> Self {
        Self::new()
    }
}

impl Timer {
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Mutex::new(TimerShared {
                remaining: 0,
                paused: false,
                delay: Duration::from_millis(DEFAULT_TICK_MS),
                generation: 0,
                on_tick: None,
                on_ended: None,
                stop_condition: None,
                specific: HashMap::new(),
            })),
        }
    }

    /// Tick callback, fired with the current value once per tick delay
    /// (and once immediately on start).
    pub fn set_on_tick(&self, callback: TickCallback) -> &Self {
        self.shared.lock().unwrap().on_tick = Some(callback);
        self
    }

    /// Fired when the countdown reaches zero or the stop condition cuts
    /// it short.
    pub fn set_on_ended(&self, callback: EndedCallback) -> &Self {
        self.shared.lock().unwrap().on_ended = Some(callback);
        self
    }

    /// Polled once per tick; returning true ends the countdown early.
    pub fn set_stop_condition(&self, condition: StopCondition) -> &Self {
        self.shared.lock().unwrap().stop_condition = Some(condition);
        self
    }

    pub fn clear_stop_condition(&self) -> &Self {
        self.shared.lock().unwrap().stop_condition = None;
        self
    }

    /// One-off hook fired when the countdown passes through `value`.
    pub fn set_specific_callback(&self, value: u32, callback: SpecificCallback) -> &Self {
        self.shared.lock().unwrap().specific.insert(value, callback);
        self
    }

    pub fn clear_specific_callbacks(&self) -> &Self {
        self.shared.lock().unwrap().specific.clear();
        self
    }

    pub fn remaining(&self) -> u32 {
        self.shared.lock().unwrap().remaining
    }

    pub fn is_paused(&self) -> bool {
        self.shared.lock().unwrap().paused
    }

    /// Reset and begin a countdown from `seconds`. Any previous countdown
    /// is superseded; the tick delay goes back to one second.
    pub fn start_timer(&self, seconds: u32) {
        let generation = {
            let mut shared = self.shared.lock().unwrap();
            shared.generation += 1;
            shared.remaining = seconds;
            shared.paused = false;
            shared.delay = Duration::from_millis(DEFAULT_TICK_MS);
            shared.generation
        };
        run(Arc::clone(&self.shared), generation);
    }

    /// Halt the countdown. Idempotent; afterwards no callback fires until
    /// the next `start_timer`.
    pub fn stop_timer(&self) {
        self.shared.lock().unwrap().generation += 1;
    }

    /// Suspend or resume ticking without losing the current value.
    /// Returns the new paused state.
    pub fn toggle_pause(&self) -> bool {
        let mut shared = self.shared.lock().unwrap();
        shared.paused = !shared.paused;
        shared.paused
    }

    /// Change the tick granularity (panic mode acceleration) and resume
    /// if paused.
    pub fn update_delay(&self, millis: u64) {
        let mut shared = self.shared.lock().unwrap();
        shared.delay = Duration::from_millis(millis);
        shared.paused = false;
    }
}

fn run(shared: Arc<Mutex<TimerShared>>, generation: u64) {
    tokio::spawn(async move {
        loop {
            let (value, on_tick, stop_condition) = {
                let guard = shared.lock().unwrap();
                if guard.generation != generation {
                    return;
                }
                (
                    guard.remaining,
                    guard.on_tick.clone(),
                    guard.stop_condition.clone(),
                )
            };

            if let Some(tick) = on_tick {
                tick(value).await;
            }

            let specific = {
                let mut guard = shared.lock().unwrap();
                if guard.generation != generation {
                    return;
                }
                guard.specific.remove(&value)
            };
            if let Some(callback) = specific {
                callback().await;
            }

            if let Some(condition) = stop_condition {
                if condition().await {
                    finish(&shared, generation).await;
                    return;
                }
            }

            if value == 0 {
                finish(&shared, generation).await;
                return;
            }

            // Wait out one tick delay; a paused timer keeps waiting
            // without decrementing.
            loop {
                let delay = {
                    let guard = shared.lock().unwrap();
                    if guard.generation != generation {
                        return;
                    }
                    guard.delay
                };
                tokio::time::sleep(delay).await;
                let paused = {
                    let guard = shared.lock().unwrap();
                    if guard.generation != generation {
                        return;
                    }
                    guard.paused
                };
                if !paused {
                    break;
                }
            }

            {
                let mut guard = shared.lock().unwrap();
                if guard.generation != generation {
                    return;
                }
                guard.remaining = guard.remaining.saturating_sub(1);
            }
        }
    });
}

async fn finish(shared: &Arc<Mutex<TimerShared>>, generation: u64) {
    let on_ended = {
        let guard = shared.lock().unwrap();
        if guard.generation != generation {
            return;
        }
        guard.on_ended.clone()
    };
    if let Some(ended) = on_ended {
        ended().await;
    }
}
