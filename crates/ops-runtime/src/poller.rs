//! Background loops that feed the engine on a timer.

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::debug;

use crate::engine::EngineHandle;

/// Poll the order service every `interval`, starting immediately.
///
/// Exits once the engine stops. A slow poll never stacks ticks: missed ticks
/// are delayed, and a response that arrives after a newer poll was issued is
/// discarded by the engine anyway.
pub fn spawn_poll_loop(engine: EngineHandle, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            if !engine.poll_tick() {
                debug!("engine stopped; poll loop exiting");
                break;
            }
        }
    })
}

/// Re-evaluate slow orders every `interval`.
pub fn spawn_slow_order_loop(engine: EngineHandle, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // First tick fires immediately; the cache is still empty then.
        ticker.tick().await;
        loop {
            ticker.tick().await;
            if !engine.check_slow_orders() {
                debug!("engine stopped; slow-order loop exiting");
                break;
            }
        }
    })
}
