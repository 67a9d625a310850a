//! Keepalive task
//!
//! A periodic loop that probes the managed handle when it has sat idle past
//! the inactivity threshold. The task holds only a weak reference, so
//! dropping the last manager clone ends the loop on its next tick.

use std::sync::{Arc, Weak};

use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};

use super::ManagerInner;

pub(crate) fn spawn(inner: &Arc<ManagerInner>) -> JoinHandle<()> {
    let weak: Weak<ManagerInner> = Arc::downgrade(inner);
    let period = inner.config.keep_alive_interval();

    tokio::spawn(async move {
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick of an interval completes immediately.
        ticker.tick().await;

        tracing::debug!("Keepalive task started with period {:?}", period);

        loop {
            ticker.tick().await;
            let Some(inner) = weak.upgrade() else {
                break;
            };
            ManagerInner::keepalive_tick(&inner).await;
        }

        tracing::debug!("Keepalive task stopped");
    })
}
