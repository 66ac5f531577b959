//! Manual-clock timer service: time only moves when [`TimerService::advance`]
//! is called, typically once per world tick.

use crate::services::{Dispatch, ExternalEvent, Subscriber, TimerHandle, TimerService};
use crate::InstanceId;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::time::Duration;

/// Firings a repeating timer may catch up on in one advance. Whole periods
/// beyond this are dropped.
pub const MAX_CATCH_UP_FIRES: u32 = 64;

#[derive(Debug, Clone)]
struct Timer {
    owner: Subscriber,
    duration: Duration,
    repeating: bool,
    elapsed: Duration,
    paused: bool,
}

#[derive(Default)]
struct TimerState {
    next_handle: u64,
    timers: BTreeMap<TimerHandle, Timer>,
}

#[derive(Default)]
pub struct TimerManager {
    state: Mutex<TimerState>,
}

impl TimerManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.state.lock().timers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl TimerService for TimerManager {
    fn set_timer(&self, owner: Subscriber, duration: Duration, repeating: bool) -> TimerHandle {
        let mut state = self.state.lock();
        state.next_handle += 1;
        let handle = TimerHandle(state.next_handle);
        state.timers.insert(
            handle,
            Timer {
                owner,
                duration,
                repeating,
                elapsed: Duration::ZERO,
                paused: false,
            },
        );
        tracing::debug!("Timer {:?} set for {:?} (repeating: {})", handle, duration, repeating);
        handle
    }

    fn pause_timer(&self, handle: TimerHandle) {
        if let Some(timer) = self.state.lock().timers.get_mut(&handle) {
            timer.paused = true;
        }
    }

    fn unpause_timer(&self, handle: TimerHandle) {
        if let Some(timer) = self.state.lock().timers.get_mut(&handle) {
            timer.paused = false;
        }
    }

    fn clear_timer(&self, handle: TimerHandle) {
        self.state.lock().timers.remove(&handle);
    }

    fn is_timer_active(&self, handle: TimerHandle) -> bool {
        self.state
            .lock()
            .timers
            .get(&handle)
            .is_some_and(|timer| !timer.paused)
    }

    fn is_timer_paused(&self, handle: TimerHandle) -> bool {
        self.state
            .lock()
            .timers
            .get(&handle)
            .is_some_and(|timer| timer.paused)
    }

    fn elapsed(&self, handle: TimerHandle) -> Option<Duration> {
        self.state.lock().timers.get(&handle).map(|timer| timer.elapsed)
    }

    fn clear_instance(&self, instance: InstanceId) {
        self.state
            .lock()
            .timers
            .retain(|_, timer| timer.owner.instance != instance);
    }

    fn advance(&self, delta: Duration) -> Vec<Dispatch> {
        let mut state = self.state.lock();
        let mut fired: Vec<(Duration, TimerHandle, Subscriber)> = Vec::new();
        let mut expired = Vec::new();

        for (handle, timer) in state.timers.iter_mut() {
            if timer.paused {
                continue;
            }
            // Zero-length timers fire once per advance.
            if timer.duration.is_zero() {
                fired.push((Duration::ZERO, *handle, timer.owner));
                if !timer.repeating {
                    expired.push(*handle);
                }
                continue;
            }

            let mut consumed = Duration::ZERO;
            let mut remaining = delta;
            let mut fires = 0;
            loop {
                let until_expiry = timer.duration - timer.elapsed;
                if remaining < until_expiry {
                    timer.elapsed += remaining;
                    break;
                }
                consumed += until_expiry;
                remaining -= until_expiry;
                fired.push((consumed, *handle, timer.owner));
                fires += 1;
                if !timer.repeating {
                    expired.push(*handle);
                    break;
                }
                timer.elapsed = Duration::ZERO;
                if fires >= MAX_CATCH_UP_FIRES {
                    let partial = remaining.as_nanos() % timer.duration.as_nanos();
                    timer.elapsed = Duration::from_nanos(u64::try_from(partial).unwrap_or(0));
                    tracing::debug!(
                        "Timer {:?} fell {} periods behind; dropping the rest",
                        handle,
                        remaining.as_nanos() / timer.duration.as_nanos()
                    );
                    break;
                }
            }
        }

        for handle in expired {
            state.timers.remove(&handle);
        }

        fired.sort_by_key(|(offset, handle, _)| (*offset, *handle));
        fired
            .into_iter()
            .map(|(_, handle, owner)| Dispatch {
                target: owner,
                event: ExternalEvent::TimerFired(handle),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn owner() -> Subscriber {
        Subscriber::new(Uuid::new_v4(), Uuid::new_v4())
    }

    #[test]
    fn test_catch_up_is_capped_per_advance() {
        let timers = TimerManager::new();
        let handle = timers.set_timer(owner(), Duration::from_nanos(1), true);

        let fired = timers.advance(Duration::from_millis(100));
        assert_eq!(fired.len(), MAX_CATCH_UP_FIRES as usize);
        assert!(timers.is_timer_active(handle));
        assert_eq!(timers.elapsed(handle), Some(Duration::ZERO));

        let timers = TimerManager::new();
        let handle = timers.set_timer(owner(), Duration::from_millis(10), true);
        let fired = timers.advance(Duration::from_millis(1005));
        assert_eq!(fired.len(), MAX_CATCH_UP_FIRES as usize);
        assert_eq!(timers.elapsed(handle), Some(Duration::from_millis(5)));
    }

    #[test]
    fn test_one_shot_fires_once_and_expires() {
        let timers = TimerManager::new();
        let handle = timers.set_timer(owner(), Duration::from_millis(100), false);

        assert!(timers.advance(Duration::from_millis(60)).is_empty());
        let fired = timers.advance(Duration::from_millis(60));
        assert_eq!(fired.len(), 1);
        assert_eq!(fired[0].event, ExternalEvent::TimerFired(handle));
        assert!(!timers.is_timer_active(handle));
        assert!(timers.is_empty());
    }

    #[test]
    fn test_repeating_catches_up_in_order() {
        let timers = TimerManager::new();
        let slow = timers.set_timer(owner(), Duration::from_millis(250), true);
        let fast = timers.set_timer(owner(), Duration::from_millis(100), true);

        let fired: Vec<_> = timers
            .advance(Duration::from_millis(300))
            .into_iter()
            .map(|d| d.event)
            .collect();

        assert_eq!(
            fired,
            vec![
                ExternalEvent::TimerFired(fast),
                ExternalEvent::TimerFired(fast),
                ExternalEvent::TimerFired(slow),
                ExternalEvent::TimerFired(fast),
            ]
        );
    }

    #[test]
    fn test_paused_timer_does_not_advance() {
        let timers = TimerManager::new();
        let handle = timers.set_timer(owner(), Duration::from_millis(100), false);
        timers.advance(Duration::from_millis(50));
        timers.pause_timer(handle);

        assert!(timers.is_timer_paused(handle));
        assert!(timers.advance(Duration::from_secs(10)).is_empty());

        timers.unpause_timer(handle);
        assert_eq!(timers.elapsed(handle), Some(Duration::from_millis(50)));
        assert_eq!(timers.advance(Duration::from_millis(50)).len(), 1);
    }

    #[test]
    fn test_clear_instance() {
        let timers = TimerManager::new();
        let a = owner();
        let b = owner();
        timers.set_timer(a, Duration::from_secs(1), true);
        let kept = timers.set_timer(b, Duration::from_secs(1), true);

        timers.clear_instance(a.instance);
        assert_eq!(timers.len(), 1);
        assert!(timers.is_timer_active(kept));
    }
}
