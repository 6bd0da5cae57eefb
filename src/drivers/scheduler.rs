use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};
use std::time::Duration;

use log::{debug, info};

use crate::drivers::MonitorError;

/// Handle returned by `register`; ids grow with registration order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(u64);

struct Task<T> {
    interval: Duration,
    payload: T,
}

/// Single-threaded cooperative timer. Every task that is due when `pump` is
/// called runs to completion, in (due time, registration) order, and is then
/// re-armed at `now + interval`. A late pump therefore delays the following
/// firing by the same amount instead of trying to catch up.
pub struct PollingScheduler<T> {
    tasks: HashMap<TaskId, Task<T>>,
    queue: BinaryHeap<Reverse<(Duration, TaskId)>>,
    next_id: u64,
    running: bool,
    last_pump: Duration,
}

impl<T> Default for PollingScheduler<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> PollingScheduler<T> {
    pub fn new() -> Self {
        Self {
            tasks: HashMap::new(),
            queue: BinaryHeap::new(),
            next_id: 0,
            running: false,
            last_pump: Duration::ZERO,
        }
    }

    /// Add a recurring task. While running it becomes due immediately;
    /// otherwise it is armed by `start`.
    pub fn register(&mut self, interval: Duration, payload: T) -> Result<TaskId, MonitorError> {
        if interval.is_zero() {
            return Err(MonitorError::InvalidInterval(format!(
                "task #{}",
                self.next_id
            )));
        }
        let id = TaskId(self.next_id);
        self.next_id += 1;
        self.tasks.insert(id, Task { interval, payload });
        if self.running {
            self.queue.push(Reverse((self.last_pump, id)));
        }
        Ok(id)
    }

    /// Stop future firings of a task and hand back its payload.
    pub fn cancel(&mut self, id: TaskId) -> Option<T> {
        // the stale queue entry is skipped when it surfaces
        self.tasks.remove(&id).map(|task| task.payload)
    }

    pub fn start(&mut self, now: Duration) {
        if self.running {
            return;
        }
        self.running = true;
        self.last_pump = now;
        self.queue.clear();
        let mut ids: Vec<TaskId> = self.tasks.keys().copied().collect();
        ids.sort();
        for id in ids {
            self.queue.push(Reverse((now, id)));
        }
        info!("scheduler started with {} task(s)", self.tasks.len());
    }

    pub fn stop(&mut self) {
        if self.running {
            self.running = false;
            self.queue.clear();
            info!("scheduler stopped");
        }
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn contains(&self, id: TaskId) -> bool {
        self.tasks.contains_key(&id)
    }

    pub fn interval(&self, id: TaskId) -> Option<Duration> {
        self.tasks.get(&id).map(|task| task.interval)
    }

    /// Earliest armed fire time. May be a cancelled task's; waking early is harmless.
    pub fn next_due(&self) -> Option<Duration> {
        if !self.running {
            return None;
        }
        self.queue.peek().map(|Reverse((at, _))| *at)
    }

    /// Fire every due task once. Returns how many ran.
    pub fn pump(&mut self, now: Duration, mut action: impl FnMut(TaskId, &mut T)) -> usize {
        if !self.running {
            return 0;
        }
        self.last_pump = now;
        let mut due = Vec::new();
        while let Some(Reverse((at, id))) = self.queue.peek().copied() {
            if at > now {
                break;
            }
            self.queue.pop();
            if self.tasks.contains_key(&id) {
                due.push(id);
            }
        }
        let mut fired = 0;
        for id in due {
            if let Some(task) = self.tasks.get_mut(&id) {
                action(id, &mut task.payload);
                self.queue.push(Reverse((now + task.interval, id)));
                fired += 1;
            }
        }
        if fired > 0 {
            debug!("pump at {:.3}s fired {fired} task(s)", now.as_secs_f64());
        }
        fired
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(v: u64) -> Duration {
        Duration::from_millis(v)
    }

    #[test]
    fn late_pump_rearms_relative_to_fire_time() {
        let mut scheduler = PollingScheduler::new();
        scheduler.register(ms(100), ()).unwrap();
        scheduler.start(ms(0));
        let mut fired_at = Vec::new();
        for now in [0, 100, 205, 300, 305] {
            if scheduler.pump(ms(now), |_, _| {}) > 0 {
                fired_at.push(now);
            }
        }
        assert_eq!(fired_at, vec![0, 100, 205, 305]);
    }

    #[test]
    fn ties_fire_in_registration_order() {
        let mut scheduler = PollingScheduler::new();
        scheduler.register(ms(100), "a").unwrap();
        scheduler.register(ms(50), "b").unwrap();
        scheduler.register(ms(100), "c").unwrap();
        scheduler.start(ms(0));
        let mut order = Vec::new();
        scheduler.pump(ms(0), |_, name| order.push(*name));
        assert_eq!(order, vec!["a", "b", "c"]);

        order.clear();
        scheduler.pump(ms(100), |_, name| order.push(*name));
        // b was due at 50, before a and c
        assert_eq!(order, vec!["b", "a", "c"]);
    }

    #[test]
    fn each_task_fires_at_most_once_per_pump() {
        let mut scheduler = PollingScheduler::new();
        scheduler.register(ms(10), 0u32).unwrap();
        scheduler.start(ms(0));
        scheduler.pump(ms(0), |_, n| *n += 1);
        // long stall: still only one firing
        assert_eq!(scheduler.pump(ms(1_000), |_, n| *n += 1), 1);
        assert_eq!(scheduler.next_due(), Some(ms(1_010)));
    }

    #[test]
    fn cancelled_task_never_fires_again() {
        let mut scheduler = PollingScheduler::new();
        let keep = scheduler.register(ms(100), "keep").unwrap();
        let drop = scheduler.register(ms(100), "drop").unwrap();
        scheduler.start(ms(0));
        scheduler.pump(ms(0), |_, _| {});
        assert_eq!(scheduler.cancel(drop), Some("drop"));
        let mut fired = Vec::new();
        scheduler.pump(ms(100), |id, _| fired.push(id));
        assert_eq!(fired, vec![keep]);
        assert!(!scheduler.contains(drop));
        assert_eq!(scheduler.cancel(drop), None);
    }

    #[test]
    fn registering_while_running_fires_on_next_pump() {
        let mut scheduler = PollingScheduler::new();
        scheduler.start(ms(0));
        scheduler.pump(ms(40), |_, _| {});
        scheduler.register(ms(100), ()).unwrap();
        assert_eq!(scheduler.pump(ms(50), |_, _| {}), 1);
        assert_eq!(scheduler.next_due(), Some(ms(150)));
    }

    #[test]
    fn stopped_scheduler_does_nothing() {
        let mut scheduler = PollingScheduler::new();
        scheduler.register(ms(100), ()).unwrap();
        assert_eq!(scheduler.pump(ms(0), |_, _| {}), 0);
        scheduler.start(ms(0));
        scheduler.stop();
        assert_eq!(scheduler.pump(ms(100), |_, _| {}), 0);
        assert!(scheduler.next_due().is_none());
    }

    #[test]
    fn zero_interval_is_rejected() {
        let mut scheduler: PollingScheduler<()> = PollingScheduler::new();
        assert!(scheduler.register(Duration::ZERO, ()).is_err());
    }
}
