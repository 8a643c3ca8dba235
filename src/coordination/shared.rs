use std::{
    mem,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
};

use log::info;
use parking_lot::Mutex;

use super::Gate;
use crate::rollout::ExperienceRow;

/// Whether rollouts are being gathered or the policy is being trained on them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Collecting,
    Updating,
}

/// The outcome of publishing rows to the batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// The rows were queued and counted.
    Accepted,
    /// The rows were queued and completed the batch, the update was triggered.
    Triggered,
    /// The batch was already complete, the rows were dropped.
    Rejected,
}

/// The outcome of a finished episode.
#[derive(Debug, Clone, PartialEq)]
pub struct EpisodeSummary {
    pub worker_id: usize,
    pub steps: usize,
    pub mean_reward: f64,
    /// Initial over final whole-program cycles.
    pub speedup: f64,
}

/// The rows counted towards the batch being collected.
#[derive(Debug, Default)]
struct BatchCounter {
    rows: usize,
    /// Bumped by every `resume`, rows collected under an older generation are stale.
    generation: u64,
}

/// The state shared by the rollout workers and the update coordinator.
///
/// Lock order is `counter` then `queue`, the episode log is never held along with either.
#[derive(Debug)]
pub struct SharedState {
    min_batch: usize,
    max_episodes: usize,
    stop: AtomicBool,
    collect: Gate,
    update: Gate,
    counter: Mutex<BatchCounter>,
    queue: Mutex<Vec<ExperienceRow>>,
    episodes: Mutex<Vec<EpisodeSummary>>,
}

impl SharedState {
    /// Creates a new `SharedState` in the collecting phase.
    ///
    /// # Arguments
    /// * `min_batch` - The amount of counted rows that triggers an update.
    /// * `max_episodes` - The amount of finished episodes that ends the training.
    pub fn new(min_batch: usize, max_episodes: usize) -> Self {
        Self {
            min_batch,
            max_episodes,
            stop: AtomicBool::new(false),
            collect: Gate::new(true),
            update: Gate::new(false),
            counter: Mutex::new(BatchCounter::default()),
            queue: Mutex::new(Vec::new()),
            episodes: Mutex::new(Vec::new()),
        }
    }

    pub fn min_batch(&self) -> usize {
        self.min_batch
    }

    pub fn max_episodes(&self) -> usize {
        self.max_episodes
    }

    /// Queues and counts `rows` collected under `generation`.
    ///
    /// The worker whose rows reach `min_batch` closes the collect gate and opens the update
    /// gate. Every later publish is rejected until `resume`, and so is every publish of rows
    /// collected before the last `resume`.
    ///
    /// # Arguments
    /// * `generation` - The generation given by `wait_for_collect` before collecting `rows`.
    /// * `rows` - The rows to queue.
    pub fn publish(&self, generation: u64, rows: Vec<ExperienceRow>) -> Admission {
        let mut counter = self.counter.lock();

        if counter.generation != generation || counter.rows >= self.min_batch {
            return Admission::Rejected;
        }

        let n = rows.len();
        self.queue.lock().extend(rows);
        counter.rows += n;

        if counter.rows < self.min_batch {
            return Admission::Accepted;
        }

        self.collect.close();
        self.update.open();
        Admission::Triggered
    }

    /// Takes every queued row.
    pub fn drain(&self) -> Vec<ExperienceRow> {
        mem::take(&mut *self.queue.lock())
    }

    /// Resets the counter, starts a new generation and goes back to collecting.
    pub fn resume(&self) {
        let mut counter = self.counter.lock();
        counter.rows = 0;
        counter.generation += 1;
        self.update.close();
        self.collect.open();
    }

    pub fn phase(&self) -> Phase {
        match self.collect.is_open() {
            true => Phase::Collecting,
            false => Phase::Updating,
        }
    }

    /// The amount of rows counted towards the current batch.
    pub fn batch_count(&self) -> usize {
        self.counter.lock().rows
    }

    /// The amount of updates the policy went through since the start.
    pub fn generation(&self) -> u64 {
        self.counter.lock().generation
    }

    /// Amount of rows queued and not drained yet.
    pub fn queued(&self) -> usize {
        self.queue.lock().len()
    }

    /// Makes every thread finish, waking those blocked on a gate.
    pub fn request_stop(&self) {
        if !self.stop.swap(true, Ordering::SeqCst) {
            info!("stop requested");
        }

        self.collect.cancel();
        self.update.cancel();
    }

    pub fn should_stop(&self) -> bool {
        self.stop.load(Ordering::SeqCst)
    }

    /// Blocks until collecting is allowed.
    ///
    /// # Returns
    /// The generation the caller collects under, to be handed back to `publish`. `None` if
    /// the thread should stop instead.
    pub fn wait_for_collect(&self) -> Option<u64> {
        if !self.collect.wait() || self.should_stop() {
            return None;
        }

        Some(self.generation())
    }

    /// Blocks until a batch is complete or a stop is requested.
    ///
    /// # Returns
    /// Whether a batch is waiting to be trained on, which may be the case after a stop.
    pub fn wait_for_update(&self) -> bool {
        self.update.wait()
    }

    pub fn update_pending(&self) -> bool {
        self.update.is_open()
    }

    /// Logs a finished episode.
    ///
    /// # Returns
    /// The amount of episodes finished so far.
    pub fn record_episode(&self, summary: EpisodeSummary) -> usize {
        let mut episodes = self.episodes.lock();
        episodes.push(summary);
        episodes.len()
    }

    pub fn episodes_finished(&self) -> usize {
        self.episodes.lock().len()
    }

    /// Whether enough episodes were finished to end the training.
    pub fn cap_reached(&self) -> bool {
        self.episodes_finished() >= self.max_episodes
    }

    pub fn take_episodes(&self) -> Vec<EpisodeSummary> {
        mem::take(&mut *self.episodes.lock())
    }
}

/// Requests a training session to stop from outside of it.
#[derive(Debug, Clone)]
pub struct StopHandle {
    shared: Arc<SharedState>,
}

impl StopHandle {
    pub fn new(shared: Arc<SharedState>) -> Self {
        Self { shared }
    }

    pub fn stop(&self) {
        self.shared.request_stop();
    }

    pub fn is_stopped(&self) -> bool {
        self.shared.should_stop()
    }
}

#[cfg(test)]
mod tests {
    use std::{thread, time::Duration};

    use super::*;

    fn rows(n: usize) -> Vec<ExperienceRow> {
        (0..n)
            .map(|i| ExperienceRow::new(&[i as f32], 0, 2, 1.0))
            .collect()
    }

    #[test]
    fn test_starts_collecting() {
        let shared = SharedState::new(4, 10);
        assert_eq!(shared.phase(), Phase::Collecting);
        assert!(!shared.update_pending());
        assert_eq!(shared.batch_count(), 0);
    }

    #[test]
    fn test_threshold_flips_the_gates_once() {
        let shared = SharedState::new(4, 10);

        assert_eq!(shared.publish(0, rows(3)), Admission::Accepted);
        assert_eq!(shared.publish(0, rows(2)), Admission::Triggered);
        assert_eq!(shared.phase(), Phase::Updating);
        assert!(shared.update_pending());
        assert_eq!(shared.batch_count(), 5);
    }

    #[test]
    fn test_nothing_is_counted_after_the_threshold_until_reset() {
        let shared = SharedState::new(2, 10);

        assert_eq!(shared.publish(0, rows(2)), Admission::Triggered);
        for _ in 0..5 {
            assert_eq!(shared.publish(0, rows(1)), Admission::Rejected);
        }

        assert_eq!(shared.batch_count(), 2);
        assert_eq!(shared.drain().len(), 2);

        shared.resume();
        assert_eq!(shared.batch_count(), 0);
        assert_eq!(shared.phase(), Phase::Collecting);
        assert_eq!(shared.publish(1, rows(1)), Admission::Accepted);
    }

    #[test]
    fn test_rows_of_a_previous_generation_are_rejected() {
        let shared = SharedState::new(2, 10);
        let stale = shared.wait_for_collect().unwrap();

        assert_eq!(shared.publish(stale, rows(2)), Admission::Triggered);
        shared.drain();
        shared.resume();

        let current = shared.wait_for_collect().unwrap();
        assert_eq!(current, stale + 1);
        assert_eq!(shared.publish(stale, rows(1)), Admission::Rejected);
        assert_eq!(shared.batch_count(), 0);
        assert_eq!(shared.queued(), 0);

        assert_eq!(shared.publish(current, rows(1)), Admission::Accepted);
        assert_eq!(shared.batch_count(), 1);
    }

    #[test]
    fn test_concurrent_publishers_trigger_exactly_once() {
        let shared = Arc::new(SharedState::new(50, 10));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let shared = Arc::clone(&shared);
                thread::spawn(move || {
                    (0..20)
                        .filter(|_| shared.publish(0, rows(1)) == Admission::Triggered)
                        .count()
                })
            })
            .collect();

        let triggers: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();

        assert_eq!(triggers, 1);
        assert_eq!(shared.batch_count(), 50);
        assert_eq!(shared.drain().len(), 50);
    }

    #[test]
    fn test_stop_wakes_waiting_threads() {
        let shared = Arc::new(SharedState::new(1, 10));
        shared.publish(0, rows(1));

        let collector = {
            let shared = Arc::clone(&shared);
            thread::spawn(move || shared.wait_for_collect())
        };

        thread::sleep(Duration::from_millis(20));
        StopHandle::new(Arc::clone(&shared)).stop();

        assert!(collector.join().unwrap().is_none());
        assert!(shared.should_stop());
    }

    #[test]
    fn test_pending_update_survives_a_stop() {
        let shared = SharedState::new(1, 10);
        shared.publish(0, rows(1));
        shared.request_stop();

        assert!(shared.wait_for_update());
    }

    #[test]
    fn test_stop_without_pending_update() {
        let shared = SharedState::new(3, 10);
        shared.request_stop();

        assert!(!shared.wait_for_update());
        assert!(shared.wait_for_collect().is_none());
    }

    #[test]
    fn test_episode_cap() {
        let shared = SharedState::new(3, 2);
        let summary = EpisodeSummary {
            worker_id: 0,
            steps: 4,
            mean_reward: 0.1,
            speedup: 1.2,
        };

        assert_eq!(shared.record_episode(summary.clone()), 1);
        assert!(!shared.cap_reached());
        assert_eq!(shared.record_episode(summary), 2);
        assert!(shared.cap_reached());
        assert_eq!(shared.take_episodes().len(), 2);
    }
}
