//! Tick rendezvous between the chipset clock and consumers on other threads.
//!
//! The clock publishes a generation with the CPU cycles it covers, then waits
//! until every registered waiter has acked it. A waiter that stays silent
//! past the timeout is reported instead of hanging the emulator.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use mos_cia_8520::Cia8520;

use crate::error::BarrierError;

/// What a missed ack does to the clock side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BarrierPolicy {
    /// Fail the wait. Used by tests.
    Strict,
    /// Log, count, and carry on.
    #[default]
    Lenient,
}

#[derive(Debug, Default)]
struct State {
    generation: u64,
    cycles: u32,
    /// Waiters owed an ack for the current generation.
    waiters: usize,
    /// Waiters registered since the last release. They join at the next.
    joining: usize,
    acked: usize,
}

#[derive(Debug)]
pub struct TickBarrier {
    state: Mutex<State>,
    changed: Condvar,
    policy: BarrierPolicy,
    missed: AtomicU64,
}

impl TickBarrier {
    #[must_use]
    pub fn new(policy: BarrierPolicy) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(State::default()),
            changed: Condvar::new(),
            policy,
            missed: AtomicU64::new(0),
        })
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Add a consumer. It takes part from the next generation on.
    #[must_use]
    pub fn register(self: &Arc<Self>) -> TickWaiter {
        let mut state = self.lock();
        state.joining += 1;
        TickWaiter {
            barrier: Arc::clone(self),
            joined: state.generation,
            seen: state.generation,
            counted: None,
        }
    }

    /// Publish a new generation covering `cycles` CPU clocks.
    pub fn release(&self, cycles: u32) -> u64 {
        let mut state = self.lock();
        state.generation += 1;
        state.cycles = cycles;
        state.waiters += std::mem::take(&mut state.joining);
        state.acked = 0;
        self.changed.notify_all();
        state.generation
    }

    /// Block until every waiter has acked the current generation.
    pub fn wait_for_acks(&self, timeout: Duration) -> Result<(), BarrierError> {
        let guard = self.lock();
        let (state, _) = self
            .changed
            .wait_timeout_while(guard, timeout, |s| s.acked < s.waiters)
            .unwrap_or_else(PoisonError::into_inner);
        if state.acked >= state.waiters {
            return Ok(());
        }
        let error = BarrierError::MissedAck {
            generation: state.generation,
            outstanding: state.waiters - state.acked,
            timeout,
        };
        drop(state);
        match self.policy {
            BarrierPolicy::Strict => Err(error),
            BarrierPolicy::Lenient => {
                log::warn!("{error}");
                self.missed.fetch_add(1, Ordering::Relaxed);
                Ok(())
            }
        }
    }

    #[must_use]
    pub fn policy(&self) -> BarrierPolicy {
        self.policy
    }

    /// Generations the clock gave up waiting on (lenient policy only).
    #[must_use]
    pub fn missed_acks(&self) -> u64 {
        self.missed.load(Ordering::Relaxed)
    }

    /// Registered consumers, including those joining at the next release.
    #[must_use]
    pub fn waiters(&self) -> usize {
        let state = self.lock();
        state.waiters + state.joining
    }

    #[must_use]
    pub fn generation(&self) -> u64 {
        self.lock().generation
    }
}

/// One consumer's handle. Dropping it deregisters the consumer.
#[derive(Debug)]
pub struct TickWaiter {
    barrier: Arc<TickBarrier>,
    /// Generation current at registration; later ones are owed an ack.
    joined: u64,
    seen: u64,
    /// Generation this waiter's ack was counted for.
    counted: Option<u64>,
}

impl TickWaiter {
    /// Wait for a generation newer than the last one seen. Returns the
    /// cycles it covers, or `None` on timeout.
    pub fn wait_for_tick(&mut self, timeout: Duration) -> Option<u32> {
        let seen = self.seen;
        let guard = self.barrier.lock();
        let (state, _) = self
            .barrier
            .changed
            .wait_timeout_while(guard, timeout, |s| s.generation == seen)
            .unwrap_or_else(PoisonError::into_inner);
        if state.generation == seen {
            return None;
        }
        self.seen = state.generation;
        Some(state.cycles)
    }

    /// Acknowledge the generation last returned by `wait_for_tick`.
    /// Repeated acks of one generation count once, and a stale ack of an
    /// older generation does not count.
    pub fn ack(&mut self) {
        if self.seen == self.joined || self.counted == Some(self.seen) {
            return;
        }
        let mut state = self.barrier.lock();
        if state.generation == self.seen {
            state.acked += 1;
            self.counted = Some(self.seen);
            self.barrier.changed.notify_all();
        }
    }
}

impl Drop for TickWaiter {
    fn drop(&mut self) {
        let mut state = self.barrier.lock();
        if state.generation == self.joined {
            state.joining = state.joining.saturating_sub(1);
        } else {
            state.waiters = state.waiters.saturating_sub(1);
            if self.counted == Some(state.generation) {
                state.acked = state.acked.saturating_sub(1);
            }
        }
        self.barrier.changed.notify_all();
    }
}

const REMOTE_POLL: Duration = Duration::from_millis(10);

/// A CIA clocked from its own thread through a [`TickBarrier`].
#[derive(Debug)]
pub struct RemoteCia {
    cia: Arc<Mutex<Cia8520>>,
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl RemoteCia {
    /// The waiter is registered before this returns, so the next release
    /// already counts it.
    #[must_use]
    pub fn spawn(barrier: &Arc<TickBarrier>, cia: Cia8520) -> Self {
        let cia = Arc::new(Mutex::new(cia));
        let stop = Arc::new(AtomicBool::new(false));
        let mut waiter = barrier.register();
        let handle = {
            let cia = Arc::clone(&cia);
            let stop = Arc::clone(&stop);
            thread::spawn(move || {
                while !stop.load(Ordering::Acquire) {
                    if let Some(cycles) = waiter.wait_for_tick(REMOTE_POLL) {
                        cia.lock()
                            .unwrap_or_else(PoisonError::into_inner)
                            .emulate(cycles);
                        waiter.ack();
                    }
                }
            })
        };
        Self {
            cia,
            stop,
            handle: Some(handle),
        }
    }

    /// Access the CIA between rendezvous.
    pub fn with_cia<R>(&self, f: impl FnOnce(&mut Cia8520) -> R) -> R {
        let mut cia = self.cia.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut cia)
    }

    /// Stop the thread and deregister its waiter.
    pub fn shutdown(&mut self) {
        self.stop.store(true, Ordering::Release);
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                log::warn!("remote CIA thread panicked");
            }
        }
    }
}

impl Drop for RemoteCia {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mos_cia_8520::{ICR_TA, reg};
    use proptest::prelude::*;

    const TIMEOUT: Duration = Duration::from_secs(5);
    const SHORT: Duration = Duration::from_millis(50);

    #[test]
    fn rendezvous_completes_when_every_waiter_acks() {
        let barrier = TickBarrier::new(BarrierPolicy::Strict);
        let mut waiter = barrier.register();
        let worker = thread::spawn(move || {
            let cycles = waiter.wait_for_tick(TIMEOUT);
            waiter.ack();
            cycles
        });
        // The worker may not be waiting yet; the generation is kept for it.
        let generation = barrier.release(454);
        assert_eq!(generation, 1);
        assert_eq!(barrier.wait_for_acks(TIMEOUT), Ok(()));
        assert_eq!(worker.join().expect("worker thread"), Some(454));
    }

    #[test]
    fn silent_waiter_fails_strict_barrier() {
        let barrier = TickBarrier::new(BarrierPolicy::Strict);
        let _waiter = barrier.register();
        barrier.release(10);
        assert_eq!(
            barrier.wait_for_acks(SHORT),
            Err(BarrierError::MissedAck {
                generation: 1,
                outstanding: 1,
                timeout: SHORT,
            })
        );
    }

    #[test]
    fn lenient_barrier_counts_and_proceeds() {
        let barrier = TickBarrier::new(BarrierPolicy::Lenient);
        let _waiter = barrier.register();
        barrier.release(10);
        assert_eq!(barrier.wait_for_acks(SHORT), Ok(()));
        barrier.release(10);
        assert_eq!(barrier.wait_for_acks(SHORT), Ok(()));
        assert_eq!(barrier.missed_acks(), 2);
    }

    #[test]
    fn dropped_waiter_no_longer_blocks() {
        let barrier = TickBarrier::new(BarrierPolicy::Strict);
        let waiter = barrier.register();
        assert_eq!(barrier.waiters(), 1);
        drop(waiter);
        assert_eq!(barrier.waiters(), 0);
        barrier.release(10);
        assert_eq!(barrier.wait_for_acks(SHORT), Ok(()));
    }

    #[test]
    fn wait_for_tick_times_out_without_release() {
        let barrier = TickBarrier::new(BarrierPolicy::Strict);
        let mut waiter = barrier.register();
        assert_eq!(waiter.wait_for_tick(SHORT), None);
    }

    #[test]
    fn double_ack_counts_once() {
        let barrier = TickBarrier::new(BarrierPolicy::Strict);
        let mut first = barrier.register();
        let _second = barrier.register();
        barrier.release(2);
        assert_eq!(first.wait_for_tick(SHORT), Some(2));
        first.ack();
        first.ack();
        assert!(barrier.wait_for_acks(SHORT).is_err());
    }

    #[test]
    fn late_joiner_does_not_block_the_current_generation() {
        let barrier = TickBarrier::new(BarrierPolicy::Strict);
        let mut first = barrier.register();
        barrier.release(1);
        assert_eq!(first.wait_for_tick(SHORT), Some(1));
        first.ack();
        let _late = barrier.register();
        assert_eq!(barrier.wait_for_acks(SHORT), Ok(()));
    }

    #[test]
    fn dropping_a_late_joiner_keeps_earlier_acks() {
        let barrier = TickBarrier::new(BarrierPolicy::Strict);
        let mut first = barrier.register();
        barrier.release(1);
        assert_eq!(first.wait_for_tick(SHORT), Some(1));
        first.ack();
        let late = barrier.register();
        drop(late);
        assert_eq!(barrier.wait_for_acks(SHORT), Ok(()));
        assert_eq!(barrier.waiters(), 1);
    }

    #[test]
    fn joiner_is_owed_from_the_next_generation() {
        let barrier = TickBarrier::new(BarrierPolicy::Strict);
        let mut first = barrier.register();
        barrier.release(1);
        assert_eq!(first.wait_for_tick(SHORT), Some(1));
        first.ack();
        let mut second = barrier.register();
        assert_eq!(barrier.wait_for_acks(SHORT), Ok(()));
        // Nothing published since it joined.
        assert_eq!(second.wait_for_tick(SHORT), None);
        second.ack();

        barrier.release(2);
        assert_eq!(first.wait_for_tick(SHORT), Some(2));
        first.ack();
        assert_eq!(
            barrier.wait_for_acks(SHORT),
            Err(BarrierError::MissedAck {
                generation: 2,
                outstanding: 1,
                timeout: SHORT,
            })
        );
        assert_eq!(second.wait_for_tick(SHORT), Some(2));
        second.ack();
        assert_eq!(barrier.wait_for_acks(SHORT), Ok(()));
    }

    #[test]
    fn acked_waiter_leaving_takes_only_its_own_ack() {
        let barrier = TickBarrier::new(BarrierPolicy::Strict);
        let mut first = barrier.register();
        let mut second = barrier.register();
        barrier.release(3);
        assert_eq!(first.wait_for_tick(SHORT), Some(3));
        first.ack();
        drop(first);
        assert_eq!(
            barrier.wait_for_acks(SHORT),
            Err(BarrierError::MissedAck {
                generation: 1,
                outstanding: 1,
                timeout: SHORT,
            })
        );
        assert_eq!(second.wait_for_tick(SHORT), Some(3));
        second.ack();
        assert_eq!(barrier.wait_for_acks(SHORT), Ok(()));
    }

    #[test]
    fn stale_ack_does_not_count_for_a_newer_generation() {
        let barrier = TickBarrier::new(BarrierPolicy::Strict);
        let mut waiter = barrier.register();
        barrier.release(1);
        assert_eq!(waiter.wait_for_tick(SHORT), Some(1));
        barrier.release(1);
        waiter.ack();
        assert!(barrier.wait_for_acks(SHORT).is_err());
    }

    #[derive(Debug, Clone)]
    enum Step {
        Register,
        Leave(usize),
        TickAndAck(usize),
        Release,
    }

    fn step() -> impl Strategy<Value = Step> {
        prop_oneof![
            Just(Step::Register),
            any::<usize>().prop_map(Step::Leave),
            any::<usize>().prop_map(Step::TickAndAck),
            Just(Step::Release),
        ]
    }

    /// A waiter with the generations the model expects it to have seen.
    struct Tracked {
        waiter: TickWaiter,
        joined: u64,
        seen: u64,
        acked: Option<u64>,
    }

    proptest! {
        #[test]
        fn outstanding_acks_follow_joins_and_leaves(steps in prop::collection::vec(step(), 1..48)) {
            let barrier = TickBarrier::new(BarrierPolicy::Strict);
            let mut live: Vec<Tracked> = Vec::new();
            let mut generation = 0u64;
            for step in steps {
                match step {
                    Step::Register => live.push(Tracked {
                        waiter: barrier.register(),
                        joined: generation,
                        seen: generation,
                        acked: None,
                    }),
                    Step::Leave(i) if !live.is_empty() => {
                        let i = i % live.len();
                        drop(live.remove(i));
                    }
                    Step::TickAndAck(i) if !live.is_empty() => {
                        let i = i % live.len();
                        let tracked = &mut live[i];
                        let tick = tracked.waiter.wait_for_tick(Duration::ZERO);
                        prop_assert_eq!(tick.is_some(), tracked.seen != generation);
                        tracked.seen = generation;
                        tracked.waiter.ack();
                        if tracked.joined < generation {
                            tracked.acked = Some(generation);
                        }
                    }
                    Step::Release => {
                        generation = barrier.release(7);
                    }
                    Step::Leave(_) | Step::TickAndAck(_) => {}
                }

                let outstanding = live
                    .iter()
                    .filter(|t| t.joined < generation && t.acked != Some(generation))
                    .count();
                let expected = if outstanding == 0 {
                    Ok(())
                } else {
                    Err(BarrierError::MissedAck {
                        generation,
                        outstanding,
                        timeout: Duration::ZERO,
                    })
                };
                prop_assert_eq!(barrier.wait_for_acks(Duration::ZERO), expected);
                prop_assert_eq!(barrier.waiters(), live.len());
            }
        }
    }

    #[test]
    fn remote_cia_emulates_published_cycles() {
        let barrier = TickBarrier::new(BarrierPolicy::Strict);
        let mut cia = Cia8520::new();
        cia.write(reg::TAHI, 0);
        cia.write(reg::TALO, 10);
        cia.write(reg::CRA, 0x10);
        cia.write(reg::CRA, 0x01);
        let mut remote = RemoteCia::spawn(&barrier, cia);

        barrier.release(100);
        assert_eq!(barrier.wait_for_acks(TIMEOUT), Ok(()));
        let (pending, counter) = remote.with_cia(|cia| (cia.icr_pending(), cia.timer_a()));
        assert_ne!(pending & ICR_TA, 0);
        assert_eq!(counter, 10);

        remote.shutdown();
        assert_eq!(barrier.waiters(), 0);
    }
}
