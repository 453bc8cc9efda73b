use std::sync::atomic::{AtomicUsize, Ordering, fence};
use std::sync::{Condvar, Mutex, PoisonError};

/// The wake/sleep primitive shared by all workers.
///
/// Two populations wait here, each on its own condvar:
/// - idle workers, whose predicates are all "work exists or termination";
///   any one of them can take a new job, so they are woken one at a time;
/// - jobs parked through `put_current_worker_to_sleep_until`, each on its
///   own predicate; a notification meant for one could not be handed on,
///   so they are always woken together.
///
/// The handshake cannot lose a wakeup:
///
/// - a sleeper registers in its counter, issues a SeqCst fence, then
///   evaluates its predicate under `lock`;
/// - a waker publishes its work, issues a SeqCst fence, then reads both
///   counters, and only takes `lock` to notify if someone is registered.
///
/// With the two fences, either the sleeper sees the new work or the waker
/// sees the sleeper. When the waker takes the lock, the sleeper is either
/// still before its predicate check (and will see the work) or already
/// parked on its condvar (and will be notified).
pub(crate) struct Sleeper {
    /// Idle workers registered as sleeping.
    idle: AtomicUsize,

    /// Jobs registered as parked.
    parked: AtomicUsize,

    /// Serializes predicate checks against notification.
    lock: Mutex<()>,

    /// Idle workers park here.
    idle_condvar: Condvar,

    /// Parked jobs wait here.
    parked_condvar: Condvar,
}

impl Sleeper {
    pub(crate) fn new() -> Self {
        Self {
            idle: AtomicUsize::new(0),
            parked: AtomicUsize::new(0),
            lock: Mutex::new(()),
            idle_condvar: Condvar::new(),
            parked_condvar: Condvar::new(),
        }
    }

    /// Blocks an idle worker until `wake` returns `true`.
    ///
    /// `wake` is evaluated under the sleeper lock, first before parking and
    /// then after every notification (spurious or not).
    pub(crate) fn sleep_until(&self, wake: impl FnMut() -> bool) {
        self.wait(&self.idle, &self.idle_condvar, wake);
    }

    /// Blocks a job until `wake` returns `true`.
    ///
    /// Same contract as [`sleep_until`](Self::sleep_until), but the caller
    /// is re-checked on every wakeup regardless of its count.
    pub(crate) fn park_until(&self, wake: impl FnMut() -> bool) {
        self.wait(&self.parked, &self.parked_condvar, wake);
    }

    fn wait(&self, registered: &AtomicUsize, condvar: &Condvar, mut wake: impl FnMut() -> bool) {
        let mut guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);

        registered.fetch_add(1, Ordering::SeqCst);
        fence(Ordering::SeqCst);

        while !wake() {
            guard = condvar.wait(guard).unwrap_or_else(PoisonError::into_inner);
        }

        registered.fetch_sub(1, Ordering::SeqCst);
    }

    /// Wakes up to `count` idle workers, and every parked job.
    ///
    /// Cheap when nobody sleeps: a fence and two loads.
    pub(crate) fn wake(&self, count: usize) {
        if count == 0 {
            return;
        }

        fence(Ordering::SeqCst);
        if self.idle.load(Ordering::SeqCst) == 0 && self.parked.load(Ordering::SeqCst) == 0 {
            return;
        }

        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);

        // Registration happens under the lock, so these are exact here.
        let idle = self.idle.load(Ordering::Relaxed);
        if count >= idle {
            self.idle_condvar.notify_all();
        } else {
            for _ in 0..count {
                self.idle_condvar.notify_one();
            }
        }

        if self.parked.load(Ordering::Relaxed) > 0 {
            self.parked_condvar.notify_all();
        }
    }

    /// Wakes every sleeper, unconditionally taking the lock.
    pub(crate) fn wake_all(&self) {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        self.idle_condvar.notify_all();
        self.parked_condvar.notify_all();
    }

    /// Number of idle workers currently registered as sleeping.
    #[cfg(test)]
    pub(crate) fn sleeping(&self) -> usize {
        self.idle.load(Ordering::Relaxed)
    }

    /// Number of jobs currently registered as parked.
    #[cfg(test)]
    pub(crate) fn parked(&self) -> usize {
        self.parked.load(Ordering::Relaxed)
    }
}

/// Startup barrier: construction blocks until every worker has checked in.
pub(crate) struct StartupLatch {
    /// Workers that have not reported ready yet.
    remaining: Mutex<usize>,

    /// Signalled when `remaining` reaches zero.
    condvar: Condvar,
}

impl StartupLatch {
    pub(crate) fn new(count: usize) -> Self {
        Self {
            remaining: Mutex::new(count),
            condvar: Condvar::new(),
        }
    }

    /// Reports one worker as ready.
    pub(crate) fn count_down(&self) {
        let mut remaining = self
            .remaining
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        *remaining = remaining.saturating_sub(1);
        if *remaining == 0 {
            self.condvar.notify_all();
        }
    }

    /// Blocks until every worker has reported ready.
    pub(crate) fn wait(&self) {
        let remaining = self
            .remaining
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        let _ready = self
            .condvar
            .wait_while(remaining, |remaining| *remaining > 0)
            .unwrap_or_else(PoisonError::into_inner);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::Arc;
    use std::sync::atomic::AtomicBool;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn sleep_returns_immediately_when_predicate_holds() {
        let sleeper = Sleeper::new();
        sleeper.sleep_until(|| true);
        assert_eq!(sleeper.sleeping(), 0);
    }

    #[test]
    fn wake_releases_a_sleeper() {
        let sleeper = Arc::new(Sleeper::new());
        let flag = Arc::new(AtomicBool::new(false));

        let handle = {
            let sleeper = sleeper.clone();
            let flag = flag.clone();
            thread::spawn(move || sleeper.sleep_until(|| flag.load(Ordering::Relaxed)))
        };

        while sleeper.sleeping() == 0 {
            thread::yield_now();
        }

        flag.store(true, Ordering::Relaxed);
        sleeper.wake(1);

        handle.join().unwrap();
        assert_eq!(sleeper.sleeping(), 0);
    }

    #[test]
    fn wake_without_sleepers_is_a_no_op() {
        let sleeper = Sleeper::new();
        sleeper.wake(4);
        sleeper.wake_all();
        assert_eq!(sleeper.sleeping(), 0);
    }

    #[test]
    fn racing_wakeups_are_never_lost() {
        for _ in 0..200 {
            let sleeper = Arc::new(Sleeper::new());
            let flag = Arc::new(AtomicBool::new(false));

            let handle = {
                let sleeper = sleeper.clone();
                let flag = flag.clone();
                thread::spawn(move || sleeper.sleep_until(|| flag.load(Ordering::Relaxed)))
            };

            flag.store(true, Ordering::Relaxed);
            sleeper.wake(1);

            handle.join().unwrap();
        }
    }

    #[test]
    fn wake_one_releases_a_single_idle_worker() {
        const SLEEPERS: usize = 6;

        let sleeper = Arc::new(Sleeper::new());
        let tokens = Arc::new(AtomicUsize::new(0));
        let evaluations = Arc::new(AtomicUsize::new(0));
        let released = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..SLEEPERS)
            .map(|_| {
                let sleeper = sleeper.clone();
                let tokens = tokens.clone();
                let evaluations = evaluations.clone();
                let released = released.clone();

                thread::spawn(move || {
                    sleeper.sleep_until(|| {
                        evaluations.fetch_add(1, Ordering::Relaxed);
                        tokens
                            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |t| t.checked_sub(1))
                            .is_ok()
                    });
                    released.fetch_add(1, Ordering::Relaxed);
                })
            })
            .collect();

        while sleeper.sleeping() < SLEEPERS {
            thread::yield_now();
        }

        tokens.store(1, Ordering::Relaxed);
        sleeper.wake(1);

        while released.load(Ordering::Relaxed) == 0 {
            thread::yield_now();
        }
        thread::sleep(Duration::from_millis(20));

        // One initial check per sleeper, then (barring spurious wakeups)
        // a single re-check by the worker that was woken.
        assert_eq!(released.load(Ordering::Relaxed), 1);
        assert!(evaluations.load(Ordering::Relaxed) < 2 * SLEEPERS);
        assert_eq!(sleeper.sleeping(), SLEEPERS - 1);

        tokens.store(SLEEPERS - 1, Ordering::Relaxed);
        sleeper.wake_all();

        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(sleeper.sleeping(), 0);
    }

    #[test]
    fn wake_one_reaches_a_parked_job_behind_idle_workers() {
        let sleeper = Arc::new(Sleeper::new());
        let stop = Arc::new(AtomicBool::new(false));
        let ready = Arc::new(AtomicBool::new(false));

        let idle: Vec<_> = (0..3)
            .map(|_| {
                let sleeper = sleeper.clone();
                let stop = stop.clone();
                thread::spawn(move || sleeper.sleep_until(|| stop.load(Ordering::Relaxed)))
            })
            .collect();

        let parked = {
            let sleeper = sleeper.clone();
            let ready = ready.clone();
            thread::spawn(move || sleeper.park_until(|| ready.load(Ordering::Relaxed)))
        };

        while sleeper.sleeping() < 3 || sleeper.parked() < 1 {
            thread::yield_now();
        }

        ready.store(true, Ordering::Relaxed);
        sleeper.wake(1);

        parked.join().unwrap();
        assert_eq!(sleeper.parked(), 0);

        stop.store(true, Ordering::Relaxed);
        sleeper.wake_all();

        for handle in idle {
            handle.join().unwrap();
        }
    }

    #[test]
    fn latch_waits_for_every_count_down() {
        let latch = Arc::new(StartupLatch::new(3));

        let handles: Vec<_> = (0..3)
            .map(|i| {
                let latch = latch.clone();
                thread::spawn(move || {
                    thread::sleep(Duration::from_millis(i * 5));
                    latch.count_down();
                })
            })
            .collect();

        latch.wait();

        for handle in handles {
            handle.join().unwrap();
        }
    }

    #[test]
    fn latch_of_zero_does_not_block() {
        StartupLatch::new(0).wait();
    }
}
