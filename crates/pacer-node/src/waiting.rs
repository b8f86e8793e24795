// Bounded busy-wait: poll a predicate until it holds or the deadline
// passes. No sleeping and no condition variables; the node runs on a
// dedicated thread and trades CPU for predictable wake-up latency.
use std::sync::OnceLock;
use std::time::{Duration, Instant};

/// Monotonic nanosecond clock, injected so tests control time.
pub trait Clock {
    fn nano_time(&self) -> u64;
}

/// Clock backed by `Instant`, anchored at first use.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn nano_time(&self) -> u64 {
        static ANCHOR: OnceLock<Instant> = OnceLock::new();
        let anchor = *ANCHOR.get_or_init(Instant::now);
        anchor.elapsed().as_nanos() as u64
    }
}

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
#[error("condition not met within {timeout:?}")]
pub struct TimeoutError {
    pub timeout: Duration,
}

/// Spin until `predicate` returns true, or fail once the elapsed time
/// on `clock` exceeds `timeout`. The predicate is always evaluated
/// before the deadline check, so an already-true condition succeeds
/// even with a zero timeout.
///
/// ```
/// use pacer_node::{await_condition, SystemClock};
/// use std::time::Duration;
///
/// await_condition(|| true, Duration::ZERO, &SystemClock).expect("immediate");
/// ```
pub fn await_condition<P, C>(
    mut predicate: P,
    timeout: Duration,
    clock: &C,
) -> Result<(), TimeoutError>
where
    P: FnMut() -> bool,
    C: Clock + ?Sized,
{
    let deadline = clock
        .nano_time()
        .saturating_add(timeout.as_nanos().min(u64::MAX as u128) as u64);
    loop {
        if predicate() {
            return Ok(());
        }
        if clock.nano_time() > deadline {
            return Err(TimeoutError { timeout });
        }
        std::hint::spin_loop();
    }
}
