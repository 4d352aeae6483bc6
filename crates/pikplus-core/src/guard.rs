use std::sync::Arc;
use std::sync::atomic::{
  AtomicBool,
  Ordering
};
use std::thread;
use std::time::Duration;

use tracing::{
  debug,
  warn
};

/// Shared "still active" flag handed to
/// every asynchronous call. Results that
/// arrive after teardown are dropped.
#[derive(Debug, Clone)]
pub struct ActiveGuard {
  active: Arc<AtomicBool>
}

impl Default for ActiveGuard {
  fn default() -> Self {
    Self::new()
  }
}

impl ActiveGuard {
  pub fn new() -> Self {
    Self {
      active: Arc::new(AtomicBool::new(
        true
      ))
    }
  }

  pub fn is_active(&self) -> bool {
    self.active.load(Ordering::Acquire)
  }

  pub fn deactivate(&self) {
    self
      .active
      .store(false, Ordering::Release);
  }

  /// Runs `apply` only while active.
  pub fn apply_if_active<T, F>(
    &self,
    value: T,
    apply: F
  ) -> bool
  where
    F: FnOnce(T)
  {
    if !self.is_active() {
      debug!(
        "discarding result after \
         teardown"
      );
      return false;
    }
    apply(value);
    true
  }
}

#[derive(
  Debug, Clone, Copy, PartialEq, Eq,
)]
pub enum TickOutcome {
  Applied,
  Failed,
  Discarded
}

/// Fixed-interval re-fetch loop. There
/// is no cancellation of a fetch in
/// flight; its result is discarded once
/// the guard is down.
#[derive(Debug, Clone)]
pub struct Poller {
  interval: Duration,
  guard:    ActiveGuard
}

impl Poller {
  pub fn new(
    interval: Duration,
    guard: ActiveGuard
  ) -> Self {
    Self {
      interval,
      guard
    }
  }

  pub fn guard(&self) -> &ActiveGuard {
    &self.guard
  }

  pub fn tick<T, Fetch, Apply>(
    &self,
    fetch: &mut Fetch,
    apply: &mut Apply
  ) -> TickOutcome
  where
    Fetch: FnMut() -> anyhow::Result<T>,
    Apply: FnMut(T)
  {
    if !self.guard.is_active() {
      return TickOutcome::Discarded;
    }

    match fetch() {
      | Ok(value) => {
        if self
          .guard
          .apply_if_active(value, |v| {
            apply(v)
          })
        {
          TickOutcome::Applied
        } else {
          TickOutcome::Discarded
        }
      }
      | Err(err) => {
        warn!(error = %format!("{err:#}"), "poll fetch failed; retrying next interval");
        TickOutcome::Failed
      }
    }
  }

  /// Blocks until the guard is
  /// deactivated; returns the number of
  /// applied results.
  #[tracing::instrument(skip_all, fields(interval_ms = self.interval.as_millis() as u64))]
  pub fn run<T, Fetch, Apply>(
    &self,
    mut fetch: Fetch,
    mut apply: Apply
  ) -> usize
  where
    Fetch: FnMut() -> anyhow::Result<T>,
    Apply: FnMut(T)
  {
    let mut applied = 0_usize;
    while self.guard.is_active() {
      if self.tick(&mut fetch, &mut apply)
        == TickOutcome::Applied
      {
        applied += 1;
      }
      if !self.guard.is_active() {
        break;
      }
      thread::sleep(self.interval);
    }

    debug!(applied, "poller stopped");
    applied
  }
}

#[cfg(test)]
mod tests {
  use anyhow::anyhow;

  use super::*;

  #[test]
  fn guard_blocks_late_results() {
    let guard = ActiveGuard::new();
    let mut seen = Vec::new();

    assert!(
      guard.apply_if_active(1, |v| seen
        .push(v))
    );
    guard.clone().deactivate();
    assert!(
      !guard.apply_if_active(2, |v| seen
        .push(v))
    );
    assert_eq!(seen, vec![1]);
  }

  #[test]
  fn in_flight_fetch_is_discarded_on_teardown()
   {
    let guard = ActiveGuard::new();
    let poller = Poller::new(
      Duration::from_millis(1),
      guard.clone()
    );
    let mut applied = Vec::new();

    let teardown = guard.clone();
    let mut fetch =
      || -> anyhow::Result<i32> {
      teardown.deactivate();
      Ok(5)
    };
    let outcome = poller
      .tick(&mut fetch, &mut |v: i32| {
        applied.push(v)
      });

    assert_eq!(
      outcome,
      TickOutcome::Discarded
    );
    assert!(applied.is_empty());
  }

  #[test]
  fn failures_do_not_stop_polling() {
    let guard = ActiveGuard::new();
    let poller = Poller::new(
      Duration::from_millis(1),
      guard.clone()
    );

    let mut calls = 0_u32;
    let stopper = guard.clone();
    let mut values = Vec::new();
    let applied = poller.run(
      || {
        calls += 1;
        match calls {
          | 1 => Err(anyhow!("offline")),
          | 2 => Ok(calls),
          | _ => {
            stopper.deactivate();
            Ok(calls)
          }
        }
      },
      |v| values.push(v)
    );

    assert_eq!(applied, 1);
    assert_eq!(values, vec![2]);
    assert_eq!(calls, 3);
  }
}
