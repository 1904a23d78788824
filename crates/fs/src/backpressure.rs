//! Process-wide open-file backpressure.
//!
//! When an operation fails with `EMFILE`/`ENFILE` it parks here instead of
//! burning retries. The completion of any other filesystem operation
//! releases one parked caller; a watchdog timer forces a retry if no
//! natural wake arrives. There is no configured concurrency limit: the
//! descriptor table itself is the limit.

use std::collections::VecDeque;
use std::sync::{Mutex, OnceLock};
use std::time::Duration;

use tokio::sync::oneshot;

/// How long a parked caller waits before retrying on its own.
pub(crate) const WATCHDOG: Duration = Duration::from_secs(4);

fn queue() -> &'static Mutex<VecDeque<oneshot::Sender<()>>> {
  static QUEUE: OnceLock<Mutex<VecDeque<oneshot::Sender<()>>>> = OnceLock::new();
  QUEUE.get_or_init(|| Mutex::new(VecDeque::new()))
}

/// Park until another operation completes or the watchdog fires.
pub(crate) async fn park_for_file_handle() {
  let (tx, rx) = oneshot::channel();
  {
    let mut pending = queue().lock().expect("backpressure queue poisoned");
    pending.push_back(tx);
  }
  tracing::debug!(parked = pending_count(), "open-file limit hit, parking");

  tokio::select! {
    _ = rx => {}
    _ = tokio::time::sleep(WATCHDOG) => {
      tracing::debug!("backpressure watchdog fired, retrying");
    }
  }
}

/// Sync variant: there is nothing to await, so a parked sync caller just
/// sleeps a slice of the watchdog interval.
pub(crate) fn park_for_file_handle_sync() {
  std::thread::sleep(WATCHDOG / 8);
}

/// Wake one parked caller. Called after every completed operation.
/// Senders whose receiver timed out and left are skipped.
pub(crate) fn release_one() {
  let mut pending = queue().lock().expect("backpressure queue poisoned");
  while let Some(tx) = pending.pop_front() {
    if tx.send(()).is_ok() {
      return;
    }
  }
}

/// Number of currently parked callers. Exposed for tests.
pub fn pending_count() -> usize {
  queue().lock().expect("backpressure queue poisoned").len()
}
