//! The FIFO job queue sequencing pipeline work.
//!
//! Jobs drain strictly in enqueue order, one at a time; a job's completion
//! is its future resolving. External parties (root lists during source
//! discovery, the watcher while it classifies a change burst) hold the
//! queue with [`AsyncQueue::lock`]: draining only happens while the lock
//! count is zero. [`AsyncQueue::drained`] resolves the next time the queue
//! runs empty.

use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};

use tokio::sync::oneshot;

type Job = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

#[derive(Default)]
struct QueueState {
  jobs: VecDeque<Job>,
  lock_count: usize,
  running: bool,
  waiters: Vec<oneshot::Sender<()>>,
}

/// A shared FIFO of async jobs with an external lock counter.
#[derive(Clone, Default)]
pub struct AsyncQueue {
  state: Arc<Mutex<QueueState>>,
}

impl AsyncQueue {
  pub fn new() -> AsyncQueue {
    AsyncQueue::default()
  }

  /// Append a job. It runs after every previously enqueued job has
  /// completed, and only while the queue is unlocked.
  pub fn enqueue<F>(&self, job: F)
  where
    F: Future<Output = ()> + Send + 'static,
  {
    {
      let mut state = self.state.lock().expect("queue poisoned");
      state.jobs.push_back(Box::pin(job));
    }
    self.maybe_drain();
  }

  /// Append a synchronous job.
  pub fn enqueue_sync<F>(&self, job: F)
  where
    F: FnOnce() + Send + 'static,
  {
    self.enqueue(async move { job() });
  }

  /// Hold the queue: no further jobs start until a matching `unlock`.
  /// Locks nest.
  pub fn lock(&self) {
    let mut state = self.state.lock().expect("queue poisoned");
    state.lock_count += 1;
  }

  /// Release one hold; at zero the queue resumes draining.
  pub fn unlock(&self) {
    {
      let mut state = self.state.lock().expect("queue poisoned");
      state.lock_count = state.lock_count.saturating_sub(1);
    }
    self.maybe_drain();
  }

  /// Jobs currently waiting (not counting the running one).
  pub fn len(&self) -> usize {
    self.state.lock().expect("queue poisoned").jobs.len()
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }

  /// Whether nothing is queued or running.
  pub fn is_idle(&self) -> bool {
    let state = self.state.lock().expect("queue poisoned");
    state.jobs.is_empty() && !state.running
  }

  /// Resolves the next time the queue has no queued and no running job.
  /// Resolves immediately when already idle.
  pub async fn drained(&self) {
    let rx = {
      let mut state = self.state.lock().expect("queue poisoned");
      if state.jobs.is_empty() && !state.running {
        return;
      }
      let (tx, rx) = oneshot::channel();
      state.waiters.push(tx);
      rx
    };
    let _ = rx.await;
  }

  fn maybe_drain(&self) {
    let start = {
      let mut state = self.state.lock().expect("queue poisoned");
      if state.running || state.lock_count > 0 || state.jobs.is_empty() {
        false
      } else {
        state.running = true;
        true
      }
    };
    if start {
      let queue = self.clone();
      tokio::spawn(async move { queue.drain().await });
    }
  }

  async fn drain(&self) {
    loop {
      let job = {
        let mut state = self.state.lock().expect("queue poisoned");
        if state.lock_count > 0 {
          state.running = false;
          return;
        }
        match state.jobs.pop_front() {
          Some(job) => job,
          None => {
            state.running = false;
            for tx in state.waiters.drain(..) {
              let _ = tx.send(());
            }
            return;
          }
        }
      };
      job.await;
    }
  }
}

impl std::fmt::Debug for AsyncQueue {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    let state = self.state.lock().expect("queue poisoned");
    f.debug_struct("AsyncQueue")
      .field("jobs", &state.jobs.len())
      .field("lock_count", &state.lock_count)
      .field("running", &state.running)
      .finish()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::sync::atomic::{AtomicUsize, Ordering};
  use std::time::Duration;

  #[tokio::test]
  async fn jobs_run_fifo() {
    let queue = AsyncQueue::new();
    let order = Arc::new(Mutex::new(Vec::new()));

    for n in 0..5 {
      let order = order.clone();
      queue.enqueue(async move {
        // Later jobs sleeping less would finish first if they ran
        // concurrently.
        tokio::time::sleep(Duration::from_millis(20 - n * 4)).await;
        order.lock().unwrap().push(n);
      });
    }

    queue.drained().await;
    assert_eq!(*order.lock().unwrap(), vec![0, 1, 2, 3, 4]);
  }

  #[tokio::test]
  async fn completion_precedes_next_start() {
    let queue = AsyncQueue::new();
    let active = Arc::new(AtomicUsize::new(0));
    let max_seen = Arc::new(AtomicUsize::new(0));

    for _ in 0..4 {
      let active = active.clone();
      let max_seen = max_seen.clone();
      queue.enqueue(async move {
        let now = active.fetch_add(1, Ordering::SeqCst) + 1;
        max_seen.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(5)).await;
        active.fetch_sub(1, Ordering::SeqCst);
      });
    }

    queue.drained().await;
    assert_eq!(max_seen.load(Ordering::SeqCst), 1);
  }

  #[tokio::test]
  async fn locked_queue_does_not_drain() {
    let queue = AsyncQueue::new();
    let ran = Arc::new(AtomicUsize::new(0));

    queue.lock();
    {
      let ran = ran.clone();
      queue.enqueue(async move {
        ran.fetch_add(1, Ordering::SeqCst);
      });
    }

    tokio::time::sleep(Duration::from_millis(30)).await;
    assert_eq!(ran.load(Ordering::SeqCst), 0);

    queue.unlock();
    queue.drained().await;
    assert_eq!(ran.load(Ordering::SeqCst), 1);
  }

  #[tokio::test]
  async fn nested_locks_require_matching_unlocks() {
    let queue = AsyncQueue::new();
    let ran = Arc::new(AtomicUsize::new(0));

    queue.lock();
    queue.lock();
    {
      let ran = ran.clone();
      queue.enqueue(async move {
        ran.fetch_add(1, Ordering::SeqCst);
      });
    }

    queue.unlock();
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(ran.load(Ordering::SeqCst), 0);

    queue.unlock();
    queue.drained().await;
    assert_eq!(ran.load(Ordering::SeqCst), 1);
  }

  #[tokio::test]
  async fn drained_resolves_immediately_when_idle() {
    let queue = AsyncQueue::new();
    tokio::time::timeout(Duration::from_millis(50), queue.drained())
      .await
      .expect("idle queue should resolve drained() immediately");
  }

  #[tokio::test]
  async fn jobs_enqueued_during_drain_run_in_order() {
    let queue = AsyncQueue::new();
    let order = Arc::new(Mutex::new(Vec::new()));

    {
      let order = order.clone();
      let inner_queue = queue.clone();
      queue.enqueue(async move {
        order.lock().unwrap().push("first");
        let order = order.clone();
        inner_queue.enqueue(async move {
          order.lock().unwrap().push("third");
        });
      });
    }
    {
      let order = order.clone();
      queue.enqueue(async move {
        order.lock().unwrap().push("second");
      });
    }

    queue.drained().await;
    assert_eq!(*order.lock().unwrap(), vec!["first", "second", "third"]);
  }

  #[tokio::test]
  async fn lock_pauses_between_jobs() {
    let queue = AsyncQueue::new();
    let ran = Arc::new(AtomicUsize::new(0));

    {
      let ran = ran.clone();
      let inner = queue.clone();
      queue.enqueue(async move {
        ran.fetch_add(1, Ordering::SeqCst);
        // Lock from inside a job: the next job must not start.
        inner.lock();
      });
    }
    {
      let ran = ran.clone();
      queue.enqueue(async move {
        ran.fetch_add(1, Ordering::SeqCst);
      });
    }

    tokio::time::sleep(Duration::from_millis(30)).await;
    assert_eq!(ran.load(Ordering::SeqCst), 1);

    queue.unlock();
    queue.drained().await;
    assert_eq!(ran.load(Ordering::SeqCst), 2);
  }
}
