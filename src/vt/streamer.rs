//! Background page loading.
//!
//! A single worker thread drains a request queue through a [`PageAccessor`]
//! and posts results to a completion queue the render thread polls without
//! blocking. Requests are deduplicated: a page already queued or loading is
//! not requested again until its result has been polled.

use std::collections::{HashSet, VecDeque};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;

use super::accessor::PageAccessor;
use super::page::PageKey;

/// A finished load. `data` is `None` when the accessor failed; the page may
/// be requested again on a later frame.
#[derive(Debug)]
pub struct LoadedPage {
    /// The requested page.
    pub key: PageKey,
    /// Page pixels, or `None` on load failure.
    pub data: Option<Vec<u8>>,
}

enum Task {
    Load(PageKey),
    Stop,
}

struct Shared {
    tasks: Mutex<VecDeque<Task>>,
    task_signal: Condvar,
    results: Mutex<VecDeque<LoadedPage>>,
}

/// Handle to the page loading thread.
pub struct PageStreamer {
    shared: Arc<Shared>,
    in_flight: HashSet<PageKey>,
    worker: Option<JoinHandle<()>>,
}

impl PageStreamer {
    /// Spawn the loading thread over an accessor.
    pub fn new(accessor: Box<dyn PageAccessor>) -> Self {
        let shared = Arc::new(Shared {
            tasks: Mutex::new(VecDeque::new()),
            task_signal: Condvar::new(),
            results: Mutex::new(VecDeque::new()),
        });

        let worker_shared = Arc::clone(&shared);
        let worker = std::thread::Builder::new()
            .name("page_streamer".to_string())
            .spawn(move || worker_loop(worker_shared, accessor))
            .expect("failed to spawn page streamer thread");

        Self {
            shared,
            in_flight: HashSet::new(),
            worker: Some(worker),
        }
    }

    /// Queue a page load. Deduplicated: returns false if the page is
    /// already queued or loading.
    pub fn request(&mut self, key: PageKey) -> bool {
        if !self.in_flight.insert(key) {
            return false;
        }
        let mut tasks = self.shared.tasks.lock().expect("streamer task queue poisoned");
        tasks.push_back(Task::Load(key));
        self.shared.task_signal.notify_one();
        true
    }

    /// Take one finished load, if any. Never blocks.
    pub fn poll_result(&mut self) -> Option<LoadedPage> {
        let loaded = self
            .shared
            .results
            .lock()
            .expect("streamer result queue poisoned")
            .pop_front()?;
        self.in_flight.remove(&loaded.key);
        Some(loaded)
    }

    /// Number of pages queued or loading.
    pub fn pending_count(&self) -> usize {
        self.in_flight.len()
    }

    /// Check whether a page is queued or loading.
    pub fn is_in_flight(&self, key: PageKey) -> bool {
        self.in_flight.contains(&key)
    }
}

impl Drop for PageStreamer {
    fn drop(&mut self) {
        {
            let mut tasks = self.shared.tasks.lock().expect("streamer task queue poisoned");
            tasks.push_back(Task::Stop);
        }
        self.shared.task_signal.notify_one();
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                log::error!("page streamer thread panicked");
            }
        }
    }
}

impl std::fmt::Debug for PageStreamer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PageStreamer")
            .field("in_flight", &self.in_flight.len())
            .finish_non_exhaustive()
    }
}

fn worker_loop(shared: Arc<Shared>, accessor: Box<dyn PageAccessor>) {
    loop {
        let task = {
            let mut tasks = shared.tasks.lock().expect("streamer task queue poisoned");
            loop {
                match tasks.pop_front() {
                    Some(task) => break task,
                    None => {
                        tasks = shared
                            .task_signal
                            .wait(tasks)
                            .expect("streamer task queue poisoned");
                    }
                }
            }
        };

        match task {
            Task::Load(key) => {
                let data = accessor.read_page(key);
                if data.is_none() {
                    log::warn!("load failed for {key}");
                }
                shared
                    .results
                    .lock()
                    .expect("streamer result queue poisoned")
                    .push_back(LoadedPage { key, data });
            }
            Task::Stop => break,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vt::accessor::InMemoryPageAccessor;
    use std::time::{Duration, Instant};

    const PAGE_BYTES: usize = 8;

    fn wait_for_result(streamer: &mut PageStreamer) -> LoadedPage {
        let deadline = Instant::now() + Duration::from_secs(5);
        loop {
            if let Some(loaded) = streamer.poll_result() {
                return loaded;
            }
            assert!(Instant::now() < deadline, "streamer result timed out");
            std::thread::sleep(Duration::from_millis(1));
        }
    }

    #[test]
    fn test_loads_page_in_background() {
        let mut accessor = InMemoryPageAccessor::new(PAGE_BYTES);
        let key = PageKey::new(0, 0, 1, 1);
        accessor.insert(key, vec![5; PAGE_BYTES]);

        let mut streamer = PageStreamer::new(Box::new(accessor));
        assert!(streamer.request(key));

        let loaded = wait_for_result(&mut streamer);
        assert_eq!(loaded.key, key);
        assert_eq!(loaded.data, Some(vec![5; PAGE_BYTES]));
        assert_eq!(streamer.pending_count(), 0);
    }

    #[test]
    fn test_requests_deduplicate_until_polled() {
        let mut accessor = InMemoryPageAccessor::new(PAGE_BYTES);
        let key = PageKey::new(0, 0, 0, 0);
        accessor.insert(key, vec![1; PAGE_BYTES]);

        let mut streamer = PageStreamer::new(Box::new(accessor));
        assert!(streamer.request(key));
        assert!(!streamer.request(key));
        assert!(streamer.is_in_flight(key));

        let _ = wait_for_result(&mut streamer);
        // Polled, so the page may be requested again.
        assert!(streamer.request(key));
        let _ = wait_for_result(&mut streamer);
    }

    #[test]
    fn test_missing_page_reports_failure() {
        let accessor = InMemoryPageAccessor::new(PAGE_BYTES);
        let mut streamer = PageStreamer::new(Box::new(accessor));

        let key = PageKey::new(0, 0, 2, 2);
        streamer.request(key);
        let loaded = wait_for_result(&mut streamer);
        assert_eq!(loaded.key, key);
        assert_eq!(loaded.data, None);
    }

    #[test]
    fn test_drop_joins_worker() {
        let accessor = InMemoryPageAccessor::new(PAGE_BYTES);
        let streamer = PageStreamer::new(Box::new(accessor));
        drop(streamer);
    }
}
