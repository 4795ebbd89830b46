use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::path::PathBuf;
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::thread::{self, JoinHandle};

use tracing::warn;

use super::tiles::TileKey;

/// Decoded tile pixels, shared between the cache and the renderer.
#[derive(Debug)]
pub struct TileImage {
    pub width: u32,
    pub height: u32,
    pub rgba: Vec<u8>,
}

#[derive(Debug)]
pub struct TileLoadResult {
    pub key: TileKey,
    /// `None` when the fetch or decode failed; the tile stays unloaded.
    pub image: Option<Arc<TileImage>>,
}

#[derive(Debug)]
struct QueuedRequest {
    key: TileKey,
    path: PathBuf,
    /// Squared world-pixel distance from the viewport centre at submit time.
    priority_sq: i64,
}

impl PartialEq for QueuedRequest {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for QueuedRequest {}

impl PartialOrd for QueuedRequest {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for QueuedRequest {
    fn cmp(&self, other: &Self) -> Ordering {
        // BinaryHeap pops the greatest element; invert so the nearest tile
        // (smallest distance) wins, with the key as a deterministic tiebreak.
        other
            .priority_sq
            .cmp(&self.priority_sq)
            .then_with(|| other.key.cmp(&self.key))
    }
}

#[derive(Debug, Default)]
struct SharedQueue {
    pending: BinaryHeap<QueuedRequest>,
    shutdown: bool,
}

#[derive(Debug, Default)]
struct PoolShared {
    queue: Mutex<SharedQueue>,
    available: Condvar,
}

/// Fixed-size worker pool decoding tile images off the main timeline.
/// Requests drain closest-first; completions come back over a channel and
/// are applied by the streamer on its own tick. Workers are joined on drop.
pub struct TileLoaderPool {
    shared: Arc<PoolShared>,
    results: Receiver<TileLoadResult>,
    workers: Vec<JoinHandle<()>>,
}

impl TileLoaderPool {
    pub fn new(worker_count: usize) -> Self {
        let shared = Arc::new(PoolShared::default());
        let (sender, results) = mpsc::channel();
        let workers = (0..worker_count.max(1))
            .map(|_| {
                let shared = Arc::clone(&shared);
                let sender = sender.clone();
                thread::spawn(move || worker_loop(shared, sender))
            })
            .collect();
        Self {
            shared,
            results,
            workers,
        }
    }

    pub fn submit(&self, key: TileKey, path: PathBuf, priority_sq: i64) {
        let mut queue = self
            .shared
            .queue
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        queue.pending.push(QueuedRequest {
            key,
            path,
            priority_sq,
        });
        drop(queue);
        self.shared.available.notify_one();
    }

    pub fn try_recv(&self) -> Option<TileLoadResult> {
        self.results.try_recv().ok()
    }

    #[cfg(test)]
    fn recv_timeout(&self, timeout: std::time::Duration) -> Option<TileLoadResult> {
        self.results.recv_timeout(timeout).ok()
    }
}

impl Drop for TileLoaderPool {
    fn drop(&mut self) {
        {
            let mut queue = self
                .shared
                .queue
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            queue.shutdown = true;
            // Queued-but-unstarted work is abandoned; only in-progress
            // decodes hold up the join.
            queue.pending.clear();
        }
        self.shared.available.notify_all();
        for worker in self.workers.drain(..) {
            let _ = worker.join();
        }
    }
}

fn worker_loop(shared: Arc<PoolShared>, sender: Sender<TileLoadResult>) {
    loop {
        let request = {
            let mut queue = shared.queue.lock().unwrap_or_else(PoisonError::into_inner);
            loop {
                if let Some(request) = queue.pending.pop() {
                    break request;
                }
                if queue.shutdown {
                    return;
                }
                queue = shared
                    .available
                    .wait(queue)
                    .unwrap_or_else(PoisonError::into_inner);
            }
        };
        let image = decode_tile(&request.path);
        if sender
            .send(TileLoadResult {
                key: request.key,
                image,
            })
            .is_err()
        {
            return;
        }
    }
}

fn decode_tile(path: &std::path::Path) -> Option<Arc<TileImage>> {
    match image::open(path) {
        Ok(decoded) => {
            let rgba = decoded.to_rgba8();
            Some(Arc::new(TileImage {
                width: rgba.width(),
                height: rgba.height(),
                rgba: rgba.into_raw(),
            }))
        }
        Err(error) => {
            warn!(path = %path.display(), error = %error, "tile_decode_failed");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    fn key(x: i32, y: i32) -> TileKey {
        TileKey { x, y }
    }

    #[test]
    fn queue_pops_nearest_request_first() {
        let mut heap = BinaryHeap::new();
        heap.push(QueuedRequest {
            key: key(5, 5),
            path: PathBuf::from("far.png"),
            priority_sq: 900,
        });
        heap.push(QueuedRequest {
            key: key(1, 1),
            path: PathBuf::from("near.png"),
            priority_sq: 4,
        });
        heap.push(QueuedRequest {
            key: key(3, 3),
            path: PathBuf::from("mid.png"),
            priority_sq: 100,
        });

        assert_eq!(heap.pop().expect("near").key, key(1, 1));
        assert_eq!(heap.pop().expect("mid").key, key(3, 3));
        assert_eq!(heap.pop().expect("far").key, key(5, 5));
    }

    #[test]
    fn equal_distances_break_ties_by_key() {
        let mut heap = BinaryHeap::new();
        heap.push(QueuedRequest {
            key: key(2, 0),
            path: PathBuf::from("b.png"),
            priority_sq: 64,
        });
        heap.push(QueuedRequest {
            key: key(0, 2),
            path: PathBuf::from("a.png"),
            priority_sq: 64,
        });

        assert_eq!(heap.pop().expect("first").key, key(0, 2));
        assert_eq!(heap.pop().expect("second").key, key(2, 0));
    }

    #[test]
    fn pool_returns_decoded_image_and_failure() {
        let dir = tempfile::tempdir().expect("tempdir");
        let good = dir.path().join("map_0_0.png");
        image::RgbaImage::from_pixel(4, 4, image::Rgba([10, 20, 30, 255]))
            .save(&good)
            .expect("save tile");

        let pool = TileLoaderPool::new(2);
        pool.submit(key(0, 0), good, 0);
        pool.submit(key(9, 9), dir.path().join("missing.png"), 1);

        let mut loaded = None;
        let mut failed = None;
        for _ in 0..2 {
            let result = pool
                .recv_timeout(Duration::from_secs(10))
                .expect("result within timeout");
            if result.key == key(0, 0) {
                loaded = result.image;
            } else {
                failed = Some(result.image.is_none());
            }
        }

        let image = loaded.expect("decoded image");
        assert_eq!(image.width, 4);
        assert_eq!(image.height, 4);
        assert_eq!(image.rgba.len(), 4 * 4 * 4);
        assert_eq!(failed, Some(true));
    }

    #[test]
    fn drop_joins_idle_workers() {
        let pool = TileLoaderPool::new(4);
        drop(pool);
    }
}
