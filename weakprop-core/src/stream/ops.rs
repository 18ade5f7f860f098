//! Minimal Operators
//!
//! Just enough of an operator set to build validation pipelines:
//!
//! - [`start_with`]: emit a seed value, then everything from the source
//! - [`map`]: transform each value synchronously
//! - [`map_async`]: transform each value with a future run on Tokio
//! - [`combine_latest`]: the latest value of every source, re-emitted as a
//!   whole whenever any one of them changes
//!
//! Each operator's subscription owns the intermediate observer it creates,
//! so chains stay alive exactly as long as the outermost handle, even when a
//! link in the chain only holds its observers weakly.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, ReentrantMutex};
use tokio::runtime::Handle;

use super::{BoxObservable, Observable, Observer, StreamError, Subscription};

/// A boxed, sendable future.
pub type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send + 'static>>;

// ----------------------------------------------------------------------------
// start_with
// ----------------------------------------------------------------------------

struct StartWith<T> {
    source: BoxObservable<T>,
    seed: T,
}

impl<T> Observable<T> for StartWith<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn subscribe(&self, observer: &Arc<dyn Observer<T>>) -> Subscription {
        observer.on_next(self.seed.clone());
        self.source.subscribe(observer)
    }
}

/// Emit `seed` to every new observer, then forward `source`.
pub fn start_with<T>(source: BoxObservable<T>, seed: T) -> BoxObservable<T>
where
    T: Clone + Send + Sync + 'static,
{
    Arc::new(StartWith { source, seed })
}

// ----------------------------------------------------------------------------
// map
// ----------------------------------------------------------------------------

type MapFn<T, U> = Arc<dyn Fn(T) -> U + Send + Sync>;

struct Map<T, U> {
    source: BoxObservable<T>,
    f: MapFn<T, U>,
}

struct MapObserver<T, U> {
    downstream: Arc<dyn Observer<U>>,
    f: MapFn<T, U>,
}

impl<T, U> Observer<T> for MapObserver<T, U>
where
    T: Send + Sync + 'static,
    U: Send + Sync + 'static,
{
    fn on_next(&self, value: T) {
        self.downstream.on_next((self.f)(value));
    }

    fn on_error(&self, error: StreamError) {
        self.downstream.on_error(error);
    }

    fn on_completed(&self) {
        self.downstream.on_completed();
    }
}

impl<T, U> Observable<U> for Map<T, U>
where
    T: Send + Sync + 'static,
    U: Send + Sync + 'static,
{
    fn subscribe(&self, observer: &Arc<dyn Observer<U>>) -> Subscription {
        let inner: Arc<dyn Observer<T>> = Arc::new(MapObserver {
            downstream: Arc::clone(observer),
            f: Arc::clone(&self.f),
        });
        let upstream = self.source.subscribe(&inner);
        Subscription::new(move || {
            upstream.dispose();
            drop(inner);
        })
    }
}

/// Transform every value of `source` with `f`.
pub fn map<T, U, F>(source: BoxObservable<T>, f: F) -> BoxObservable<U>
where
    T: Send + Sync + 'static,
    U: Send + Sync + 'static,
    F: Fn(T) -> U + Send + Sync + 'static,
{
    Arc::new(Map {
        source,
        f: Arc::new(f),
    })
}

// ----------------------------------------------------------------------------
// map_async
// ----------------------------------------------------------------------------

type AsyncMapFn<T, U> = Arc<dyn Fn(T) -> BoxFuture<U> + Send + Sync>;

struct MapAsync<T, U> {
    source: BoxObservable<T>,
    runtime: Handle,
    f: AsyncMapFn<T, U>,
}

struct MapAsyncObserver<T, U> {
    downstream: Arc<dyn Observer<U>>,
    runtime: Handle,
    f: AsyncMapFn<T, U>,
    active: Arc<AtomicBool>,
}

impl<T, U> Observer<T> for MapAsyncObserver<T, U>
where
    T: Send + Sync + 'static,
    U: Send + Sync + 'static,
{
    fn on_next(&self, value: T) {
        let task = self.runtime.spawn((self.f)(value));
        let downstream = Arc::clone(&self.downstream);
        let active = Arc::clone(&self.active);

        // Results arrive in completion order, not submission order.
        self.runtime.spawn(async move {
            match task.await {
                Ok(output) => {
                    if active.load(Ordering::SeqCst) {
                        downstream.on_next(output);
                    }
                }
                Err(err) => tracing::error!(%err, "asynchronous map task failed"),
            }
        });
    }

    fn on_error(&self, error: StreamError) {
        self.downstream.on_error(error);
    }

    fn on_completed(&self) {
        self.downstream.on_completed();
    }
}

impl<T, U> Observable<U> for MapAsync<T, U>
where
    T: Send + Sync + 'static,
    U: Send + Sync + 'static,
{
    fn subscribe(&self, observer: &Arc<dyn Observer<U>>) -> Subscription {
        let active = Arc::new(AtomicBool::new(true));
        let inner: Arc<dyn Observer<T>> = Arc::new(MapAsyncObserver {
            downstream: Arc::clone(observer),
            runtime: self.runtime.clone(),
            f: Arc::clone(&self.f),
            active: Arc::clone(&active),
        });
        let upstream = self.source.subscribe(&inner);
        Subscription::new(move || {
            // In-flight results are discarded from here on.
            active.store(false, Ordering::SeqCst);
            upstream.dispose();
            drop(inner);
        })
    }
}

/// Transform every value of `source` with an asynchronous `f`, spawned on
/// `runtime`. Completed results are forwarded as they finish.
pub fn map_async<T, U, F>(source: BoxObservable<T>, runtime: Handle, f: F) -> BoxObservable<U>
where
    T: Send + Sync + 'static,
    U: Send + Sync + 'static,
    F: Fn(T) -> BoxFuture<U> + Send + Sync + 'static,
{
    Arc::new(MapAsync {
        source,
        runtime,
        f: Arc::new(f),
    })
}

// ----------------------------------------------------------------------------
// combine_latest
// ----------------------------------------------------------------------------

struct CombineState<U> {
    latest: Vec<Option<U>>,
    completed: usize,
    stopped: bool,
}

struct CombineShared<U> {
    state: Mutex<CombineState<U>>,
    // Serializes emission so snapshots reach downstream in the order they
    // were taken. Re-entrant because downstream may push back into a source
    // on the same thread.
    emit: ReentrantMutex<()>,
    downstream: Arc<dyn Observer<Vec<U>>>,
}

struct CombineSlot<U> {
    index: usize,
    shared: Arc<CombineShared<U>>,
}

impl<U> Observer<U> for CombineSlot<U>
where
    U: Clone + Send + Sync + 'static,
{
    fn on_next(&self, value: U) {
        let _emit = self.shared.emit.lock();
        let snapshot = {
            let mut state = self.shared.state.lock();
            if state.stopped {
                return;
            }
            state.latest[self.index] = Some(value);
            // Nothing is emitted until every source has produced a value.
            state.latest.iter().cloned().collect::<Option<Vec<U>>>()
        };
        if let Some(values) = snapshot {
            self.shared.downstream.on_next(values);
        }
    }

    fn on_error(&self, error: StreamError) {
        let _emit = self.shared.emit.lock();
        {
            let mut state = self.shared.state.lock();
            if state.stopped {
                return;
            }
            state.stopped = true;
        }
        self.shared.downstream.on_error(error);
    }

    fn on_completed(&self) {
        let _emit = self.shared.emit.lock();
        {
            let mut state = self.shared.state.lock();
            if state.stopped {
                return;
            }
            state.completed += 1;
            if state.completed < state.latest.len() {
                return;
            }
            state.stopped = true;
        }
        self.shared.downstream.on_completed();
    }
}

struct CombineLatest<U> {
    sources: Vec<BoxObservable<U>>,
}

impl<U> Observable<Vec<U>> for CombineLatest<U>
where
    U: Clone + Send + Sync + 'static,
{
    fn subscribe(&self, observer: &Arc<dyn Observer<Vec<U>>>) -> Subscription {
        if self.sources.is_empty() {
            observer.on_completed();
            return Subscription::empty();
        }

        let shared = Arc::new(CombineShared {
            state: Mutex::new(CombineState {
                latest: vec![None; self.sources.len()],
                completed: 0,
                stopped: false,
            }),
            emit: ReentrantMutex::new(()),
            downstream: Arc::clone(observer),
        });

        let mut slots = Vec::with_capacity(self.sources.len());
        let mut upstreams = Vec::with_capacity(self.sources.len());
        for (index, source) in self.sources.iter().enumerate() {
            let slot: Arc<dyn Observer<U>> = Arc::new(CombineSlot {
                index,
                shared: Arc::clone(&shared),
            });
            upstreams.push(source.subscribe(&slot));
            slots.push(slot);
        }

        Subscription::new(move || {
            shared.state.lock().stopped = true;
            for upstream in upstreams {
                upstream.dispose();
            }
            drop(slots);
        })
    }
}

/// Combine the latest value of each source into one vector, in source order.
///
/// The first vector is emitted once every source has produced a value; after
/// that, any single source producing a value re-emits the whole vector.
/// Completes when all sources complete; fails on the first error.
pub fn combine_latest<U>(sources: Vec<BoxObservable<U>>) -> BoxObservable<Vec<U>>
where
    U: Clone + Send + Sync + 'static,
{
    Arc::new(CombineLatest { sources })
}
