//! Keyed model cache with in-flight request coalescing.
//!
//! One fetch → decode → upload task per key runs on the injected executor.
//! Every other request for that key either clones the cached [`Model`] or
//! queues behind the running task and gets its own clone when it settles.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;

use futures::StreamExt;
use futures::channel::{mpsc, oneshot};
use futures::stream::FuturesUnordered;
use futures::task::{LocalSpawn, LocalSpawnExt};

use crate::decoder::ModelDecoder;
use crate::error::{AssetError, AssetResult};
use crate::gpu::GpuDevice;
use crate::model::Model;
use crate::source::{AssetSource, FetchProgress};

/// What to load and whether the cache may answer it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LoadRequest {
    pub key: String,
    /// When false, skip the cache lookup and do not store the result.
    pub use_cache: bool,
}

impl LoadRequest {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            use_cache: true,
        }
    }

    pub fn bypass_cache(mut self) -> Self {
        self.use_cache = false;
        self
    }
}

impl From<&str> for LoadRequest {
    fn from(key: &str) -> Self {
        Self::new(key)
    }
}

/// Byte progress of one running fetch, broadcast to every subscriber.
#[derive(Clone, Debug, PartialEq)]
pub struct LoadProgress {
    pub key: String,
    /// `0..=100`.
    pub percent: f32,
}

/// Counts of GPU resources actually released by [`AssetCache::dispose`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DisposeReport {
    pub buffers: usize,
    pub textures: usize,
}

impl std::ops::AddAssign for DisposeReport {
    fn add_assign(&mut self, rhs: Self) {
        self.buffers += rhs.buffers;
        self.textures += rhs.textures;
    }
}

/// Handle returned by [`AssetCache::spawn_load`]. While it is alive the
/// completion callback runs; once dropped or cancelled the load still
/// finishes (and may populate the cache) but the callback is skipped.
#[derive(Debug)]
pub struct LoadTicket {
    interested: Rc<Cell<bool>>,
}

impl LoadTicket {
    pub fn cancel(&self) {
        self.interested.set(false);
    }

    pub fn is_active(&self) -> bool {
        self.interested.get()
    }
}

impl Drop for LoadTicket {
    fn drop(&mut self) {
        self.interested.set(false);
    }
}

type Waiter = oneshot::Sender<AssetResult<Model>>;

struct InFlight {
    /// Attach order; settled front to back.
    waiters: Vec<Waiter>,
    /// Any caching request among the waiters makes the result cacheable.
    store: bool,
}

#[derive(Default)]
struct CacheState {
    entries: HashMap<String, Model>,
    in_flight: HashMap<String, InFlight>,
}

struct CacheInner {
    source: Box<dyn AssetSource>,
    decoder: Box<dyn ModelDecoder>,
    device: Rc<dyn GpuDevice>,
    spawner: Box<dyn LocalSpawn>,
    state: RefCell<CacheState>,
    progress: RefCell<Vec<mpsc::UnboundedSender<LoadProgress>>>,
}

/// Shared, single-threaded model cache. Clones share one state.
#[derive(Clone)]
pub struct AssetCache {
    inner: Rc<CacheInner>,
}

impl AssetCache {
    pub fn new(
        source: impl AssetSource + 'static,
        decoder: impl ModelDecoder + 'static,
        device: Rc<dyn GpuDevice>,
        spawner: impl LocalSpawn + 'static,
    ) -> Self {
        Self {
            inner: Rc::new(CacheInner {
                source: Box::new(source),
                decoder: Box::new(decoder),
                device,
                spawner: Box::new(spawner),
                state: RefCell::new(CacheState::default()),
                progress: RefCell::new(Vec::new()),
            }),
        }
    }

    pub async fn load(&self, key: &str) -> AssetResult<Model> {
        self.load_with(LoadRequest::new(key)).await
    }

    pub async fn load_with(&self, request: LoadRequest) -> AssetResult<Model> {
        let LoadRequest { key, use_cache } = request;
        let (tx, rx) = oneshot::channel();

        let start = {
            let mut state = self.inner.state.borrow_mut();
            if use_cache {
                if let Some(model) = state.entries.get(&key) {
                    log::debug!("Cache hit for '{}'", key);
                    return Ok(model.clone());
                }
            }
            match state.in_flight.get_mut(&key) {
                Some(flight) => {
                    log::debug!(
                        "Attaching to in-flight load of '{}' ({} waiting)",
                        key,
                        flight.waiters.len()
                    );
                    flight.waiters.push(tx);
                    flight.store |= use_cache;
                    false
                }
                None => {
                    state.in_flight.insert(
                        key.clone(),
                        InFlight {
                            waiters: vec![tx],
                            store: use_cache,
                        },
                    );
                    true
                }
            }
        };

        if start {
            log::info!("Fetching '{}'", key);
            if let Err(e) = self.start_task(key.clone()) {
                log::error!("Could not spawn load of '{}': {}", key, e);
                self.inner.state.borrow_mut().in_flight.remove(&key);
                return Err(AssetError::Aborted { key });
            }
        }

        match rx.await {
            Ok(result) => result,
            Err(oneshot::Canceled) => Err(AssetError::Aborted { key }),
        }
    }

    /// Callback flavour of [`load_with`](Self::load_with) for consumers that
    /// may go away before the load settles.
    pub fn spawn_load<F>(&self, request: LoadRequest, on_settled: F) -> AssetResult<LoadTicket>
    where
        F: FnOnce(AssetResult<Model>) + 'static,
    {
        let ticket = LoadTicket {
            interested: Rc::new(Cell::new(true)),
        };
        let interested = ticket.interested.clone();
        let cache = self.clone();
        let key = request.key.clone();

        self.inner
            .spawner
            .spawn_local(async move {
                let key = request.key.clone();
                let result = cache.load_with(request).await;
                if interested.get() {
                    on_settled(result);
                } else {
                    log::trace!("Load of '{}' settled after its ticket was dropped; callback skipped", key);
                }
            })
            .map_err(|e| {
                log::error!("Could not spawn load of '{}': {}", key, e);
                AssetError::Aborted { key: key.clone() }
            })?;

        Ok(ticket)
    }

    /// Receiver of byte progress for every fetch started from now on.
    pub fn subscribe_progress(&self) -> mpsc::UnboundedReceiver<LoadProgress> {
        let (tx, rx) = mpsc::unbounded();
        self.inner.progress.borrow_mut().push(tx);
        rx
    }

    pub async fn preload(&self, keys: &[&str]) -> AssetResult<()> {
        self.preload_with_progress(keys, |_| {}).await
    }

    /// Load every key and wait until all of them settle.
    ///
    /// `on_progress` receives the overall fraction in `[0, 1]`: each key
    /// contributes its latest fetch fraction (1.0 once loaded) divided by
    /// `keys.len()`. Returns the error of the first failing key in input
    /// order; keys that did load stay cached.
    pub async fn preload_with_progress(
        &self,
        keys: &[&str],
        mut on_progress: impl FnMut(f32),
    ) -> AssetResult<()> {
        if keys.is_empty() {
            on_progress(1.0);
            return Ok(());
        }

        let mut events = self.subscribe_progress();
        let mut fractions = vec![0.0f32; keys.len()];
        let mut results: Vec<Option<AssetResult<()>>> = vec![None; keys.len()];
        let mut pending: FuturesUnordered<_> = keys
            .iter()
            .enumerate()
            .map(|(i, key)| {
                let cache = self.clone();
                let key = key.to_string();
                async move { (i, cache.load(&key).await.map(drop)) }
            })
            .collect();

        let overall = |fractions: &[f32]| (fractions.iter().sum::<f32>() / fractions.len() as f32).min(1.0);
        let mut remaining = keys.len();

        while remaining > 0 {
            futures::select! {
                (i, result) = pending.select_next_some() => {
                    if result.is_ok() {
                        fractions[i] = 1.0;
                    }
                    results[i] = Some(result);
                    remaining -= 1;
                    on_progress(overall(&fractions));
                }
                event = events.select_next_some() => {
                    let fraction = (event.percent / 100.0).clamp(0.0, 1.0);
                    for (i, key) in keys.iter().enumerate() {
                        if *key == event.key && results[i].is_none() {
                            fractions[i] = fraction;
                        }
                    }
                    on_progress(overall(&fractions));
                }
            }
        }

        let failed = keys.iter().zip(&results).find_map(|(key, result)| match result {
            Some(Err(e)) => Some((*key, e.clone())),
            _ => None,
        });
        match failed {
            Some((key, e)) => {
                log::error!("Preload of {} keys failed at '{}'", keys.len(), key);
                Err(e)
            }
            None => {
                log::info!("Preloaded {} keys", keys.len());
                Ok(())
            }
        }
    }

    /// Drop cache entries; all of them when `keys` is `None`. Instances
    /// already handed out keep their GPU resources.
    pub fn clear(&self, keys: Option<&[&str]>) {
        let mut state = self.inner.state.borrow_mut();
        match keys {
            Some(keys) => {
                for key in keys {
                    if state.entries.remove(*key).is_some() {
                        log::debug!("Cleared '{}'", key);
                    }
                }
            }
            None => {
                log::debug!("Cleared {} entries", state.entries.len());
                state.entries.clear();
            }
        }
    }

    /// Release the GPU resources held only by `model`, or, with `None`,
    /// dispose every cached entry and empty the cache.
    pub fn dispose(&self, model: Option<Model>) -> DisposeReport {
        let report = match model {
            Some(model) => release(model),
            None => {
                let entries: Vec<Model> = {
                    let mut state = self.inner.state.borrow_mut();
                    state.entries.drain().map(|(_, model)| model).collect()
                };
                let mut report = DisposeReport::default();
                for model in entries {
                    report += release(model);
                }
                report
            }
        };
        log::info!(
            "Disposed {} buffers and {} textures",
            report.buffers,
            report.textures
        );
        report
    }

    pub fn contains(&self, key: &str) -> bool {
        self.inner.state.borrow().entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.inner.state.borrow().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn in_flight_count(&self) -> usize {
        self.inner.state.borrow().in_flight.len()
    }

    fn start_task(&self, key: String) -> Result<(), futures::task::SpawnError> {
        // Built outside the task so it also fires when the executor drops
        // the task before its first poll.
        let mut guard = InFlightGuard {
            cache: self.clone(),
            key,
            armed: true,
        };
        self.inner.spawner.spawn_local(async move {
            let result = guard.cache.fetch_and_upload(&guard.key).await;
            guard.armed = false;
            guard.cache.settle(&guard.key, result);
        })
    }

    async fn fetch_and_upload(&self, key: &str) -> AssetResult<Model> {
        let report = |p: FetchProgress| {
            if let Some(percent) = p.percent() {
                self.broadcast(LoadProgress {
                    key: key.to_string(),
                    percent,
                });
            }
        };
        let bytes = self.inner.source.fetch(key, &report).await?;
        let data = self.inner.decoder.decode(key, &bytes)?;
        log::debug!(
            "Decoded '{}': {} nodes, {} triangles, bounds {:?}",
            key,
            data.nodes.len(),
            data.triangle_count(),
            data.bounds()
        );
        Ok(Model::upload(data, &self.inner.device))
    }

    /// Runs in the same poll that produced `result`, so no waiter can
    /// observe the key as both in flight and settled.
    fn settle(&self, key: &str, result: AssetResult<Model>) {
        let flight = {
            let mut state = self.inner.state.borrow_mut();
            let Some(flight) = state.in_flight.remove(key) else {
                log::warn!("Load of '{}' settled with no in-flight entry", key);
                return;
            };
            match &result {
                Ok(model) => {
                    log::info!("Loaded '{}' ({} waiters)", key, flight.waiters.len());
                    if flight.store {
                        state.entries.insert(key.to_string(), model.clone());
                    }
                }
                Err(e) => log::error!("{}", e),
            }
            flight
        };

        for waiter in flight.waiters {
            if waiter.send(result.clone()).is_err() {
                log::trace!("Waiter for '{}' went away; result dropped", key);
            }
        }
    }

    fn broadcast(&self, event: LoadProgress) {
        self.inner
            .progress
            .borrow_mut()
            .retain(|tx| tx.unbounded_send(event.clone()).is_ok());
    }
}

impl std::fmt::Debug for AssetCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.inner.state.borrow();
        f.debug_struct("AssetCache")
            .field("entries", &state.entries.len())
            .field("in_flight", &state.in_flight.len())
            .finish()
    }
}

/// Removes the in-flight entry of a load task dropped before it settled.
/// Dropping the entry drops its waiters' senders, so they see `Aborted`
/// and the next request for the key starts a fresh load.
struct InFlightGuard {
    cache: AssetCache,
    key: String,
    armed: bool,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let Ok(mut state) = self.cache.inner.state.try_borrow_mut() else {
            log::error!("Load of '{}' dropped while the cache was borrowed", self.key);
            return;
        };
        if let Some(flight) = state.in_flight.remove(&self.key) {
            log::warn!(
                "Load of '{}' dropped before settling; aborting {} waiters",
                self.key,
                flight.waiters.len()
            );
        }
    }
}

fn release(model: Model) -> DisposeReport {
    let mut report = DisposeReport::default();
    for primitive in model.into_primitives() {
        // Still referenced elsewhere: the last holder frees it on drop.
        let Ok(primitive) = Rc::try_unwrap(primitive) else {
            continue;
        };
        report.buffers += 2;
        if let Some(texture) = primitive.texture {
            if Rc::try_unwrap(texture).is_ok() {
                report.textures += 1;
            }
        }
    }
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decoder::ObjDecoder;
    use crate::gpu::HeadlessDevice;
    use crate::model::ModelData;
    use corelib::vec3;
    use futures::executor::LocalPool;
    use futures::future::LocalBoxFuture;

    const TRIANGLE: &[u8] = b"v 0 0 0\nv 1 0 0\nv 0 1 0\nf 1 2 3\n";

    type Gate = oneshot::Sender<Result<Vec<u8>, String>>;

    /// Source whose fetches hang until the test opens them.
    #[derive(Clone, Default)]
    struct GatedSource {
        fetched: Rc<RefCell<Vec<String>>>,
        gates: Rc<RefCell<Vec<(String, Gate)>>>,
    }

    impl GatedSource {
        fn fetches(&self, key: &str) -> usize {
            self.fetched.borrow().iter().filter(|k| *k == key).count()
        }

        fn open(&self, key: &str, outcome: Result<&[u8], &str>) {
            let mut gates = self.gates.borrow_mut();
            let i = gates.iter().position(|(k, _)| k == key).expect("no pending fetch");
            let (_, gate) = gates.remove(i);
            gate.send(outcome.map(<[u8]>::to_vec).map_err(str::to_string)).unwrap();
        }
    }

    impl AssetSource for GatedSource {
        fn fetch<'a>(
            &'a self,
            key: &'a str,
            progress: &'a dyn Fn(FetchProgress),
        ) -> LocalBoxFuture<'a, AssetResult<Vec<u8>>> {
            let (tx, rx) = oneshot::channel();
            self.fetched.borrow_mut().push(key.to_string());
            self.gates.borrow_mut().push((key.to_string(), tx));
            Box::pin(async move {
                let bytes = rx
                    .await
                    .map_err(|_| AssetError::fetch(key, "gate dropped"))?
                    .map_err(|reason| AssetError::fetch(key, reason))?;
                let total = bytes.len() as u64;
                progress(FetchProgress {
                    loaded: total / 2,
                    total: Some(total),
                });
                progress(FetchProgress {
                    loaded: total,
                    total: Some(total),
                });
                Ok(bytes)
            })
        }
    }

    struct Harness {
        pool: LocalPool,
        cache: AssetCache,
        source: GatedSource,
        device: Rc<HeadlessDevice>,
    }

    type Slot<T> = Rc<RefCell<Option<T>>>;

    impl Harness {
        fn new() -> Self {
            let pool = LocalPool::new();
            let source = GatedSource::default();
            let device = Rc::new(HeadlessDevice::new());
            let cache = AssetCache::new(source.clone(), ObjDecoder, device.clone(), pool.spawner());
            Self {
                pool,
                cache,
                source,
                device,
            }
        }

        fn load(&self, request: impl Into<LoadRequest>) -> Slot<AssetResult<Model>> {
            let slot = Rc::new(RefCell::new(None));
            let (cache, out, request) = (self.cache.clone(), slot.clone(), request.into());
            self.pool
                .spawner()
                .spawn_local(async move {
                    let result = cache.load_with(request).await;
                    *out.borrow_mut() = Some(result);
                })
                .unwrap();
            slot
        }

        fn run(&mut self) {
            self.pool.run_until_stalled();
        }
    }

    fn take<T>(slot: &Slot<T>) -> T {
        slot.borrow_mut().take().expect("not settled yet")
    }

    #[test]
    fn concurrent_loads_share_one_fetch() {
        let mut h = Harness::new();
        let a = h.load("tri.obj");
        let b = h.load("tri.obj");
        h.run();
        assert_eq!(h.source.fetches("tri.obj"), 1);
        assert_eq!(h.cache.in_flight_count(), 1);

        h.source.open("tri.obj", Ok(TRIANGLE));
        h.run();
        let (a, b) = (take(&a).unwrap(), take(&b).unwrap());
        assert_eq!(a.primitive_count(), 1);
        assert_eq!(b.primitive_count(), 1);
        assert_eq!(h.cache.in_flight_count(), 0);
        assert!(h.cache.contains("tri.obj"));

        // Cache hit: no new fetch.
        let c = h.load("tri.obj");
        h.run();
        assert!(take(&c).is_ok());
        assert_eq!(h.source.fetches("tri.obj"), 1);
    }

    #[test]
    fn handed_out_models_are_independent_instances() {
        let mut h = Harness::new();
        let a = h.load("tri.obj");
        h.run();
        h.source.open("tri.obj", Ok(TRIANGLE));
        h.run();
        let mut first = take(&a).unwrap();
        first.transform.translation = vec3(5.0, 0.0, 0.0);

        let b = h.load("tri.obj");
        h.run();
        let second = take(&b).unwrap();
        assert_eq!(second.transform.translation, vec3(0.0, 0.0, 0.0));
    }

    #[test]
    fn waiters_settle_in_attach_order() {
        let mut h = Harness::new();
        let order = Rc::new(RefCell::new(Vec::new()));
        let mut tickets = Vec::new();
        for tag in 0..4 {
            let order = order.clone();
            let ticket = h
                .cache
                .spawn_load(LoadRequest::new("tri.obj"), move |r| {
                    assert!(r.is_ok());
                    order.borrow_mut().push(tag);
                })
                .unwrap();
            tickets.push(ticket);
        }
        h.run();
        h.source.open("tri.obj", Ok(TRIANGLE));
        h.run();
        assert_eq!(*order.borrow(), vec![0, 1, 2, 3]);
    }

    #[test]
    fn failure_is_not_cached_and_retry_fetches_again() {
        let mut h = Harness::new();
        let a = h.load("bad.obj");
        let b = h.load("bad.obj");
        h.run();
        h.source.open("bad.obj", Err("503 Service Unavailable"));
        h.run();

        for slot in [&a, &b] {
            let err = take(slot).unwrap_err();
            assert_eq!(err.key(), "bad.obj");
            assert!(err.to_string().contains("503"));
        }
        assert!(!h.cache.contains("bad.obj"));
        assert_eq!(h.cache.in_flight_count(), 0);

        let retry = h.load("bad.obj");
        h.run();
        assert_eq!(h.source.fetches("bad.obj"), 2);
        h.source.open("bad.obj", Ok(TRIANGLE));
        h.run();
        assert!(take(&retry).is_ok());
        assert!(h.cache.contains("bad.obj"));
    }

    #[test]
    fn failure_of_one_key_does_not_affect_another() {
        let mut h = Harness::new();
        let bad = h.load("bad.obj");
        let good = h.load("good.obj");
        h.run();
        h.source.open("bad.obj", Err("404"));
        h.source.open("good.obj", Ok(TRIANGLE));
        h.run();
        assert!(take(&bad).is_err());
        assert!(take(&good).is_ok());
    }

    #[test]
    fn decode_failure_names_the_key() {
        let mut h = Harness::new();
        let a = h.load("garbage.obj");
        h.run();
        h.source.open("garbage.obj", Ok(b"f 1 2 3\n"));
        h.run();
        let err = take(&a).unwrap_err();
        assert!(matches!(err, AssetError::Decode { ref key, .. } if key == "garbage.obj"));
    }

    #[test]
    fn clear_forces_a_fresh_fetch() {
        let mut h = Harness::new();
        let a = h.load("tri.obj");
        h.run();
        h.source.open("tri.obj", Ok(TRIANGLE));
        h.run();
        let held = take(&a).unwrap();

        h.cache.clear(Some(&["tri.obj"]));
        assert!(h.cache.is_empty());
        assert_eq!(h.device.live_buffers(), 2, "handed-out instance keeps its buffers");

        let b = h.load("tri.obj");
        h.run();
        assert_eq!(h.source.fetches("tri.obj"), 2);
        h.source.open("tri.obj", Ok(TRIANGLE));
        h.run();
        assert!(take(&b).is_ok());
        drop(held);
    }

    #[test]
    fn bypassing_the_cache_fetches_and_does_not_store() {
        let mut h = Harness::new();
        let a = h.load(LoadRequest::new("tri.obj").bypass_cache());
        h.run();
        h.source.open("tri.obj", Ok(TRIANGLE));
        h.run();
        assert!(take(&a).is_ok());
        assert!(!h.cache.contains("tri.obj"));
    }

    #[test]
    fn dropped_ticket_skips_callback_but_still_caches() {
        let mut h = Harness::new();
        let called = Rc::new(Cell::new(false));
        let flag = called.clone();
        let ticket = h
            .cache
            .spawn_load(LoadRequest::new("tri.obj"), move |_| flag.set(true))
            .unwrap();
        h.run();
        drop(ticket);
        h.source.open("tri.obj", Ok(TRIANGLE));
        h.run();
        assert!(!called.get());
        assert!(h.cache.contains("tri.obj"));
    }

    #[test]
    fn progress_is_broadcast_per_key() {
        let mut h = Harness::new();
        let events = h.cache.subscribe_progress();
        let a = h.load("tri.obj");
        h.run();
        h.source.open("tri.obj", Ok(TRIANGLE));
        h.run();
        assert!(take(&a).is_ok());

        let Harness { mut pool, cache, .. } = h;
        drop(cache);
        let seen: Vec<LoadProgress> = pool.run_until(events.collect());
        let percents: Vec<f32> = seen.iter().map(|p| p.percent).collect();
        assert!(seen.iter().all(|p| p.key == "tri.obj"));
        assert_eq!(percents.last().copied(), Some(100.0));
        assert!(percents.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn preload_waits_for_all_and_reports_first_failure() {
        let mut h = Harness::new();
        let reported = Rc::new(RefCell::new(Vec::new()));
        let slot: Slot<AssetResult<()>> = Rc::new(RefCell::new(None));
        {
            let (cache, out, reported) = (h.cache.clone(), slot.clone(), reported.clone());
            h.pool
                .spawner()
                .spawn_local(async move {
                    let result = cache
                        .preload_with_progress(&["a.obj", "b.obj", "c.obj"], |f| reported.borrow_mut().push(f))
                        .await;
                    *out.borrow_mut() = Some(result);
                })
                .unwrap();
        }
        h.run();
        h.source.open("c.obj", Err("boom"));
        h.source.open("a.obj", Ok(TRIANGLE));
        h.run();
        assert!(slot.borrow().is_none(), "b.obj still pending");
        h.source.open("b.obj", Err("timeout"));
        h.run();

        let err = take(&slot).unwrap_err();
        assert_eq!(err.key(), "b.obj", "first failure in input order");
        assert!(h.cache.contains("a.obj"));
        assert!(!h.cache.contains("b.obj"));

        let reported = reported.borrow();
        assert!(!reported.is_empty());
        assert!(reported.iter().all(|f| (0.0..=1.0).contains(f)));
    }

    #[test]
    fn preload_succeeds_when_everything_loads() {
        let mut h = Harness::new();
        let reported = Rc::new(RefCell::new(Vec::new()));
        let slot: Slot<AssetResult<()>> = Rc::new(RefCell::new(None));
        {
            let (cache, out, reported) = (h.cache.clone(), slot.clone(), reported.clone());
            h.pool
                .spawner()
                .spawn_local(async move {
                    let result = cache
                        .preload_with_progress(&["a.obj", "b.obj"], |f| reported.borrow_mut().push(f))
                        .await;
                    *out.borrow_mut() = Some(result);
                })
                .unwrap();
        }
        h.run();
        h.source.open("a.obj", Ok(TRIANGLE));
        h.run();
        assert!(slot.borrow().is_none(), "b.obj still pending");
        assert_eq!(reported.borrow().last().copied(), Some(0.5), "a.obj done, b.obj still gated");

        h.source.open("b.obj", Ok(TRIANGLE));
        h.run();
        assert!(take(&slot).is_ok());
        assert_eq!(h.cache.len(), 2);

        let reported = reported.borrow();
        assert_eq!(reported.last().copied(), Some(1.0));
        assert!(reported.windows(2).all(|w| w[0] <= w[1]), "progress regressed: {:?}", *reported);
    }

    #[test]
    fn executor_shutdown_aborts_waiters_and_frees_the_key() {
        let mut loader = LocalPool::new();
        let source = GatedSource::default();
        let cache = AssetCache::new(
            source.clone(),
            ObjDecoder,
            Rc::new(HeadlessDevice::new()),
            loader.spawner(),
        );

        let mut caller = LocalPool::new();
        let slot: Slot<AssetResult<Model>> = Rc::new(RefCell::new(None));
        {
            let (cache, out) = (cache.clone(), slot.clone());
            caller
                .spawner()
                .spawn_local(async move {
                    let result = cache.load("x.obj").await;
                    *out.borrow_mut() = Some(result);
                })
                .unwrap();
        }
        caller.run_until_stalled();
        loader.run_until_stalled();
        assert_eq!(source.fetches("x.obj"), 1);
        assert_eq!(cache.in_flight_count(), 1);

        // Mid-fetch: the gate for x.obj is never opened.
        drop(loader);
        assert_eq!(cache.in_flight_count(), 0);

        caller.run_until_stalled();
        let err = take(&slot).unwrap_err();
        assert!(matches!(err, AssetError::Aborted { ref key } if key == "x.obj"));

        // The key is free again; with no executor left the retry aborts
        // instead of attaching to a dead load.
        let retry = caller.run_until(cache.load("x.obj"));
        assert!(matches!(retry, Err(AssetError::Aborted { .. })));
        assert_eq!(cache.in_flight_count(), 0);
        assert!(!cache.contains("x.obj"));
    }

    #[test]
    fn empty_preload_completes_immediately() {
        let mut h = Harness::new();
        let result = h.pool.run_until(h.cache.preload(&[]));
        assert!(result.is_ok());
    }

    #[test]
    fn dispose_counts_only_resources_it_releases() {
        let mut h = Harness::new();
        let a = h.load("tri.obj");
        h.run();
        h.source.open("tri.obj", Ok(TRIANGLE));
        h.run();
        let instance = take(&a).unwrap();

        // The cache still shares the primitive.
        assert_eq!(h.cache.dispose(Some(instance)), DisposeReport::default());
        assert_eq!(h.device.live_buffers(), 2);

        let report = h.cache.dispose(None);
        assert_eq!(report, DisposeReport { buffers: 2, textures: 0 });
        assert!(h.cache.is_empty());
        assert_eq!(h.device.live_buffers(), 0);
    }

    #[test]
    fn dispose_releases_textures_once() {
        let h = Harness::new();
        let device: Rc<dyn GpuDevice> = h.device.clone();
        let model = Model::upload(ModelData::placeholder(), &device);
        let report = h.cache.dispose(Some(model));
        assert_eq!(report, DisposeReport { buffers: 2, textures: 1 });
        assert_eq!(h.device.live_textures(), 0);
    }
}
