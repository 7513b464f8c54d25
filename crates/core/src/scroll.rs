//! Scroll-driven pose animation.
//!
//! A [`ScrollHub`] stands in for the page: it knows the scroll offset and the
//! measured geometry of the pinned region, and pushes a [`ScrollTick`] to its
//! subscribers on every scroll or layout change. A [`ScrollDriver`] turns
//! those ticks into a normalized progress and samples a [`KeyframeTrack`].

use std::cell::RefCell;
use std::rc::{Rc, Weak};

use crate::scene::{FrameTime, UpdateStatus};
use crate::transform::Transform;
use crate::{CoreError, CoreResult, Vec3};

/// Clamp into `[0, 1]`; NaN counts as "no input".
#[inline]
pub fn clamp_progress(p: f32) -> f32 {
    if p.is_nan() { 0.0 } else { p.clamp(0.0, 1.0) }
}

/// Scroll offsets between which the pinned scene animates.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ScrollRegion {
    pub start: f32,
    pub end: f32,
}

impl ScrollRegion {
    pub fn new(start: f32, end: f32) -> Self {
        Self { start, end }
    }

    /// Region of a pinned container: animation starts when its top reaches
    /// the viewport top and ends when its bottom reaches the viewport bottom.
    pub fn pinned(top: f32, height: f32, viewport_height: f32) -> Self {
        Self {
            start: top,
            end: top + (height - viewport_height).max(0.0),
        }
    }

    /// Progress for a raw scroll offset, recomputed from scratch every call.
    pub fn progress(&self, scroll_y: f32) -> f32 {
        let span = self.end - self.start;
        if span <= 0.0 {
            return if scroll_y >= self.start { 1.0 } else { 0.0 };
        }
        clamp_progress((scroll_y - self.start) / span)
    }
}

/// Ordered poses spread evenly over progress `[0, 1]`.
#[derive(Clone, Debug, PartialEq)]
pub struct KeyframeTrack {
    keys: Vec<Transform>,
}

impl KeyframeTrack {
    pub fn new(keys: Vec<Transform>) -> CoreResult<Self> {
        if keys.is_empty() {
            return Err(CoreError::EmptyTrack);
        }
        Ok(Self { keys })
    }

    /// Translation-only poses (camera paths).
    pub fn from_positions<I>(positions: I) -> CoreResult<Self>
    where
        I: IntoIterator<Item = Vec3>,
    {
        Self::new(positions.into_iter().map(Transform::from_translation).collect())
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    #[inline]
    pub fn keys(&self) -> &[Transform] {
        &self.keys
    }

    /// Pose at `progress`. N keyframes form N-1 linear segments; a single
    /// keyframe is a fixed pose.
    pub fn sample(&self, progress: f32) -> Transform {
        let n = self.keys.len();
        let p = clamp_progress(progress);
        if n == 1 || p <= 0.0 {
            return self.keys[0];
        }
        if p >= 1.0 {
            return self.keys[n - 1];
        }
        let scaled = p * (n - 1) as f32;
        let index = (scaled.floor() as usize).min(n - 2);
        let weight = scaled - index as f32;
        self.keys[index].lerp(&self.keys[index + 1], weight)
    }
}

/// Snapshot pushed to subscribers.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ScrollTick {
    pub scroll_y: f32,
    /// `None` while the pinned element is not laid out yet.
    pub region: Option<ScrollRegion>,
}

type Listener = Rc<dyn Fn(ScrollTick)>;

#[derive(Default)]
struct HubState {
    scroll_y: f32,
    region: Option<ScrollRegion>,
    next_id: u64,
    listeners: Vec<(u64, Listener)>,
}

/// Host-side scroll observer.
#[derive(Clone, Default)]
pub struct ScrollHub {
    inner: Rc<RefCell<HubState>>,
}

impl ScrollHub {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn tick(&self) -> ScrollTick {
        let s = self.inner.borrow();
        ScrollTick {
            scroll_y: s.scroll_y,
            region: s.region,
        }
    }

    pub fn listener_count(&self) -> usize {
        self.inner.borrow().listeners.len()
    }

    /// Scroll event.
    pub fn scroll_to(&self, scroll_y: f32) {
        self.inner.borrow_mut().scroll_y = scroll_y;
        self.dispatch();
    }

    /// Layout / resize event: the pinned element was (re)measured or removed.
    pub fn set_region(&self, region: Option<ScrollRegion>) {
        self.inner.borrow_mut().region = region;
        self.dispatch();
    }

    pub fn subscribe(&self, listener: impl Fn(ScrollTick) + 'static) -> ScrollSubscription {
        let mut s = self.inner.borrow_mut();
        let id = s.next_id;
        s.next_id += 1;
        s.listeners.push((id, Rc::new(listener)));
        ScrollSubscription {
            id,
            hub: Rc::downgrade(&self.inner),
        }
    }

    fn dispatch(&self) {
        // Listeners may (un)subscribe, so call them outside the borrow.
        let tick = self.tick();
        let listeners: Vec<Listener> = self
            .inner
            .borrow()
            .listeners
            .iter()
            .map(|(_, l)| l.clone())
            .collect();
        for listener in listeners {
            listener(tick);
        }
    }
}

/// Registration on a [`ScrollHub`]; unregisters on drop.
pub struct ScrollSubscription {
    id: u64,
    hub: Weak<RefCell<HubState>>,
}

impl Drop for ScrollSubscription {
    fn drop(&mut self) {
        if let Some(hub) = self.hub.upgrade() {
            hub.borrow_mut().listeners.retain(|(id, _)| *id != self.id);
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DriverState {
    /// Mounted, no region measured yet.
    Idle,
    /// Region measured and observer attached; progress not moved yet.
    Bound,
    /// Progress has changed at least once since binding.
    Active,
    /// Observer and pending frame released; ticks are ignored.
    Unbound,
}

struct DriverCore {
    state: DriverState,
    track: KeyframeTrack,
    region: Option<ScrollRegion>,
    progress: f32,
    pose: Transform,
    frame_pending: bool,
}

impl DriverCore {
    fn on_tick(&mut self, tick: ScrollTick) {
        if self.state == DriverState::Unbound {
            return;
        }
        let Some(region) = tick.region else {
            // Element not there (yet): keep whatever we had.
            return;
        };
        self.region = Some(region);
        if self.state == DriverState::Idle {
            self.state = DriverState::Bound;
            self.frame_pending = true;
            log::debug!("scroll driver bound to {:?}", region);
        }

        let progress = region.progress(tick.scroll_y);
        if progress != self.progress {
            self.progress = progress;
            self.pose = self.track.sample(progress);
            self.frame_pending = true;
            if self.state == DriverState::Bound {
                log::debug!("scroll driver active");
            }
            self.state = DriverState::Active;
        }
    }
}

/// Binds scroll progress to a keyframe track.
pub struct ScrollDriver {
    core: Rc<RefCell<DriverCore>>,
    subscription: Option<ScrollSubscription>,
}

impl ScrollDriver {
    pub fn new(track: KeyframeTrack) -> Self {
        let pose = track.sample(0.0);
        Self {
            core: Rc::new(RefCell::new(DriverCore {
                state: DriverState::Idle,
                track,
                region: None,
                progress: 0.0,
                pose,
                frame_pending: false,
            })),
            subscription: None,
        }
    }

    /// Attach to `hub`. If the pinned region is not measured yet the driver
    /// stays `Idle` and binds on the first tick that carries one.
    pub fn bind(&mut self, hub: &ScrollHub) {
        if self.state() == DriverState::Unbound || self.subscription.is_some() {
            return;
        }
        let weak = Rc::downgrade(&self.core);
        self.subscription = Some(hub.subscribe(move |tick| {
            if let Some(core) = weak.upgrade() {
                core.borrow_mut().on_tick(tick);
            }
        }));
        self.core.borrow_mut().on_tick(hub.tick());
    }

    /// Release the observer and any pending frame.
    pub fn unbind(&mut self) {
        self.subscription = None;
        let mut core = self.core.borrow_mut();
        if core.state != DriverState::Unbound {
            log::debug!("scroll driver unbound at progress {:.3}", core.progress);
        }
        core.state = DriverState::Unbound;
        core.frame_pending = false;
    }

    pub fn state(&self) -> DriverState {
        self.core.borrow().state
    }

    pub fn progress(&self) -> f32 {
        self.core.borrow().progress
    }

    pub fn pose(&self) -> Transform {
        self.core.borrow().pose
    }

    pub fn region(&self) -> Option<ScrollRegion> {
        self.core.borrow().region
    }

    pub fn frame_pending(&self) -> bool {
        self.core.borrow().frame_pending
    }

    /// Scene updater that writes the current pose into its target whenever a
    /// new one is pending. Removes itself once the driver is unbound/dropped.
    pub fn pose_updater(&self) -> impl FnMut(&mut Transform, &FrameTime) -> UpdateStatus + 'static {
        let weak = Rc::downgrade(&self.core);
        move |target, _| {
            let Some(core) = weak.upgrade() else {
                return UpdateStatus::Remove;
            };
            let mut core = core.borrow_mut();
            if core.state == DriverState::Unbound {
                return UpdateStatus::Remove;
            }
            if core.frame_pending {
                *target = core.pose;
                core.frame_pending = false;
            }
            UpdateStatus::Retain
        }
    }
}

impl Drop for ScrollDriver {
    fn drop(&mut self) {
        self.unbind();
    }
}
