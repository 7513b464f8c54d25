//! Scene: entities (Transform + Renderable) plus explicit per-frame updaters.
//!
//! Animation is expressed as `(Entity, UpdateFn)` pairs owned by [`Scene`]
//! and run once per frame, instead of hooks stashed on scene nodes.

use crate::Vec3;
use crate::transform::Transform;

/// Entity id (dense, index into component arrays).
pub type Entity = u32;

/// Index of a loaded model in the consumer's own model table.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ModelSlot(pub u32);

/// What to draw for an entity.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Renderable {
    /// Default visual shown while a model loads or after it failed.
    Placeholder,
    Model(ModelSlot),
}

#[derive(Clone, Copy, Debug)]
struct EntityData {
    transform: Transform,
    renderable: Option<Renderable>,
}

/// Entity store. Ids are never reused, so an updater can't outlive its
/// entity and start driving a newcomer.
#[derive(Default)]
pub struct World {
    entities: Vec<Option<EntityData>>,
}

impl World {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn spawn(&mut self, transform: Transform, renderable: Option<Renderable>) -> Entity {
        let id = self.entities.len() as Entity;
        self.entities.push(Some(EntityData {
            transform,
            renderable,
        }));
        id
    }

    /// Its updaters are dropped on the next frame.
    pub fn despawn(&mut self, e: Entity) {
        if let Some(slot) = self.entities.get_mut(e as usize) {
            *slot = None;
        }
    }

    #[inline]
    pub fn is_alive(&self, e: Entity) -> bool {
        self.get(e).is_some()
    }

    #[inline]
    pub fn transform(&self, e: Entity) -> Option<&Transform> {
        self.get(e).map(|d| &d.transform)
    }

    #[inline]
    pub fn transform_mut(&mut self, e: Entity) -> Option<&mut Transform> {
        self.entities
            .get_mut(e as usize)
            .and_then(Option::as_mut)
            .map(|d| &mut d.transform)
    }

    #[inline]
    pub fn renderable(&self, e: Entity) -> Option<Renderable> {
        self.get(e).and_then(|d| d.renderable)
    }

    /// Swap what an entity draws (placeholder -> loaded model).
    pub fn set_renderable(&mut self, e: Entity, r: Option<Renderable>) {
        if let Some(d) = self.entities.get_mut(e as usize).and_then(Option::as_mut) {
            d.renderable = r;
        }
    }

    /// Live entities that draw something, in spawn order.
    pub fn iter_renderables(&self) -> impl Iterator<Item = (Entity, &Transform, Renderable)> {
        self.entities.iter().enumerate().filter_map(|(i, slot)| {
            let d = slot.as_ref()?;
            Some((i as Entity, &d.transform, d.renderable?))
        })
    }

    fn get(&self, e: Entity) -> Option<&EntityData> {
        self.entities.get(e as usize).and_then(Option::as_ref)
    }
}

/// Timing handed to every updater.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct FrameTime {
    /// Seconds since the previous frame.
    pub dt: f32,
    /// Seconds since the scene was created.
    pub elapsed: f32,
}

/// Whether an updater stays registered after this frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UpdateStatus {
    Retain,
    Remove,
}

pub type UpdateFn = Box<dyn FnMut(&mut Transform, &FrameTime) -> UpdateStatus>;

/// World plus the ordered list of per-frame updaters.
#[derive(Default)]
pub struct Scene {
    pub world: World,
    updaters: Vec<(Entity, UpdateFn)>,
    time: FrameTime,
}

impl Scene {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `update` to run against `entity`'s transform every frame.
    pub fn add_updater<F>(&mut self, entity: Entity, update: F)
    where
        F: FnMut(&mut Transform, &FrameTime) -> UpdateStatus + 'static,
    {
        self.updaters.push((entity, Box::new(update)));
    }

    #[inline]
    pub fn updater_count(&self) -> usize {
        self.updaters.len()
    }

    #[inline]
    pub fn time(&self) -> FrameTime {
        self.time
    }

    /// Advance one frame: every updater runs once, in registration order.
    pub fn frame(&mut self, dt: f32) {
        self.time = FrameTime {
            dt,
            elapsed: self.time.elapsed + dt,
        };
        let Scene {
            world,
            updaters,
            time,
        } = self;
        updaters.retain_mut(|(entity, update)| match world.transform_mut(*entity) {
            Some(t) => update(t, time) == UpdateStatus::Retain,
            None => false,
        });
    }
}

/// Rotate by `rate` radians per second around each Euler axis.
pub fn spin(rate: Vec3) -> impl FnMut(&mut Transform, &FrameTime) -> UpdateStatus {
    move |t, time| {
        t.rotation_euler += rate * time.dt;
        UpdateStatus::Retain
    }
}

/// Bob vertically around the height observed on the first frame.
pub fn float(amplitude: f32, speed: f32) -> impl FnMut(&mut Transform, &FrameTime) -> UpdateStatus {
    let mut base: Option<f32> = None;
    move |t, time| {
        let y = *base.get_or_insert(t.translation.y);
        t.translation.y = y + (time.elapsed * speed).sin() * amplitude;
        UpdateStatus::Retain
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vec3;
    use std::cell::Cell;
    use std::rc::Rc;

    #[test]
    fn updaters_run_once_per_frame_in_order() {
        let mut scene = Scene::new();
        let e = scene.world.spawn(Transform::identity(), Some(Renderable::Placeholder));
        let order = Rc::new(std::cell::RefCell::new(Vec::new()));
        for tag in 0..3 {
            let order = order.clone();
            scene.add_updater(e, move |_, _| {
                order.borrow_mut().push(tag);
                UpdateStatus::Retain
            });
        }
        scene.frame(0.016);
        assert_eq!(*order.borrow(), vec![0, 1, 2]);
    }

    #[test]
    fn removed_and_orphaned_updaters_are_dropped() {
        let mut scene = Scene::new();
        let a = scene.world.spawn(Transform::identity(), None);
        let b = scene.world.spawn(Transform::identity(), None);
        let runs = Rc::new(Cell::new(0));
        let counter = runs.clone();
        scene.add_updater(a, move |_, _| {
            counter.set(counter.get() + 1);
            UpdateStatus::Remove
        });
        scene.add_updater(b, spin(Vec3::Y));
        scene.frame(0.1);
        assert_eq!(scene.updater_count(), 1);

        scene.world.despawn(b);
        scene.frame(0.1);
        assert_eq!(scene.updater_count(), 0);
        assert_eq!(runs.get(), 1);
    }

    #[test]
    fn spin_integrates_rate_over_dt() {
        let mut scene = Scene::new();
        let e = scene.world.spawn(Transform::identity(), None);
        scene.add_updater(e, spin(vec3(0.0, 2.0, 0.0)));
        scene.frame(0.5);
        scene.frame(0.25);
        let t = scene.world.transform(e).copied().unwrap();
        assert!((t.rotation_euler.y - 1.5).abs() < 1e-6);
    }

    #[test]
    fn float_oscillates_around_initial_height() {
        let mut scene = Scene::new();
        let e = scene
            .world
            .spawn(Transform::from_translation(vec3(0.0, 3.0, 0.0)), None);
        scene.add_updater(e, float(0.5, std::f32::consts::PI));
        scene.frame(0.5); // sin(pi/2) = 1
        let y = scene.world.transform(e).unwrap().translation.y;
        assert!((y - 3.5).abs() < 1e-5);
        scene.frame(0.5); // sin(pi) = 0
        let y = scene.world.transform(e).unwrap().translation.y;
        assert!((y - 3.0).abs() < 1e-5);
    }

    #[test]
    fn renderable_swaps_from_placeholder_to_model() {
        let mut world = World::new();
        let e = world.spawn(Transform::identity(), Some(Renderable::Placeholder));
        world.set_renderable(e, Some(Renderable::Model(ModelSlot(0))));
        assert_eq!(world.renderable(e), Some(Renderable::Model(ModelSlot(0))));
        let drawn: Vec<_> = world.iter_renderables().map(|(e, _, r)| (e, r)).collect();
        assert_eq!(drawn, vec![(e, Renderable::Model(ModelSlot(0)))]);
    }

    #[test]
    fn despawned_ids_stay_dead() {
        let mut world = World::new();
        let a = world.spawn(Transform::identity(), Some(Renderable::Placeholder));
        world.despawn(a);
        let b = world.spawn(Transform::identity(), None);
        assert_ne!(a, b);
        assert!(!world.is_alive(a));
        assert!(world.transform_mut(a).is_none());
        assert_eq!(world.iter_renderables().count(), 0);
    }
}
