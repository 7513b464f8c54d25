//! Headless scroll showcase: loads the hero model through the asset cache,
//! drives the camera from simulated scroll and disposes everything on exit.

mod args;

use std::cell::RefCell;
use std::rc::Rc;

use anyhow::{Result, ensure};
use asset::{
    AssetCache, AssetResult, FileSource, FormatDecoder, GpuDevice, HeadlessDevice, LoadRequest,
    MemorySource, Model, ModelData,
};
use corelib::camera::Camera;
use corelib::quality::{QualityTier, RenderSettings};
use corelib::scene::{ModelSlot, Renderable, Scene, float, spin};
use corelib::scroll::{KeyframeTrack, ScrollDriver, ScrollHub, ScrollRegion};
use corelib::transform::Transform;
use corelib::{Vec3, vec3};
use futures::executor::LocalPool;
use renderer::{RenderTarget, WgpuDevice};

use crate::args::Config;

const BUILTIN_KEY: &str = "builtin/gem.obj";

/// Octahedron shown when no `--model` is given.
const BUILTIN_GEM: &str = "\
o Gem
v 0 1 0
v 1 0 0
v 0 0 1
v -1 0 0
v 0 0 -1
v 0 -1 0
f 1 3 2
f 1 4 3
f 1 5 4
f 1 2 5
f 6 2 3
f 6 3 4
f 6 4 5
f 6 5 2
";

const FRAME_DT: f32 = 1.0 / 60.0;

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = Config::from_env();
    let tier = config
        .quality
        .unwrap_or_else(|| QualityTier::detect(config.width, config.device_pixel_ratio));
    let settings = tier.settings();
    let (render_w, render_h) =
        settings.render_size(config.width, config.height, config.device_pixel_ratio);
    log::info!(
        "Starting showcase. Viewport {}x{} @ {:.2}x, quality={}, render target {}x{}",
        config.width,
        config.height,
        config.device_pixel_ratio,
        tier,
        render_w,
        render_h
    );

    let (device, _target) = open_device(&config, &settings, render_w, render_h);

    let mut pool = LocalPool::new();
    let (cache, hero_key) = match &config.model {
        Some(path) => (
            AssetCache::new(FileSource::new("."), FormatDecoder::new(), device.clone(), pool.spawner()),
            path.to_string_lossy().into_owned(),
        ),
        None => (
            AssetCache::new(
                MemorySource::new().with(BUILTIN_KEY, BUILTIN_GEM),
                FormatDecoder::new(),
                device.clone(),
                pool.spawner(),
            ),
            BUILTIN_KEY.to_string(),
        ),
    };

    if !config.preload.is_empty() {
        let keys: Vec<&str> = config.preload.iter().map(String::as_str).collect();
        let preload = cache.preload_with_progress(&keys, |f| log::info!("Preload {:.0}%", f * 100.0));
        if let Err(e) = pool.run_until(preload) {
            log::warn!("Preload incomplete: {}", e);
        }
    }

    // Hero entity shows the placeholder until its model arrives.
    let mut scene = Scene::new();
    let hero = scene
        .world
        .spawn(Transform::identity(), Some(Renderable::Placeholder));
    let placeholder = Model::upload(ModelData::placeholder(), &device);
    let mut models: Vec<Model> = Vec::new();

    let settled: Rc<RefCell<Option<AssetResult<Model>>>> = Rc::new(RefCell::new(None));
    let slot = settled.clone();
    let ticket = cache.spawn_load(LoadRequest::new(hero_key.as_str()), move |result| {
        *slot.borrow_mut() = Some(result);
    })?;
    pool.run_until_stalled();

    match settled.borrow_mut().take() {
        Some(Ok(model)) => {
            log::info!(
                "Hero '{}' ready: {} nodes, {} primitives, clips {:?}",
                hero_key,
                model.nodes().len(),
                model.primitive_count(),
                model.animations().iter().map(|c| c.name.as_str()).collect::<Vec<_>>()
            );
            models.push(model);
            let slot = ModelSlot((models.len() - 1) as u32);
            scene.world.set_renderable(hero, Some(Renderable::Model(slot)));
        }
        Some(Err(e)) => log::warn!("Keeping placeholder: {}", e),
        None => log::warn!("Hero load did not settle; keeping placeholder"),
    }
    drop(ticket);

    scene.add_updater(hero, spin(vec3(0.0, 0.6, 0.0)));
    scene.add_updater(hero, float(0.15, 1.5));

    // Camera dollies in and swings over the top as the section scrolls by.
    let track = KeyframeTrack::from_positions([
        vec3(0.0, 0.0, 10.0),
        vec3(4.0, 1.5, 7.0),
        vec3(0.0, 3.0, 4.0),
    ])?;
    let rig = scene
        .world
        .spawn(Transform::from_translation(track.sample(0.0).translation), None);

    let hub = ScrollHub::new();
    let mut driver = ScrollDriver::new(track);
    driver.bind(&hub);
    scene.add_updater(rig, driver.pose_updater());

    let viewport = config.height as f32;
    let region = ScrollRegion::pinned(viewport, viewport * 3.0, viewport);
    hub.set_region(Some(region));

    let aspect = Camera::aspect_of(config.width, config.height);
    let start = region.start - viewport * 0.5;
    let end = region.end + viewport * 0.5;
    for step in 0..=config.scroll_steps {
        let scroll_y = start + (end - start) * step as f32 / config.scroll_steps as f32;
        hub.scroll_to(scroll_y);
        scene.frame(FRAME_DT);

        let eye = scene
            .world
            .transform(rig)
            .map(|t| t.translation)
            .unwrap_or(Vec3::Z * 10.0);
        let camera = Camera::showcase(aspect).with_eye(eye);
        log::info!(
            "scroll {:>7.1}px  progress {:.3}  {:?}  eye ({:.2}, {:.2}, {:.2})",
            scroll_y,
            driver.progress(),
            driver.state(),
            eye.x,
            eye.y,
            eye.z
        );
        for (entity, transform, renderable) in scene.world.iter_renderables() {
            let model = match renderable {
                Renderable::Model(ModelSlot(i)) => models.get(i as usize).unwrap_or(&placeholder),
                Renderable::Placeholder => &placeholder,
            };
            let world = transform.matrix() * model.transform.matrix();
            let ndc = camera.project(world.transform_point3(Vec3::ZERO));
            log::debug!(
                "  entity {} {:?} at ndc ({:.2}, {:.2}), {} primitives",
                entity,
                renderable,
                ndc.x,
                ndc.y,
                model.primitive_count()
            );
        }
    }

    driver.unbind();
    scene.frame(FRAME_DT);
    ensure!(
        hub.listener_count() == 0,
        "scroll listener still registered after unbind"
    );
    log::info!("{} updaters left after unbind", scene.updater_count());

    let mut report = cache.dispose(Some(placeholder));
    for model in models.drain(..) {
        report += cache.dispose(Some(model));
    }
    report += cache.dispose(None);
    log::info!(
        "Released {} buffers and {} textures. Bye!",
        report.buffers,
        report.textures
    );
    Ok(())
}

/// wgpu when allowed and available, the counting headless device otherwise.
fn open_device(
    config: &Config,
    settings: &RenderSettings,
    width: u32,
    height: u32,
) -> (Rc<dyn GpuDevice>, Option<RenderTarget>) {
    if config.gpu {
        match WgpuDevice::headless(settings, config.backends) {
            Ok(device) => {
                log::info!("GPU device: {}", device.adapter_name());
                let target = device.create_render_target(width, height);
                return (Rc::new(device), Some(target));
            }
            Err(e) => log::warn!("{:#}; falling back to headless device", e),
        }
    } else {
        log::info!("GPU disabled; using headless device");
    }
    (Rc::new(HeadlessDevice::new()), None)
}
