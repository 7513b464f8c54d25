//! `--flag=value` command line, parsed by hand.

use std::path::PathBuf;

use corelib::quality::QualityTier;
use renderer::Backends;

#[derive(Clone, Debug, PartialEq)]
pub struct Config {
    /// Hero model on disk; `None` shows the built-in gem.
    pub model: Option<PathBuf>,
    pub preload: Vec<String>,
    pub width: u32,
    pub height: u32,
    pub device_pixel_ratio: f32,
    /// `None` means detect from the viewport.
    pub quality: Option<QualityTier>,
    pub gpu: bool,
    pub backends: Backends,
    pub scroll_steps: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            model: None,
            preload: Vec::new(),
            width: 1280,
            height: 720,
            device_pixel_ratio: 1.0,
            quality: None,
            gpu: true,
            backends: Backends::all(),
            scroll_steps: 10,
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        Self::parse(std::env::args().skip(1))
    }

    /// Unknown flags and bad values are logged and fall back to defaults.
    pub fn parse<I>(args: I) -> Self
    where
        I: IntoIterator<Item = String>,
    {
        let mut cfg = Config::default();
        for arg in args {
            if let Some(v) = arg.strip_prefix("--model=") {
                cfg.model = Some(PathBuf::from(v));
            } else if let Some(v) = arg.strip_prefix("--preload=") {
                cfg.preload = v
                    .split(',')
                    .map(str::trim)
                    .filter(|k| !k.is_empty())
                    .map(str::to_string)
                    .collect();
            } else if let Some(v) = arg.strip_prefix("--size=") {
                if let Some((sw, sh)) = v.split_once('x').or_else(|| v.split_once('X')) {
                    if let (Ok(pw), Ok(ph)) = (sw.parse::<u32>(), sh.parse::<u32>()) {
                        cfg.width = pw;
                        cfg.height = ph;
                    }
                }
            } else if let Some(v) = arg.strip_prefix("--width=") {
                if let Ok(pw) = v.parse::<u32>() {
                    cfg.width = pw;
                }
            } else if let Some(v) = arg.strip_prefix("--height=") {
                if let Ok(ph) = v.parse::<u32>() {
                    cfg.height = ph;
                }
            } else if let Some(v) = arg.strip_prefix("--dpr=") {
                match v.parse::<f32>() {
                    Ok(dpr) if dpr.is_finite() && dpr > 0.0 => cfg.device_pixel_ratio = dpr,
                    _ => log::warn!("Ignoring --dpr={}", v),
                }
            } else if let Some(v) = arg.strip_prefix("--quality=") {
                cfg.quality = match v.to_ascii_lowercase().as_str() {
                    "auto" => None,
                    other => match other.parse::<QualityTier>() {
                        Ok(tier) => Some(tier),
                        Err(e) => {
                            log::warn!("{}; detecting instead", e);
                            None
                        }
                    },
                };
            } else if let Some(v) = arg.strip_prefix("--gpu=") {
                cfg.gpu = !matches!(
                    v.to_ascii_lowercase().as_str(),
                    "0" | "false" | "off" | "no"
                );
            } else if let Some(v) = arg.strip_prefix("--gpu-backend=") {
                cfg.backends = parse_backend(v);
            } else if let Some(v) = arg.strip_prefix("--scroll-steps=") {
                if let Ok(n) = v.parse::<u32>() {
                    cfg.scroll_steps = n;
                }
            } else {
                log::warn!("Unknown argument '{}'", arg);
            }
        }
        cfg.width = cfg.width.max(1);
        cfg.height = cfg.height.max(1);
        cfg.scroll_steps = cfg.scroll_steps.max(1);
        cfg
    }
}

// Accept: auto|vulkan|dx12|metal|gl
fn parse_backend(val: &str) -> Backends {
    match val.to_ascii_lowercase().as_str() {
        "auto" => Backends::all(),
        "vulkan" | "vk" => Backends::VULKAN,
        "dx12" | "d3d12" => Backends::DX12,
        "metal" | "mtl" => Backends::METAL,
        "gl" | "opengl" | "gles" => Backends::GL,
        other => {
            log::warn!("Unknown backend '{}', falling back to auto.", other);
            Backends::all()
        }
    }
}
