// SPDX-License-Identifier: CEPL-1.0
//! `cubic.toml` plus command-line overrides.
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::Parser;
use cubic_render::{Msaa, RenderOptions, ShaderBlobs};
use serde::Deserialize;
use tracing::{debug, warn};

#[derive(Parser, Debug, Default)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Config file; missing means defaults
    #[arg(long, default_value = "cubic.toml")]
    pub config: PathBuf,
    /// Multisampling: "max" or a sample count (1, 2, 4, 8, ...)
    #[arg(long)]
    pub msaa: Option<String>,
    #[arg(long)]
    pub frames_in_flight: Option<usize>,
    /// Force FIFO presentation
    #[arg(long)]
    pub vsync: bool,
}

/// `msaa = "max"` or `msaa = 4`.
#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(untagged)]
pub enum MsaaCfg {
    Count(u32),
    Word(String),
}

impl Default for MsaaCfg {
    fn default() -> Self {
        MsaaCfg::Word("max".into())
    }
}

impl MsaaCfg {
    pub fn resolve(&self) -> Result<Msaa> {
        match self {
            MsaaCfg::Count(n) => Ok(Msaa::Samples(*n)),
            MsaaCfg::Word(w) => parse_msaa(w),
        }
    }
}

pub fn parse_msaa(s: &str) -> Result<Msaa> {
    let s = s.trim();
    if s.eq_ignore_ascii_case("max") {
        return Ok(Msaa::Max);
    }
    match s.parse::<u32>() {
        Ok(n) if n.is_power_of_two() => Ok(Msaa::Samples(n)),
        _ => bail!("invalid msaa setting {s:?} (expected \"max\" or a power of two)"),
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct RenderCfg {
    pub clear_color: [f32; 4],
    pub vsync: bool,
    /// Switch to FIFO while the window is unfocused.
    pub unfocused_vsync: bool,
    pub frames_in_flight: usize,
    pub msaa: MsaaCfg,
    pub fence_timeout_ms: u64,
    pub vertex_shader: Option<PathBuf>,
    pub fragment_shader: Option<PathBuf>,
    pub instances: usize,
}

impl Default for RenderCfg {
    fn default() -> Self {
        RenderCfg {
            clear_color: default_clear(),
            vsync: false,
            unfocused_vsync: true,
            frames_in_flight: 2,
            msaa: MsaaCfg::default(),
            fence_timeout_ms: 5_000,
            vertex_shader: None,
            fragment_shader: None,
            instances: 12,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct WindowCfg {
    pub title: String,
    pub width: u32,
    pub height: u32,
}

impl Default for WindowCfg {
    fn default() -> Self {
        WindowCfg {
            title: "cubic".into(),
            width: 1280,
            height: 720,
        }
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct AppCfg {
    pub render: RenderCfg,
    pub window: WindowCfg,
}

fn default_clear() -> [f32; 4] {
    [0.02, 0.02, 0.04, 1.0]
}

/// Missing file means defaults; a malformed one is reported and ignored.
pub fn load_cfg(path: &Path) -> AppCfg {
    match fs::read_to_string(path) {
        Ok(s) => match toml::from_str::<AppCfg>(&s) {
            Ok(cfg) => cfg,
            Err(e) => {
                warn!("{}: {e}; using defaults", path.display());
                AppCfg::default()
            }
        },
        Err(e) => {
            debug!("{}: {e}; using defaults", path.display());
            AppCfg::default()
        }
    }
}

impl AppCfg {
    /// Command-line flags win over the file.
    pub fn apply_args(&mut self, args: &Args) -> Result<()> {
        if let Some(m) = &args.msaa {
            parse_msaa(m)?;
            self.render.msaa = MsaaCfg::Word(m.clone());
        }
        if let Some(n) = args.frames_in_flight {
            self.render.frames_in_flight = n;
        }
        if args.vsync {
            self.render.vsync = true;
        }
        Ok(())
    }

    pub fn render_options(&self) -> Result<RenderOptions> {
        let r = &self.render;
        if r.frames_in_flight == 0 {
            bail!("frames_in_flight must be at least 1");
        }
        let shaders = match (&r.vertex_shader, &r.fragment_shader) {
            (None, None) => None,
            (Some(v), Some(f)) => Some(ShaderBlobs {
                vertex: fs::read(v).with_context(|| format!("read {}", v.display()))?,
                fragment: fs::read(f).with_context(|| format!("read {}", f.display()))?,
            }),
            _ => bail!("vertex_shader and fragment_shader must be set together"),
        };
        Ok(RenderOptions {
            frames_in_flight: r.frames_in_flight,
            clear_color: r.clear_color,
            vsync: r.vsync,
            msaa: r.msaa.resolve()?,
            fence_timeout: Duration::from_millis(r.fence_timeout_ms),
            shaders,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_file_parses() {
        let cfg: AppCfg = toml::from_str(
            r#"
            [render]
            clear_color = [0.1, 0.2, 0.3, 1.0]
            vsync = true
            frames_in_flight = 3
            msaa = 4
            fence_timeout_ms = 250

            [window]
            title = "demo"
            width = 800
            height = 600
            "#,
        )
        .unwrap();
        assert_eq!(cfg.render.frames_in_flight, 3);
        assert_eq!(cfg.render.msaa, MsaaCfg::Count(4));
        assert_eq!(cfg.window.title, "demo");

        let opts = cfg.render_options().unwrap();
        assert_eq!(opts.msaa, Msaa::Samples(4));
        assert_eq!(opts.fence_timeout, Duration::from_millis(250));
        assert!(opts.vsync);
        assert!(opts.shaders.is_none());
    }

    #[test]
    fn missing_fields_fall_back() {
        let cfg: AppCfg = toml::from_str("[render]\nvsync = true\n").unwrap();
        assert!(cfg.render.vsync);
        assert_eq!(cfg.render.frames_in_flight, 2);
        assert_eq!(cfg.render.msaa.resolve().unwrap(), Msaa::Max);
        assert_eq!(cfg.window.width, 1280);
    }

    #[test]
    fn malformed_file_means_defaults() {
        let path = std::env::temp_dir().join(format!("cubic-bad-{}.toml", std::process::id()));
        fs::write(&path, "[render\nvsync = ").unwrap();
        let cfg = load_cfg(&path);
        fs::remove_file(&path).ok();
        assert!(!cfg.render.vsync);
        assert_eq!(cfg.render.clear_color, default_clear());
    }

    #[test]
    fn missing_file_means_defaults() {
        let cfg = load_cfg(Path::new("/nonexistent/cubic.toml"));
        assert_eq!(cfg.window.title, "cubic");
    }

    #[test]
    fn msaa_strings() {
        assert_eq!(parse_msaa("max").unwrap(), Msaa::Max);
        assert_eq!(parse_msaa(" MAX ").unwrap(), Msaa::Max);
        assert_eq!(parse_msaa("8").unwrap(), Msaa::Samples(8));
        assert!(parse_msaa("3").is_err());
        assert!(parse_msaa("lots").is_err());
    }

    #[test]
    fn args_override_file() {
        let mut cfg = AppCfg::default();
        let args = Args {
            msaa: Some("2".into()),
            frames_in_flight: Some(3),
            vsync: true,
            ..Args::default()
        };
        cfg.apply_args(&args).unwrap();
        let opts = cfg.render_options().unwrap();
        assert_eq!(opts.msaa, Msaa::Samples(2));
        assert_eq!(opts.frames_in_flight, 3);
        assert!(opts.vsync);

        let bad = Args {
            msaa: Some("many".into()),
            ..Args::default()
        };
        assert!(cfg.apply_args(&bad).is_err());
    }

    #[test]
    fn shader_paths_must_come_in_pairs() {
        let mut cfg = AppCfg::default();
        cfg.render.vertex_shader = Some("mesh.vert.spv".into());
        assert!(cfg.render_options().is_err());
        cfg.render.frames_in_flight = 0;
        cfg.render.vertex_shader = None;
        assert!(cfg.render_options().is_err());
    }
}
