// SPDX-License-Identifier: CEPL-1.0
#![deny(unsafe_op_in_unsafe_fn)]
use anyhow::{Context, Result};
use clap::Parser;
use cubic_core::{init_tracing, FrameClock};
use cubic_platform::{window_size, WindowExtent};
use cubic_render::{FrameOutcome, RenderOptions, RenderSize, Renderer};
use cubic_render_vk::VkRenderer;
use tracing::{debug, error, info};

use cubic_platform::winit::{
    application::ApplicationHandler,
    dpi::LogicalSize,
    event::WindowEvent,
    event_loop::{ActiveEventLoop, ControlFlow, EventLoop},
    window::{Window, WindowId},
};

mod assets;
mod config;

use config::{load_cfg, AppCfg, Args};

struct App {
    cfg: AppCfg,
    options: RenderOptions,
    // declared before `window`: the renderer's surface refers to it
    renderer: Option<VkRenderer>,
    window: Option<Window>,
    render_size: RenderSize,

    exiting: bool,
    paused: bool,
    focused: bool,
    clock: FrameClock,
    /// First fatal error; ends the event loop and the process.
    failure: Option<anyhow::Error>,
}

impl App {
    fn new(cfg: AppCfg, options: RenderOptions) -> Self {
        Self {
            cfg,
            options,
            renderer: None,
            window: None,
            render_size: RenderSize::new(1, 1),
            exiting: false,
            paused: false,
            focused: true,
            clock: FrameClock::new(),
            failure: None,
        }
    }

    fn init(&mut self, event_loop: &ActiveEventLoop) -> Result<()> {
        let w = &self.cfg.window;
        let window = event_loop
            .create_window(
                Window::default_attributes()
                    .with_title(w.title.clone())
                    .with_inner_size(LogicalSize::new(w.width, w.height)),
            )
            .context("create_window")?;
        let scene = assets::demo_scene(self.cfg.render.instances);
        let renderer = VkRenderer::new(
            &window,
            &window,
            &WindowExtent::new(&window),
            &scene,
            &self.options,
        )?;
        self.render_size = window_size(&window);
        info!("device = {}", renderer.device_name());
        info!(
            "vsync cfg = {}, frames in flight = {}",
            self.options.vsync, self.options.frames_in_flight
        );

        self.window = Some(window);
        self.renderer = Some(renderer);
        Ok(())
    }

    fn fail(&mut self, event_loop: &ActiveEventLoop, e: anyhow::Error) {
        error!("{e:#}");
        self.failure.get_or_insert(e);
        self.shutdown(event_loop);
    }

    fn shutdown(&mut self, event_loop: &ActiveEventLoop) {
        self.exiting = true;
        self.release_window();
        event_loop.exit();
    }

    /// Renderer first; its surface is built on the window.
    fn release_window(&mut self) {
        self.renderer = None;
        self.window = None;
    }

    fn update_paused(&mut self, now_paused: bool, why: &str) {
        if self.paused != now_paused {
            self.paused = now_paused;
            self.clock.reset_window();
            info!("{why} → paused={}", self.paused);
        } else {
            debug!("{why} (paused unchanged={})", self.paused);
        }
    }
}

impl Drop for App {
    fn drop(&mut self) {
        self.release_window();
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_none() {
            if let Err(e) = self.init(event_loop) {
                self.fail(event_loop, e.context("renderer init"));
                return;
            }
        }

        event_loop.set_control_flow(if self.options.vsync {
            ControlFlow::Wait
        } else {
            ControlFlow::Poll
        });

        self.paused = self.render_size.is_degenerate();
        info!("resumed → paused={}", self.paused);
        if !self.paused {
            if let Some(w) = &self.window {
                w.request_redraw();
            }
        }
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        window_id: WindowId,
        event: WindowEvent,
    ) {
        if let Some(window) = &self.window {
            if window_id != window.id() {
                return;
            }
        }

        match event {
            WindowEvent::CloseRequested => {
                info!("CloseRequested");
                self.shutdown(event_loop);
            }

            WindowEvent::Resized(new_size) => {
                self.render_size = RenderSize::new(new_size.width, new_size.height);
                self.update_paused(
                    self.render_size.is_degenerate(),
                    &format!(
                        "Resized → {}x{}",
                        self.render_size.width, self.render_size.height
                    ),
                );
                if !self.paused {
                    if let Some(r) = &mut self.renderer {
                        if let Err(e) = r.resize(self.render_size) {
                            self.fail(event_loop, e);
                            return;
                        }
                    }
                    if let Some(w) = &self.window {
                        w.request_redraw();
                    }
                }
            }

            WindowEvent::Occluded(occluded) => {
                self.update_paused(
                    occluded || self.render_size.is_degenerate(),
                    &format!("Occluded={occluded}"),
                );
            }

            WindowEvent::Focused(focused) => {
                if self.focused != focused {
                    self.focused = focused;
                    info!("Focused({})", focused);
                    if self.cfg.render.unfocused_vsync {
                        if let Some(r) = &mut self.renderer {
                            r.set_vsync(!focused || self.options.vsync);
                        }
                    }
                }
            }

            WindowEvent::RedrawRequested => {
                if self.exiting || self.paused {
                    return;
                }
                let (Some(window), Some(renderer)) = (&self.window, &mut self.renderer) else {
                    return;
                };
                match renderer.render(&WindowExtent::new(window)) {
                    // count only frames that were actually presented
                    Ok(FrameOutcome::Presented { .. }) => self.clock.frame_rendered(),
                    Ok(FrameOutcome::Skipped) => debug!("frame skipped"),
                    Err(e) => self.fail(event_loop, e.context("render")),
                }
            }

            _ => {}
        }
    }

    fn about_to_wait(&mut self, event_loop: &ActiveEventLoop) {
        if self.exiting {
            return;
        }

        if self.paused {
            // window-size=0 or occluded → sleep
            event_loop.set_control_flow(ControlFlow::Wait);
            return;
        }

        // vsync paces us inside present; otherwise spin
        event_loop.set_control_flow(if self.options.vsync {
            ControlFlow::Wait
        } else {
            ControlFlow::Poll
        });
        if let Some(w) = &self.window {
            w.request_redraw();
        }

        if let Some(fps) = self.clock.poll_fps() {
            info!("fps ~ {}", fps);
        }
    }
}

fn main() -> Result<()> {
    init_tracing();
    let args = Args::parse();
    let mut cfg = load_cfg(&args.config);
    cfg.apply_args(&args)?;
    let options = cfg.render_options()?;

    let event_loop: EventLoop<()> = EventLoop::new()?;
    let mut app = App::new(cfg, options);
    event_loop.run_app(&mut app)?;

    match app.failure.take() {
        Some(e) => Err(e.context("cubic exited with an error")),
        None => {
            info!("bye");
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn app_without_window_releases_cleanly() {
        let cfg = AppCfg::default();
        let options = cfg.render_options().unwrap();
        let mut app = App::new(cfg, options);
        app.release_window();
        assert!(app.renderer.is_none() && app.window.is_none());
        assert!(app.failure.is_none());
        drop(app);
    }
}
