// SPDX-License-Identifier: CEPL-1.0
pub use winit;

use std::time::Duration;

use cubic_render::{ExtentSource, RenderSize};
use tracing::trace;
use winit::window::Window;

/// How long a rebuild sleeps between size polls while the window is
/// minimized.
pub const EXTENT_POLL_INTERVAL: Duration = Duration::from_millis(16);

pub fn window_size(window: &Window) -> RenderSize {
    let s = window.inner_size();
    RenderSize::new(s.width, s.height)
}

/// Lends a window to the renderer as its source of framebuffer size.
///
/// winit owns event dispatch, so `wait_events` cannot pump the queue; it
/// yields the thread for one poll interval and lets the OS catch up.
pub struct WindowExtent<'a> {
    window: &'a Window,
    poll_interval: Duration,
}

impl<'a> WindowExtent<'a> {
    pub fn new(window: &'a Window) -> Self {
        Self {
            window,
            poll_interval: EXTENT_POLL_INTERVAL,
        }
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }
}

impl ExtentSource for WindowExtent<'_> {
    fn framebuffer_size(&self) -> RenderSize {
        window_size(self.window)
    }

    fn wait_events(&self) {
        trace!("window extent degenerate, sleeping {:?}", self.poll_interval);
        std::thread::sleep(self.poll_interval);
    }
}
