// SPDX-License-Identifier: CEPL-1.0
use tracing::{debug, info};

use crate::RenderSize;

/// Windowing side of a presentation surface: the current framebuffer size and
/// a way to let the platform make progress while we wait on it.
pub trait ExtentSource {
    fn framebuffer_size(&self) -> RenderSize;

    /// Blocks briefly so the window system can deliver pending events. Must
    /// not spin.
    fn wait_events(&self);
}

/// Polls `source` until it reports a drawable (non-zero) size.
///
/// Minimized windows report 0x0; building a swapchain for that is invalid, so
/// a rebuild parks here instead.
pub fn wait_for_drawable_extent(source: &dyn ExtentSource) -> RenderSize {
    let mut size = source.framebuffer_size();
    if !size.is_degenerate() {
        return size;
    }

    info!("surface extent is {}x{}, waiting", size.width, size.height);
    let mut polls = 0u32;
    while size.is_degenerate() {
        source.wait_events();
        polls += 1;
        size = source.framebuffer_size();
    }
    debug!(polls, "surface extent restored to {}x{}", size.width, size.height);
    size
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::{Cell, RefCell};

    struct Scripted {
        sizes: RefCell<Vec<RenderSize>>,
        waits: Cell<u32>,
    }

    impl Scripted {
        fn new(mut sizes: Vec<RenderSize>) -> Self {
            sizes.reverse();
            Self {
                sizes: RefCell::new(sizes),
                waits: Cell::new(0),
            }
        }
    }

    impl ExtentSource for Scripted {
        fn framebuffer_size(&self) -> RenderSize {
            let mut sizes = self.sizes.borrow_mut();
            if sizes.len() > 1 {
                sizes.pop().unwrap()
            } else {
                sizes[0]
            }
        }

        fn wait_events(&self) {
            self.waits.set(self.waits.get() + 1);
        }
    }

    #[test]
    fn drawable_extent_returns_immediately() {
        let src = Scripted::new(vec![RenderSize::new(800, 600)]);
        assert_eq!(wait_for_drawable_extent(&src), RenderSize::new(800, 600));
        assert_eq!(src.waits.get(), 0);
    }

    #[test]
    fn minimized_window_is_polled_until_restored() {
        let src = Scripted::new(vec![
            RenderSize::new(0, 0),
            RenderSize::new(0, 0),
            RenderSize::new(640, 0),
            RenderSize::new(640, 480),
        ]);
        let size = wait_for_drawable_extent(&src);
        assert_eq!(size, RenderSize::new(640, 480));
        assert_eq!(src.waits.get(), 3);
    }
}
