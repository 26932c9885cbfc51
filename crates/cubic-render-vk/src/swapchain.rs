// SPDX-License-Identifier: CEPL-1.0
//! Swapchain, its image views, and the render targets sized to it.
use ash::khr::swapchain;
use ash::vk;
use cubic_render::{
  Acquired, ExtentSource, RenderError, RenderResult, RenderSize, SurfaceStatus,
};
use tracing::{debug, info};

use crate::device::RenderingDevice;
use crate::instance::{VulkanInstance, WindowSurface};
use crate::memory::{
  create_view, transition_aspect, transition_image, GpuImage, ImageDesc, MemoryKind,
};

const PREFERRED_FORMAT: vk::SurfaceFormatKHR = vk::SurfaceFormatKHR {
  format: vk::Format::B8G8R8A8_UNORM,
  color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
};

// Info only
fn fmt_name(f: vk::Format) -> &'static str {
  match f {
    vk::Format::B8G8R8A8_UNORM => "B8G8R8A8_UNORM",
    vk::Format::B8G8R8A8_SRGB => "B8G8R8A8_SRGB",
    vk::Format::R8G8B8A8_UNORM => "R8G8B8A8_UNORM",
    vk::Format::R8G8B8A8_SRGB => "R8G8B8A8_SRGB",
    vk::Format::A2B10G10R10_UNORM_PACK32 => "A2B10G10R10_UNORM",
    _ => "OTHER",
  }
}

fn pm_name(m: vk::PresentModeKHR) -> &'static str {
  match m {
    vk::PresentModeKHR::FIFO => "FIFO",
    vk::PresentModeKHR::MAILBOX => "MAILBOX",
    vk::PresentModeKHR::IMMEDIATE => "IMMEDIATE",
    vk::PresentModeKHR::FIFO_RELAXED => "FIFO_RELAXED",
    _ => "OTHER",
  }
}

/// BGRA8 with sRGB-nonlinear color space when offered, else whatever comes
/// first. A lone `UNDEFINED` entry means the surface takes anything.
pub fn choose_surface_format(
  formats: &[vk::SurfaceFormatKHR],
) -> RenderResult<vk::SurfaceFormatKHR> {
  match formats {
    [] => Err(RenderError::Surface("surface reports no formats".into())),
    [only] if only.format == vk::Format::UNDEFINED => Ok(PREFERRED_FORMAT),
    _ => Ok(formats
      .iter()
      .copied()
      .find(|f| {
        f.format == PREFERRED_FORMAT.format && f.color_space == PREFERRED_FORMAT.color_space
      })
      .unwrap_or(formats[0])),
  }
}

/// MAILBOX, then IMMEDIATE, then the always-present FIFO. With vsync forced
/// only FIFO is used.
pub fn choose_present_mode(modes: &[vk::PresentModeKHR], vsync: bool) -> vk::PresentModeKHR {
  if vsync {
    return vk::PresentModeKHR::FIFO;
  }
  [vk::PresentModeKHR::MAILBOX, vk::PresentModeKHR::IMMEDIATE]
    .into_iter()
    .find(|m| modes.contains(m))
    .unwrap_or(vk::PresentModeKHR::FIFO)
}

pub fn extent_from_caps(caps: &vk::SurfaceCapabilitiesKHR, want: RenderSize) -> vk::Extent2D {
  if caps.current_extent.width != u32::MAX {
    caps.current_extent
  } else {
    vk::Extent2D {
      width: want
        .width
        .clamp(caps.min_image_extent.width, caps.max_image_extent.width),
      height: want
        .height
        .clamp(caps.min_image_extent.height, caps.max_image_extent.height),
    }
  }
}

pub fn image_count(caps: &vk::SurfaceCapabilitiesKHR) -> u32 {
  let want = caps.min_image_count + 1;
  if caps.max_image_count == 0 {
    want
  } else {
    want.min(caps.max_image_count)
  }
}

/// Everything about a swapchain decided before creating it.
#[derive(Clone, Copy, Debug)]
pub struct SurfacePlan {
  pub format: vk::SurfaceFormatKHR,
  pub present_mode: vk::PresentModeKHR,
  pub extent: vk::Extent2D,
  pub image_count: u32,
  pub transform: vk::SurfaceTransformFlagsKHR,
}

impl SurfacePlan {
  pub fn new(
    caps: &vk::SurfaceCapabilitiesKHR,
    formats: &[vk::SurfaceFormatKHR],
    modes: &[vk::PresentModeKHR],
    want: RenderSize,
    vsync: bool,
  ) -> RenderResult<Self> {
    Ok(Self {
      format: choose_surface_format(formats)?,
      present_mode: choose_present_mode(modes, vsync),
      extent: extent_from_caps(caps, want),
      image_count: image_count(caps),
      transform: caps.current_transform,
    })
  }

  pub fn is_degenerate(&self) -> bool {
    self.extent.width == 0 || self.extent.height == 0
  }
}

/// Swapchain plus the per-image views, the shared depth target, the optional
/// multisample color target and one framebuffer per image.
pub struct PresentationSurface {
  device: ash::Device,
  loader: swapchain::Device,
  swapchain: vk::SwapchainKHR,
  plan: SurfacePlan,
  samples: vk::SampleCountFlags,
  depth_format: vk::Format,
  images: Vec<vk::Image>,
  views: Vec<vk::ImageView>,
  color: Option<GpuImage>,
  depth: Option<GpuImage>,
  framebuffers: Vec<vk::Framebuffer>,
  generation: u64,
}

impl PresentationSurface {
  pub fn build(
    instance: &VulkanInstance,
    dev: &RenderingDevice,
    surface: &WindowSurface,
    desired: RenderSize,
    source: &dyn ExtentSource,
    samples: vk::SampleCountFlags,
    vsync: bool,
  ) -> RenderResult<Self> {
    let mut this = Self {
      device: dev.device.clone(),
      loader: swapchain::Device::new(instance.handle(), &dev.device),
      swapchain: vk::SwapchainKHR::null(),
      plan: SurfacePlan {
        format: PREFERRED_FORMAT,
        present_mode: vk::PresentModeKHR::FIFO,
        extent: vk::Extent2D::default(),
        image_count: 0,
        transform: vk::SurfaceTransformFlagsKHR::IDENTITY,
      },
      samples,
      depth_format: dev.caps.depth_format,
      images: Vec::new(),
      views: Vec::new(),
      color: None,
      depth: None,
      framebuffers: Vec::new(),
      generation: 0,
    };
    this.create(dev, surface, desired, source, vsync)?;
    Ok(this)
  }

  /// Tears everything down and builds again for `desired`. The device must
  /// be idle.
  pub fn rebuild(
    &mut self,
    dev: &RenderingDevice,
    surface: &WindowSurface,
    desired: RenderSize,
    source: &dyn ExtentSource,
    vsync: bool,
  ) -> RenderResult<()> {
    self.release();
    self.generation += 1;
    self.create(dev, surface, desired, source, vsync)
  }

  fn create(
    &mut self,
    dev: &RenderingDevice,
    surface: &WindowSurface,
    desired: RenderSize,
    source: &dyn ExtentSource,
    vsync: bool,
  ) -> RenderResult<()> {
    let plan = poll_plan(desired, source, |want| {
      query_plan(dev, surface, want, vsync)
    })?;
    let families = dev.queues.unique();

    let info = vk::SwapchainCreateInfoKHR {
      s_type: vk::StructureType::SWAPCHAIN_CREATE_INFO_KHR,
      surface: surface.surface,
      min_image_count: plan.image_count,
      image_format: plan.format.format,
      image_color_space: plan.format.color_space,
      image_extent: plan.extent,
      image_array_layers: 1,
      image_usage: vk::ImageUsageFlags::COLOR_ATTACHMENT,
      image_sharing_mode: if dev.queues.is_shared() {
        vk::SharingMode::EXCLUSIVE
      } else {
        vk::SharingMode::CONCURRENT
      },
      queue_family_index_count: if dev.queues.is_shared() {
        0
      } else {
        families.len() as u32
      },
      p_queue_family_indices: families.as_ptr(),
      pre_transform: plan.transform,
      composite_alpha: vk::CompositeAlphaFlagsKHR::OPAQUE,
      present_mode: plan.present_mode,
      clipped: vk::TRUE,
      ..Default::default()
    };

    unsafe {
      self.swapchain = self
        .loader
        .create_swapchain(&info, None)
        .map_err(|e| RenderError::Surface(format!("create_swapchain: {e:?}")))?;
      self.plan = plan;
      self.images = self
        .loader
        .get_swapchain_images(self.swapchain)
        .map_err(|e| RenderError::Surface(format!("get_swapchain_images: {e:?}")))?;
      for &image in &self.images {
        let view = create_view(
          &self.device,
          image,
          plan.format.format,
          vk::ImageAspectFlags::COLOR,
        )?;
        self.views.push(view);
      }
    }

    if self.samples != vk::SampleCountFlags::TYPE_1 {
      let color = GpuImage::new(
        dev,
        ImageDesc {
          extent: plan.extent,
          samples: self.samples,
          format: plan.format.format,
          tiling: vk::ImageTiling::OPTIMAL,
          usage: vk::ImageUsageFlags::TRANSIENT_ATTACHMENT
            | vk::ImageUsageFlags::COLOR_ATTACHMENT,
          aspect: vk::ImageAspectFlags::COLOR,
        },
        MemoryKind::DeviceLocal,
      )?;
      transition_image(
        dev,
        &color,
        vk::ImageLayout::UNDEFINED,
        vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
      )?;
      self.color = Some(color);
    }

    let depth = GpuImage::new(
      dev,
      ImageDesc {
        extent: plan.extent,
        samples: self.samples,
        format: self.depth_format,
        tiling: vk::ImageTiling::OPTIMAL,
        usage: vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT,
        aspect: transition_aspect(
          self.depth_format,
          vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
        ),
      },
      MemoryKind::DeviceLocal,
    )?;
    transition_image(
      dev,
      &depth,
      vk::ImageLayout::UNDEFINED,
      vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
    )?;
    self.depth = Some(depth);

    info!(
      "swapchain #{} ready: {}x{}, {} images, {} / {}, msaa x{}",
      self.generation,
      plan.extent.width,
      plan.extent.height,
      self.images.len(),
      fmt_name(plan.format.format),
      pm_name(plan.present_mode),
      self.samples.as_raw()
    );
    Ok(())
  }

  /// One framebuffer per presentable image. Attachment order matches the
  /// render pass: [msaa color, depth, resolve] or [color, depth].
  pub fn create_framebuffers(&mut self, render_pass: vk::RenderPass) -> RenderResult<()> {
    self.destroy_framebuffers();
    let depth_view = self
      .depth
      .as_ref()
      .map(GpuImage::view)
      .ok_or_else(|| RenderError::Surface("depth target missing".into()))?;
    for &view in &self.views {
      let attachments: Vec<vk::ImageView> = match &self.color {
        Some(color) => vec![color.view(), depth_view, view],
        None => vec![view, depth_view],
      };
      let info = vk::FramebufferCreateInfo {
        s_type: vk::StructureType::FRAMEBUFFER_CREATE_INFO,
        render_pass,
        attachment_count: attachments.len() as u32,
        p_attachments: attachments.as_ptr(),
        width: self.plan.extent.width,
        height: self.plan.extent.height,
        layers: 1,
        ..Default::default()
      };
      let fb = unsafe { self.device.create_framebuffer(&info, None) }
        .map_err(|e| RenderError::device("create_framebuffer", e))?;
      self.framebuffers.push(fb);
    }
    Ok(())
  }

  pub fn acquire_next(&self, signal: vk::Semaphore) -> RenderResult<Acquired> {
    let res = unsafe {
      self.loader
        .acquire_next_image(self.swapchain, u64::MAX, signal, vk::Fence::null())
    };
    match res {
      Ok((image_index, suboptimal)) => Ok(Acquired {
        image_index,
        status: if suboptimal {
          SurfaceStatus::Suboptimal
        } else {
          SurfaceStatus::Optimal
        },
      }),
      Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(Acquired {
        image_index: 0,
        status: SurfaceStatus::Stale,
      }),
      Err(e) => Err(RenderError::Acquire(format!("{e:?}"))),
    }
  }

  pub fn present(
    &self,
    queue: vk::Queue,
    image_index: u32,
    wait: vk::Semaphore,
  ) -> RenderResult<SurfaceStatus> {
    let info = vk::PresentInfoKHR {
      s_type: vk::StructureType::PRESENT_INFO_KHR,
      wait_semaphore_count: 1,
      p_wait_semaphores: &wait,
      swapchain_count: 1,
      p_swapchains: &self.swapchain,
      p_image_indices: &image_index,
      ..Default::default()
    };
    match unsafe { self.loader.queue_present(queue, &info) } {
      Ok(false) => Ok(SurfaceStatus::Optimal),
      Ok(true) | Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(SurfaceStatus::Stale),
      Err(e) => Err(RenderError::Present(format!("{e:?}"))),
    }
  }

  pub fn format(&self) -> vk::Format {
    self.plan.format.format
  }

  pub fn extent(&self) -> vk::Extent2D {
    self.plan.extent
  }

  pub fn plan(&self) -> &SurfacePlan {
    &self.plan
  }

  pub fn samples(&self) -> vk::SampleCountFlags {
    self.samples
  }

  pub fn depth_format(&self) -> vk::Format {
    self.depth_format
  }

  pub fn image_count(&self) -> usize {
    self.images.len()
  }

  pub fn framebuffer(&self, image_index: u32) -> vk::Framebuffer {
    self.framebuffers[image_index as usize]
  }

  fn destroy_framebuffers(&mut self) {
    for fb in self.framebuffers.drain(..) {
      unsafe { self.device.destroy_framebuffer(fb, None) };
    }
  }

  /// Destroys every object of the current generation. Views and framebuffers
  /// go before the swapchain that owns their images.
  fn release(&mut self) {
    self.destroy_framebuffers();
    self.color = None;
    self.depth = None;
    for view in self.views.drain(..) {
      unsafe { self.device.destroy_image_view(view, None) };
    }
    self.images.clear();
    if self.swapchain != vk::SwapchainKHR::null() {
      unsafe { self.loader.destroy_swapchain(self.swapchain, None) };
      self.swapchain = vk::SwapchainKHR::null();
    }
    debug!(generation = self.generation, "swapchain released");
  }
}

impl Drop for PresentationSurface {
  fn drop(&mut self) {
    self.release();
  }
}

/// Capabilities can lag the window after a restore and report 0x0 while the
/// window itself is already drawable. Keeps asking, letting the window system
/// run between attempts, until the surface has an area. `query` gets `desired`
/// first and the live window size after that.
pub fn poll_plan<Q>(
  desired: RenderSize,
  source: &dyn ExtentSource,
  mut query: Q,
) -> RenderResult<SurfacePlan>
where
  Q: FnMut(RenderSize) -> RenderResult<SurfacePlan>,
{
  let mut want = desired;
  let mut polls = 0u32;
  loop {
    let plan = query(want)?;
    if !plan.is_degenerate() {
      if polls > 0 {
        debug!(polls, "surface capabilities caught up");
      }
      return Ok(plan);
    }
    if polls == 0 {
      info!("surface reports a 0x0 extent, waiting");
    }
    polls += 1;
    source.wait_events();
    want = source.framebuffer_size();
  }
}

fn query_plan(
  dev: &RenderingDevice,
  surface: &WindowSurface,
  desired: RenderSize,
  vsync: bool,
) -> RenderResult<SurfacePlan> {
  let (phys, s) = (dev.phys, surface.surface);
  unsafe {
    let caps = surface
      .loader
      .get_physical_device_surface_capabilities(phys, s)
      .map_err(|e| RenderError::Surface(format!("surface capabilities: {e:?}")))?;
    let formats = surface
      .loader
      .get_physical_device_surface_formats(phys, s)
      .map_err(|e| RenderError::Surface(format!("surface formats: {e:?}")))?;
    let modes = surface
      .loader
      .get_physical_device_surface_present_modes(phys, s)
      .map_err(|e| RenderError::Surface(format!("present modes: {e:?}")))?;
    SurfacePlan::new(&caps, &formats, &modes, desired, vsync)
  }
}
