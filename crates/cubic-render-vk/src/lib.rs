// SPDX-License-Identifier: CEPL-1.0
//! Vulkan backend: device selection, the presentation surface, frame slots,
//! GPU memory and the mesh render graph, driven by [`FrameController`].
use std::time::Duration;

use anyhow::{Context, Result};
use ash::vk;
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use tracing::{error, info};

use cubic_core::FrameClock;
use cubic_math::Transforms;
use cubic_render::{
  Acquired, ExtentSource, FrameBackend, FrameController, FrameOutcome, FrameUniforms,
  RebuildReason, RenderError, RenderOptions, RenderResult, RenderSize, Renderer, SceneDesc,
  ShaderBlobs, SurfaceStatus, wait_for_drawable_extent,
};

pub mod device;
pub mod graph;
pub mod instance;
pub mod memory;
pub mod scene;
pub mod shader;
pub mod swapchain;
pub mod sync;

use device::{resolve_sample_count, RenderingDevice};
use graph::{FrameDescriptors, PipelineState, RenderConfiguration};
use instance::{VulkanInstance, WindowSurface};
use scene::{GpuScene, UniformRing};
use shader::builtin_shaders;
use swapchain::PresentationSurface;
use sync::FrameSlots;

pub struct VkRenderer {
  controller: FrameController,
  backend: VkBackend,
}

/// GPU state behind [`FrameBackend`]. Fields drop top to bottom, so everything
/// created from the device comes before it, and the instance goes last.
struct VkBackend {
  slots: FrameSlots,
  descriptors: FrameDescriptors,
  graph: RenderConfiguration,
  surface: PresentationSurface,
  uniforms: UniformRing,
  scene: GpuScene,
  device: RenderingDevice,
  window_surface: WindowSurface,
  instance: VulkanInstance,

  shaders: ShaderBlobs,
  clear: [f32; 4],
  vsync: bool,
  clock: FrameClock,
}

fn bind_descriptors(
  dev: &RenderingDevice,
  graph: &RenderConfiguration,
  uniforms: &UniformRing,
  scene: &GpuScene,
  slots: usize,
) -> RenderResult<FrameDescriptors> {
  let descriptors = FrameDescriptors::new(&dev.device, graph.set_layout(), slots)?;
  for slot in 0..slots {
    descriptors.write(
      slot,
      uniforms.buffer(slot),
      UniformRing::BLOCK_SIZE,
      scene.texture().view(),
      scene.texture().sampler(),
    );
  }
  Ok(descriptors)
}

impl VkBackend {
  fn pipeline_state(&self) -> PipelineState {
    PipelineState::new(
      self.surface.samples(),
      self.surface.extent(),
      self.device.capabilities().sample_shading,
    )
  }
}

impl FrameBackend for VkBackend {
  fn wait_slot(&mut self, slot: usize, timeout: Duration) -> RenderResult<()> {
    self.slots.wait(slot, timeout)
  }

  fn acquire(&mut self, slot: usize) -> RenderResult<Acquired> {
    self.surface.acquire_next(self.slots.get(slot).image_ready)
  }

  fn prepare(&mut self, slot: usize, image_index: u32) -> RenderResult<()> {
    let extent = self.surface.extent();
    let aspect = RenderSize::new(extent.width, extent.height).aspect();
    let [model, view, proj] =
      Transforms::animated(self.clock.elapsed_secs(), aspect).to_arrays();
    self.uniforms
      .write(slot, &FrameUniforms { model, view, proj })?;

    unsafe {
      self.graph.record_frame(
        self.slots.get(slot).cmd,
        self.surface.framebuffer(image_index),
        self.clear,
        self.descriptors.set(slot),
        &[self.scene.batch()],
      )
    }
  }

  fn submit(&mut self, slot: usize, _image_index: u32) -> RenderResult<()> {
    self.slots.reset(slot)?;
    let s = self.slots.get(slot);
    let wait_stage = vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT;
    let info = vk::SubmitInfo {
      s_type: vk::StructureType::SUBMIT_INFO,
      wait_semaphore_count: 1,
      p_wait_semaphores: &s.image_ready,
      p_wait_dst_stage_mask: &wait_stage,
      command_buffer_count: 1,
      p_command_buffers: &s.cmd,
      signal_semaphore_count: 1,
      p_signal_semaphores: &s.render_done,
      ..Default::default()
    };
    unsafe {
      self.device.device.queue_submit(
        self.device.graphics_queue,
        std::slice::from_ref(&info),
        s.in_flight,
      )
    }
    .map_err(|e| RenderError::device("queue_submit", e))
  }

  fn present(&mut self, slot: usize, image_index: u32) -> RenderResult<SurfaceStatus> {
    self.surface.present(
      self.device.present_queue,
      image_index,
      self.slots.get(slot).render_done,
    )
  }

  fn wait_idle(&mut self) -> RenderResult<()> {
    self.device.wait_idle()
  }

  fn rebuild(&mut self, size: RenderSize, source: &dyn ExtentSource) -> RenderResult<()> {
    self.surface
      .rebuild(&self.device, &self.window_surface, size, source, self.vsync)?;
    self.graph = RenderConfiguration::configure(
      &self.device.device,
      self.surface.format(),
      self.surface.depth_format(),
      self.pipeline_state(),
      &self.shaders,
    )?;
    self.surface.create_framebuffers(self.graph.render_pass())?;
    self.descriptors = bind_descriptors(
      &self.device,
      &self.graph,
      &self.uniforms,
      &self.scene,
      self.slots.len(),
    )?;
    Ok(())
  }
}

impl VkRenderer {
  pub fn frame_counter(&self) -> u64 {
    self.controller.frame_counter()
  }

  pub fn device_name(&self) -> &str {
    &self.backend.device.capabilities().name
  }
}

impl Renderer for VkRenderer {
  fn new(
    window: &dyn HasWindowHandle,
    display: &dyn HasDisplayHandle,
    extent: &dyn ExtentSource,
    scene: &SceneDesc,
    options: &RenderOptions,
  ) -> Result<Self> {
    let frames = options.frames_in_flight.max(1);
    let instance = VulkanInstance::for_display(display).context("create Vulkan instance")?;
    let window_surface =
      WindowSurface::new(&instance, window, display).context("create window surface")?;
    let device =
      RenderingDevice::select(&instance, &window_surface).context("select device")?;
    let samples = resolve_sample_count(options.msaa, device.max_sample_count())?;
    let shaders = options.shaders.clone().unwrap_or_else(builtin_shaders);

    let scene = GpuScene::upload(&device, scene).context("upload scene")?;
    let uniforms = UniformRing::new(&device, frames)?;
    let size = wait_for_drawable_extent(extent);
    let mut surface = PresentationSurface::build(
      &instance,
      &device,
      &window_surface,
      size,
      extent,
      samples,
      options.vsync,
    )
    .context("build presentation surface")?;
    let state = PipelineState::new(
      samples,
      surface.extent(),
      device.capabilities().sample_shading,
    );
    let graph = RenderConfiguration::configure(
      &device.device,
      surface.format(),
      surface.depth_format(),
      state,
      &shaders,
    )
    .context("configure render graph")?;
    surface.create_framebuffers(graph.render_pass())?;
    let descriptors = bind_descriptors(&device, &graph, &uniforms, &scene, frames)?;
    let slots = FrameSlots::new(&device, frames)?;

    info!(
      "Vulkan renderer ready ({} frames in flight, msaa x{})",
      frames,
      samples.as_raw()
    );
    Ok(Self {
      controller: FrameController::new(frames, options.fence_timeout),
      backend: VkBackend {
        slots,
        descriptors,
        graph,
        surface,
        uniforms,
        scene,
        device,
        window_surface,
        instance,
        shaders,
        clear: options.clear_color,
        vsync: options.vsync,
        clock: FrameClock::new(),
      },
    })
  }

  fn resize(&mut self, _size: RenderSize) -> Result<()> {
    // the rebuild reads the live window size itself
    self.controller.request_rebuild(RebuildReason::RESIZED);
    Ok(())
  }

  fn render(&mut self, window: &dyn ExtentSource) -> Result<FrameOutcome> {
    Ok(self.controller.draw_frame(&mut self.backend, window)?)
  }

  fn set_clear_color(&mut self, rgba: [f32; 4]) {
    self.backend.clear = rgba;
  }

  fn set_vsync(&mut self, on: bool) {
    if self.backend.vsync != on {
      self.backend.vsync = on;
      self.controller.request_rebuild(RebuildReason::OPTIONS);
    }
  }
}

impl Drop for VkRenderer {
  fn drop(&mut self) {
    if let Err(e) = self.controller.shutdown(&mut self.backend) {
      error!("shutdown: {e}");
    }
  }
}
