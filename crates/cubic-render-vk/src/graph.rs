// SPDX-License-Identifier: CEPL-1.0
//! Render pass, pipeline and descriptor layout derived from the surface, plus
//! per-frame command recording.
use std::mem::{offset_of, size_of};

use ash::vk;
use cubic_render::{InstanceData, RenderError, RenderResult, ShaderBlobs, Vertex};
use tracing::debug;

use crate::shader::{ShaderModule, ENTRY_POINT};

/// Fixed-function state of the mesh pipeline. A pure function of its inputs,
/// so a rebuild for the same surface reproduces it exactly.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PipelineState {
  pub topology: vk::PrimitiveTopology,
  pub cull_mode: vk::CullModeFlags,
  pub front_face: vk::FrontFace,
  pub depth_test: bool,
  pub depth_write: bool,
  pub depth_compare: vk::CompareOp,
  pub samples: vk::SampleCountFlags,
  pub sample_shading: bool,
  pub min_sample_shading: f32,
  pub blend: bool,
  pub write_mask: vk::ColorComponentFlags,
  pub extent: vk::Extent2D,
}

impl PipelineState {
  pub fn new(
    samples: vk::SampleCountFlags,
    extent: vk::Extent2D,
    sample_shading_supported: bool,
  ) -> Self {
    let multisampled = samples != vk::SampleCountFlags::TYPE_1;
    Self {
      topology: vk::PrimitiveTopology::TRIANGLE_LIST,
      cull_mode: vk::CullModeFlags::BACK,
      front_face: vk::FrontFace::COUNTER_CLOCKWISE,
      depth_test: true,
      depth_write: true,
      depth_compare: vk::CompareOp::LESS,
      samples,
      sample_shading: multisampled && sample_shading_supported,
      min_sample_shading: 1.0,
      blend: false,
      write_mask: vk::ColorComponentFlags::RGBA,
      extent,
    }
  }

  pub fn viewport(&self) -> vk::Viewport {
    vk::Viewport {
      x: 0.0,
      y: 0.0,
      width: self.extent.width as f32,
      height: self.extent.height as f32,
      min_depth: 0.0,
      max_depth: 1.0,
    }
  }

  pub fn scissor(&self) -> vk::Rect2D {
    vk::Rect2D {
      offset: vk::Offset2D { x: 0, y: 0 },
      extent: self.extent,
    }
  }
}

/// Attachments of the single-subpass pass: `[color, depth, resolve]` when
/// multisampled, `[color, depth]` otherwise (color is then the presentable
/// image itself).
#[derive(Clone, Debug)]
pub struct RenderPassLayout {
  pub attachments: Vec<vk::AttachmentDescription>,
  pub color: vk::AttachmentReference,
  pub depth: vk::AttachmentReference,
  pub resolve: Option<vk::AttachmentReference>,
  pub dependency: vk::SubpassDependency,
}

impl RenderPassLayout {
  pub fn new(
    color_format: vk::Format,
    depth_format: vk::Format,
    samples: vk::SampleCountFlags,
  ) -> Self {
    let resolving = samples != vk::SampleCountFlags::TYPE_1;
    let color = vk::AttachmentDescription {
      format: color_format,
      samples,
      load_op: vk::AttachmentLoadOp::CLEAR,
      store_op: vk::AttachmentStoreOp::STORE,
      stencil_load_op: vk::AttachmentLoadOp::DONT_CARE,
      stencil_store_op: vk::AttachmentStoreOp::DONT_CARE,
      initial_layout: vk::ImageLayout::UNDEFINED,
      final_layout: if resolving {
        vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL
      } else {
        vk::ImageLayout::PRESENT_SRC_KHR
      },
      ..Default::default()
    };
    let depth = vk::AttachmentDescription {
      format: depth_format,
      samples,
      load_op: vk::AttachmentLoadOp::CLEAR,
      store_op: vk::AttachmentStoreOp::DONT_CARE,
      stencil_load_op: vk::AttachmentLoadOp::DONT_CARE,
      stencil_store_op: vk::AttachmentStoreOp::DONT_CARE,
      initial_layout: vk::ImageLayout::UNDEFINED,
      final_layout: vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
      ..Default::default()
    };
    let mut attachments = vec![color, depth];
    if resolving {
      attachments.push(vk::AttachmentDescription {
        format: color_format,
        samples: vk::SampleCountFlags::TYPE_1,
        load_op: vk::AttachmentLoadOp::DONT_CARE,
        store_op: vk::AttachmentStoreOp::STORE,
        stencil_load_op: vk::AttachmentLoadOp::DONT_CARE,
        stencil_store_op: vk::AttachmentStoreOp::DONT_CARE,
        initial_layout: vk::ImageLayout::UNDEFINED,
        final_layout: vk::ImageLayout::PRESENT_SRC_KHR,
        ..Default::default()
      });
    }

    let dependency = vk::SubpassDependency {
      src_subpass: vk::SUBPASS_EXTERNAL,
      dst_subpass: 0,
      src_stage_mask: vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT
        | vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS,
      src_access_mask: vk::AccessFlags::empty(),
      dst_stage_mask: vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT
        | vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS,
      dst_access_mask: vk::AccessFlags::COLOR_ATTACHMENT_READ
        | vk::AccessFlags::COLOR_ATTACHMENT_WRITE
        | vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE,
      ..Default::default()
    };

    Self {
      attachments,
      color: vk::AttachmentReference {
        attachment: 0,
        layout: vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
      },
      depth: vk::AttachmentReference {
        attachment: 1,
        layout: vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
      },
      resolve: resolving.then_some(vk::AttachmentReference {
        attachment: 2,
        layout: vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
      }),
      dependency,
    }
  }

  unsafe fn create(&self, device: &ash::Device) -> RenderResult<vk::RenderPass> {
    let subpass = vk::SubpassDescription {
      pipeline_bind_point: vk::PipelineBindPoint::GRAPHICS,
      color_attachment_count: 1,
      p_color_attachments: &self.color,
      p_resolve_attachments: self
        .resolve
        .as_ref()
        .map_or(std::ptr::null(), |r| r as *const _),
      p_depth_stencil_attachment: &self.depth,
      ..Default::default()
    };
    let info = vk::RenderPassCreateInfo {
      s_type: vk::StructureType::RENDER_PASS_CREATE_INFO,
      attachment_count: self.attachments.len() as u32,
      p_attachments: self.attachments.as_ptr(),
      subpass_count: 1,
      p_subpasses: &subpass,
      dependency_count: 1,
      p_dependencies: &self.dependency,
      ..Default::default()
    };
    device
      .create_render_pass(&info, None)
      .map_err(|e| RenderError::device("create_render_pass", e))
  }
}

/// Binding 0 streams [`Vertex`] per vertex, binding 1 streams
/// [`InstanceData`] per instance. Locations match the vertex shader.
pub fn vertex_input() -> (
  [vk::VertexInputBindingDescription; 2],
  [vk::VertexInputAttributeDescription; 7],
) {
  let bindings = [
    vk::VertexInputBindingDescription {
      binding: 0,
      stride: size_of::<Vertex>() as u32,
      input_rate: vk::VertexInputRate::VERTEX,
    },
    vk::VertexInputBindingDescription {
      binding: 1,
      stride: size_of::<InstanceData>() as u32,
      input_rate: vk::VertexInputRate::INSTANCE,
    },
  ];
  let attr = |location, binding, format, offset: usize| vk::VertexInputAttributeDescription {
    location,
    binding,
    format,
    offset: offset as u32,
  };
  use vk::Format as F;
  let attributes = [
    attr(0, 0, F::R32G32B32_SFLOAT, offset_of!(Vertex, pos)),
    attr(1, 0, F::R32G32B32_SFLOAT, offset_of!(Vertex, color)),
    attr(2, 0, F::R32G32_SFLOAT, offset_of!(Vertex, uv)),
    attr(3, 0, F::R32G32B32_SFLOAT, offset_of!(Vertex, normal)),
    attr(4, 1, F::R32G32B32_SFLOAT, offset_of!(InstanceData, position)),
    attr(5, 1, F::R32G32B32_SFLOAT, offset_of!(InstanceData, rotation)),
    attr(6, 1, F::R32_SFLOAT, offset_of!(InstanceData, scale)),
  ];
  (bindings, attributes)
}

/// Everything the per-frame path needs to draw into one surface generation.
pub struct RenderConfiguration {
  device: ash::Device,
  render_pass: vk::RenderPass,
  set_layout: vk::DescriptorSetLayout,
  pipeline_layout: vk::PipelineLayout,
  pipeline: vk::Pipeline,
  state: PipelineState,
}

impl RenderConfiguration {
  pub fn configure(
    device: &ash::Device,
    surface_format: vk::Format,
    depth_format: vk::Format,
    state: PipelineState,
    shaders: &ShaderBlobs,
  ) -> RenderResult<Self> {
    // Modules first: bad blobs fail before any Vulkan object exists.
    let vert = ShaderModule::new(device, &shaders.vertex)?;
    let frag = ShaderModule::new(device, &shaders.fragment)?;

    let layout = RenderPassLayout::new(surface_format, depth_format, state.samples);
    let mut this = Self {
      device: device.clone(),
      render_pass: vk::RenderPass::null(),
      set_layout: vk::DescriptorSetLayout::null(),
      pipeline_layout: vk::PipelineLayout::null(),
      pipeline: vk::Pipeline::null(),
      state,
    };
    unsafe {
      this.render_pass = layout.create(device)?;
      this.set_layout = create_set_layout(device)?;
      let pl_info = vk::PipelineLayoutCreateInfo {
        s_type: vk::StructureType::PIPELINE_LAYOUT_CREATE_INFO,
        set_layout_count: 1,
        p_set_layouts: &this.set_layout,
        ..Default::default()
      };
      this.pipeline_layout = device
        .create_pipeline_layout(&pl_info, None)
        .map_err(|e| RenderError::device("create_pipeline_layout", e))?;
      this.pipeline = this.create_pipeline(&vert, &frag)?;
    }
    debug!(
      samples = state.samples.as_raw(),
      sample_shading = state.sample_shading,
      "render configuration built ({}x{})",
      state.extent.width,
      state.extent.height
    );
    Ok(this)
  }

  unsafe fn create_pipeline(
    &self,
    vert: &ShaderModule,
    frag: &ShaderModule,
  ) -> RenderResult<vk::Pipeline> {
    let s = &self.state;
    let stages = [
      vk::PipelineShaderStageCreateInfo {
        s_type: vk::StructureType::PIPELINE_SHADER_STAGE_CREATE_INFO,
        stage: vk::ShaderStageFlags::VERTEX,
        module: vert.handle(),
        p_name: ENTRY_POINT.as_ptr(),
        ..Default::default()
      },
      vk::PipelineShaderStageCreateInfo {
        s_type: vk::StructureType::PIPELINE_SHADER_STAGE_CREATE_INFO,
        stage: vk::ShaderStageFlags::FRAGMENT,
        module: frag.handle(),
        p_name: ENTRY_POINT.as_ptr(),
        ..Default::default()
      },
    ];

    let (bindings, attributes) = vertex_input();
    let vertex_input = vk::PipelineVertexInputStateCreateInfo {
      s_type: vk::StructureType::PIPELINE_VERTEX_INPUT_STATE_CREATE_INFO,
      vertex_binding_description_count: bindings.len() as u32,
      p_vertex_binding_descriptions: bindings.as_ptr(),
      vertex_attribute_description_count: attributes.len() as u32,
      p_vertex_attribute_descriptions: attributes.as_ptr(),
      ..Default::default()
    };
    let input_assembly = vk::PipelineInputAssemblyStateCreateInfo {
      s_type: vk::StructureType::PIPELINE_INPUT_ASSEMBLY_STATE_CREATE_INFO,
      topology: s.topology,
      ..Default::default()
    };
    let viewport = s.viewport();
    let scissor = s.scissor();
    let viewport_state = vk::PipelineViewportStateCreateInfo {
      s_type: vk::StructureType::PIPELINE_VIEWPORT_STATE_CREATE_INFO,
      viewport_count: 1,
      p_viewports: &viewport,
      scissor_count: 1,
      p_scissors: &scissor,
      ..Default::default()
    };
    let raster = vk::PipelineRasterizationStateCreateInfo {
      s_type: vk::StructureType::PIPELINE_RASTERIZATION_STATE_CREATE_INFO,
      polygon_mode: vk::PolygonMode::FILL,
      cull_mode: s.cull_mode,
      front_face: s.front_face,
      line_width: 1.0,
      ..Default::default()
    };
    let multisample = vk::PipelineMultisampleStateCreateInfo {
      s_type: vk::StructureType::PIPELINE_MULTISAMPLE_STATE_CREATE_INFO,
      rasterization_samples: s.samples,
      sample_shading_enable: s.sample_shading as vk::Bool32,
      min_sample_shading: s.min_sample_shading,
      ..Default::default()
    };
    let depth_stencil = vk::PipelineDepthStencilStateCreateInfo {
      s_type: vk::StructureType::PIPELINE_DEPTH_STENCIL_STATE_CREATE_INFO,
      depth_test_enable: s.depth_test as vk::Bool32,
      depth_write_enable: s.depth_write as vk::Bool32,
      depth_compare_op: s.depth_compare,
      max_depth_bounds: 1.0,
      ..Default::default()
    };
    let blend_attachment = vk::PipelineColorBlendAttachmentState {
      blend_enable: s.blend as vk::Bool32,
      color_write_mask: s.write_mask,
      ..Default::default()
    };
    let blend = vk::PipelineColorBlendStateCreateInfo {
      s_type: vk::StructureType::PIPELINE_COLOR_BLEND_STATE_CREATE_INFO,
      attachment_count: 1,
      p_attachments: &blend_attachment,
      ..Default::default()
    };

    let info = vk::GraphicsPipelineCreateInfo {
      s_type: vk::StructureType::GRAPHICS_PIPELINE_CREATE_INFO,
      stage_count: stages.len() as u32,
      p_stages: stages.as_ptr(),
      p_vertex_input_state: &vertex_input,
      p_input_assembly_state: &input_assembly,
      p_viewport_state: &viewport_state,
      p_rasterization_state: &raster,
      p_multisample_state: &multisample,
      p_depth_stencil_state: &depth_stencil,
      p_color_blend_state: &blend,
      layout: self.pipeline_layout,
      render_pass: self.render_pass,
      subpass: 0,
      ..Default::default()
    };
    let pipelines = self
      .device
      .create_graphics_pipelines(
        vk::PipelineCache::null(),
        std::slice::from_ref(&info),
        None,
      )
      .map_err(|(_, e)| RenderError::device("create_graphics_pipelines", e))?;
    pipelines
      .into_iter()
      .next()
      .ok_or_else(|| RenderError::device("create_graphics_pipelines", "no pipeline returned"))
  }

  pub fn render_pass(&self) -> vk::RenderPass {
    self.render_pass
  }

  pub fn set_layout(&self) -> vk::DescriptorSetLayout {
    self.set_layout
  }

  pub fn state(&self) -> &PipelineState {
    &self.state
  }
}

impl Drop for RenderConfiguration {
  fn drop(&mut self) {
    unsafe {
      let d = &self.device;
      if self.pipeline != vk::Pipeline::null() {
        d.destroy_pipeline(self.pipeline, None);
      }
      if self.pipeline_layout != vk::PipelineLayout::null() {
        d.destroy_pipeline_layout(self.pipeline_layout, None);
      }
      if self.set_layout != vk::DescriptorSetLayout::null() {
        d.destroy_descriptor_set_layout(self.set_layout, None);
      }
      if self.render_pass != vk::RenderPass::null() {
        d.destroy_render_pass(self.render_pass, None);
      }
    }
  }
}

/// Binding 0: frame uniforms (vertex). Binding 1: albedo (fragment).
pub fn set_layout_bindings() -> [vk::DescriptorSetLayoutBinding<'static>; 2] {
  [
    vk::DescriptorSetLayoutBinding {
      binding: 0,
      descriptor_type: vk::DescriptorType::UNIFORM_BUFFER,
      descriptor_count: 1,
      stage_flags: vk::ShaderStageFlags::VERTEX,
      ..Default::default()
    },
    vk::DescriptorSetLayoutBinding {
      binding: 1,
      descriptor_type: vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
      descriptor_count: 1,
      stage_flags: vk::ShaderStageFlags::FRAGMENT,
      ..Default::default()
    },
  ]
}

unsafe fn create_set_layout(device: &ash::Device) -> RenderResult<vk::DescriptorSetLayout> {
  let bindings = set_layout_bindings();
  let info = vk::DescriptorSetLayoutCreateInfo {
    s_type: vk::StructureType::DESCRIPTOR_SET_LAYOUT_CREATE_INFO,
    binding_count: bindings.len() as u32,
    p_bindings: bindings.as_ptr(),
    ..Default::default()
  };
  device
    .create_descriptor_set_layout(&info, None)
    .map_err(|e| RenderError::device("create_descriptor_set_layout", e))
}

/// One descriptor set per frame slot, from a pool sized exactly for them.
pub struct FrameDescriptors {
  device: ash::Device,
  pool: vk::DescriptorPool,
  sets: Vec<vk::DescriptorSet>,
}

impl FrameDescriptors {
  pub fn new(
    device: &ash::Device,
    layout: vk::DescriptorSetLayout,
    count: usize,
  ) -> RenderResult<Self> {
    let sizes = [
      vk::DescriptorPoolSize {
        ty: vk::DescriptorType::UNIFORM_BUFFER,
        descriptor_count: count as u32,
      },
      vk::DescriptorPoolSize {
        ty: vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
        descriptor_count: count as u32,
      },
    ];
    let pool_info = vk::DescriptorPoolCreateInfo {
      s_type: vk::StructureType::DESCRIPTOR_POOL_CREATE_INFO,
      max_sets: count as u32,
      pool_size_count: sizes.len() as u32,
      p_pool_sizes: sizes.as_ptr(),
      ..Default::default()
    };
    let pool = unsafe { device.create_descriptor_pool(&pool_info, None) }
      .map_err(|e| RenderError::device("create_descriptor_pool", e))?;
    let mut this = Self {
      device: device.clone(),
      pool,
      sets: Vec::new(),
    };

    let layouts = vec![layout; count];
    let alloc = vk::DescriptorSetAllocateInfo {
      s_type: vk::StructureType::DESCRIPTOR_SET_ALLOCATE_INFO,
      descriptor_pool: pool,
      descriptor_set_count: layouts.len() as u32,
      p_set_layouts: layouts.as_ptr(),
      ..Default::default()
    };
    this.sets = unsafe { device.allocate_descriptor_sets(&alloc) }
      .map_err(|e| RenderError::device("allocate_descriptor_sets", e))?;
    Ok(this)
  }

  /// Points the set of `slot` at its uniform buffer and the shared texture.
  pub fn write(
    &self,
    slot: usize,
    uniforms: vk::Buffer,
    uniforms_len: vk::DeviceSize,
    view: vk::ImageView,
    sampler: vk::Sampler,
  ) {
    let buffer_info = vk::DescriptorBufferInfo {
      buffer: uniforms,
      offset: 0,
      range: uniforms_len,
    };
    let image_info = vk::DescriptorImageInfo {
      sampler,
      image_view: view,
      image_layout: vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
    };
    let writes = [
      vk::WriteDescriptorSet {
        s_type: vk::StructureType::WRITE_DESCRIPTOR_SET,
        dst_set: self.sets[slot],
        dst_binding: 0,
        descriptor_count: 1,
        descriptor_type: vk::DescriptorType::UNIFORM_BUFFER,
        p_buffer_info: &buffer_info,
        ..Default::default()
      },
      vk::WriteDescriptorSet {
        s_type: vk::StructureType::WRITE_DESCRIPTOR_SET,
        dst_set: self.sets[slot],
        dst_binding: 1,
        descriptor_count: 1,
        descriptor_type: vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
        p_image_info: &image_info,
        ..Default::default()
      },
    ];
    unsafe { self.device.update_descriptor_sets(&writes, &[]) };
  }

  pub fn set(&self, slot: usize) -> vk::DescriptorSet {
    self.sets[slot]
  }

  pub fn len(&self) -> usize {
    self.sets.len()
  }

  pub fn is_empty(&self) -> bool {
    self.sets.is_empty()
  }
}

impl Drop for FrameDescriptors {
  fn drop(&mut self) {
    // sets go with the pool
    unsafe { self.device.destroy_descriptor_pool(self.pool, None) };
  }
}

/// One indexed, instanced draw.
#[derive(Clone, Copy, Debug)]
pub struct DrawBatch {
  pub vertices: vk::Buffer,
  pub instances: vk::Buffer,
  pub indices: vk::Buffer,
  pub index_count: u32,
  pub instance_count: u32,
}

pub fn clear_values(color: [f32; 4]) -> [vk::ClearValue; 2] {
  [
    vk::ClearValue {
      color: vk::ClearColorValue { float32: color },
    },
    vk::ClearValue {
      depth_stencil: vk::ClearDepthStencilValue {
        depth: 1.0,
        stencil: 0,
      },
    },
  ]
}

impl RenderConfiguration {
  /// Resets and records `cmd` for one frame. Resolve attachments have no
  /// clear, so two clear values cover both layouts.
  ///
  /// # Safety
  /// `cmd` must not be pending and every handle in `batches` must be alive.
  pub unsafe fn record_frame(
    &self,
    cmd: vk::CommandBuffer,
    framebuffer: vk::Framebuffer,
    clear: [f32; 4],
    set: vk::DescriptorSet,
    batches: &[DrawBatch],
  ) -> RenderResult<()> {
    let d = &self.device;
    d.reset_command_buffer(cmd, vk::CommandBufferResetFlags::empty())
      .map_err(|e| RenderError::device("reset_command_buffer", e))?;
    let begin = vk::CommandBufferBeginInfo {
      s_type: vk::StructureType::COMMAND_BUFFER_BEGIN_INFO,
      flags: vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT,
      ..Default::default()
    };
    d.begin_command_buffer(cmd, &begin)
      .map_err(|e| RenderError::device("begin_command_buffer", e))?;

    let clears = clear_values(clear);
    let rp_begin = vk::RenderPassBeginInfo {
      s_type: vk::StructureType::RENDER_PASS_BEGIN_INFO,
      render_pass: self.render_pass,
      framebuffer,
      render_area: self.state.scissor(),
      clear_value_count: clears.len() as u32,
      p_clear_values: clears.as_ptr(),
      ..Default::default()
    };
    d.cmd_begin_render_pass(cmd, &rp_begin, vk::SubpassContents::INLINE);
    d.cmd_bind_pipeline(cmd, vk::PipelineBindPoint::GRAPHICS, self.pipeline);
    d.cmd_bind_descriptor_sets(
      cmd,
      vk::PipelineBindPoint::GRAPHICS,
      self.pipeline_layout,
      0,
      std::slice::from_ref(&set),
      &[],
    );
    for b in batches {
      d.cmd_bind_vertex_buffers(cmd, 0, &[b.vertices, b.instances], &[0, 0]);
      d.cmd_bind_index_buffer(cmd, b.indices, 0, vk::IndexType::UINT32);
      d.cmd_draw_indexed(cmd, b.index_count, b.instance_count, 0, 0, 0);
    }
    d.cmd_end_render_pass(cmd);

    d.end_command_buffer(cmd)
      .map_err(|e| RenderError::device("end_command_buffer", e))
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  const EXTENT: vk::Extent2D = vk::Extent2D {
    width: 1280,
    height: 720,
  };

  #[test]
  fn pipeline_state_is_reproducible() {
    let a = PipelineState::new(vk::SampleCountFlags::TYPE_4, EXTENT, true);
    let b = PipelineState::new(vk::SampleCountFlags::TYPE_4, EXTENT, true);
    assert_eq!(a, b);
    assert_eq!(a.cull_mode, vk::CullModeFlags::BACK);
    assert_eq!(a.front_face, vk::FrontFace::COUNTER_CLOCKWISE);
    assert_eq!(a.depth_compare, vk::CompareOp::LESS);
    assert!(a.depth_test && a.depth_write && !a.blend);
    assert_eq!(a.write_mask, vk::ColorComponentFlags::RGBA);
  }

  #[test]
  fn sample_shading_only_when_multisampled() {
    assert!(PipelineState::new(vk::SampleCountFlags::TYPE_8, EXTENT, true).sample_shading);
    assert!(!PipelineState::new(vk::SampleCountFlags::TYPE_1, EXTENT, true).sample_shading);
    assert!(!PipelineState::new(vk::SampleCountFlags::TYPE_8, EXTENT, false).sample_shading);
  }

  #[test]
  fn viewport_and_scissor_cover_extent() {
    let s = PipelineState::new(vk::SampleCountFlags::TYPE_1, EXTENT, false);
    assert_eq!((s.viewport().width, s.viewport().height), (1280.0, 720.0));
    assert_eq!(s.scissor().extent, EXTENT);
  }

  #[test]
  fn multisampled_pass_resolves_into_presentable_image() {
    let l = RenderPassLayout::new(
      vk::Format::B8G8R8A8_UNORM,
      vk::Format::D32_SFLOAT,
      vk::SampleCountFlags::TYPE_4,
    );
    assert_eq!(l.attachments.len(), 3);
    let [color, depth, resolve] = [l.attachments[0], l.attachments[1], l.attachments[2]];
    assert_eq!(color.samples, vk::SampleCountFlags::TYPE_4);
    assert_eq!(color.final_layout, vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL);
    assert_eq!(color.store_op, vk::AttachmentStoreOp::STORE);
    assert_eq!(depth.store_op, vk::AttachmentStoreOp::DONT_CARE);
    assert_eq!(
      depth.final_layout,
      vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL
    );
    assert_eq!(resolve.samples, vk::SampleCountFlags::TYPE_1);
    assert_eq!(resolve.load_op, vk::AttachmentLoadOp::DONT_CARE);
    assert_eq!(resolve.final_layout, vk::ImageLayout::PRESENT_SRC_KHR);
    assert_eq!(l.resolve.map(|r| r.attachment), Some(2));
  }

  #[test]
  fn single_sample_pass_has_no_resolve() {
    let l = RenderPassLayout::new(
      vk::Format::B8G8R8A8_UNORM,
      vk::Format::D32_SFLOAT,
      vk::SampleCountFlags::TYPE_1,
    );
    assert_eq!(l.attachments.len(), 2);
    assert!(l.resolve.is_none());
    assert_eq!(l.attachments[0].final_layout, vk::ImageLayout::PRESENT_SRC_KHR);
  }

  #[test]
  fn external_dependency_guards_color_output() {
    let dep = RenderPassLayout::new(
      vk::Format::B8G8R8A8_UNORM,
      vk::Format::D32_SFLOAT,
      vk::SampleCountFlags::TYPE_2,
    )
    .dependency;
    assert_eq!(dep.src_subpass, vk::SUBPASS_EXTERNAL);
    assert_eq!(dep.dst_subpass, 0);
    assert!(dep
      .dst_stage_mask
      .contains(vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT));
    assert!(dep.dst_access_mask.contains(
      vk::AccessFlags::COLOR_ATTACHMENT_READ | vk::AccessFlags::COLOR_ATTACHMENT_WRITE
    ));
  }

  #[test]
  fn vertex_layout_matches_shader_locations() {
    let (bindings, attrs) = vertex_input();
    assert_eq!(bindings[0].input_rate, vk::VertexInputRate::VERTEX);
    assert_eq!(bindings[0].stride, 44);
    assert_eq!(bindings[1].input_rate, vk::VertexInputRate::INSTANCE);
    assert_eq!(bindings[1].stride, 28);
    let locations: Vec<u32> = attrs.iter().map(|a| a.location).collect();
    assert_eq!(locations, (0..7).collect::<Vec<_>>());
    assert!(attrs[..4].iter().all(|a| a.binding == 0));
    assert!(attrs[4..].iter().all(|a| a.binding == 1));
    assert_eq!(attrs[3].offset, 32);
    assert_eq!(attrs[6].offset, 24);
  }

  #[test]
  fn descriptor_bindings() {
    let [ubo, tex] = set_layout_bindings();
    assert_eq!(ubo.descriptor_type, vk::DescriptorType::UNIFORM_BUFFER);
    assert_eq!(ubo.stage_flags, vk::ShaderStageFlags::VERTEX);
    assert_eq!(tex.binding, 1);
    assert_eq!(tex.stage_flags, vk::ShaderStageFlags::FRAGMENT);
  }

  #[test]
  fn depth_clears_to_far_plane() {
    let c = clear_values([0.1, 0.2, 0.3, 1.0]);
    unsafe {
      assert_eq!(c[0].color.float32, [0.1, 0.2, 0.3, 1.0]);
      assert_eq!(c[1].depth_stencil.depth, 1.0);
      assert_eq!(c[1].depth_stencil.stencil, 0);
    }
  }
}
