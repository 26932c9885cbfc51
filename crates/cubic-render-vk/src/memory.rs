// SPDX-License-Identifier: CEPL-1.0
//! Buffers, images and staged host -> device transfers.
//!
//! Every resource owns its memory and frees it on drop. Drop order relative to
//! the [`RenderingDevice`] is the caller's job: resources first, device last.
use ash::vk;
use cubic_render::{AllocationError, RenderError, RenderResult};
use tracing::trace;

use crate::device::{has_stencil, RenderingDevice};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MemoryKind {
  /// GPU-only; filled through a staging buffer.
  DeviceLocal,
  /// Mappable, may need explicit flushes.
  HostVisible,
  /// Mappable and coherent.
  HostCoherent,
}

impl MemoryKind {
  pub fn flags(self) -> vk::MemoryPropertyFlags {
    match self {
      MemoryKind::DeviceLocal => vk::MemoryPropertyFlags::DEVICE_LOCAL,
      MemoryKind::HostVisible => vk::MemoryPropertyFlags::HOST_VISIBLE,
      MemoryKind::HostCoherent => {
        vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT
      }
    }
  }
}

/// Lowest memory type allowed by `type_bits` whose flags contain `required`.
pub fn find_memory_type(
  props: &vk::PhysicalDeviceMemoryProperties,
  type_bits: u32,
  required: vk::MemoryPropertyFlags,
) -> RenderResult<u32> {
  (0..props.memory_type_count.min(vk::MAX_MEMORY_TYPES as u32))
    .find(|&i| {
      type_bits & (1 << i) != 0
        && props.memory_types[i as usize]
          .property_flags
          .contains(required)
    })
    .ok_or_else(|| {
      AllocationError::NoSuitableMemory {
        type_bits,
        requested: format!("{required:?}"),
      }
      .into()
    })
}

unsafe fn allocate(
  dev: &RenderingDevice,
  req: vk::MemoryRequirements,
  kind: MemoryKind,
) -> RenderResult<(vk::DeviceMemory, vk::MemoryPropertyFlags)> {
  let index = find_memory_type(&dev.caps.memory, req.memory_type_bits, kind.flags())?;
  let info = vk::MemoryAllocateInfo {
    s_type: vk::StructureType::MEMORY_ALLOCATE_INFO,
    allocation_size: req.size,
    memory_type_index: index,
    ..Default::default()
  };
  let memory = dev
    .device
    .allocate_memory(&info, None)
    .map_err(|e| AllocationError::OutOfMemory(format!("{e:?}")))?;
  Ok((
    memory,
    dev.caps.memory.memory_types[index as usize].property_flags,
  ))
}

pub struct GpuBuffer {
  device: ash::Device,
  buffer: vk::Buffer,
  memory: vk::DeviceMemory,
  size: vk::DeviceSize,
  flags: vk::MemoryPropertyFlags,
}

impl GpuBuffer {
  pub fn new(
    dev: &RenderingDevice,
    size: vk::DeviceSize,
    usage: vk::BufferUsageFlags,
    kind: MemoryKind,
  ) -> RenderResult<Self> {
    if size == 0 {
      return Err(AllocationError::ZeroSize.into());
    }
    let d = &dev.device;
    let info = vk::BufferCreateInfo {
      s_type: vk::StructureType::BUFFER_CREATE_INFO,
      size,
      usage,
      sharing_mode: vk::SharingMode::EXCLUSIVE,
      ..Default::default()
    };
    unsafe {
      let buffer = d
        .create_buffer(&info, None)
        .map_err(|e| RenderError::device("create_buffer", e))?;
      let req = d.get_buffer_memory_requirements(buffer);
      let (memory, flags) = match allocate(dev, req, kind) {
        Ok(m) => m,
        Err(e) => {
          d.destroy_buffer(buffer, None);
          return Err(e);
        }
      };
      if let Err(e) = d.bind_buffer_memory(buffer, memory, 0) {
        d.destroy_buffer(buffer, None);
        d.free_memory(memory, None);
        return Err(RenderError::device("bind_buffer_memory", e));
      }
      Ok(Self {
        device: d.clone(),
        buffer,
        memory,
        size,
        flags,
      })
    }
  }

  /// Device-local buffer filled from `bytes` through a staging buffer.
  pub fn with_data(
    dev: &RenderingDevice,
    usage: vk::BufferUsageFlags,
    bytes: &[u8],
  ) -> RenderResult<Self> {
    let buffer = Self::new(
      dev,
      bytes.len() as vk::DeviceSize,
      usage | vk::BufferUsageFlags::TRANSFER_DST,
      MemoryKind::DeviceLocal,
    )?;
    upload_buffer(dev, &buffer, bytes)?;
    Ok(buffer)
  }

  pub fn handle(&self) -> vk::Buffer {
    self.buffer
  }

  pub fn size(&self) -> vk::DeviceSize {
    self.size
  }

  pub fn is_host_visible(&self) -> bool {
    self.flags.contains(vk::MemoryPropertyFlags::HOST_VISIBLE)
  }

  pub fn is_coherent(&self) -> bool {
    self.flags.contains(vk::MemoryPropertyFlags::HOST_COHERENT)
  }

  /// Copies `bytes` in at `offset` through a temporary mapping. Non-coherent
  /// memory is flushed before unmapping.
  pub fn write(&self, offset: vk::DeviceSize, bytes: &[u8]) -> RenderResult<()> {
    let end = offset + bytes.len() as vk::DeviceSize;
    if end > self.size {
      return Err(AllocationError::Overflow {
        len: end,
        capacity: self.size,
      }
      .into());
    }
    unsafe {
      let ptr = self.map()?;
      std::ptr::copy_nonoverlapping(
        bytes.as_ptr(),
        ptr.add(offset as usize),
        bytes.len(),
      );
      let flushed = if self.is_coherent() {
        Ok(())
      } else {
        self.device.flush_mapped_memory_ranges(&[self.whole_range()])
      };
      self.device.unmap_memory(self.memory);
      flushed.map_err(|e| RenderError::device("flush_mapped_memory_ranges", e))
    }
  }

  pub fn read(&self) -> RenderResult<Vec<u8>> {
    unsafe {
      let ptr = self.map()?;
      if !self.is_coherent() {
        if let Err(e) = self
          .device
          .invalidate_mapped_memory_ranges(&[self.whole_range()])
        {
          self.device.unmap_memory(self.memory);
          return Err(RenderError::device("invalidate_mapped_memory_ranges", e));
        }
      }
      let out = std::slice::from_raw_parts(ptr as *const u8, self.size as usize).to_vec();
      self.device.unmap_memory(self.memory);
      Ok(out)
    }
  }

  unsafe fn map(&self) -> RenderResult<*mut u8> {
    if !self.is_host_visible() {
      return Err(RenderError::device(
        "map_memory",
        "buffer memory is not host visible",
      ));
    }
    self.device
      .map_memory(self.memory, 0, vk::WHOLE_SIZE, vk::MemoryMapFlags::empty())
      .map(|p| p as *mut u8)
      .map_err(|e| RenderError::device("map_memory", e))
  }

  fn whole_range(&self) -> vk::MappedMemoryRange<'static> {
    vk::MappedMemoryRange {
      s_type: vk::StructureType::MAPPED_MEMORY_RANGE,
      memory: self.memory,
      offset: 0,
      size: vk::WHOLE_SIZE,
      ..Default::default()
    }
  }
}

impl Drop for GpuBuffer {
  fn drop(&mut self) {
    unsafe {
      self.device.destroy_buffer(self.buffer, None);
      self.device.free_memory(self.memory, None);
    }
  }
}

#[derive(Clone, Copy, Debug)]
pub struct ImageDesc {
  pub extent: vk::Extent2D,
  pub samples: vk::SampleCountFlags,
  pub format: vk::Format,
  pub tiling: vk::ImageTiling,
  pub usage: vk::ImageUsageFlags,
  pub aspect: vk::ImageAspectFlags,
}

/// Single-mip 2D image with one view over it.
pub struct GpuImage {
  device: ash::Device,
  image: vk::Image,
  memory: vk::DeviceMemory,
  view: vk::ImageView,
  desc: ImageDesc,
}

impl GpuImage {
  pub fn new(dev: &RenderingDevice, desc: ImageDesc, kind: MemoryKind) -> RenderResult<Self> {
    if desc.extent.width == 0 || desc.extent.height == 0 {
      return Err(AllocationError::ZeroSize.into());
    }
    let d = &dev.device;
    let info = vk::ImageCreateInfo {
      s_type: vk::StructureType::IMAGE_CREATE_INFO,
      image_type: vk::ImageType::TYPE_2D,
      format: desc.format,
      extent: vk::Extent3D {
        width: desc.extent.width,
        height: desc.extent.height,
        depth: 1,
      },
      mip_levels: 1,
      array_layers: 1,
      samples: desc.samples,
      tiling: desc.tiling,
      usage: desc.usage,
      sharing_mode: vk::SharingMode::EXCLUSIVE,
      initial_layout: vk::ImageLayout::UNDEFINED,
      ..Default::default()
    };
    unsafe {
      let image = d
        .create_image(&info, None)
        .map_err(|e| RenderError::device("create_image", e))?;
      let req = d.get_image_memory_requirements(image);
      let (memory, _) = match allocate(dev, req, kind) {
        Ok(m) => m,
        Err(e) => {
          d.destroy_image(image, None);
          return Err(e);
        }
      };
      if let Err(e) = d.bind_image_memory(image, memory, 0) {
        d.destroy_image(image, None);
        d.free_memory(memory, None);
        return Err(RenderError::device("bind_image_memory", e));
      }
      let view = match create_view(d, image, desc.format, desc.aspect) {
        Ok(v) => v,
        Err(e) => {
          d.destroy_image(image, None);
          d.free_memory(memory, None);
          return Err(e);
        }
      };
      Ok(Self {
        device: d.clone(),
        image,
        memory,
        view,
        desc,
      })
    }
  }

  pub fn handle(&self) -> vk::Image {
    self.image
  }

  pub fn view(&self) -> vk::ImageView {
    self.view
  }

  pub fn desc(&self) -> &ImageDesc {
    &self.desc
  }
}

impl Drop for GpuImage {
  fn drop(&mut self) {
    unsafe {
      self.device.destroy_image_view(self.view, None);
      self.device.destroy_image(self.image, None);
      self.device.free_memory(self.memory, None);
    }
  }
}

pub(crate) unsafe fn create_view(
  device: &ash::Device,
  image: vk::Image,
  format: vk::Format,
  aspect: vk::ImageAspectFlags,
) -> RenderResult<vk::ImageView> {
  let info = vk::ImageViewCreateInfo {
    s_type: vk::StructureType::IMAGE_VIEW_CREATE_INFO,
    image,
    view_type: vk::ImageViewType::TYPE_2D,
    format,
    subresource_range: subresource(aspect),
    ..Default::default()
  };
  device
    .create_image_view(&info, None)
    .map_err(|e| RenderError::device("create_image_view", e))
}

fn subresource(aspect: vk::ImageAspectFlags) -> vk::ImageSubresourceRange {
  vk::ImageSubresourceRange {
    aspect_mask: aspect,
    base_mip_level: 0,
    level_count: 1,
    base_array_layer: 0,
    layer_count: 1,
  }
}

/// Access masks and stages bracketing one layout transition.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Transition {
  pub src_access: vk::AccessFlags,
  pub dst_access: vk::AccessFlags,
  pub src_stage: vk::PipelineStageFlags,
  pub dst_stage: vk::PipelineStageFlags,
}

/// The layout transitions this renderer performs. Anything else is refused
/// rather than guessed.
pub fn transition_for(old: vk::ImageLayout, new: vk::ImageLayout) -> RenderResult<Transition> {
  use vk::{AccessFlags as A, ImageLayout as L, PipelineStageFlags as S};
  let t = match (old, new) {
    (L::UNDEFINED, L::TRANSFER_DST_OPTIMAL) => Transition {
      src_access: A::empty(),
      dst_access: A::TRANSFER_WRITE,
      src_stage: S::TOP_OF_PIPE,
      dst_stage: S::TRANSFER,
    },
    (L::TRANSFER_DST_OPTIMAL, L::SHADER_READ_ONLY_OPTIMAL) => Transition {
      src_access: A::TRANSFER_WRITE,
      dst_access: A::SHADER_READ,
      src_stage: S::TRANSFER,
      dst_stage: S::FRAGMENT_SHADER,
    },
    (L::UNDEFINED, L::DEPTH_STENCIL_ATTACHMENT_OPTIMAL) => Transition {
      src_access: A::empty(),
      dst_access: A::DEPTH_STENCIL_ATTACHMENT_READ | A::DEPTH_STENCIL_ATTACHMENT_WRITE,
      src_stage: S::TOP_OF_PIPE,
      dst_stage: S::EARLY_FRAGMENT_TESTS,
    },
    (L::UNDEFINED, L::COLOR_ATTACHMENT_OPTIMAL) => Transition {
      src_access: A::empty(),
      dst_access: A::COLOR_ATTACHMENT_READ | A::COLOR_ATTACHMENT_WRITE,
      src_stage: S::TOP_OF_PIPE,
      dst_stage: S::COLOR_ATTACHMENT_OUTPUT,
    },
    _ => {
      return Err(RenderError::UnsupportedTransition {
        from: format!("{old:?}"),
        to: format!("{new:?}"),
      })
    }
  };
  Ok(t)
}

/// Aspect touched by a transition into `new`.
pub fn transition_aspect(format: vk::Format, new: vk::ImageLayout) -> vk::ImageAspectFlags {
  if new == vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL {
    if has_stencil(format) {
      vk::ImageAspectFlags::DEPTH | vk::ImageAspectFlags::STENCIL
    } else {
      vk::ImageAspectFlags::DEPTH
    }
  } else {
    vk::ImageAspectFlags::COLOR
  }
}

pub(crate) unsafe fn record_transition(
  device: &ash::Device,
  cmd: vk::CommandBuffer,
  image: vk::Image,
  format: vk::Format,
  old: vk::ImageLayout,
  new: vk::ImageLayout,
) -> RenderResult<()> {
  let t = transition_for(old, new)?;
  let barrier = vk::ImageMemoryBarrier {
    s_type: vk::StructureType::IMAGE_MEMORY_BARRIER,
    src_access_mask: t.src_access,
    dst_access_mask: t.dst_access,
    old_layout: old,
    new_layout: new,
    src_queue_family_index: vk::QUEUE_FAMILY_IGNORED,
    dst_queue_family_index: vk::QUEUE_FAMILY_IGNORED,
    image,
    subresource_range: subresource(transition_aspect(format, new)),
    ..Default::default()
  };
  device.cmd_pipeline_barrier(
    cmd,
    t.src_stage,
    t.dst_stage,
    vk::DependencyFlags::empty(),
    &[],
    &[],
    std::slice::from_ref(&barrier),
  );
  Ok(())
}

/// Command buffer from the transfer pool, freed however we leave.
struct OneShot<'a> {
  dev: &'a RenderingDevice,
  cmd: vk::CommandBuffer,
}

impl<'a> OneShot<'a> {
  unsafe fn begin(dev: &'a RenderingDevice) -> RenderResult<Self> {
    let ai = vk::CommandBufferAllocateInfo {
      s_type: vk::StructureType::COMMAND_BUFFER_ALLOCATE_INFO,
      command_pool: dev.transfer_pool,
      level: vk::CommandBufferLevel::PRIMARY,
      command_buffer_count: 1,
      ..Default::default()
    };
    let cmd = dev
      .device
      .allocate_command_buffers(&ai)
      .map_err(|e| RenderError::device("allocate_command_buffers", e))?[0];
    let this = Self { dev, cmd };
    let bi = vk::CommandBufferBeginInfo {
      s_type: vk::StructureType::COMMAND_BUFFER_BEGIN_INFO,
      flags: vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT,
      ..Default::default()
    };
    dev.device
      .begin_command_buffer(cmd, &bi)
      .map_err(|e| RenderError::device("begin_command_buffer", e))?;
    Ok(this)
  }

  /// Ends, submits and blocks until the queue drains.
  unsafe fn finish(self) -> RenderResult<()> {
    let d = &self.dev.device;
    d.end_command_buffer(self.cmd)
      .map_err(|e| RenderError::device("end_command_buffer", e))?;
    let si = vk::SubmitInfo {
      s_type: vk::StructureType::SUBMIT_INFO,
      command_buffer_count: 1,
      p_command_buffers: &self.cmd,
      ..Default::default()
    };
    d.queue_submit(
      self.dev.graphics_queue,
      std::slice::from_ref(&si),
      vk::Fence::null(),
    )
    .map_err(|e| RenderError::device("queue_submit", e))?;
    d.queue_wait_idle(self.dev.graphics_queue)
      .map_err(|e| RenderError::device("queue_wait_idle", e))
  }
}

impl Drop for OneShot<'_> {
  fn drop(&mut self) {
    unsafe {
      self.dev
        .device
        .free_command_buffers(self.dev.transfer_pool, std::slice::from_ref(&self.cmd));
    }
  }
}

fn staging_with(dev: &RenderingDevice, bytes: &[u8]) -> RenderResult<GpuBuffer> {
  if bytes.is_empty() {
    return Err(AllocationError::ZeroSize.into());
  }
  let staging = GpuBuffer::new(
    dev,
    bytes.len() as vk::DeviceSize,
    vk::BufferUsageFlags::TRANSFER_SRC,
    MemoryKind::HostCoherent,
  )?;
  staging.write(0, bytes)?;
  Ok(staging)
}

/// Host -> `dst` through a temporary coherent staging buffer. Blocks until
/// the copy has executed.
pub fn upload_buffer(dev: &RenderingDevice, dst: &GpuBuffer, bytes: &[u8]) -> RenderResult<()> {
  if bytes.len() as vk::DeviceSize > dst.size() {
    return Err(AllocationError::Overflow {
      len: bytes.len() as u64,
      capacity: dst.size(),
    }
    .into());
  }
  let staging = staging_with(dev, bytes)?;
  unsafe {
    let one = OneShot::begin(dev)?;
    let region = vk::BufferCopy {
      src_offset: 0,
      dst_offset: 0,
      size: bytes.len() as vk::DeviceSize,
    };
    dev.device.cmd_copy_buffer(
      one.cmd,
      staging.handle(),
      dst.handle(),
      std::slice::from_ref(&region),
    );
    one.finish()?;
  }
  trace!(bytes = bytes.len(), "buffer upload complete");
  Ok(())
}

/// Host pixels -> `dst`, leaving it in `SHADER_READ_ONLY_OPTIMAL`.
pub fn upload_image(dev: &RenderingDevice, dst: &GpuImage, bytes: &[u8]) -> RenderResult<()> {
  let staging = staging_with(dev, bytes)?;
  let desc = *dst.desc();
  unsafe {
    let one = OneShot::begin(dev)?;
    record_transition(
      &dev.device,
      one.cmd,
      dst.handle(),
      desc.format,
      vk::ImageLayout::UNDEFINED,
      vk::ImageLayout::TRANSFER_DST_OPTIMAL,
    )?;
    let region = vk::BufferImageCopy {
      buffer_offset: 0,
      buffer_row_length: 0,
      buffer_image_height: 0,
      image_subresource: vk::ImageSubresourceLayers {
        aspect_mask: vk::ImageAspectFlags::COLOR,
        mip_level: 0,
        base_array_layer: 0,
        layer_count: 1,
      },
      image_offset: vk::Offset3D { x: 0, y: 0, z: 0 },
      image_extent: vk::Extent3D {
        width: desc.extent.width,
        height: desc.extent.height,
        depth: 1,
      },
    };
    dev.device.cmd_copy_buffer_to_image(
      one.cmd,
      staging.handle(),
      dst.handle(),
      vk::ImageLayout::TRANSFER_DST_OPTIMAL,
      std::slice::from_ref(&region),
    );
    record_transition(
      &dev.device,
      one.cmd,
      dst.handle(),
      desc.format,
      vk::ImageLayout::TRANSFER_DST_OPTIMAL,
      vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
    )?;
    one.finish()?;
  }
  trace!(bytes = bytes.len(), "image upload complete");
  Ok(())
}

/// One-shot layout transition outside any frame.
pub fn transition_image(
  dev: &RenderingDevice,
  image: &GpuImage,
  old: vk::ImageLayout,
  new: vk::ImageLayout,
) -> RenderResult<()> {
  transition_for(old, new)?;
  unsafe {
    let one = OneShot::begin(dev)?;
    record_transition(
      &dev.device,
      one.cmd,
      image.handle(),
      image.desc().format,
      old,
      new,
    )?;
    one.finish()
  }
}

/// Device -> host copy of a whole buffer. `src` needs `TRANSFER_SRC` usage.
pub fn read_back(dev: &RenderingDevice, src: &GpuBuffer) -> RenderResult<Vec<u8>> {
  let staging = GpuBuffer::new(
    dev,
    src.size(),
    vk::BufferUsageFlags::TRANSFER_DST,
    MemoryKind::HostVisible,
  )?;
  unsafe {
    let one = OneShot::begin(dev)?;
    let region = vk::BufferCopy {
      src_offset: 0,
      dst_offset: 0,
      size: src.size(),
    };
    dev.device.cmd_copy_buffer(
      one.cmd,
      src.handle(),
      staging.handle(),
      std::slice::from_ref(&region),
    );
    one.finish()?;
  }
  staging.read()
}

#[cfg(test)]
mod tests {
  use super::*;

  fn memory(types: &[vk::MemoryPropertyFlags]) -> vk::PhysicalDeviceMemoryProperties {
    let mut props = vk::PhysicalDeviceMemoryProperties {
      memory_type_count: types.len() as u32,
      ..Default::default()
    };
    for (slot, flags) in props.memory_types.iter_mut().zip(types) {
      slot.property_flags = *flags;
    }
    props
  }

  fn typical() -> vk::PhysicalDeviceMemoryProperties {
    memory(&[
      vk::MemoryPropertyFlags::DEVICE_LOCAL,
      vk::MemoryPropertyFlags::HOST_VISIBLE,
      MemoryKind::HostCoherent.flags(),
      vk::MemoryPropertyFlags::DEVICE_LOCAL | MemoryKind::HostCoherent.flags(),
    ])
  }

  #[test]
  fn lowest_matching_index_wins() {
    let props = typical();
    let all = 0b1111;
    assert_eq!(
      find_memory_type(&props, all, MemoryKind::DeviceLocal.flags()).unwrap(),
      0
    );
    assert_eq!(
      find_memory_type(&props, all, MemoryKind::HostVisible.flags()).unwrap(),
      1
    );
    assert_eq!(
      find_memory_type(&props, all, MemoryKind::HostCoherent.flags()).unwrap(),
      2
    );
  }

  #[test]
  fn type_bits_restrict_candidates() {
    let props = typical();
    assert_eq!(
      find_memory_type(&props, 0b1000, MemoryKind::DeviceLocal.flags()).unwrap(),
      3
    );
    assert_eq!(
      find_memory_type(&props, 0b1010, MemoryKind::HostVisible.flags()).unwrap(),
      1
    );
  }

  #[test]
  fn unmatched_mask_is_an_allocation_error() {
    let props = typical();
    let err = find_memory_type(&props, 0, MemoryKind::DeviceLocal.flags()).unwrap_err();
    assert!(err.is_allocation());
    assert!(matches!(
      err,
      RenderError::Allocation(AllocationError::NoSuitableMemory { type_bits: 0, .. })
    ));

    // bits past memory_type_count never match
    let err = find_memory_type(&props, 0b1_0000, vk::MemoryPropertyFlags::empty());
    assert!(err.is_err());

    let err = find_memory_type(&props, 0b0001, MemoryKind::HostCoherent.flags());
    assert!(err.unwrap_err().is_allocation());
  }

  #[test]
  fn supported_transitions() {
    use vk::ImageLayout as L;
    let t = transition_for(L::UNDEFINED, L::TRANSFER_DST_OPTIMAL).unwrap();
    assert_eq!(t.dst_access, vk::AccessFlags::TRANSFER_WRITE);
    assert_eq!(t.src_stage, vk::PipelineStageFlags::TOP_OF_PIPE);

    let t = transition_for(L::TRANSFER_DST_OPTIMAL, L::SHADER_READ_ONLY_OPTIMAL).unwrap();
    assert_eq!(t.src_stage, vk::PipelineStageFlags::TRANSFER);
    assert_eq!(t.dst_stage, vk::PipelineStageFlags::FRAGMENT_SHADER);

    let t = transition_for(L::UNDEFINED, L::DEPTH_STENCIL_ATTACHMENT_OPTIMAL).unwrap();
    assert_eq!(t.dst_stage, vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS);

    let t = transition_for(L::UNDEFINED, L::COLOR_ATTACHMENT_OPTIMAL).unwrap();
    assert_eq!(t.dst_stage, vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT);
  }

  #[test]
  fn unknown_transition_is_refused() {
    use vk::ImageLayout as L;
    for (old, new) in [
      (L::SHADER_READ_ONLY_OPTIMAL, L::TRANSFER_DST_OPTIMAL),
      (L::UNDEFINED, L::PRESENT_SRC_KHR),
      (L::TRANSFER_DST_OPTIMAL, L::TRANSFER_DST_OPTIMAL),
    ] {
      assert!(matches!(
        transition_for(old, new),
        Err(RenderError::UnsupportedTransition { .. })
      ));
    }
  }

  #[test]
  fn depth_aspect_includes_stencil_when_present() {
    use vk::ImageLayout as L;
    assert_eq!(
      transition_aspect(vk::Format::D32_SFLOAT, L::DEPTH_STENCIL_ATTACHMENT_OPTIMAL),
      vk::ImageAspectFlags::DEPTH
    );
    assert_eq!(
      transition_aspect(
        vk::Format::D24_UNORM_S8_UINT,
        L::DEPTH_STENCIL_ATTACHMENT_OPTIMAL
      ),
      vk::ImageAspectFlags::DEPTH | vk::ImageAspectFlags::STENCIL
    );
    assert_eq!(
      transition_aspect(vk::Format::R8G8B8A8_SRGB, L::TRANSFER_DST_OPTIMAL),
      vk::ImageAspectFlags::COLOR
    );
  }
}
