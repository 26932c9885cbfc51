// SPDX-License-Identifier: CEPL-1.0
//! Scene data living on the GPU: mesh, instances, texture and the per-slot
//! uniform buffers.
use std::mem::size_of;

use ash::vk;
use cubic_render::{
  AllocationError, FrameUniforms, RenderError, RenderResult, SceneDesc, TextureData,
};
use tracing::info;

use crate::device::RenderingDevice;
use crate::graph::DrawBatch;
use crate::memory::{upload_image, GpuBuffer, GpuImage, ImageDesc, MemoryKind};

const TEXTURE_FORMAT: vk::Format = vk::Format::R8G8B8A8_UNORM;
const MAX_ANISOTROPY: f32 = 16.0;

/// Anisotropy the sampler asks for, or `None` when the device lacks it.
pub fn sampler_anisotropy(supported: bool, device_limit: f32) -> Option<f32> {
  supported.then(|| MAX_ANISOTROPY.min(device_limit).max(1.0))
}

pub struct GpuTexture {
  device: ash::Device,
  image: GpuImage,
  sampler: vk::Sampler,
}

impl GpuTexture {
  pub fn new(dev: &RenderingDevice, data: &TextureData) -> RenderResult<Self> {
    if data.width == 0 || data.height == 0 {
      return Err(AllocationError::ZeroSize.into());
    }
    if !data.is_well_formed() {
      return Err(AllocationError::Overflow {
        len: data.rgba.len() as u64,
        capacity: data.expected_len() as u64,
      }
      .into());
    }
    let image = GpuImage::new(
      dev,
      ImageDesc {
        extent: vk::Extent2D {
          width: data.width,
          height: data.height,
        },
        samples: vk::SampleCountFlags::TYPE_1,
        format: TEXTURE_FORMAT,
        tiling: vk::ImageTiling::OPTIMAL,
        usage: vk::ImageUsageFlags::TRANSFER_DST | vk::ImageUsageFlags::SAMPLED,
        aspect: vk::ImageAspectFlags::COLOR,
      },
      MemoryKind::DeviceLocal,
    )?;
    upload_image(dev, &image, &data.rgba)?;

    let caps = dev.capabilities();
    let aniso = sampler_anisotropy(caps.anisotropy, caps.max_anisotropy);
    let info = vk::SamplerCreateInfo {
      s_type: vk::StructureType::SAMPLER_CREATE_INFO,
      mag_filter: vk::Filter::LINEAR,
      min_filter: vk::Filter::LINEAR,
      mipmap_mode: vk::SamplerMipmapMode::LINEAR,
      address_mode_u: vk::SamplerAddressMode::REPEAT,
      address_mode_v: vk::SamplerAddressMode::REPEAT,
      address_mode_w: vk::SamplerAddressMode::REPEAT,
      anisotropy_enable: aniso.is_some() as vk::Bool32,
      max_anisotropy: aniso.unwrap_or(1.0),
      border_color: vk::BorderColor::INT_OPAQUE_BLACK,
      compare_op: vk::CompareOp::ALWAYS,
      ..Default::default()
    };
    let sampler = unsafe { dev.device.create_sampler(&info, None) }
      .map_err(|e| RenderError::device("create_sampler", e))?;
    Ok(Self {
      device: dev.device.clone(),
      image,
      sampler,
    })
  }

  pub fn view(&self) -> vk::ImageView {
    self.image.view()
  }

  pub fn sampler(&self) -> vk::Sampler {
    self.sampler
  }
}

impl Drop for GpuTexture {
  fn drop(&mut self) {
    unsafe { self.device.destroy_sampler(self.sampler, None) };
  }
}

/// Immutable scene uploaded once at startup.
pub struct GpuScene {
  vertices: GpuBuffer,
  indices: GpuBuffer,
  instances: GpuBuffer,
  index_count: u32,
  instance_count: u32,
  texture: GpuTexture,
}

impl GpuScene {
  pub fn upload(dev: &RenderingDevice, scene: &SceneDesc) -> RenderResult<Self> {
    let vertices = GpuBuffer::with_data(
      dev,
      vk::BufferUsageFlags::VERTEX_BUFFER,
      bytemuck::cast_slice(&scene.mesh.vertices),
    )?;
    let indices = GpuBuffer::with_data(
      dev,
      vk::BufferUsageFlags::INDEX_BUFFER,
      bytemuck::cast_slice(&scene.mesh.indices),
    )?;
    let instances = GpuBuffer::with_data(
      dev,
      vk::BufferUsageFlags::VERTEX_BUFFER,
      bytemuck::cast_slice(&scene.instances),
    )?;
    let texture = GpuTexture::new(dev, &scene.texture)?;
    info!(
      "scene uploaded: {} vertices, {} indices, {} instances, {}x{} texture",
      scene.mesh.vertices.len(),
      scene.mesh.indices.len(),
      scene.instances.len(),
      scene.texture.width,
      scene.texture.height
    );
    Ok(Self {
      vertices,
      indices,
      instances,
      index_count: scene.mesh.indices.len() as u32,
      instance_count: scene.instances.len() as u32,
      texture,
    })
  }

  pub fn batch(&self) -> DrawBatch {
    DrawBatch {
      vertices: self.vertices.handle(),
      instances: self.instances.handle(),
      indices: self.indices.handle(),
      index_count: self.index_count,
      instance_count: self.instance_count,
    }
  }

  pub fn texture(&self) -> &GpuTexture {
    &self.texture
  }
}

/// One host-visible uniform buffer per frame slot. A slot's buffer is only
/// written after that slot's fence has been observed.
pub struct UniformRing {
  buffers: Vec<GpuBuffer>,
}

impl UniformRing {
  pub const BLOCK_SIZE: vk::DeviceSize = size_of::<FrameUniforms>() as vk::DeviceSize;

  pub fn new(dev: &RenderingDevice, slots: usize) -> RenderResult<Self> {
    let buffers = (0..slots)
      .map(|_| {
        GpuBuffer::new(
          dev,
          Self::BLOCK_SIZE,
          vk::BufferUsageFlags::UNIFORM_BUFFER,
          MemoryKind::HostVisible,
        )
      })
      .collect::<RenderResult<Vec<_>>>()?;
    Ok(Self { buffers })
  }

  pub fn write(&self, slot: usize, uniforms: &FrameUniforms) -> RenderResult<()> {
    self.buffers[slot].write(0, bytemuck::bytes_of(uniforms))
  }

  pub fn buffer(&self, slot: usize) -> vk::Buffer {
    self.buffers[slot].handle()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn anisotropy_is_clamped_to_device_limit() {
    assert_eq!(sampler_anisotropy(true, 8.0), Some(8.0));
    assert_eq!(sampler_anisotropy(true, 64.0), Some(16.0));
    assert_eq!(sampler_anisotropy(false, 16.0), None);
  }

  #[test]
  fn uniform_block_is_three_matrices() {
    assert_eq!(UniformRing::BLOCK_SIZE, 192);
  }
}
