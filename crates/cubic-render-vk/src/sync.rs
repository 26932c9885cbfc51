// SPDX-License-Identifier: CEPL-1.0
//! Per-slot semaphores, fences and command buffers.
use std::time::Duration;

use ash::vk;
use cubic_render::{RenderError, RenderResult};
use tracing::debug;

use crate::device::RenderingDevice;

/// Everything one frame in flight owns.
pub struct FrameSlot {
  /// Signaled by acquire, waited on by the submit.
  pub image_ready: vk::Semaphore,
  /// Signaled by the submit, waited on by present.
  pub render_done: vk::Semaphore,
  /// Created signaled so the very first wait returns at once.
  pub in_flight: vk::Fence,
  pub cmd: vk::CommandBuffer,
}

pub struct FrameSlots {
  device: ash::Device,
  pool: vk::CommandPool,
  slots: Vec<FrameSlot>,
}

impl FrameSlots {
  pub fn new(dev: &RenderingDevice, count: usize) -> RenderResult<Self> {
    let d = &dev.device;
    let pool_info = vk::CommandPoolCreateInfo {
      s_type: vk::StructureType::COMMAND_POOL_CREATE_INFO,
      flags: vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER,
      queue_family_index: dev.queues.graphics,
      ..Default::default()
    };
    let pool = unsafe { d.create_command_pool(&pool_info, None) }
      .map_err(|e| RenderError::device("create_command_pool", e))?;
    let mut this = Self {
      device: d.clone(),
      pool,
      slots: Vec::with_capacity(count),
    };

    let alloc_info = vk::CommandBufferAllocateInfo {
      s_type: vk::StructureType::COMMAND_BUFFER_ALLOCATE_INFO,
      command_pool: pool,
      level: vk::CommandBufferLevel::PRIMARY,
      command_buffer_count: count as u32,
      ..Default::default()
    };
    let cmds = unsafe { d.allocate_command_buffers(&alloc_info) }
      .map_err(|e| RenderError::device("allocate_command_buffers", e))?;

    let sem_info = vk::SemaphoreCreateInfo {
      s_type: vk::StructureType::SEMAPHORE_CREATE_INFO,
      ..Default::default()
    };
    let fence_info = vk::FenceCreateInfo {
      s_type: vk::StructureType::FENCE_CREATE_INFO,
      flags: vk::FenceCreateFlags::SIGNALED,
      ..Default::default()
    };
    for (i, cmd) in cmds.into_iter().enumerate() {
      // Null handles first so a failure part way leaves `this` droppable.
      this.slots.push(FrameSlot {
        image_ready: vk::Semaphore::null(),
        render_done: vk::Semaphore::null(),
        in_flight: vk::Fence::null(),
        cmd,
      });
      let slot = &mut this.slots[i];
      unsafe {
        slot.image_ready = d
          .create_semaphore(&sem_info, None)
          .map_err(|e| RenderError::device("create_semaphore", e))?;
        slot.render_done = d
          .create_semaphore(&sem_info, None)
          .map_err(|e| RenderError::device("create_semaphore", e))?;
        slot.in_flight = d
          .create_fence(&fence_info, None)
          .map_err(|e| RenderError::device("create_fence", e))?;
      }
    }
    debug!(count, "frame slots created");
    Ok(this)
  }

  pub fn len(&self) -> usize {
    self.slots.len()
  }

  pub fn is_empty(&self) -> bool {
    self.slots.is_empty()
  }

  pub fn get(&self, slot: usize) -> &FrameSlot {
    &self.slots[slot]
  }

  /// Blocks on the fence of `slot`. Does not reset it; that happens right
  /// before the next submit so an abandoned frame never leaves it unsignaled.
  pub fn wait(&self, slot: usize, timeout: Duration) -> RenderResult<()> {
    let fence = self.slots[slot].in_flight;
    let nanos = u64::try_from(timeout.as_nanos()).unwrap_or(u64::MAX);
    match unsafe {
      self.device
        .wait_for_fences(std::slice::from_ref(&fence), true, nanos)
    } {
      Ok(()) => Ok(()),
      Err(vk::Result::TIMEOUT) => Err(RenderError::FenceTimeout { slot, timeout }),
      Err(e) => Err(RenderError::device("wait_for_fences", e)),
    }
  }

  pub fn reset(&self, slot: usize) -> RenderResult<()> {
    let fence = self.slots[slot].in_flight;
    unsafe { self.device.reset_fences(std::slice::from_ref(&fence)) }
      .map_err(|e| RenderError::device("reset_fences", e))
  }
}

impl Drop for FrameSlots {
  fn drop(&mut self) {
    unsafe {
      for s in self.slots.drain(..) {
        if s.in_flight != vk::Fence::null() {
          self.device.destroy_fence(s.in_flight, None);
        }
        if s.render_done != vk::Semaphore::null() {
          self.device.destroy_semaphore(s.render_done, None);
        }
        if s.image_ready != vk::Semaphore::null() {
          self.device.destroy_semaphore(s.image_ready, None);
        }
      }
      // frees the command buffers with it
      self.device.destroy_command_pool(self.pool, None);
    }
  }
}
