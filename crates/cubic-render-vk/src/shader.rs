// SPDX-License-Identifier: CEPL-1.0
use std::ffi::CStr;
use std::io::Cursor;

use ash::util::read_spv;
use ash::vk;
use cubic_render::{RenderError, RenderResult, ShaderBlobs};

/// Entry point every stage is expected to export.
pub const ENTRY_POINT: &CStr = c"main";

const SPIRV_MAGIC: u32 = 0x0723_0203;

/// Compiled from the GLSL in `build.rs`.
pub fn builtin_shaders() -> ShaderBlobs {
  ShaderBlobs {
    vertex: include_bytes!(concat!(env!("OUT_DIR"), "/mesh.vert.spv")).to_vec(),
    fragment: include_bytes!(concat!(env!("OUT_DIR"), "/mesh.frag.spv")).to_vec(),
  }
}

/// Decodes an opaque blob into SPIR-V words, rejecting anything that cannot be
/// a module.
pub fn parse_spirv(bytes: &[u8]) -> RenderResult<Vec<u32>> {
  if bytes.is_empty() {
    return Err(RenderError::ShaderCompilation("empty blob".into()));
  }
  let words = read_spv(&mut Cursor::new(bytes))
    .map_err(|e| RenderError::ShaderCompilation(e.to_string()))?;
  if words.first() != Some(&SPIRV_MAGIC) {
    return Err(RenderError::ShaderCompilation("bad SPIR-V magic".into()));
  }
  Ok(words)
}

pub struct ShaderModule {
  device: ash::Device,
  module: vk::ShaderModule,
}

impl ShaderModule {
  pub fn new(device: &ash::Device, bytes: &[u8]) -> RenderResult<Self> {
    let code = parse_spirv(bytes)?;
    let info = vk::ShaderModuleCreateInfo {
      s_type: vk::StructureType::SHADER_MODULE_CREATE_INFO,
      p_code: code.as_ptr(),
      code_size: code.len() * 4,
      ..Default::default()
    };
    let module = unsafe { device.create_shader_module(&info, None) }
      .map_err(|e| RenderError::ShaderCompilation(format!("{e:?}")))?;
    Ok(Self {
      device: device.clone(),
      module,
    })
  }

  pub fn handle(&self) -> vk::ShaderModule {
    self.module
  }
}

impl Drop for ShaderModule {
  fn drop(&mut self) {
    unsafe { self.device.destroy_shader_module(self.module, None) };
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn builtin_blobs_parse() {
    let blobs = builtin_shaders();
    assert!(parse_spirv(&blobs.vertex).is_ok());
    assert!(parse_spirv(&blobs.fragment).is_ok());
  }

  #[test]
  fn malformed_blobs_are_rejected() {
    assert!(matches!(
      parse_spirv(&[]),
      Err(RenderError::ShaderCompilation(_))
    ));
    assert!(matches!(
      parse_spirv(&[0x03, 0x02, 0x23]),
      Err(RenderError::ShaderCompilation(_))
    ));
    assert!(matches!(
      parse_spirv(&[0xde, 0xad, 0xbe, 0xef, 0, 0, 0, 0]),
      Err(RenderError::ShaderCompilation(_))
    ));
  }

  #[test]
  fn byte_swapped_module_is_accepted() {
    let mut blob = SPIRV_MAGIC.to_be_bytes().to_vec();
    blob.extend_from_slice(&[0, 1, 0, 0]);
    let words = parse_spirv(&blob).unwrap();
    assert_eq!(words[0], SPIRV_MAGIC);
  }
}
