// SPDX-License-Identifier: CEPL-1.0
//! Physical device selection and the logical device built on top of it.
use std::ffi::CStr;

use ash::khr::swapchain;
use ash::vk;
use cubic_render::{InitError, Msaa, RenderError, RenderResult};
use tracing::{debug, info};

use crate::instance::{VulkanInstance, WindowSurface};

/// Device extensions every presenting device must expose.
pub const REQUIRED_DEVICE_EXTENSIONS: [&CStr; 1] = [swapchain::NAME];

/// Tried in order; the first one usable as an optimal-tiling depth attachment
/// wins.
pub const DEPTH_FORMAT_CANDIDATES: [vk::Format; 3] = [
  vk::Format::D32_SFLOAT,
  vk::Format::D32_SFLOAT_S8_UINT,
  vk::Format::D24_UNORM_S8_UINT,
];

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct QueueFamilies {
  pub graphics: u32,
  pub present: u32,
}

impl QueueFamilies {
  pub fn is_shared(&self) -> bool {
    self.graphics == self.present
  }

  pub fn unique(&self) -> Vec<u32> {
    if self.is_shared() {
      vec![self.graphics]
    } else {
      vec![self.graphics, self.present]
    }
  }
}

/// What a physical device reported, gathered before deciding on it.
pub struct CandidateInfo<'a> {
  pub families: &'a [vk::QueueFamilyProperties],
  /// Indexed by queue family.
  pub present_support: &'a [bool],
  pub extensions: &'a [vk::ExtensionProperties],
  pub features: vk::PhysicalDeviceFeatures,
  pub format_count: usize,
  pub present_mode_count: usize,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Rejection {
  NoGraphicsQueue,
  NoPresentQueue,
  MissingExtension(String),
  MissingFeatures,
  NoSurfaceFormats,
  NoPresentModes,
}

/// Graphics family is the first with graphics support. Presentation reuses it
/// when possible, else the first family that can present.
pub fn find_queue_families(
  families: &[vk::QueueFamilyProperties],
  can_present: impl Fn(u32) -> bool,
) -> Option<QueueFamilies> {
  let graphics = families
    .iter()
    .position(|f| f.queue_count > 0 && f.queue_flags.contains(vk::QueueFlags::GRAPHICS))?
    as u32;
  let present = if can_present(graphics) {
    graphics
  } else {
    (0..families.len() as u32).find(|&i| families[i as usize].queue_count > 0 && can_present(i))?
  };
  Some(QueueFamilies { graphics, present })
}

pub fn missing_extensions<'a>(
  available: &[vk::ExtensionProperties],
  required: &[&'a CStr],
) -> Vec<&'a CStr> {
  required
    .iter()
    .copied()
    .filter(|req| {
      !available
        .iter()
        .any(|e| unsafe { CStr::from_ptr(e.extension_name.as_ptr()) } == *req)
    })
    .collect()
}

pub fn supports_required_features(f: &vk::PhysicalDeviceFeatures) -> bool {
  f.sampler_anisotropy == vk::TRUE && f.sample_rate_shading == vk::TRUE
}

pub fn evaluate_candidate(
  info: &CandidateInfo<'_>,
  required_extensions: &[&CStr],
) -> Result<QueueFamilies, Rejection> {
  let has_graphics = info
    .families
    .iter()
    .any(|f| f.queue_count > 0 && f.queue_flags.contains(vk::QueueFlags::GRAPHICS));
  if !has_graphics {
    return Err(Rejection::NoGraphicsQueue);
  }
  let queues = find_queue_families(info.families, |i| {
    info.present_support.get(i as usize).copied().unwrap_or(false)
  })
  .ok_or(Rejection::NoPresentQueue)?;

  if let Some(ext) = missing_extensions(info.extensions, required_extensions).first() {
    return Err(Rejection::MissingExtension(ext.to_string_lossy().into_owned()));
  }
  if !supports_required_features(&info.features) {
    return Err(Rejection::MissingFeatures);
  }
  if info.format_count == 0 {
    return Err(Rejection::NoSurfaceFormats);
  }
  if info.present_mode_count == 0 {
    return Err(Rejection::NoPresentModes);
  }
  Ok(queues)
}

/// Highest sample count usable for both color and depth attachments.
pub fn max_usable_sample_count(limits: &vk::PhysicalDeviceLimits) -> vk::SampleCountFlags {
  let counts =
    limits.framebuffer_color_sample_counts & limits.framebuffer_depth_sample_counts;
  [
    vk::SampleCountFlags::TYPE_64,
    vk::SampleCountFlags::TYPE_32,
    vk::SampleCountFlags::TYPE_16,
    vk::SampleCountFlags::TYPE_8,
    vk::SampleCountFlags::TYPE_4,
    vk::SampleCountFlags::TYPE_2,
  ]
  .into_iter()
  .find(|&c| counts.contains(c))
  .unwrap_or(vk::SampleCountFlags::TYPE_1)
}

pub fn sample_count_flags(samples: u32) -> Option<vk::SampleCountFlags> {
  match samples {
    1 => Some(vk::SampleCountFlags::TYPE_1),
    2 => Some(vk::SampleCountFlags::TYPE_2),
    4 => Some(vk::SampleCountFlags::TYPE_4),
    8 => Some(vk::SampleCountFlags::TYPE_8),
    16 => Some(vk::SampleCountFlags::TYPE_16),
    32 => Some(vk::SampleCountFlags::TYPE_32),
    64 => Some(vk::SampleCountFlags::TYPE_64),
    _ => None,
  }
}

/// Turns the user's request into a concrete count. Never falls back.
pub fn resolve_sample_count(
  request: Msaa,
  max: vk::SampleCountFlags,
) -> RenderResult<vk::SampleCountFlags> {
  match request {
    Msaa::Max => Ok(max),
    Msaa::Samples(n) => match sample_count_flags(n) {
      Some(flags) if flags.as_raw() <= max.as_raw() => Ok(flags),
      _ => Err(InitError::UnsupportedSampleCount {
        requested: n,
        max: max.as_raw(),
      }
      .into()),
    },
  }
}

pub fn choose_depth_format(
  format_props: impl Fn(vk::Format) -> vk::FormatProperties,
) -> Option<vk::Format> {
  DEPTH_FORMAT_CANDIDATES.into_iter().find(|&f| {
    format_props(f)
      .optimal_tiling_features
      .contains(vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT)
  })
}

pub fn has_stencil(format: vk::Format) -> bool {
  matches!(
    format,
    vk::Format::D32_SFLOAT_S8_UINT | vk::Format::D24_UNORM_S8_UINT
  )
}

#[derive(Clone, Debug)]
pub struct DeviceCapabilities {
  pub name: String,
  pub max_samples: vk::SampleCountFlags,
  pub depth_format: vk::Format,
  pub memory: vk::PhysicalDeviceMemoryProperties,
  pub max_anisotropy: f32,
  pub anisotropy: bool,
  pub sample_shading: bool,
}

/// Physical device, logical device and its queues. Everything created from
/// the device must be dropped first.
pub struct RenderingDevice {
  pub(crate) phys: vk::PhysicalDevice,
  pub(crate) device: ash::Device,
  pub(crate) queues: QueueFamilies,
  pub(crate) graphics_queue: vk::Queue,
  pub(crate) present_queue: vk::Queue,
  pub(crate) caps: DeviceCapabilities,
  /// Transient pool for one-shot transfer submissions.
  pub(crate) transfer_pool: vk::CommandPool,
}

impl RenderingDevice {
  /// First physical device able to render to and present on `surface`.
  pub fn select(instance: &VulkanInstance, surface: &WindowSurface) -> RenderResult<Self> {
    let inst = &instance.instance;
    let physicals = unsafe { inst.enumerate_physical_devices() }
      .map_err(|e| RenderError::device("enumerate_physical_devices", e))?;

    for phys in physicals {
      let name = unsafe { device_name(inst, phys) };
      let families = unsafe { inst.get_physical_device_queue_family_properties(phys) };
      let present_support: Vec<bool> = (0..families.len() as u32)
        .map(|i| unsafe {
          surface
            .loader
            .get_physical_device_surface_support(phys, i, surface.surface)
            .unwrap_or(false)
        })
        .collect();
      let extensions =
        unsafe { inst.enumerate_device_extension_properties(phys) }.unwrap_or_default();
      let features = unsafe { inst.get_physical_device_features(phys) };
      let format_count = unsafe {
        surface
          .loader
          .get_physical_device_surface_formats(phys, surface.surface)
      }
      .map(|f| f.len())
      .unwrap_or(0);
      let present_mode_count = unsafe {
        surface
          .loader
          .get_physical_device_surface_present_modes(phys, surface.surface)
      }
      .map(|m| m.len())
      .unwrap_or(0);

      let info = CandidateInfo {
        families: &families,
        present_support: &present_support,
        extensions: &extensions,
        features,
        format_count,
        present_mode_count,
      };
      match evaluate_candidate(&info, &REQUIRED_DEVICE_EXTENSIONS) {
        Ok(queues) => {
          let caps = unsafe { capabilities(inst, phys, name, features)? };
          return unsafe { Self::create(inst, phys, queues, caps, true) };
        }
        Err(why) => debug!(device = %name, ?why, "rejected"),
      }
    }
    Err(InitError::NoCompatibleDevice.into())
  }

  /// First device with a graphics queue; no presentation support.
  pub fn headless(instance: &VulkanInstance) -> RenderResult<Self> {
    let inst = &instance.instance;
    let physicals = unsafe { inst.enumerate_physical_devices() }
      .map_err(|e| RenderError::device("enumerate_physical_devices", e))?;
    for phys in physicals {
      let families = unsafe { inst.get_physical_device_queue_family_properties(phys) };
      if let Some(queues) = find_queue_families(&families, |_| true) {
        let name = unsafe { device_name(inst, phys) };
        let features = unsafe { inst.get_physical_device_features(phys) };
        let caps = unsafe { capabilities(inst, phys, name, features)? };
        let single = QueueFamilies {
          graphics: queues.graphics,
          present: queues.graphics,
        };
        return unsafe { Self::create(inst, phys, single, caps, false) };
      }
    }
    Err(InitError::NoCompatibleDevice.into())
  }

  unsafe fn create(
    inst: &ash::Instance,
    phys: vk::PhysicalDevice,
    queues: QueueFamilies,
    caps: DeviceCapabilities,
    presenting: bool,
  ) -> RenderResult<Self> {
    let priorities = [1.0_f32];
    let queue_infos: Vec<vk::DeviceQueueCreateInfo> = queues
      .unique()
      .into_iter()
      .map(|family| vk::DeviceQueueCreateInfo {
        s_type: vk::StructureType::DEVICE_QUEUE_CREATE_INFO,
        queue_family_index: family,
        queue_count: 1,
        p_queue_priorities: priorities.as_ptr(),
        ..Default::default()
      })
      .collect();

    let features = vk::PhysicalDeviceFeatures {
      sampler_anisotropy: caps.anisotropy as vk::Bool32,
      sample_rate_shading: caps.sample_shading as vk::Bool32,
      ..Default::default()
    };
    let exts: Vec<_> = if presenting {
      REQUIRED_DEVICE_EXTENSIONS.iter().map(|e| e.as_ptr()).collect()
    } else {
      Vec::new()
    };

    let dinfo = vk::DeviceCreateInfo {
      s_type: vk::StructureType::DEVICE_CREATE_INFO,
      queue_create_info_count: queue_infos.len() as u32,
      p_queue_create_infos: queue_infos.as_ptr(),
      enabled_extension_count: exts.len() as u32,
      pp_enabled_extension_names: exts.as_ptr(),
      p_enabled_features: &features,
      ..Default::default()
    };
    let device = inst
      .create_device(phys, &dinfo, None)
      .map_err(|e| InitError::Other(format!("create_device: {e:?}")))?;
    let graphics_queue = device.get_device_queue(queues.graphics, 0);
    let present_queue = device.get_device_queue(queues.present, 0);

    let pool_info = vk::CommandPoolCreateInfo {
      s_type: vk::StructureType::COMMAND_POOL_CREATE_INFO,
      queue_family_index: queues.graphics,
      flags: vk::CommandPoolCreateFlags::TRANSIENT,
      ..Default::default()
    };
    let transfer_pool = match device.create_command_pool(&pool_info, None) {
      Ok(p) => p,
      Err(e) => {
        device.destroy_device(None);
        return Err(RenderError::device("create_command_pool", e));
      }
    };

    info!(
      "device: {} (graphics q{}, present q{}, max msaa x{}, depth {:?})",
      caps.name,
      queues.graphics,
      queues.present,
      caps.max_samples.as_raw(),
      caps.depth_format
    );

    Ok(Self {
      phys,
      device,
      queues,
      graphics_queue,
      present_queue,
      caps,
      transfer_pool,
    })
  }

  pub fn capabilities(&self) -> &DeviceCapabilities {
    &self.caps
  }

  pub fn max_sample_count(&self) -> vk::SampleCountFlags {
    self.caps.max_samples
  }

  pub fn queue_families(&self) -> QueueFamilies {
    self.queues
  }

  pub fn wait_idle(&self) -> RenderResult<()> {
    unsafe { self.device.device_wait_idle() }
      .map_err(|e| RenderError::device("device_wait_idle", e))
  }
}

impl Drop for RenderingDevice {
  fn drop(&mut self) {
    unsafe {
      self.device.device_wait_idle().ok();
      self.device.destroy_command_pool(self.transfer_pool, None);
      self.device.destroy_device(None);
    }
  }
}

unsafe fn device_name(inst: &ash::Instance, phys: vk::PhysicalDevice) -> String {
  let props = inst.get_physical_device_properties(phys);
  CStr::from_ptr(props.device_name.as_ptr())
    .to_string_lossy()
    .into_owned()
}

unsafe fn capabilities(
  inst: &ash::Instance,
  phys: vk::PhysicalDevice,
  name: String,
  features: vk::PhysicalDeviceFeatures,
) -> RenderResult<DeviceCapabilities> {
  let props = inst.get_physical_device_properties(phys);
  let depth_format =
    choose_depth_format(|f| inst.get_physical_device_format_properties(phys, f))
      .ok_or(InitError::NoDepthFormat)?;
  Ok(DeviceCapabilities {
    name,
    max_samples: max_usable_sample_count(&props.limits),
    depth_format,
    memory: inst.get_physical_device_memory_properties(phys),
    max_anisotropy: props.limits.max_sampler_anisotropy,
    anisotropy: features.sampler_anisotropy == vk::TRUE,
    sample_shading: features.sample_rate_shading == vk::TRUE,
  })
}

#[cfg(test)]
mod tests {
  use super::*;

  fn family(flags: vk::QueueFlags) -> vk::QueueFamilyProperties {
    vk::QueueFamilyProperties {
      queue_flags: flags,
      queue_count: 1,
      ..Default::default()
    }
  }

  fn ext(name: &CStr) -> vk::ExtensionProperties {
    let mut p = vk::ExtensionProperties::default();
    for (dst, src) in p.extension_name.iter_mut().zip(name.to_bytes()) {
      *dst = *src as _;
    }
    p
  }

  fn full_features() -> vk::PhysicalDeviceFeatures {
    vk::PhysicalDeviceFeatures {
      sampler_anisotropy: vk::TRUE,
      sample_rate_shading: vk::TRUE,
      ..Default::default()
    }
  }

  #[test]
  fn graphics_family_presents_when_it_can() {
    let fams = [
      family(vk::QueueFlags::TRANSFER),
      family(vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE),
    ];
    let q = find_queue_families(&fams, |_| true).unwrap();
    assert_eq!(q, QueueFamilies { graphics: 1, present: 1 });
    assert_eq!(q.unique(), vec![1]);
  }

  #[test]
  fn separate_present_family() {
    let fams = [
      family(vk::QueueFlags::GRAPHICS),
      family(vk::QueueFlags::COMPUTE),
    ];
    let q = find_queue_families(&fams, |i| i == 1).unwrap();
    assert_eq!(q, QueueFamilies { graphics: 0, present: 1 });
    assert!(!q.is_shared());
    assert_eq!(q.unique(), vec![0, 1]);
  }

  #[test]
  fn candidate_checks_in_order() {
    let fams = [family(vk::QueueFlags::GRAPHICS)];
    let exts = [ext(swapchain::NAME)];
    let mut info = CandidateInfo {
      families: &fams,
      present_support: &[true],
      extensions: &exts,
      features: full_features(),
      format_count: 2,
      present_mode_count: 1,
    };
    assert!(evaluate_candidate(&info, &REQUIRED_DEVICE_EXTENSIONS).is_ok());

    info.present_mode_count = 0;
    assert_eq!(
      evaluate_candidate(&info, &REQUIRED_DEVICE_EXTENSIONS),
      Err(Rejection::NoPresentModes)
    );
    info.format_count = 0;
    assert_eq!(
      evaluate_candidate(&info, &REQUIRED_DEVICE_EXTENSIONS),
      Err(Rejection::NoSurfaceFormats)
    );
    info.features = vk::PhysicalDeviceFeatures::default();
    assert_eq!(
      evaluate_candidate(&info, &REQUIRED_DEVICE_EXTENSIONS),
      Err(Rejection::MissingFeatures)
    );
    info.extensions = &[];
    assert_eq!(
      evaluate_candidate(&info, &REQUIRED_DEVICE_EXTENSIONS),
      Err(Rejection::MissingExtension("VK_KHR_swapchain".into()))
    );
    info.present_support = &[false];
    assert_eq!(
      evaluate_candidate(&info, &REQUIRED_DEVICE_EXTENSIONS),
      Err(Rejection::NoPresentQueue)
    );
    let compute_only = [family(vk::QueueFlags::COMPUTE)];
    info.families = &compute_only;
    assert_eq!(
      evaluate_candidate(&info, &REQUIRED_DEVICE_EXTENSIONS),
      Err(Rejection::NoGraphicsQueue)
    );
  }

  #[test]
  fn max_samples_is_common_highest_bit() {
    let limits = vk::PhysicalDeviceLimits {
      framebuffer_color_sample_counts: vk::SampleCountFlags::TYPE_1
        | vk::SampleCountFlags::TYPE_2
        | vk::SampleCountFlags::TYPE_4
        | vk::SampleCountFlags::TYPE_8,
      framebuffer_depth_sample_counts: vk::SampleCountFlags::TYPE_1
        | vk::SampleCountFlags::TYPE_2
        | vk::SampleCountFlags::TYPE_4,
      ..Default::default()
    };
    assert_eq!(max_usable_sample_count(&limits), vk::SampleCountFlags::TYPE_4);
    assert_eq!(
      max_usable_sample_count(&vk::PhysicalDeviceLimits::default()),
      vk::SampleCountFlags::TYPE_1
    );
  }

  #[test]
  fn sample_request_never_degrades() {
    let max = vk::SampleCountFlags::TYPE_4;
    assert_eq!(resolve_sample_count(Msaa::Max, max).unwrap(), max);
    assert_eq!(
      resolve_sample_count(Msaa::Samples(2), max).unwrap(),
      vk::SampleCountFlags::TYPE_2
    );
    assert!(matches!(
      resolve_sample_count(Msaa::Samples(8), max),
      Err(RenderError::Initialization(InitError::UnsupportedSampleCount {
        requested: 8,
        max: 4
      }))
    ));
    assert!(resolve_sample_count(Msaa::Samples(3), max).is_err());
  }

  #[test]
  fn depth_format_follows_candidate_order() {
    let supports = |ok: vk::Format| {
      move |f: vk::Format| vk::FormatProperties {
        optimal_tiling_features: if f == ok {
          vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT
        } else {
          vk::FormatFeatureFlags::empty()
        },
        ..Default::default()
      }
    };
    assert_eq!(
      choose_depth_format(supports(vk::Format::D24_UNORM_S8_UINT)),
      Some(vk::Format::D24_UNORM_S8_UINT)
    );
    assert_eq!(choose_depth_format(supports(vk::Format::D16_UNORM)), None);
    assert!(has_stencil(vk::Format::D24_UNORM_S8_UINT));
    assert!(!has_stencil(vk::Format::D32_SFLOAT));
  }
}
