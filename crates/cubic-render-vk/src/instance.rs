// SPDX-License-Identifier: CEPL-1.0
//! Vulkan instance, debug messenger and the window surface.
use std::ffi::{c_char, CStr};

#[cfg(debug_assertions)]
use ash::ext::debug_utils as ext_debug;
use ash::khr::surface;
use ash::{vk, Entry, Instance};
use cubic_render::{InitError, RenderError, RenderResult};
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use tracing::info;

const APP_NAME: &CStr = c"cubic";
#[cfg(debug_assertions)]
const VALIDATION_LAYER: &CStr = c"VK_LAYER_KHRONOS_validation";

#[cfg(debug_assertions)]
unsafe extern "system" fn debug_callback(
  severity: vk::DebugUtilsMessageSeverityFlagsEXT,
  _types: vk::DebugUtilsMessageTypeFlagsEXT,
  data: *const vk::DebugUtilsMessengerCallbackDataEXT<'_>,
  _user: *mut std::ffi::c_void,
) -> vk::Bool32 {
  if data.is_null() || (*data).p_message.is_null() {
    return vk::FALSE;
  }
  let msg = CStr::from_ptr((*data).p_message).to_string_lossy();
  if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::ERROR) {
    tracing::error!(target: "vulkan", "{msg}");
  } else if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::WARNING) {
    tracing::warn!(target: "vulkan", "{msg}");
  } else if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::INFO) {
    tracing::debug!(target: "vulkan", "{msg}");
  } else {
    tracing::trace!(target: "vulkan", "{msg}");
  }
  vk::FALSE
}

/// Loader entry plus instance. Validation and the messenger only exist in
/// debug builds.
pub struct VulkanInstance {
  pub(crate) entry: Entry,
  pub(crate) instance: Instance,
  #[cfg(debug_assertions)]
  debug: Option<(ext_debug::Instance, vk::DebugUtilsMessengerEXT)>,
}

impl VulkanInstance {
  /// Instance with the WSI extensions the display needs.
  pub fn for_display(display: &dyn HasDisplayHandle) -> RenderResult<Self> {
    let dh = display
      .display_handle()
      .map_err(|e| RenderError::Surface(e.to_string()))?
      .as_raw();
    let wsi = ash_window::enumerate_required_extensions(dh)
      .map_err(|e| InitError::Other(format!("enumerate_required_extensions: {e:?}")))?;
    unsafe { Self::with_extensions(wsi) }
  }

  /// Instance without any surface support, for transfer-only work.
  pub fn headless() -> RenderResult<Self> {
    unsafe { Self::with_extensions(&[]) }
  }

  unsafe fn with_extensions(required: &[*const c_char]) -> RenderResult<Self> {
    let entry = Entry::linked();

    let app_info = vk::ApplicationInfo {
      s_type: vk::StructureType::APPLICATION_INFO,
      p_application_name: APP_NAME.as_ptr(),
      application_version: 0,
      p_engine_name: APP_NAME.as_ptr(),
      engine_version: 0,
      api_version: vk::API_VERSION_1_0,
      ..Default::default()
    };

    let available = entry
      .enumerate_instance_extension_properties(None)
      .map_err(|e| RenderError::device("enumerate_instance_extension_properties", e))?;
    let has_ext = |name: &CStr| {
      available
        .iter()
        .any(|e| CStr::from_ptr(e.extension_name.as_ptr()) == name)
    };

    let mut exts = Vec::with_capacity(required.len() + 1);
    for &p in required {
      let name = CStr::from_ptr(p);
      if !has_ext(name) {
        return Err(InitError::MissingExtension(name.to_string_lossy().into_owned()).into());
      }
      exts.push(p);
    }

    #[cfg(debug_assertions)]
    let debug_enabled = {
      let layers = entry
        .enumerate_instance_layer_properties()
        .unwrap_or_default();
      let has_layer = layers
        .iter()
        .any(|l| CStr::from_ptr(l.layer_name.as_ptr()) == VALIDATION_LAYER);
      if !has_layer {
        tracing::warn!(
          "{} not installed, running without validation",
          VALIDATION_LAYER.to_string_lossy()
        );
      }
      let enabled = has_layer && has_ext(ext_debug::NAME);
      if enabled {
        exts.push(ext_debug::NAME.as_ptr());
      }
      enabled
    };
    #[cfg(debug_assertions)]
    let layers = [VALIDATION_LAYER.as_ptr()];
    #[cfg(debug_assertions)]
    let (enabled_layer_count, pp_enabled_layer_names) = if debug_enabled {
      (layers.len() as u32, layers.as_ptr())
    } else {
      (0, std::ptr::null())
    };
    #[cfg(not(debug_assertions))]
    let (enabled_layer_count, pp_enabled_layer_names) = (0u32, std::ptr::null());

    let create_info = vk::InstanceCreateInfo {
      s_type: vk::StructureType::INSTANCE_CREATE_INFO,
      p_application_info: &app_info,
      enabled_extension_count: exts.len() as u32,
      pp_enabled_extension_names: exts.as_ptr(),
      enabled_layer_count,
      pp_enabled_layer_names,
      ..Default::default()
    };
    let instance = entry
      .create_instance(&create_info, None)
      .map_err(|e| match e {
        vk::Result::ERROR_LAYER_NOT_PRESENT => {
          RenderError::from(InitError::MissingLayer("validation".into()))
        }
        vk::Result::ERROR_EXTENSION_NOT_PRESENT => {
          RenderError::from(InitError::MissingExtension("instance".into()))
        }
        other => RenderError::from(InitError::Other(format!("create_instance: {other:?}"))),
      })?;
    info!(extensions = exts.len(), "vulkan instance created");

    #[cfg(debug_assertions)]
    let debug = if debug_enabled {
      let loader = ext_debug::Instance::new(&entry, &instance);
      let ci = vk::DebugUtilsMessengerCreateInfoEXT {
        s_type: vk::StructureType::DEBUG_UTILS_MESSENGER_CREATE_INFO_EXT,
        message_severity: vk::DebugUtilsMessageSeverityFlagsEXT::VERBOSE
          | vk::DebugUtilsMessageSeverityFlagsEXT::INFO
          | vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
          | vk::DebugUtilsMessageSeverityFlagsEXT::ERROR,
        message_type: vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
          | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
          | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
        pfn_user_callback: Some(debug_callback),
        ..Default::default()
      };
      match loader.create_debug_utils_messenger(&ci, None) {
        Ok(m) => Some((loader, m)),
        Err(e) => {
          tracing::warn!("debug messenger unavailable: {e:?}");
          None
        }
      }
    } else {
      None
    };

    Ok(Self {
      entry,
      instance,
      #[cfg(debug_assertions)]
      debug,
    })
  }

  pub fn handle(&self) -> &Instance {
    &self.instance
  }

  #[cfg(debug_assertions)]
  fn destroy_messenger(&mut self) {
    if let Some((loader, messenger)) = self.debug.take() {
      unsafe { loader.destroy_debug_utils_messenger(messenger, None) };
    }
  }

  #[cfg(not(debug_assertions))]
  fn destroy_messenger(&mut self) {}
}

impl Drop for VulkanInstance {
  fn drop(&mut self) {
    self.destroy_messenger();
    unsafe { self.instance.destroy_instance(None) };
  }
}

/// The native window's `VkSurfaceKHR`. Must be dropped before its instance.
pub struct WindowSurface {
  pub(crate) loader: surface::Instance,
  pub(crate) surface: vk::SurfaceKHR,
}

impl WindowSurface {
  pub fn new(
    instance: &VulkanInstance,
    window: &dyn HasWindowHandle,
    display: &dyn HasDisplayHandle,
  ) -> RenderResult<Self> {
    let dh = display
      .display_handle()
      .map_err(|e| RenderError::Surface(e.to_string()))?
      .as_raw();
    let wh = window
      .window_handle()
      .map_err(|e| RenderError::Surface(e.to_string()))?
      .as_raw();

    let loader = surface::Instance::new(&instance.entry, &instance.instance);
    let surface = unsafe {
      ash_window::create_surface(&instance.entry, &instance.instance, dh, wh, None)
    }
    .map_err(|e| RenderError::Surface(format!("create_surface: {e:?}")))?;
    Ok(Self { loader, surface })
  }
}

impl Drop for WindowSurface {
  fn drop(&mut self) {
    unsafe { self.loader.destroy_surface(self.surface, None) };
  }
}
