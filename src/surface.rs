// Presentation surface
//
// Binds a native window handle to Vulkan and carries the window parameters
// the swapchain negotiates against. The window itself (creation, input,
// resize events) belongs to the host application.

use std::ffi::c_void;

use ash::vk;
use raw_window_handle::{RawDisplayHandle, RawWindowHandle};

use crate::error::{RhiError, RhiResult};
use crate::format::PresentMode;
use crate::instance::Instance;

/// Everything the windowing collaborator hands us per window. Resize is
/// poll-based: `width`/`height` are re-read before every recreation.
#[derive(Clone, Copy, Debug)]
pub struct WindowSpec {
    pub display_handle: RawDisplayHandle,
    pub window_handle: RawWindowHandle,
    pub width: u32,
    pub height: u32,
    pub hdr: bool,
    pub present_mode: PresentMode,
}

pub struct Surface {
    loader: ash::extensions::khr::Surface,
    handle: vk::SurfaceKHR,
    destroyed: bool,
}

impl Surface {
    pub fn new(instance: &Instance, spec: &WindowSpec) -> RhiResult<Self> {
        let handle = create_native_surface(instance, spec)?;
        let loader =
            ash::extensions::khr::Surface::new(instance.entry(), instance.handle());

        log::info!("Created presentation surface ({}x{})", spec.width, spec.height);
        Ok(Self {
            loader,
            handle,
            destroyed: false,
        })
    }

    pub fn handle(&self) -> vk::SurfaceKHR {
        self.handle
    }

    pub fn loader(&self) -> &ash::extensions::khr::Surface {
        &self.loader
    }

    /// Explicit destruction; must run before the instance goes away.
    pub fn destroy(&mut self) {
        if !self.destroyed {
            unsafe { self.loader.destroy_surface(self.handle, None) };
            self.destroyed = true;
        }
    }
}

impl Drop for Surface {
    fn drop(&mut self) {
        self.destroy();
    }
}

// Builds the platform surface directly from the raw handle pair. The handle
// variants must agree with each other and with the surface extensions the
// instance was created with.
fn create_native_surface(instance: &Instance, spec: &WindowSpec) -> RhiResult<vk::SurfaceKHR> {
    match (spec.display_handle, spec.window_handle) {
        (RawDisplayHandle::Windows(_), RawWindowHandle::Win32(window)) => {
            let hinstance = window.hinstance.map(|h| h.get()).unwrap_or(0) as *const c_void;
            let hwnd = window.hwnd.get() as *const c_void;
            let create_info = vk::Win32SurfaceCreateInfoKHR::builder()
                .hinstance(hinstance)
                .hwnd(hwnd);
            let loader =
                ash::extensions::khr::Win32Surface::new(instance.entry(), instance.handle());
            Ok(unsafe { loader.create_win32_surface(&create_info, None)? })
        }
        (RawDisplayHandle::Xlib(display), RawWindowHandle::Xlib(window)) => {
            let dpy = display
                .display
                .map(|d| d.as_ptr())
                .unwrap_or(std::ptr::null_mut());
            let create_info = vk::XlibSurfaceCreateInfoKHR::builder()
                .dpy(dpy.cast())
                .window(window.window);
            let loader =
                ash::extensions::khr::XlibSurface::new(instance.entry(), instance.handle());
            Ok(unsafe { loader.create_xlib_surface(&create_info, None)? })
        }
        (RawDisplayHandle::Wayland(display), RawWindowHandle::Wayland(window)) => {
            let create_info = vk::WaylandSurfaceCreateInfoKHR::builder()
                .display(display.display.as_ptr())
                .surface(window.surface.as_ptr());
            let loader =
                ash::extensions::khr::WaylandSurface::new(instance.entry(), instance.handle());
            Ok(unsafe { loader.create_wayland_surface(&create_info, None)? })
        }
        _ => Err(RhiError::Validation(
            "unsupported window handle type".into(),
        )),
    }
}
