// Physical device registry
//
// Enumerates GPU adapters once with cached properties, scores them against a
// surface, and keeps per-surface capability data that must be re-queried
// after every swapchain recreation.

use std::collections::HashMap;
use std::ffi::CStr;

use ash::vk;

use crate::error::{RhiError, RhiResult};

/// Device extensions every selected adapter must support.
pub const REQUIRED_DEVICE_EXTENSIONS: [&CStr; 1] = [ash::extensions::khr::Swapchain::name()];

/// Queue family indices found by a single scan of an adapter's families.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct QueueFamilyIndices {
    pub graphics: Option<u32>,
    pub present: Option<u32>,
}

impl QueueFamilyIndices {
    #[inline]
    pub fn is_complete(&self) -> bool {
        self.graphics.is_some() && self.present.is_some()
    }

    /// Distinct family indices, used to create one queue per needed family.
    pub fn unique(&self) -> Vec<u32> {
        let mut families = Vec::with_capacity(2);
        if let Some(graphics) = self.graphics {
            families.push(graphics);
        }
        if let Some(present) = self.present {
            if !families.contains(&present) {
                families.push(present);
            }
        }
        families
    }
}

/// An enumerated GPU adapter with its capabilities cached at enumeration time.
pub struct Adapter {
    pub handle: vk::PhysicalDevice,
    pub properties: vk::PhysicalDeviceProperties,
    pub features: vk::PhysicalDeviceFeatures,
    pub memory_properties: vk::PhysicalDeviceMemoryProperties,
    pub queue_family_props: Vec<vk::QueueFamilyProperties>,
    pub extensions_supported: bool,
}

impl Adapter {
    pub fn name(&self) -> String {
        unsafe { CStr::from_ptr(self.properties.device_name.as_ptr()) }
            .to_string_lossy()
            .into_owned()
    }
}

/// Cached per-(adapter, surface) presentation capabilities.
#[derive(Clone, Default)]
pub struct SurfaceSupport {
    pub capabilities: vk::SurfaceCapabilitiesKHR,
    pub formats: Vec<vk::SurfaceFormatKHR>,
    pub present_modes: Vec<vk::PresentModeKHR>,
}

impl SurfaceSupport {
    pub fn query(
        adapter: vk::PhysicalDevice,
        surface: vk::SurfaceKHR,
        surface_loader: &ash::extensions::khr::Surface,
    ) -> RhiResult<Self> {
        unsafe {
            Ok(Self {
                capabilities: surface_loader
                    .get_physical_device_surface_capabilities(adapter, surface)?,
                formats: surface_loader.get_physical_device_surface_formats(adapter, surface)?,
                present_modes: surface_loader
                    .get_physical_device_surface_present_modes(adapter, surface)?,
            })
        }
    }

    /// A surface is presentable only with at least one format and one mode.
    pub fn is_adequate(&self) -> bool {
        !self.formats.is_empty() && !self.present_modes.is_empty()
    }
}

/// Outcome of device selection for a surface.
pub struct SelectedAdapter {
    pub index: usize,
    pub families: QueueFamilyIndices,
}

pub struct AdapterRegistry {
    adapters: Vec<Adapter>,
    support: HashMap<vk::SurfaceKHR, SurfaceSupport>,
}

impl AdapterRegistry {
    pub fn enumerate(instance: &ash::Instance) -> RhiResult<Self> {
        let handles = unsafe { instance.enumerate_physical_devices()? };
        if handles.is_empty() {
            log::warn!("No Vulkan-capable GPUs found");
            return Err(RhiError::NoSuitableGpu);
        }

        let mut adapters = Vec::with_capacity(handles.len());
        for handle in handles {
            let properties = unsafe { instance.get_physical_device_properties(handle) };
            let features = unsafe { instance.get_physical_device_features(handle) };
            let memory_properties =
                unsafe { instance.get_physical_device_memory_properties(handle) };
            let queue_family_props =
                unsafe { instance.get_physical_device_queue_family_properties(handle) };
            let extensions_supported = check_extension_support(instance, handle)?;

            adapters.push(Adapter {
                handle,
                properties,
                features,
                memory_properties,
                queue_family_props,
                extensions_supported,
            });
        }

        log::info!("Enumerated {} GPU adapter(s)", adapters.len());
        for adapter in &adapters {
            log::debug!(
                "  {} ({:?})",
                adapter.name(),
                adapter.properties.device_type
            );
        }

        Ok(Self {
            adapters,
            support: HashMap::new(),
        })
    }

    pub fn adapters(&self) -> &[Adapter] {
        &self.adapters
    }

    pub fn adapter(&self, index: usize) -> &Adapter {
        &self.adapters[index]
    }

    /// Scans an adapter's queue families for graphics and present support.
    pub fn queue_families(
        &self,
        index: usize,
        surface: vk::SurfaceKHR,
        surface_loader: &ash::extensions::khr::Surface,
    ) -> QueueFamilyIndices {
        let adapter = &self.adapters[index];
        find_queue_families(&adapter.queue_family_props, |family| unsafe {
            surface_loader
                .get_physical_device_surface_support(adapter.handle, family, surface)
                .unwrap_or(false)
        })
    }

    /// Queries and caches the surface capabilities for an adapter. Must be
    /// re-run (`update_surface_support`) after every swapchain recreation
    /// since the window size can change underneath the cache.
    pub fn add_surface_support(
        &mut self,
        index: usize,
        surface: vk::SurfaceKHR,
        surface_loader: &ash::extensions::khr::Surface,
    ) -> RhiResult<&SurfaceSupport> {
        let support = SurfaceSupport::query(self.adapters[index].handle, surface, surface_loader)?;
        Ok(self.support.entry(surface).or_insert(support))
    }

    pub fn update_surface_support(
        &mut self,
        index: usize,
        surface: vk::SurfaceKHR,
        surface_loader: &ash::extensions::khr::Surface,
    ) -> RhiResult<&SurfaceSupport> {
        let support = SurfaceSupport::query(self.adapters[index].handle, surface, surface_loader)?;
        self.support.insert(surface, support);
        Ok(&self.support[&surface])
    }

    pub fn surface_support(&self, surface: vk::SurfaceKHR) -> Option<&SurfaceSupport> {
        self.support.get(&surface)
    }

    pub fn forget_surface(&mut self, surface: vk::SurfaceKHR) {
        self.support.remove(&surface);
    }

    /// Selects the highest-scoring adapter for a surface.
    ///
    /// Ties resolve to the lowest enumeration index: the scan only replaces
    /// the current best on a strictly greater score, so selection is stable
    /// across runs for identical capability tuples.
    pub fn pick(
        &mut self,
        surface: vk::SurfaceKHR,
        surface_loader: &ash::extensions::khr::Surface,
    ) -> RhiResult<SelectedAdapter> {
        let mut best: Option<(usize, QueueFamilyIndices, SurfaceSupport)> = None;
        let mut best_score = 0u32;

        for index in 0..self.adapters.len() {
            let families = self.queue_families(index, surface, surface_loader);
            let adapter = &self.adapters[index];
            let support = SurfaceSupport::query(adapter.handle, surface, surface_loader)?;
            let score = score_adapter(
                &adapter.properties,
                &adapter.features,
                adapter.extensions_supported,
                &families,
                &support,
            );
            log::debug!("Adapter '{}' scored {}", adapter.name(), score);

            if score > best_score {
                best_score = score;
                best = Some((index, families, support));
            }
        }

        let (index, families, support) = best.ok_or(RhiError::NoSuitableGpu)?;
        log::info!(
            "Selected GPU '{}' (score {})",
            self.adapters[index].name(),
            best_score
        );
        self.support.insert(surface, support);

        Ok(SelectedAdapter { index, families })
    }
}

fn check_extension_support(
    instance: &ash::Instance,
    device: vk::PhysicalDevice,
) -> RhiResult<bool> {
    let available = unsafe { instance.enumerate_device_extension_properties(device)? };
    let supported = REQUIRED_DEVICE_EXTENSIONS.iter().all(|required| {
        available.iter().any(|ext| {
            let name = unsafe { CStr::from_ptr(ext.extension_name.as_ptr()) };
            name == *required
        })
    });
    Ok(supported)
}

/// Single-pass queue family scan. `present_support` reports whether a family
/// can present to the target surface.
fn find_queue_families(
    families: &[vk::QueueFamilyProperties],
    mut present_support: impl FnMut(u32) -> bool,
) -> QueueFamilyIndices {
    let mut indices = QueueFamilyIndices::default();

    for (i, family) in families.iter().enumerate() {
        let i = i as u32;
        if family.queue_count == 0 {
            continue;
        }

        if indices.graphics.is_none() && family.queue_flags.contains(vk::QueueFlags::GRAPHICS) {
            indices.graphics = Some(i);
        }
        if indices.present.is_none() && present_support(i) {
            indices.present = Some(i);
        }
        if indices.is_complete() {
            break;
        }
    }

    indices
}

/// Scores an adapter for a surface. Zero disqualifies: a missing required
/// feature, missing extensions, incomplete queue families, or an inadequate
/// surface all rule the adapter out.
fn score_adapter(
    properties: &vk::PhysicalDeviceProperties,
    features: &vk::PhysicalDeviceFeatures,
    extensions_supported: bool,
    families: &QueueFamilyIndices,
    support: &SurfaceSupport,
) -> u32 {
    if features.geometry_shader == vk::FALSE {
        return 0;
    }
    if !extensions_supported || !families.is_complete() || !support.is_adequate() {
        return 0;
    }

    let mut score = 0u32;
    if properties.device_type == vk::PhysicalDeviceType::DISCRETE_GPU {
        score += 1000;
    }
    score += properties.limits.max_image_dimension2_d;
    score
}

#[cfg(test)]
mod tests {
    use super::*;

    fn complete_support() -> SurfaceSupport {
        SurfaceSupport {
            capabilities: vk::SurfaceCapabilitiesKHR::default(),
            formats: vec![vk::SurfaceFormatKHR {
                format: vk::Format::B8G8R8A8_SRGB,
                color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
            }],
            present_modes: vec![vk::PresentModeKHR::FIFO],
        }
    }

    fn capable_features() -> vk::PhysicalDeviceFeatures {
        vk::PhysicalDeviceFeatures {
            geometry_shader: vk::TRUE,
            ..Default::default()
        }
    }

    fn discrete_properties(max_dim: u32) -> vk::PhysicalDeviceProperties {
        let mut properties = vk::PhysicalDeviceProperties::default();
        properties.device_type = vk::PhysicalDeviceType::DISCRETE_GPU;
        properties.limits.max_image_dimension2_d = max_dim;
        properties
    }

    fn graphics_family(count: u32) -> vk::QueueFamilyProperties {
        vk::QueueFamilyProperties {
            queue_flags: vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE,
            queue_count: count,
            ..Default::default()
        }
    }

    #[test]
    fn queue_family_unique_dedups() {
        let shared = QueueFamilyIndices {
            graphics: Some(0),
            present: Some(0),
        };
        assert_eq!(shared.unique(), vec![0]);

        let split = QueueFamilyIndices {
            graphics: Some(0),
            present: Some(2),
        };
        assert_eq!(split.unique(), vec![0, 2]);
    }

    #[test]
    fn queue_scan_finds_graphics_and_present() {
        let families = [
            vk::QueueFamilyProperties {
                queue_flags: vk::QueueFlags::TRANSFER,
                queue_count: 1,
                ..Default::default()
            },
            graphics_family(4),
        ];
        let indices = find_queue_families(&families, |i| i == 1);
        assert_eq!(indices.graphics, Some(1));
        assert_eq!(indices.present, Some(1));
        assert!(indices.is_complete());
    }

    #[test]
    fn queue_scan_skips_empty_families() {
        let families = [graphics_family(0), graphics_family(2)];
        let indices = find_queue_families(&families, |_| true);
        assert_eq!(indices.graphics, Some(1));
        assert_eq!(indices.present, Some(1));
    }

    #[test]
    fn missing_feature_disqualifies() {
        let families = QueueFamilyIndices {
            graphics: Some(0),
            present: Some(0),
        };
        let score = score_adapter(
            &discrete_properties(16384),
            &vk::PhysicalDeviceFeatures::default(),
            true,
            &families,
            &complete_support(),
        );
        assert_eq!(score, 0);
    }

    #[test]
    fn missing_extensions_or_surface_disqualify() {
        let families = QueueFamilyIndices {
            graphics: Some(0),
            present: Some(0),
        };
        assert_eq!(
            score_adapter(
                &discrete_properties(16384),
                &capable_features(),
                false,
                &families,
                &complete_support(),
            ),
            0
        );
        assert_eq!(
            score_adapter(
                &discrete_properties(16384),
                &capable_features(),
                true,
                &families,
                &SurfaceSupport::default(),
            ),
            0
        );
    }

    #[test]
    fn discrete_gpu_outscores_integrated() {
        let families = QueueFamilyIndices {
            graphics: Some(0),
            present: Some(0),
        };
        let mut integrated = discrete_properties(16384);
        integrated.device_type = vk::PhysicalDeviceType::INTEGRATED_GPU;

        let discrete_score = score_adapter(
            &discrete_properties(16384),
            &capable_features(),
            true,
            &families,
            &complete_support(),
        );
        let integrated_score = score_adapter(
            &integrated,
            &capable_features(),
            true,
            &families,
            &complete_support(),
        );
        assert_eq!(discrete_score, 1000 + 16384);
        assert_eq!(integrated_score, 16384);
        assert!(discrete_score > integrated_score);
    }

    #[test]
    fn identical_tuples_score_identically() {
        // Determinism for the tie-break: equal inputs, equal scores; the pick
        // loop keeps the first enumerated adapter on equality.
        let families = QueueFamilyIndices {
            graphics: Some(0),
            present: Some(1),
        };
        let a = score_adapter(
            &discrete_properties(8192),
            &capable_features(),
            true,
            &families,
            &complete_support(),
        );
        let b = score_adapter(
            &discrete_properties(8192),
            &capable_features(),
            true,
            &families,
            &complete_support(),
        );
        assert_eq!(a, b);
    }
}
