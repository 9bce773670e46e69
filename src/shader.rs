// Shader stage wrappers
//
// Vulkan consumes SPIR-V bytecode; compilation happens upstream. This module
// validates and wraps the compiled blob plus its stage and entry point.

use std::ffi::CString;

use ash::vk;

use crate::device::Device;
use crate::error::{RhiError, RhiResult};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ShaderStageKind {
    Vertex,
    Fragment,
    Geometry,
    Compute,
}

impl ShaderStageKind {
    pub fn to_vk(self) -> vk::ShaderStageFlags {
        match self {
            ShaderStageKind::Vertex => vk::ShaderStageFlags::VERTEX,
            ShaderStageKind::Fragment => vk::ShaderStageFlags::FRAGMENT,
            ShaderStageKind::Geometry => vk::ShaderStageFlags::GEOMETRY,
            ShaderStageKind::Compute => vk::ShaderStageFlags::COMPUTE,
        }
    }
}

#[derive(Clone, Debug)]
pub struct ShaderStageDesc {
    pub bytecode: Vec<u8>,
    pub stage: ShaderStageKind,
    pub entry_point: String,
}

pub struct ShaderStage {
    module: vk::ShaderModule,
    stage: ShaderStageKind,
    entry_point: CString,
}

impl ShaderStage {
    pub fn create(device: &Device, desc: &ShaderStageDesc) -> RhiResult<Self> {
        // SPIR-V is a stream of 4-byte words.
        if desc.bytecode.is_empty() || desc.bytecode.len() % 4 != 0 {
            return Err(RhiError::Validation(format!(
                "shader bytecode length {} is not a multiple of 4",
                desc.bytecode.len()
            )));
        }

        let words: Vec<u32> = desc
            .bytecode
            .chunks_exact(4)
            .map(|chunk| u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
            .collect();

        let create_info = vk::ShaderModuleCreateInfo::builder().code(&words);

        let module = unsafe {
            device
                .handle()
                .create_shader_module(&create_info, None)
                .map_err(|e| RhiError::ResourceCreation(format!("shader module: {}", e)))?
        };

        let entry_point = CString::new(desc.entry_point.as_str())
            .map_err(|_| RhiError::Validation("entry point contains a NUL byte".into()))?;

        Ok(Self {
            module,
            stage: desc.stage,
            entry_point,
        })
    }

    pub fn module(&self) -> vk::ShaderModule {
        self.module
    }

    pub fn stage(&self) -> ShaderStageKind {
        self.stage
    }

    pub fn entry_point(&self) -> &CString {
        &self.entry_point
    }

    pub fn destroy(&mut self, device: &Device) {
        unsafe { device.handle().destroy_shader_module(self.module, None) };
        self.module = vk::ShaderModule::null();
    }
}
