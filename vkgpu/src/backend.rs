//! The portable GPU entry-point table, and its Vulkan implementation.
//!
//! [`GpuBackend`] is what a front end drives. Resource objects are owned by
//! the front end and identified to the backend by id. Only CPU buffers,
//! command buffer acquisition and submission do real work here; every other
//! entry point has a provided body that reports success without touching
//! the device, so front ends written against the full table keep working.

use raw_window_handle::HasWindowHandle;
use thiserror::Error;

use crate::command::CommandBufferError;
use crate::cpu_buffer::{CpuBuffer, CpuBufferError};
use crate::device::{self, Device};

macro_rules! resource_id {
    ($($name:ident),* $(,)?) => {
        $(
            #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
            pub struct $name(pub u64);
        )*
    };
}

resource_id!(BufferId, TextureId, ShaderId, PipelineId, SamplerId, FenceId);

#[derive(Debug, Error)]
pub enum BackendError {
    #[error(transparent)]
    CommandBuffer(#[from] CommandBufferError),

    #[error(transparent)]
    CpuBuffer(#[from] CpuBufferError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexType {
    U16,
    U32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrimitiveType {
    PointList,
    LineList,
    LineStrip,
    TriangleList,
    TriangleStrip,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Filter {
    Nearest,
    Linear,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BufferDesc {
    pub label: String,
    pub size: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextureDesc {
    pub label: String,
    pub width: u32,
    pub height: u32,
    pub depth_or_layers: u32,
    pub mip_levels: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineDesc {
    pub label: String,
    pub vertex_shader: ShaderId,
    pub fragment_shader: ShaderId,
    pub primitive: PrimitiveType,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SamplerDesc {
    pub label: String,
    pub min_filter: Filter,
    pub mag_filter: Filter,
    pub max_anisotropy: Option<f32>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ColorAttachment {
    pub texture: TextureId,
    pub clear: Option<[f64; 4]>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DepthAttachment {
    pub texture: TextureId,
    pub clear: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StencilAttachment {
    pub texture: TextureId,
    pub clear: Option<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
    pub znear: f64,
    pub zfar: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Scissor {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// A box inside one slice and mip level of a texture.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextureRegion {
    pub texture: TextureId,
    pub slice: u32,
    pub level: u32,
    pub x: u32,
    pub y: u32,
    pub z: u32,
    pub width: u32,
    pub height: u32,
    pub depth: u32,
}

/// Buffer side of a buffer/texture copy. Pitches are in bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferLayout {
    pub buffer: BufferId,
    pub offset: u32,
    pub row_pitch: u32,
    pub image_pitch: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexedDraw {
    pub index_count: u32,
    pub index_type: IndexType,
    pub index_buffer: BufferId,
    pub index_offset: u32,
}

#[allow(unused_variables)]
pub trait GpuBackend {
    type CommandBuffer<'a>
    where
        Self: 'a;

    fn name(&self) -> &'static str;

    fn claim_window(
        &self,
        window: &dyn HasWindowHandle,
    ) -> Result<(), BackendError> {
        Ok(())
    }

    fn create_cpu_buffer(
        &self,
        label: &str,
        len: usize,
        initial: Option<&[u8]>,
    ) -> Result<CpuBuffer, BackendError> {
        Ok(CpuBuffer::new(label, len, initial)?)
    }

    fn lock_cpu_buffer<'b>(&self, buffer: &'b mut CpuBuffer) -> &'b mut [u8] {
        buffer.lock()
    }

    fn unlock_cpu_buffer(
        &self,
        buffer: &mut CpuBuffer,
    ) -> Result<(), BackendError> {
        buffer.unlock();
        Ok(())
    }

    fn create_buffer(
        &self,
        id: BufferId,
        desc: &BufferDesc,
    ) -> Result<(), BackendError> {
        Ok(())
    }
    fn destroy_buffer(&self, id: BufferId) {}

    fn create_texture(
        &self,
        id: TextureId,
        desc: &TextureDesc,
    ) -> Result<(), BackendError> {
        Ok(())
    }
    fn destroy_texture(&self, id: TextureId) {}

    fn create_shader(
        &self,
        id: ShaderId,
        bytecode: &[u8],
    ) -> Result<(), BackendError> {
        Ok(())
    }
    fn destroy_shader(&self, id: ShaderId) {}

    fn create_pipeline(
        &self,
        id: PipelineId,
        desc: &PipelineDesc,
    ) -> Result<(), BackendError> {
        Ok(())
    }
    fn destroy_pipeline(&self, id: PipelineId) {}

    fn create_sampler(
        &self,
        id: SamplerId,
        desc: &SamplerDesc,
    ) -> Result<(), BackendError> {
        Ok(())
    }
    fn destroy_sampler(&self, id: SamplerId) {}

    fn acquire_command_buffer(
        &self,
    ) -> Result<Self::CommandBuffer<'_>, BackendError>;

    /// Submit in order. `fence` is signaled once all of them complete.
    fn submit_command_buffers(
        &self,
        buffers: Vec<Self::CommandBuffer<'_>>,
        fence: Option<FenceId>,
    ) -> Result<(), BackendError> {
        Ok(())
    }

    fn abandon_command_buffer(&self, buffer: Self::CommandBuffer<'_>) {}

    fn start_render_pass(
        &self,
        cmd: &mut Self::CommandBuffer<'_>,
        color_attachments: &[ColorAttachment],
        depth_attachment: Option<&DepthAttachment>,
        stencil_attachment: Option<&StencilAttachment>,
    ) -> Result<(), BackendError> {
        Ok(())
    }

    fn set_render_pass_pipeline(
        &self,
        cmd: &mut Self::CommandBuffer<'_>,
        pipeline: PipelineId,
    ) -> Result<(), BackendError> {
        Ok(())
    }

    fn set_render_pass_viewport(
        &self,
        cmd: &mut Self::CommandBuffer<'_>,
        viewport: &Viewport,
    ) -> Result<(), BackendError> {
        Ok(())
    }

    fn set_render_pass_scissor(
        &self,
        cmd: &mut Self::CommandBuffer<'_>,
        scissor: &Scissor,
    ) -> Result<(), BackendError> {
        Ok(())
    }

    fn set_render_pass_blend_constant(
        &self,
        cmd: &mut Self::CommandBuffer<'_>,
        rgba: [f64; 4],
    ) -> Result<(), BackendError> {
        Ok(())
    }

    fn set_render_pass_vertex_buffer(
        &self,
        cmd: &mut Self::CommandBuffer<'_>,
        buffer: BufferId,
        offset: u32,
        index: u32,
    ) -> Result<(), BackendError> {
        Ok(())
    }

    fn set_render_pass_vertex_sampler(
        &self,
        cmd: &mut Self::CommandBuffer<'_>,
        sampler: SamplerId,
        index: u32,
    ) -> Result<(), BackendError> {
        Ok(())
    }

    fn set_render_pass_vertex_texture(
        &self,
        cmd: &mut Self::CommandBuffer<'_>,
        texture: TextureId,
        index: u32,
    ) -> Result<(), BackendError> {
        Ok(())
    }

    fn set_render_pass_fragment_buffer(
        &self,
        cmd: &mut Self::CommandBuffer<'_>,
        buffer: BufferId,
        offset: u32,
        index: u32,
    ) -> Result<(), BackendError> {
        Ok(())
    }

    fn set_render_pass_fragment_sampler(
        &self,
        cmd: &mut Self::CommandBuffer<'_>,
        sampler: SamplerId,
        index: u32,
    ) -> Result<(), BackendError> {
        Ok(())
    }

    fn set_render_pass_fragment_texture(
        &self,
        cmd: &mut Self::CommandBuffer<'_>,
        texture: TextureId,
        index: u32,
    ) -> Result<(), BackendError> {
        Ok(())
    }

    fn draw(
        &self,
        cmd: &mut Self::CommandBuffer<'_>,
        vertex_start: u32,
        vertex_count: u32,
    ) -> Result<(), BackendError> {
        Ok(())
    }

    fn draw_indexed(
        &self,
        cmd: &mut Self::CommandBuffer<'_>,
        indexed: &IndexedDraw,
    ) -> Result<(), BackendError> {
        Ok(())
    }

    fn draw_instanced(
        &self,
        cmd: &mut Self::CommandBuffer<'_>,
        vertex_start: u32,
        vertex_count: u32,
        instance_count: u32,
        base_instance: u32,
    ) -> Result<(), BackendError> {
        Ok(())
    }

    fn draw_instanced_indexed(
        &self,
        cmd: &mut Self::CommandBuffer<'_>,
        indexed: &IndexedDraw,
        instance_count: u32,
        base_vertex: u32,
        base_instance: u32,
    ) -> Result<(), BackendError> {
        Ok(())
    }

    fn end_render_pass(
        &self,
        cmd: &mut Self::CommandBuffer<'_>,
    ) -> Result<(), BackendError> {
        Ok(())
    }

    fn start_blit_pass(
        &self,
        cmd: &mut Self::CommandBuffer<'_>,
    ) -> Result<(), BackendError> {
        Ok(())
    }

    fn copy_between_textures(
        &self,
        cmd: &mut Self::CommandBuffer<'_>,
        src: &TextureRegion,
        dst: &TextureRegion,
    ) -> Result<(), BackendError> {
        Ok(())
    }

    fn fill_buffer(
        &self,
        cmd: &mut Self::CommandBuffer<'_>,
        buffer: BufferId,
        offset: u32,
        length: u32,
        value: u8,
    ) -> Result<(), BackendError> {
        Ok(())
    }

    fn generate_mipmaps(
        &self,
        cmd: &mut Self::CommandBuffer<'_>,
        texture: TextureId,
    ) -> Result<(), BackendError> {
        Ok(())
    }

    fn copy_buffer_cpu_to_gpu(
        &self,
        cmd: &mut Self::CommandBuffer<'_>,
        src: &CpuBuffer,
        src_offset: u32,
        dst: BufferId,
        dst_offset: u32,
        length: u32,
    ) -> Result<(), BackendError> {
        Ok(())
    }

    fn copy_buffer_gpu_to_cpu(
        &self,
        cmd: &mut Self::CommandBuffer<'_>,
        src: BufferId,
        src_offset: u32,
        dst: &mut CpuBuffer,
        dst_offset: u32,
        length: u32,
    ) -> Result<(), BackendError> {
        Ok(())
    }

    fn copy_buffer_gpu_to_gpu(
        &self,
        cmd: &mut Self::CommandBuffer<'_>,
        src: BufferId,
        src_offset: u32,
        dst: BufferId,
        dst_offset: u32,
        length: u32,
    ) -> Result<(), BackendError> {
        Ok(())
    }

    fn copy_buffer_to_texture(
        &self,
        cmd: &mut Self::CommandBuffer<'_>,
        src: &BufferLayout,
        dst: &TextureRegion,
    ) -> Result<(), BackendError> {
        Ok(())
    }

    fn copy_texture_to_buffer(
        &self,
        cmd: &mut Self::CommandBuffer<'_>,
        src: &TextureRegion,
        dst: &BufferLayout,
    ) -> Result<(), BackendError> {
        Ok(())
    }

    fn end_blit_pass(
        &self,
        cmd: &mut Self::CommandBuffer<'_>,
    ) -> Result<(), BackendError> {
        Ok(())
    }

    fn get_backbuffer(
        &self,
        window: &dyn HasWindowHandle,
        texture: TextureId,
    ) -> Result<(), BackendError> {
        Ok(())
    }

    fn present(
        &self,
        window: &dyn HasWindowHandle,
        backbuffer: TextureId,
        swap_interval: i32,
    ) -> Result<(), BackendError> {
        Ok(())
    }

    fn create_fence(&self, id: FenceId) -> Result<(), BackendError> {
        Ok(())
    }
    fn destroy_fence(&self, id: FenceId) {}

    /// Whether the fence has signaled.
    fn query_fence(&self, id: FenceId) -> Result<bool, BackendError> {
        Ok(true)
    }

    fn reset_fence(&self, id: FenceId) -> Result<(), BackendError> {
        Ok(())
    }

    fn wait_fence(&self, id: FenceId) -> Result<(), BackendError> {
        Ok(())
    }
}

impl GpuBackend for Device {
    type CommandBuffer<'a> = device::CommandBuffer<'a>;

    fn name(&self) -> &'static str {
        "Vulkan"
    }

    fn acquire_command_buffer(
        &self,
    ) -> Result<Self::CommandBuffer<'_>, BackendError> {
        Ok(Device::acquire_command_buffer(self)?)
    }

    // Front-end fences are not backed by native ones, so `fence` is
    // accepted and left alone.
    fn submit_command_buffers(
        &self,
        buffers: Vec<Self::CommandBuffer<'_>>,
        _fence: Option<FenceId>,
    ) -> Result<(), BackendError> {
        for buffer in buffers {
            buffer.submit()?;
        }
        Ok(())
    }

    fn abandon_command_buffer(&self, buffer: Self::CommandBuffer<'_>) {
        buffer.abandon();
    }
}
