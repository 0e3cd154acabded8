use std::collections::HashMap;

use anyhow::{anyhow, Result};
use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Quat, Vec3};
use wgpu::util::DeviceExt;
use wgpu::{
    vertex_attr_array, AddressMode, BindGroup, BindGroupDescriptor, BindGroupEntry,
    BindGroupLayout, BindGroupLayoutDescriptor, BindGroupLayoutEntry, BindingResource,
    BindingType, Buffer, BufferBindingType, BufferUsages, ColorTargetState, ColorWrites,
    CommandEncoderDescriptor, CompositeAlphaMode, DeviceDescriptor, Extent3d, FilterMode,
    FragmentState, Instance, InstanceDescriptor, LoadOp, MultisampleState, Operations, Origin3d,
    PipelineLayoutDescriptor, PresentMode, PrimitiveState, RenderPass, RenderPassColorAttachment,
    RenderPassDescriptor, RenderPipeline, RenderPipelineDescriptor, RequestAdapterOptions,
    Sampler, SamplerBindingType, SamplerDescriptor, ShaderModuleDescriptor, ShaderSource,
    SurfaceConfiguration, TexelCopyBufferLayout, TexelCopyTextureInfo, Texture, TextureAspect,
    TextureDescriptor, TextureDimension, TextureFormat, TextureSampleType, TextureUsages,
    TextureView, TextureViewDescriptor, TextureViewDimension, VertexState,
};
use winit::{dpi::PhysicalSize, window::Window};

use crate::math::{Colour, Rect, Vec2};
use crate::render::{DrawCommand, DrawList, TextureHandle, TextureStore};

/// Quads drawn per frame across all passes; extras are dropped.
const MAX_DRAWS_PER_FRAME: u64 = 4096;

#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable)]
struct SpriteVertex {
    position: [f32; 2],
    uv: [f32; 2],
}

#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable)]
struct SpriteUniforms {
    mvp: [[f32; 4]; 4],
    color: [f32; 4],
    uv_offset: [f32; 2],
    uv_scale: [f32; 2],
}

const SPRITE_VERTICES: [SpriteVertex; 6] = [
    SpriteVertex {
        position: [-0.5, -0.5],
        uv: [0.0, 0.0],
    },
    SpriteVertex {
        position: [0.5, -0.5],
        uv: [1.0, 0.0],
    },
    SpriteVertex {
        position: [0.5, 0.5],
        uv: [1.0, 1.0],
    },
    SpriteVertex {
        position: [-0.5, -0.5],
        uv: [0.0, 0.0],
    },
    SpriteVertex {
        position: [0.5, 0.5],
        uv: [1.0, 1.0],
    },
    SpriteVertex {
        position: [-0.5, 0.5],
        uv: [0.0, 1.0],
    },
];

struct TextureEntry {
    texture: Texture,
    view: TextureView,
    size: (u32, u32),
}

struct SpritePipeline {
    pipeline: RenderPipeline,
    vertex_buffer: Buffer,
    uniform_buffer: Buffer,
    bind_group_layout: BindGroupLayout,
    uniform_stride: u64,
}

/// Off-screen texture the world pass renders into.
struct WorldTarget {
    /// Must outlive `view`.
    #[allow(dead_code)]
    texture: Texture,
    view: TextureView,
    size: (u32, u32),
    bind_group: BindGroup,
}

/// A quad whose uniforms are already written.
struct QueuedDraw {
    uniform_offset: u64,
    texture: TextureHandle,
}

/// wgpu renderer for [`DrawList`]s.
///
/// The world commands are drawn into an off-screen target sized
/// [`DrawList::target_size`], which is then composited onto the window centred
/// and rotated by [`DrawList::composite_rotation`]. Overlay commands follow in
/// the same pass, in window pixels.
pub struct GpuBackend<'window> {
    surface: wgpu::Surface<'window>,
    device: wgpu::Device,
    queue: wgpu::Queue,
    surface_config: SurfaceConfiguration,
    present_mode: PresentMode,
    adapter_name: String,
    sprite_pipeline: SpritePipeline,
    sampler: Sampler,
    textures: HashMap<TextureHandle, TextureEntry>,
    next_texture_id: u32,
    white: TextureHandle,
    target: Option<WorldTarget>,
    uniform_write_offset: u64,
    bind_group_cache: HashMap<TextureHandle, BindGroup>,
}

impl<'window> GpuBackend<'window> {
    pub fn new(window: &'window Window, vsync: bool, backends: wgpu::Backends) -> Result<Self> {
        let instance = Instance::new(&InstanceDescriptor {
            backends,
            ..Default::default()
        });
        let surface = instance.create_surface(window)?;

        let adapter = pollster::block_on(instance.request_adapter(&RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::HighPerformance,
            compatible_surface: Some(&surface),
            force_fallback_adapter: false,
        }))?;
        let adapter_name = adapter.get_info().name;

        let (device, queue) = pollster::block_on(adapter.request_device(&DeviceDescriptor {
            label: Some("penumbra2d-device"),
            required_features: wgpu::Features::empty(),
            required_limits: wgpu::Limits::default(),
            experimental_features: Default::default(),
            memory_hints: Default::default(),
            trace: wgpu::Trace::Off,
        }))?;

        let size = window.inner_size();
        let capabilities = surface.get_capabilities(&adapter);
        let format = capabilities
            .formats
            .iter()
            .copied()
            .find(|format| format.is_srgb())
            .or_else(|| capabilities.formats.first().copied())
            .ok_or_else(|| anyhow!("Surface reports no supported formats"))?;

        let present_mode = choose_present_mode(&capabilities.present_modes, vsync);
        let alpha_mode = choose_alpha_mode(&capabilities.alpha_modes);

        let surface_config = SurfaceConfiguration {
            usage: TextureUsages::RENDER_ATTACHMENT,
            format,
            width: size.width.max(1),
            height: size.height.max(1),
            present_mode,
            alpha_mode,
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };
        surface.configure(&device, &surface_config);

        let sprite_pipeline = create_sprite_pipeline(&device, format);
        let sampler = device.create_sampler(&SamplerDescriptor {
            label: Some("sprite-sampler"),
            address_mode_u: AddressMode::ClampToEdge,
            address_mode_v: AddressMode::ClampToEdge,
            address_mode_w: AddressMode::ClampToEdge,
            mag_filter: FilterMode::Linear,
            min_filter: FilterMode::Linear,
            mipmap_filter: wgpu::MipmapFilterMode::Nearest,
            ..Default::default()
        });

        log::info!(
            "Graphics adapter: {} ({:?}, {:?})",
            adapter_name,
            format,
            present_mode
        );

        let mut backend = Self {
            surface,
            device,
            queue,
            surface_config,
            present_mode,
            adapter_name,
            sprite_pipeline,
            sampler,
            textures: HashMap::new(),
            next_texture_id: 1,
            white: TextureHandle(0),
            target: None,
            uniform_write_offset: 0,
            bind_group_cache: HashMap::new(),
        };
        backend.white = backend.create_texture(&[255; 4], 1, 1)?;
        Ok(backend)
    }

    pub fn adapter_name(&self) -> &str {
        &self.adapter_name
    }

    pub fn surface_size(&self) -> (u32, u32) {
        (self.surface_config.width, self.surface_config.height)
    }

    pub fn resize(&mut self, new_size: PhysicalSize<u32>) {
        if new_size.width == 0 || new_size.height == 0 {
            return;
        }

        self.surface_config.width = new_size.width;
        self.surface_config.height = new_size.height;
        self.surface_config.present_mode = self.present_mode;
        self.surface.configure(&self.device, &self.surface_config);
    }

    /// Rasterise and present one frame.
    pub fn render(&mut self, list: &DrawList) -> Result<()> {
        self.uniform_write_offset = 0;
        self.bind_group_cache.clear();

        let zoom = list.world_zoom.max(f32::EPSILON);
        let target_px = (
            (list.target_size.x.round() as u32).max(1),
            (list.target_size.y.round() as u32).max(1),
        );
        self.ensure_target(target_px);

        let world_proj = ortho(list.target_size / zoom);
        let window_proj = ortho(list.window_size);

        let world_draws = self.queue_commands(&list.world, world_proj);
        let composite = Rect::from_center(list.window_size / 2.0, list.target_size);
        let composite_offset = self.write_uniforms(
            window_proj * model_matrix(composite, list.composite_rotation),
            [1.0; 4],
            [0.0, 0.0],
            [1.0, 1.0],
        );
        let overlay_draws = self.queue_commands(&list.overlay, window_proj);

        let surface_texture = loop {
            match self.surface.get_current_texture() {
                Ok(surface_texture) => break surface_texture,
                Err(e) => match e {
                    wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated => {
                        self.surface.configure(&self.device, &self.surface_config);
                        continue;
                    }
                    wgpu::SurfaceError::Timeout => {
                        continue;
                    }
                    wgpu::SurfaceError::OutOfMemory => {
                        return Err(anyhow!("Surface ran out of memory"));
                    }
                    wgpu::SurfaceError::Other => {
                        return Err(anyhow!("Surface error: Other"));
                    }
                },
            }
        };
        let view = surface_texture
            .texture
            .create_view(&TextureViewDescriptor::default());
        let target = self
            .target
            .as_ref()
            .ok_or_else(|| anyhow!("World target not available"))?;

        let mut encoder = self
            .device
            .create_command_encoder(&CommandEncoderDescriptor {
                label: Some("frame-encoder"),
            });

        {
            let mut pass = encoder.begin_render_pass(&RenderPassDescriptor {
                label: Some("world-pass"),
                color_attachments: &[Some(RenderPassColorAttachment {
                    view: &target.view,
                    resolve_target: None,
                    ops: Operations {
                        load: LoadOp::Clear(clear_colour(list.clear_colour)),
                        store: wgpu::StoreOp::Store,
                    },
                    depth_slice: None,
                })],
                depth_stencil_attachment: None,
                multiview_mask: None,
                occlusion_query_set: None,
                timestamp_writes: None,
            });
            self.draw_queued(&mut pass, &world_draws)?;
        }

        {
            let mut pass = encoder.begin_render_pass(&RenderPassDescriptor {
                label: Some("composite-pass"),
                color_attachments: &[Some(RenderPassColorAttachment {
                    view: &view,
                    resolve_target: None,
                    ops: Operations {
                        load: LoadOp::Clear(wgpu::Color::BLACK),
                        store: wgpu::StoreOp::Store,
                    },
                    depth_slice: None,
                })],
                depth_stencil_attachment: None,
                multiview_mask: None,
                occlusion_query_set: None,
                timestamp_writes: None,
            });
            pass.set_pipeline(&self.sprite_pipeline.pipeline);
            pass.set_vertex_buffer(0, self.sprite_pipeline.vertex_buffer.slice(..));
            if let Some(offset) = composite_offset {
                pass.set_bind_group(0, &target.bind_group, &[offset as u32]);
                pass.draw(0..SPRITE_VERTICES.len() as u32, 0..1);
            }
            self.draw_queued(&mut pass, &overlay_draws)?;
        }

        self.queue.submit(Some(encoder.finish()));
        surface_texture.present();
        Ok(())
    }

    fn draw_queued(&self, pass: &mut RenderPass<'_>, draws: &[QueuedDraw]) -> Result<()> {
        if draws.is_empty() {
            return Ok(());
        }
        pass.set_pipeline(&self.sprite_pipeline.pipeline);
        pass.set_vertex_buffer(0, self.sprite_pipeline.vertex_buffer.slice(..));
        for draw in draws {
            let bind_group = self
                .bind_group_cache
                .get(&draw.texture)
                .ok_or_else(|| anyhow!("Bind group not found for texture handle"))?;
            pass.set_bind_group(0, bind_group, &[draw.uniform_offset as u32]);
            pass.draw(0..SPRITE_VERTICES.len() as u32, 0..1);
        }
        Ok(())
    }

    /// Write uniforms for every command and make sure a bind group exists for
    /// each texture used.
    fn queue_commands(&mut self, commands: &[DrawCommand], proj: Mat4) -> Vec<QueuedDraw> {
        let mut draws = Vec::with_capacity(commands.len());
        for command in commands {
            let (texture, dst, rotation, color, uv_offset, uv_scale) = match command {
                DrawCommand::Texture {
                    texture,
                    src,
                    dst,
                    rotation,
                    alpha,
                } => {
                    let Some(entry) = self.textures.get(texture) else {
                        log::warn!("Skipping draw with unknown texture {:?}", texture);
                        continue;
                    };
                    let (uv_offset, uv_scale) = uv_region(*src, entry.size);
                    (*texture, *dst, *rotation, [1.0, 1.0, 1.0, *alpha], uv_offset, uv_scale)
                }
                DrawCommand::Fill { rect, colour } => (
                    self.white,
                    *rect,
                    0.0,
                    linear_colour(*colour),
                    [0.0, 0.0],
                    [1.0, 1.0],
                ),
            };
            if dst.w <= 0.0 || dst.h <= 0.0 {
                continue;
            }

            let Some(uniform_offset) = self.write_uniforms(
                proj * model_matrix(dst, rotation),
                color,
                uv_offset,
                uv_scale,
            ) else {
                log::warn!(
                    "Too many draws in one frame (max: {}), dropping the rest",
                    MAX_DRAWS_PER_FRAME
                );
                break;
            };
            self.ensure_bind_group(texture);
            draws.push(QueuedDraw {
                uniform_offset,
                texture,
            });
        }
        draws
    }

    fn write_uniforms(
        &mut self,
        mvp: Mat4,
        color: [f32; 4],
        uv_offset: [f32; 2],
        uv_scale: [f32; 2],
    ) -> Option<u64> {
        let stride = self.sprite_pipeline.uniform_stride;
        if self.uniform_write_offset >= stride * MAX_DRAWS_PER_FRAME {
            return None;
        }
        let uniforms = SpriteUniforms {
            mvp: mvp.to_cols_array_2d(),
            color,
            uv_offset,
            uv_scale,
        };
        let offset = self.uniform_write_offset;
        self.queue.write_buffer(
            &self.sprite_pipeline.uniform_buffer,
            offset,
            bytemuck::bytes_of(&uniforms),
        );
        self.uniform_write_offset += stride;
        Some(offset)
    }

    fn ensure_bind_group(&mut self, handle: TextureHandle) {
        if self.bind_group_cache.contains_key(&handle) {
            return;
        }
        let Some(entry) = self.textures.get(&handle) else {
            return;
        };
        let bind_group = create_bind_group(
            &self.device,
            &self.sprite_pipeline,
            &entry.view,
            &self.sampler,
            "sprite-bind-group",
        );
        self.bind_group_cache.insert(handle, bind_group);
    }

    fn ensure_target(&mut self, size: (u32, u32)) {
        if self.target.as_ref().is_some_and(|t| t.size == size) {
            return;
        }
        let texture = self.device.create_texture(&TextureDescriptor {
            label: Some("world-target"),
            size: Extent3d {
                width: size.0,
                height: size.1,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: TextureDimension::D2,
            format: self.surface_config.format,
            usage: TextureUsages::RENDER_ATTACHMENT | TextureUsages::TEXTURE_BINDING,
            view_formats: &[],
        });
        let view = texture.create_view(&TextureViewDescriptor::default());
        let bind_group = create_bind_group(
            &self.device,
            &self.sprite_pipeline,
            &view,
            &self.sampler,
            "world-target-bind-group",
        );
        log::debug!("World target resized to {}x{}", size.0, size.1);
        self.target = Some(WorldTarget {
            texture,
            view,
            size,
            bind_group,
        });
    }

    fn upload(&mut self, handle: TextureHandle, rgba: &[u8], width: u32, height: u32) {
        let size = Extent3d {
            width,
            height,
            depth_or_array_layers: 1,
        };

        let texture = self.device.create_texture(&TextureDescriptor {
            label: Some("texture"),
            size,
            mip_level_count: 1,
            sample_count: 1,
            dimension: TextureDimension::D2,
            format: TextureFormat::Rgba8UnormSrgb,
            usage: TextureUsages::TEXTURE_BINDING | TextureUsages::COPY_DST,
            view_formats: &[],
        });
        self.write_pixels(&texture, rgba, size);
        let view = texture.create_view(&TextureViewDescriptor::default());

        self.bind_group_cache.remove(&handle);
        self.textures.insert(
            handle,
            TextureEntry {
                texture,
                view,
                size: (width, height),
            },
        );
    }

    fn write_pixels(&self, texture: &Texture, rgba: &[u8], size: Extent3d) {
        self.queue.write_texture(
            TexelCopyTextureInfo {
                texture,
                mip_level: 0,
                origin: Origin3d::ZERO,
                aspect: TextureAspect::All,
            },
            rgba,
            TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(4 * size.width),
                rows_per_image: Some(size.height),
            },
            size,
        );
    }
}

fn check_upload(rgba: &[u8], width: u32, height: u32) -> Result<()> {
    if width == 0 || height == 0 {
        return Err(anyhow!("Cannot create a {}x{} texture", width, height));
    }
    let expected = width as usize * height as usize * 4;
    if rgba.len() != expected {
        return Err(anyhow!(
            "Expected {} bytes of RGBA data, got {}",
            expected,
            rgba.len()
        ));
    }
    Ok(())
}

impl TextureStore for GpuBackend<'_> {
    fn create_texture(&mut self, rgba: &[u8], width: u32, height: u32) -> Result<TextureHandle> {
        check_upload(rgba, width, height)?;
        let handle = TextureHandle(self.next_texture_id);
        self.next_texture_id += 1;
        self.upload(handle, rgba, width, height);
        Ok(handle)
    }

    fn update_texture(
        &mut self,
        handle: TextureHandle,
        rgba: &[u8],
        width: u32,
        height: u32,
    ) -> Result<()> {
        check_upload(rgba, width, height)?;
        let entry = self
            .textures
            .get(&handle)
            .ok_or_else(|| anyhow!("Unknown texture handle"))?;
        if entry.size == (width, height) {
            let size = Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            };
            self.write_pixels(&entry.texture, rgba, size);
        } else {
            self.upload(handle, rgba, width, height);
        }
        Ok(())
    }

    fn texture_size(&self, handle: TextureHandle) -> Option<(u32, u32)> {
        self.textures.get(&handle).map(|t| t.size)
    }
}

/// Pixel space of `size` with the origin at the top-left and y down.
fn ortho(size: Vec2) -> Mat4 {
    Mat4::orthographic_rh(0.0, size.x.max(1.0), size.y.max(1.0), 0.0, -1.0, 1.0)
}

/// Unit quad to `dst`, rotated `degrees` about its centre.
fn model_matrix(dst: Rect, degrees: f32) -> Mat4 {
    let centre = dst.center();
    Mat4::from_scale_rotation_translation(
        Vec3::new(dst.w, dst.h, 1.0),
        Quat::from_rotation_z(degrees.to_radians()),
        Vec3::new(centre.x, centre.y, 0.0),
    )
}

/// Normalised offset and scale of `src` inside a texture of `size` pixels.
fn uv_region(src: Rect, size: (u32, u32)) -> ([f32; 2], [f32; 2]) {
    let (w, h) = (size.0.max(1) as f32, size.1.max(1) as f32);
    ([src.x / w, src.y / h], [src.w / w, src.h / h])
}

fn srgb_to_linear(channel: f32) -> f32 {
    if channel <= 0.04045 {
        channel / 12.92
    } else {
        ((channel + 0.055) / 1.055).powf(2.4)
    }
}

/// Shader colour for an sRGB render target.
fn linear_colour(colour: Colour) -> [f32; 4] {
    let [r, g, b, a] = colour.to_f32();
    [srgb_to_linear(r), srgb_to_linear(g), srgb_to_linear(b), a]
}

fn clear_colour(colour: Colour) -> wgpu::Color {
    let [r, g, b, a] = linear_colour(colour);
    wgpu::Color {
        r: r as f64,
        g: g as f64,
        b: b as f64,
        a: a as f64,
    }
}

fn create_bind_group(
    device: &wgpu::Device,
    pipeline: &SpritePipeline,
    view: &TextureView,
    sampler: &Sampler,
    label: &str,
) -> BindGroup {
    let uniform_size = std::mem::size_of::<SpriteUniforms>() as u64;
    device.create_bind_group(&BindGroupDescriptor {
        label: Some(label),
        layout: &pipeline.bind_group_layout,
        entries: &[
            BindGroupEntry {
                binding: 0,
                resource: BindingResource::Buffer(wgpu::BufferBinding {
                    buffer: &pipeline.uniform_buffer,
                    offset: 0,
                    size: std::num::NonZeroU64::new(uniform_size),
                }),
            },
            BindGroupEntry {
                binding: 1,
                resource: BindingResource::TextureView(view),
            },
            BindGroupEntry {
                binding: 2,
                resource: BindingResource::Sampler(sampler),
            },
        ],
    })
}

fn create_sprite_pipeline(device: &wgpu::Device, surface_format: TextureFormat) -> SpritePipeline {
    let shader = device.create_shader_module(ShaderModuleDescriptor {
        label: Some("sprite-shader"),
        source: ShaderSource::Wgsl(include_str!("sprite.wgsl").into()),
    });

    let bind_group_layout = device.create_bind_group_layout(&BindGroupLayoutDescriptor {
        label: Some("sprite-bind-group-layout"),
        entries: &[
            BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
                ty: BindingType::Buffer {
                    ty: BufferBindingType::Uniform,
                    has_dynamic_offset: true,
                    min_binding_size: std::num::NonZeroU64::new(
                        std::mem::size_of::<SpriteUniforms>() as u64,
                    ),
                },
                count: None,
            },
            BindGroupLayoutEntry {
                binding: 1,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: BindingType::Texture {
                    sample_type: TextureSampleType::Float { filterable: true },
                    view_dimension: TextureViewDimension::D2,
                    multisampled: false,
                },
                count: None,
            },
            BindGroupLayoutEntry {
                binding: 2,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: BindingType::Sampler(SamplerBindingType::Filtering),
                count: None,
            },
        ],
    });

    let pipeline_layout = device.create_pipeline_layout(&PipelineLayoutDescriptor {
        label: Some("sprite-pipeline-layout"),
        bind_group_layouts: &[&bind_group_layout],
        immediate_size: 0,
    });

    let vertex_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
        label: Some("sprite-vertices"),
        contents: bytemuck::cast_slice(&SPRITE_VERTICES),
        usage: BufferUsages::VERTEX,
    });

    let uniform_alignment = device.limits().min_uniform_buffer_offset_alignment as u64;
    let uniform_size = std::mem::size_of::<SpriteUniforms>() as u64;
    let uniform_stride = (uniform_size + uniform_alignment - 1) & !(uniform_alignment - 1);

    let uniform_buffer = device.create_buffer(&wgpu::BufferDescriptor {
        label: Some("sprite-uniform-buffer"),
        size: uniform_stride * MAX_DRAWS_PER_FRAME,
        usage: BufferUsages::UNIFORM | BufferUsages::COPY_DST,
        mapped_at_creation: false,
    });

    let pipeline = device.create_render_pipeline(&RenderPipelineDescriptor {
        label: Some("sprite-pipeline"),
        layout: Some(&pipeline_layout),
        vertex: VertexState {
            module: &shader,
            entry_point: Some("vs_main"),
            buffers: &[wgpu::VertexBufferLayout {
                array_stride: std::mem::size_of::<SpriteVertex>() as wgpu::BufferAddress,
                step_mode: wgpu::VertexStepMode::Vertex,
                attributes: &vertex_attr_array![0 => Float32x2, 1 => Float32x2],
            }],
            compilation_options: wgpu::PipelineCompilationOptions::default(),
        },
        fragment: Some(FragmentState {
            module: &shader,
            entry_point: Some("fs_main"),
            targets: &[Some(ColorTargetState {
                format: surface_format,
                blend: Some(wgpu::BlendState::ALPHA_BLENDING),
                write_mask: ColorWrites::ALL,
            })],
            compilation_options: wgpu::PipelineCompilationOptions::default(),
        }),
        primitive: PrimitiveState::default(),
        depth_stencil: None,
        multisample: MultisampleState::default(),
        multiview_mask: None,
        cache: None,
    });

    SpritePipeline {
        pipeline,
        vertex_buffer,
        uniform_buffer,
        bind_group_layout,
        uniform_stride,
    }
}

fn choose_present_mode(modes: &[PresentMode], vsync: bool) -> PresentMode {
    if vsync {
        modes
            .iter()
            .copied()
            .find(|mode| matches!(mode, PresentMode::Fifo | PresentMode::FifoRelaxed))
            .unwrap_or(PresentMode::Fifo)
    } else {
        modes
            .iter()
            .copied()
            .find(|mode| matches!(mode, PresentMode::Immediate | PresentMode::Mailbox))
            .unwrap_or(PresentMode::Immediate)
    }
}

fn choose_alpha_mode(modes: &[CompositeAlphaMode]) -> CompositeAlphaMode {
    modes
        .iter()
        .copied()
        .find(|mode| matches!(mode, CompositeAlphaMode::Auto))
        .unwrap_or_else(|| modes.first().copied().unwrap_or(CompositeAlphaMode::Opaque))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn uv_region_normalises_source_rect() {
        let (offset, scale) = uv_region(Rect::new(16.0, 0.0, 16.0, 32.0), (64, 32));
        assert_relative_eq!(offset[0], 0.25);
        assert_relative_eq!(offset[1], 0.0);
        assert_relative_eq!(scale[0], 0.25);
        assert_relative_eq!(scale[1], 1.0);
    }

    #[test]
    fn model_matrix_maps_unit_quad_onto_dst() {
        let m = model_matrix(Rect::new(10.0, 20.0, 40.0, 10.0), 0.0);
        let corner = m.transform_point3(Vec3::new(-0.5, -0.5, 0.0));
        assert_relative_eq!(corner.x, 10.0, epsilon = 1e-4);
        assert_relative_eq!(corner.y, 20.0, epsilon = 1e-4);

        let turned = model_matrix(Rect::new(0.0, 0.0, 2.0, 2.0), 90.0);
        let p = turned.transform_point3(Vec3::new(0.5, 0.0, 0.0));
        assert_relative_eq!(p.x, 1.0, epsilon = 1e-4);
        assert_relative_eq!(p.y, 2.0, epsilon = 1e-4);
    }

    #[test]
    fn ortho_puts_origin_top_left() {
        let proj = ortho(Vec2::new(200.0, 100.0));
        let top_left = proj.transform_point3(Vec3::ZERO);
        assert_relative_eq!(top_left.x, -1.0, epsilon = 1e-5);
        assert_relative_eq!(top_left.y, 1.0, epsilon = 1e-5);
        let bottom_right = proj.transform_point3(Vec3::new(200.0, 100.0, 0.0));
        assert_relative_eq!(bottom_right.x, 1.0, epsilon = 1e-5);
        assert_relative_eq!(bottom_right.y, -1.0, epsilon = 1e-5);
    }

    #[test]
    fn colours_convert_to_linear() {
        let [r, g, b, a] = linear_colour(Colour::rgba(255, 0, 188, 128));
        assert_relative_eq!(r, 1.0, epsilon = 1e-5);
        assert_relative_eq!(g, 0.0);
        assert_relative_eq!(b, 0.5029, epsilon = 1e-3);
        assert_relative_eq!(a, 128.0 / 255.0);
    }

    #[test]
    fn present_mode_prefers_requested_sync() {
        let modes = [PresentMode::Mailbox, PresentMode::Fifo];
        assert_eq!(choose_present_mode(&modes, true), PresentMode::Fifo);
        assert_eq!(choose_present_mode(&modes, false), PresentMode::Mailbox);
        assert_eq!(
            choose_alpha_mode(&[CompositeAlphaMode::Opaque]),
            CompositeAlphaMode::Opaque
        );
    }
}
