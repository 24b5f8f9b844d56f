//! wgpu presentation device.
//!
//! The display texture and the render target live in video memory. Sources are
//! uploaded as BGRA textures and stretched with a linear sampler; the scene pass
//! runs the active shader pair over the unit quad; overlays are rasterized on the
//! CPU into a premultiplied layer and blended on top. Device loss is reported by
//! wgpu's lost callback and recovered by recreating the whole context.

use std::borrow::Cow;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use wgpu::util::DeviceExt;

use crate::error::{OptionExt, PresentError, PresentResult, ResultExt};
use crate::rendering::coord::{Rect, Size};
use crate::rendering::format::PixelFormat;
use crate::rendering::raster::Canvas;
use crate::rendering::shader::{
    ShaderCode, ShaderProgram, ShaderState, DEFAULT_PIXEL_ENTRY, DEFAULT_SHADER,
    DEFAULT_VERTEX_ENTRY,
};
use crate::rendering::surface::{QuadVertex, UNIT_QUAD};
use crate::rendering::types::{Color, Frame};

use super::{ClientArea, DeviceStatus, GraphicsDevice, OverlayPainter};

/// Format of every engine-owned texture; matches [`Frame`]'s byte order.
const TEXTURE_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Bgra8Unorm;

const QUAD_ATTRIBUTES: [wgpu::VertexAttribute; 2] =
    wgpu::vertex_attr_array![0 => Float32x2, 1 => Float32x2];

/// Smallest uniform buffer bound for a stage without constants.
const MIN_CONSTANT_BUFFER: u64 = 16;

/// Native window a [`GpuDevice`] presents into.
pub trait GpuWindow: ClientArea + HasWindowHandle + HasDisplayHandle + Send + Sync {}

impl<T> GpuWindow for T where T: ClientArea + HasWindowHandle + HasDisplayHandle + Send + Sync {}

#[derive(Debug, Clone)]
pub struct GpuOptions {
    pub backends: wgpu::Backends,
    /// Wait for vertical blank on present.
    pub vsync: bool,
}

impl Default for GpuOptions {
    fn default() -> Self {
        Self {
            backends: wgpu::Backends::all(),
            vsync: true,
        }
    }
}

fn quad_layout() -> wgpu::VertexBufferLayout<'static> {
    wgpu::VertexBufferLayout {
        array_stride: std::mem::size_of::<QuadVertex>() as u64,
        step_mode: wgpu::VertexStepMode::Vertex,
        attributes: &QUAD_ATTRIBUTES,
    }
}

fn to_wgpu_color(color: Color) -> wgpu::Color {
    wgpu::Color {
        r: color.r() as f64 / 255.0,
        g: color.g() as f64 / 255.0,
        b: color.b() as f64 / 255.0,
        a: color.a() as f64 / 255.0,
    }
}

fn extent(size: Size) -> wgpu::Extent3d {
    wgpu::Extent3d {
        width: size.width,
        height: size.height,
        depth_or_array_layers: 1,
    }
}

/// Objects that do not depend on the display size.
struct Pipelines {
    texture_layout: wgpu::BindGroupLayout,
    constant_layout: wgpu::BindGroupLayout,
    sampler: wgpu::Sampler,
    default_module: wgpu::ShaderModule,
    quad: wgpu::Buffer,
    /// Stretch into the display texture.
    copy: wgpu::RenderPipeline,
    /// Premultiplied overlay layer over the render target.
    overlay: wgpu::RenderPipeline,
    /// Render target onto the swap chain.
    present: Option<wgpu::RenderPipeline>,
}

impl Pipelines {
    fn new(device: &wgpu::Device, surface_format: Option<wgpu::TextureFormat>) -> Self {
        let texture_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("presenter-texture-layout"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: true },
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
            ],
        });

        let uniform = |binding, visibility| wgpu::BindGroupLayoutEntry {
            binding,
            visibility,
            ty: wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Uniform,
                has_dynamic_offset: false,
                min_binding_size: None,
            },
            count: None,
        };
        let constant_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("presenter-constant-layout"),
            entries: &[
                uniform(0, wgpu::ShaderStages::VERTEX),
                uniform(1, wgpu::ShaderStages::FRAGMENT),
            ],
        });

        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("presenter-linear-sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::FilterMode::Nearest,
            ..Default::default()
        });

        let default_module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("presenter-default-shader"),
            source: wgpu::ShaderSource::Wgsl(Cow::Borrowed(DEFAULT_SHADER)),
        });

        let quad = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("presenter-unit-quad"),
            contents: bytemuck::cast_slice(&UNIT_QUAD),
            usage: wgpu::BufferUsages::VERTEX,
        });

        let texture_only = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("presenter-blit-layout"),
            bind_group_layouts: &[&texture_layout],
            push_constant_ranges: &[],
        });
        let blit = |label, format, blend| {
            quad_pipeline(
                device,
                label,
                &texture_only,
                (&default_module, DEFAULT_VERTEX_ENTRY),
                (&default_module, DEFAULT_PIXEL_ENTRY),
                format,
                blend,
            )
        };
        let copy = blit("presenter-copy", TEXTURE_FORMAT, None);
        let overlay = blit(
            "presenter-overlay",
            TEXTURE_FORMAT,
            Some(wgpu::BlendState::PREMULTIPLIED_ALPHA_BLENDING),
        );
        let present = surface_format.map(|format| blit("presenter-present", format, None));

        Self {
            texture_layout,
            constant_layout,
            sampler,
            default_module,
            quad,
            copy,
            overlay,
            present,
        }
    }

    fn texture_bind_group(&self, device: &wgpu::Device, texture: &wgpu::Texture, label: &str) -> wgpu::BindGroup {
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(label),
            layout: &self.texture_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(&view),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::Sampler(&self.sampler),
                },
            ],
        })
    }
}

fn quad_pipeline(
    device: &wgpu::Device,
    label: &str,
    layout: &wgpu::PipelineLayout,
    vertex: (&wgpu::ShaderModule, &str),
    fragment: (&wgpu::ShaderModule, &str),
    format: wgpu::TextureFormat,
    blend: Option<wgpu::BlendState>,
) -> wgpu::RenderPipeline {
    device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
        label: Some(label),
        layout: Some(layout),
        vertex: wgpu::VertexState {
            module: vertex.0,
            entry_point: Some(vertex.1),
            buffers: &[quad_layout()],
            compilation_options: Default::default(),
        },
        fragment: Some(wgpu::FragmentState {
            module: fragment.0,
            entry_point: Some(fragment.1),
            targets: &[Some(wgpu::ColorTargetState {
                format,
                blend,
                write_mask: wgpu::ColorWrites::ALL,
            })],
            compilation_options: Default::default(),
        }),
        primitive: wgpu::PrimitiveState {
            topology: wgpu::PrimitiveTopology::TriangleStrip,
            ..Default::default()
        },
        depth_stencil: None,
        multisample: wgpu::MultisampleState::default(),
        multiview: None,
        cache: None,
    })
}

fn create_module(device: &wgpu::Device, program: &ShaderProgram, label: &str) -> wgpu::ShaderModule {
    let source = match &program.shader().code {
        ShaderCode::Wgsl(text) => wgpu::ShaderSource::Wgsl(Cow::Borrowed(text.as_str())),
        ShaderCode::SpirV(words) => wgpu::ShaderSource::SpirV(Cow::Borrowed(words.as_slice())),
    };
    device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some(label),
        source,
    })
}

/// Pipeline and constant buffers for one shader generation.
struct ScenePass {
    generation: u64,
    pipeline: wgpu::RenderPipeline,
    vertex_constants: wgpu::Buffer,
    pixel_constants: wgpu::Buffer,
    constants: wgpu::BindGroup,
}

impl ScenePass {
    fn new(device: &wgpu::Device, pipelines: &Pipelines, shaders: &ShaderState) -> PresentResult<Self> {
        device.push_error_scope(wgpu::ErrorFilter::Validation);

        let vertex_module = shaders
            .vertex()
            .map(|p| create_module(device, p, "presenter-vertex-shader"));
        let pixel_module = shaders
            .pixel()
            .map(|p| create_module(device, p, "presenter-pixel-shader"));
        let vertex = match (&vertex_module, shaders.vertex()) {
            (Some(module), Some(p)) => (module, p.shader().entry_point.as_str()),
            _ => (&pipelines.default_module, DEFAULT_VERTEX_ENTRY),
        };
        let fragment = match (&pixel_module, shaders.pixel()) {
            (Some(module), Some(p)) => (module, p.shader().entry_point.as_str()),
            _ => (&pipelines.default_module, DEFAULT_PIXEL_ENTRY),
        };

        let layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("presenter-scene-layout"),
            bind_group_layouts: &[&pipelines.texture_layout, &pipelines.constant_layout],
            push_constant_ranges: &[],
        });
        let pipeline = quad_pipeline(
            device,
            "presenter-scene",
            &layout,
            vertex,
            fragment,
            TEXTURE_FORMAT,
            None,
        );

        if let Some(err) = pollster::block_on(device.pop_error_scope()) {
            return Err(PresentError::ShaderCompilationError(err.to_string()));
        }

        let constant_buffer = |program: Option<&ShaderProgram>, label| {
            let size = program
                .map(|p| p.constant_bytes().len() as u64)
                .unwrap_or(0)
                .max(MIN_CONSTANT_BUFFER);
            device.create_buffer(&wgpu::BufferDescriptor {
                label: Some(label),
                size,
                usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
                mapped_at_creation: false,
            })
        };
        let vertex_constants = constant_buffer(shaders.vertex(), "presenter-vertex-constants");
        let pixel_constants = constant_buffer(shaders.pixel(), "presenter-pixel-constants");
        let constants = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("presenter-constants"),
            layout: &pipelines.constant_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: vertex_constants.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: pixel_constants.as_entire_binding(),
                },
            ],
        });

        log::debug!("[GPU] Scene pipeline rebuilt (generation {})", shaders.generation());
        Ok(Self {
            generation: shaders.generation(),
            pipeline,
            vertex_constants,
            pixel_constants,
            constants,
        })
    }

    fn upload_constants(&self, queue: &wgpu::Queue, shaders: &ShaderState) {
        for (program, buffer) in [
            (shaders.vertex(), &self.vertex_constants),
            (shaders.pixel(), &self.pixel_constants),
        ] {
            if let Some(bytes) = program.map(ShaderProgram::constant_bytes) {
                if !bytes.is_empty() {
                    queue.write_buffer(buffer, 0, bytes);
                }
            }
        }
    }
}

struct DisplayTarget {
    size: Size,
    texture: wgpu::Texture,
    texture_group: wgpu::BindGroup,
    render_target: wgpu::Texture,
    render_group: wgpu::BindGroup,
    overlay: wgpu::Texture,
    overlay_group: wgpu::BindGroup,
    /// CPU side of the overlay texture.
    overlay_layer: Frame,
}

/// Uploaded stretch source, reused while the source size is unchanged.
struct SourceTexture {
    size: Size,
    texture: wgpu::Texture,
    group: wgpu::BindGroup,
}

/// Everything destroyed by device loss.
struct GpuContext {
    adapter: wgpu::Adapter,
    device: wgpu::Device,
    queue: wgpu::Queue,
    surface: Option<(wgpu::Surface<'static>, wgpu::SurfaceConfiguration)>,
    pipelines: Pipelines,
}

impl GpuContext {
    fn new(
        instance: &wgpu::Instance,
        window: Option<&Arc<dyn GpuWindow>>,
        adapter_index: usize,
        options: &GpuOptions,
        lost: &Arc<AtomicBool>,
    ) -> PresentResult<Self> {
        let surface = window
            .map(|w| instance.create_surface(w.clone()))
            .transpose()
            .alloc_context("Failed to create surface")?;

        let adapter = instance
            .enumerate_adapters(options.backends)
            .into_iter()
            .nth(adapter_index)
            .ok_or_else(|| {
                PresentError::AllocationError(format!("adapter {} not available", adapter_index))
            })?;
        if let Some(surface) = &surface {
            if !adapter.is_surface_supported(surface) {
                return Err(PresentError::AllocationError(format!(
                    "adapter '{}' cannot present to this window",
                    adapter.get_info().name
                )));
            }
        }

        let (device, queue) = pollster::block_on(adapter.request_device(&wgpu::DeviceDescriptor {
            label: Some("vidpresent-device"),
            required_features: wgpu::Features::empty(),
            required_limits: wgpu::Limits::downlevel_defaults().using_resolution(adapter.limits()),
            memory_hints: wgpu::MemoryHints::Performance,
            trace: wgpu::Trace::Off,
        }))
        .alloc_context("Failed to create device")?;

        let flag = lost.clone();
        device.set_device_lost_callback(move |reason, message| {
            log::warn!("[GPU] Device lost ({:?}): {}", reason, message);
            flag.store(true, Ordering::SeqCst);
        });
        device.on_uncaptured_error(Box::new(|err| {
            log::error!("[GPU] Uncaptured error: {}", err);
        }));

        let surface = match (surface, window) {
            (Some(surface), Some(window)) => {
                let size = window.client_size().at_least_one();
                let mut config = surface
                    .get_default_config(&adapter, size.width, size.height)
                    .not_ready("surface not supported by adapter")?;
                config.usage = wgpu::TextureUsages::RENDER_ATTACHMENT;
                config.present_mode = if options.vsync {
                    wgpu::PresentMode::AutoVsync
                } else {
                    wgpu::PresentMode::AutoNoVsync
                };
                surface.configure(&device, &config);
                Some((surface, config))
            }
            _ => None,
        };

        let pipelines = Pipelines::new(&device, surface.as_ref().map(|(_, c)| c.format));
        log::info!(
            "[GPU] Using adapter: {} ({:?})",
            adapter.get_info().name,
            adapter.get_info().backend
        );
        Ok(Self {
            adapter,
            device,
            queue,
            surface,
            pipelines,
        })
    }

    fn create_texture(&self, size: Size, usage: wgpu::TextureUsages, label: &str) -> wgpu::Texture {
        self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some(label),
            size: extent(size),
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: TEXTURE_FORMAT,
            usage,
            view_formats: &[],
        })
    }

    fn upload(&self, texture: &wgpu::Texture, frame: &Frame) {
        self.queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            &frame.data,
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(frame.stride as u32),
                rows_per_image: Some(frame.height),
            },
            extent(frame.size()),
        );
    }

    /// Draw the unit quad sampling `group` into `view`.
    #[allow(clippy::too_many_arguments)]
    fn draw_quad(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        view: &wgpu::TextureView,
        load: wgpu::LoadOp<wgpu::Color>,
        pipeline: &wgpu::RenderPipeline,
        group: &wgpu::BindGroup,
        constants: Option<&wgpu::BindGroup>,
        viewport: Option<Rect>,
    ) {
        let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("presenter-pass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view,
                resolve_target: None,
                ops: wgpu::Operations {
                    load,
                    store: wgpu::StoreOp::Store,
                },
            })],
            depth_stencil_attachment: None,
            timestamp_writes: None,
            occlusion_query_set: None,
        });
        if let Some(rect) = viewport {
            pass.set_viewport(
                rect.left as f32,
                rect.top as f32,
                rect.width() as f32,
                rect.height() as f32,
                0.0,
                1.0,
            );
        }
        pass.set_pipeline(pipeline);
        pass.set_bind_group(0, group, &[]);
        if let Some(constants) = constants {
            pass.set_bind_group(1, constants, &[]);
        }
        pass.set_vertex_buffer(0, self.pipelines.quad.slice(..));
        pass.draw(0..UNIT_QUAD.len() as u32, 0..1);
    }

    fn clear_pass(&self, encoder: &mut wgpu::CommandEncoder, view: &wgpu::TextureView, color: Color) {
        encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("presenter-clear"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Clear(to_wgpu_color(color)),
                    store: wgpu::StoreOp::Store,
                },
            })],
            depth_stencil_attachment: None,
            timestamp_writes: None,
            occlusion_query_set: None,
        });
    }

    fn encoder(&self, label: &str) -> wgpu::CommandEncoder {
        self.device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor { label: Some(label) })
    }

    fn reconfigure(&mut self, size: Size) {
        if let Some((surface, config)) = &mut self.surface {
            config.width = size.width;
            config.height = size.height;
            surface.configure(&self.device, config);
        }
    }
}

pub struct GpuDevice {
    instance: wgpu::Instance,
    window: Option<Arc<dyn GpuWindow>>,
    adapter_index: usize,
    options: GpuOptions,
    ctx: GpuContext,
    target: Option<DisplayTarget>,
    source: Option<SourceTexture>,
    scene: Option<ScenePass>,
    lost: Arc<AtomicBool>,
    lost_reported: bool,
}

impl GpuDevice {
    fn target(&self) -> PresentResult<&DisplayTarget> {
        self.target.as_ref().not_ready("display target not created")
    }

    fn prepare_source(&mut self, frame: &Frame) {
        let size = frame.size();
        if self.source.as_ref().map(|s| s.size) != Some(size) {
            let texture = self.ctx.create_texture(
                size,
                wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
                "presenter-source",
            );
            let group =
                self.ctx
                    .pipelines
                    .texture_bind_group(&self.ctx.device, &texture, "presenter-source-group");
            self.source = Some(SourceTexture {
                size,
                texture,
                group,
            });
        }
        if let Some(source) = &self.source {
            self.ctx.upload(&source.texture, frame);
        }
    }

    fn drop_resources(&mut self) {
        self.target = None;
        self.source = None;
        self.scene = None;
    }
}

impl GraphicsDevice for GpuDevice {
    type Window = dyn GpuWindow;
    type Options = GpuOptions;

    fn open(
        window: Option<Arc<Self::Window>>,
        adapter_index: usize,
        options: Self::Options,
    ) -> PresentResult<Self> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: options.backends,
            ..Default::default()
        });
        let lost = Arc::new(AtomicBool::new(false));
        let ctx = GpuContext::new(&instance, window.as_ref(), adapter_index, &options, &lost)?;
        Ok(Self {
            instance,
            window,
            adapter_index,
            options,
            ctx,
            target: None,
            source: None,
            scene: None,
            lost,
            lost_reported: false,
        })
    }

    fn adapter_name(&self) -> String {
        self.ctx.adapter.get_info().name
    }

    fn is_windowed(&self) -> bool {
        self.window.is_some()
    }

    fn back_buffer_size(&self) -> Size {
        match (&self.window, &self.target) {
            (Some(window), _) => window.client_size().at_least_one(),
            (None, Some(target)) => target.size,
            (None, None) => Size::new(1, 1),
        }
    }

    fn supports_format(&self, _format: PixelFormat) -> bool {
        // every format is converted to BGRA before upload
        true
    }

    fn pitch_alignment(&self) -> usize {
        wgpu::COPY_BYTES_PER_ROW_ALIGNMENT as usize
    }

    /// A lost device is reported as `Lost` once, then as `NotReset` so the engine
    /// recreates the context.
    fn check_state(&mut self) -> DeviceStatus {
        if !self.lost.load(Ordering::SeqCst) {
            DeviceStatus::Ok
        } else if !self.lost_reported {
            self.lost_reported = true;
            DeviceStatus::Lost
        } else {
            DeviceStatus::NotReset
        }
    }

    fn reset(&mut self) -> PresentResult<()> {
        self.drop_resources();
        let lost = Arc::new(AtomicBool::new(false));
        let ctx = GpuContext::new(
            &self.instance,
            self.window.as_ref(),
            self.adapter_index,
            &self.options,
            &lost,
        )?;
        self.ctx = ctx;
        self.lost = lost;
        self.lost_reported = false;
        log::info!("[GPU] Device context recreated");
        Ok(())
    }

    fn resize_back_buffer(&mut self) -> PresentResult<Size> {
        let size = self.back_buffer_size();
        self.ctx.reconfigure(size);
        Ok(size)
    }

    fn create_display_target(&mut self, size: Size) -> PresentResult<()> {
        if size.is_empty() {
            return Err(PresentError::InvalidArgument(format!(
                "display target {}x{} is empty",
                size.width, size.height
            )));
        }
        let max = self.ctx.device.limits().max_texture_dimension_2d;
        if size.width > max || size.height > max {
            return Err(PresentError::AllocationError(format!(
                "display target {}x{} exceeds the {} texel limit",
                size.width, size.height, max
            )));
        }

        let ctx = &self.ctx;
        let texture = ctx.create_texture(
            size,
            wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::TEXTURE_BINDING,
            "presenter-display-texture",
        );
        let render_target = ctx.create_texture(
            size,
            wgpu::TextureUsages::RENDER_ATTACHMENT
                | wgpu::TextureUsages::TEXTURE_BINDING
                | wgpu::TextureUsages::COPY_SRC,
            "presenter-render-target",
        );
        let overlay = ctx.create_texture(
            size,
            wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            "presenter-overlay-layer",
        );
        let texture_group = ctx
            .pipelines
            .texture_bind_group(&ctx.device, &texture, "presenter-display-group");
        let render_group = ctx
            .pipelines
            .texture_bind_group(&ctx.device, &render_target, "presenter-render-group");
        let overlay_group = ctx
            .pipelines
            .texture_bind_group(&ctx.device, &overlay, "presenter-overlay-group");

        self.target = Some(DisplayTarget {
            size,
            texture,
            texture_group,
            render_target,
            render_group,
            overlay,
            overlay_group,
            overlay_layer: Frame::filled(size.width, size.height, Color::TRANSPARENT),
        });
        log::debug!("[GPU] Display target {}x{}", size.width, size.height);
        Ok(())
    }

    fn discard_display_target(&mut self) {
        self.target = None;
    }

    fn display_size(&self) -> Option<Size> {
        self.target.as_ref().map(|t| t.size)
    }

    fn stretch(&mut self, source: Option<&Frame>, dest: Rect, background: Color) -> PresentResult<()> {
        let bounds = Rect::from_size(self.target()?.size);
        if let Some(frame) = source {
            self.prepare_source(frame);
        }

        let target = self.target()?;
        let view = target.texture.create_view(&wgpu::TextureViewDescriptor::default());
        let mut encoder = self.ctx.encoder("presenter-stretch");
        let dest = dest.intersect(&bounds);
        match (&self.source, source) {
            (Some(src), Some(_)) if !dest.is_empty() => self.ctx.draw_quad(
                &mut encoder,
                &view,
                wgpu::LoadOp::Clear(to_wgpu_color(background)),
                &self.ctx.pipelines.copy,
                &src.group,
                None,
                Some(dest),
            ),
            _ => self.ctx.clear_pass(&mut encoder, &view, background),
        }
        self.ctx.queue.submit(Some(encoder.finish()));
        Ok(())
    }

    fn fill_display(&mut self, color: Color) -> PresentResult<()> {
        let target = self.target()?;
        let view = target.texture.create_view(&wgpu::TextureViewDescriptor::default());
        let mut encoder = self.ctx.encoder("presenter-fill");
        self.ctx.clear_pass(&mut encoder, &view, color);
        self.ctx.queue.submit(Some(encoder.finish()));
        Ok(())
    }

    fn render_scene(
        &mut self,
        shaders: &ShaderState,
        overlays: Option<OverlayPainter<'_>>,
    ) -> PresentResult<()> {
        if self.scene.as_ref().map(|s| s.generation) != Some(shaders.generation()) {
            self.scene = Some(ScenePass::new(&self.ctx.device, &self.ctx.pipelines, shaders)?);
        }

        if let Some(paint) = overlays {
            let target = self.target.as_mut().not_ready("display target not created")?;
            target.overlay_layer.fill(Color::TRANSPARENT);
            paint(&mut Canvas::new(&mut target.overlay_layer));
            self.ctx.upload(&target.overlay, &target.overlay_layer);
            self.render_passes(shaders, true)
        } else {
            self.render_passes(shaders, false)
        }
    }

    fn present(&mut self) -> PresentResult<()> {
        let target = self.target()?;
        let ctx = &self.ctx;
        let (Some((surface, config)), Some(pipeline)) = (&ctx.surface, &ctx.pipelines.present)
        else {
            return Ok(());
        };

        let frame = match surface.get_current_texture() {
            Ok(frame) => frame,
            Err(wgpu::SurfaceError::Outdated | wgpu::SurfaceError::Lost) => {
                log::info!("[GPU] Surface outdated, reconfiguring");
                surface.configure(&ctx.device, config);
                surface
                    .get_current_texture()
                    .alloc_context("Failed to get surface texture after reconfig")?
            }
            Err(wgpu::SurfaceError::OutOfMemory) => {
                self.lost.store(true, Ordering::SeqCst);
                return Err(PresentError::AllocationError(
                    "out of memory acquiring surface texture".to_string(),
                ));
            }
            Err(e) => {
                return Err(PresentError::AllocationError(format!(
                    "Failed to get surface texture: {}",
                    e
                )))
            }
        };

        let view = frame
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());
        let mut encoder = ctx.encoder("presenter-present");
        ctx.draw_quad(
            &mut encoder,
            &view,
            wgpu::LoadOp::Clear(wgpu::Color::BLACK),
            pipeline,
            &target.render_group,
            None,
            None,
        );
        ctx.queue.submit(Some(encoder.finish()));
        frame.present();
        Ok(())
    }

    fn read_render_target(&mut self) -> PresentResult<Frame> {
        let target = self.target()?;
        let ctx = &self.ctx;
        let Size { width, height } = target.size;

        let bytes_per_row = width * 4;
        let align = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;
        let padded_bytes_per_row = bytes_per_row.div_ceil(align) * align;
        let buffer = ctx.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("presenter-readback"),
            size: padded_bytes_per_row as u64 * height as u64,
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });

        let mut encoder = ctx.encoder("presenter-readback");
        encoder.copy_texture_to_buffer(
            wgpu::TexelCopyTextureInfo {
                texture: &target.render_target,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::TexelCopyBufferInfo {
                buffer: &buffer,
                layout: wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(padded_bytes_per_row),
                    rows_per_image: Some(height),
                },
            },
            extent(target.size),
        );
        ctx.queue.submit(Some(encoder.finish()));

        let slice = buffer.slice(..);
        let (tx, rx) = std::sync::mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = tx.send(result);
        });
        let _ = ctx.device.poll(wgpu::PollType::Wait);
        rx.recv()
            .alloc_context("Readback channel closed")?
            .alloc_context("Failed to map readback buffer")?;

        let mut data = Vec::with_capacity(bytes_per_row as usize * height as usize);
        {
            let mapped = slice.get_mapped_range();
            for row in mapped.chunks(padded_bytes_per_row as usize).take(height as usize) {
                data.extend_from_slice(&row[..bytes_per_row as usize]);
            }
        }
        buffer.unmap();
        Frame::from_bgra(width, height, bytes_per_row as usize, data)
    }
}

impl GpuDevice {
    /// Scene pass into the render target, then the overlay layer when requested.
    fn render_passes(&mut self, shaders: &ShaderState, with_overlays: bool) -> PresentResult<()> {
        let target = self.target()?;
        let scene = self.scene.as_ref().not_ready("scene pipeline not built")?;
        let ctx = &self.ctx;
        scene.upload_constants(&ctx.queue, shaders);

        let view = target
            .render_target
            .create_view(&wgpu::TextureViewDescriptor::default());
        let mut encoder = ctx.encoder("presenter-scene");
        ctx.draw_quad(
            &mut encoder,
            &view,
            wgpu::LoadOp::Clear(wgpu::Color::BLACK),
            &scene.pipeline,
            &target.texture_group,
            Some(&scene.constants),
            None,
        );
        if with_overlays {
            ctx.draw_quad(
                &mut encoder,
                &view,
                wgpu::LoadOp::Load,
                &ctx.pipelines.overlay,
                &target.overlay_group,
                None,
                None,
            );
        }
        ctx.queue.submit(Some(encoder.finish()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_color_conversion() {
        let c = to_wgpu_color(Color::from_argb(255, 255, 0, 51));
        assert_eq!((c.r, c.g, c.a), (1.0, 0.0, 1.0));
        assert!((c.b - 0.2).abs() < 1e-9);
    }

    #[test]
    fn test_quad_layout_matches_vertex() {
        let layout = quad_layout();
        assert_eq!(layout.array_stride, 16);
        assert_eq!(layout.attributes[1].offset, 8);
    }
}
