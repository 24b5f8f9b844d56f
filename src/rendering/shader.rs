//! Shader compilation, validation and named-constant binding.
//!
//! Shaders are WGSL source (inline or from a file) or precompiled SPIR-V. naga
//! parses and validates them up front so errors surface at `set_*_shader` time with
//! the compiler diagnostic, and reflects each shader's uniform block into a table of
//! named constants.
//!
//! Binding convention shared by every device:
//!
//! ```text
//! vertex input   @location(0) position: vec2<f32>   unit quad, 0..1
//!                @location(1) uv: vec2<f32>
//! fragment input @location(0) uv: vec2<f32>
//! @group(0) @binding(0)  display texture      @group(0) @binding(1)  sampler
//! @group(1) @binding(0)  vertex constants     @group(1) @binding(1)  pixel constants
//! ```

use std::path::PathBuf;

use naga::valid::{Capabilities, ValidationFlags, Validator};

use crate::error::{PresentError, PresentResult};

/// Pass-through shader pair used when no custom shader is set.
pub const DEFAULT_SHADER: &str = r#"
struct VertexInput {
    @location(0) position: vec2<f32>,
    @location(1) uv: vec2<f32>,
}

struct VertexOutput {
    @builtin(position) clip_position: vec4<f32>,
    @location(0) uv: vec2<f32>,
}

@group(0) @binding(0) var display_texture: texture_2d<f32>;
@group(0) @binding(1) var display_sampler: sampler;

@vertex
fn vs_main(in: VertexInput) -> VertexOutput {
    var out: VertexOutput;
    out.clip_position = vec4<f32>(in.position.x * 2.0 - 1.0, 1.0 - in.position.y * 2.0, 0.0, 1.0);
    out.uv = in.uv;
    return out;
}

@fragment
fn ps_main(in: VertexOutput) -> @location(0) vec4<f32> {
    return textureSample(display_texture, display_sampler, in.uv);
}
"#;

pub const DEFAULT_VERTEX_ENTRY: &str = "vs_main";
pub const DEFAULT_PIXEL_ENTRY: &str = "ps_main";

/// Bind group holding the constant blocks.
pub const CONSTANT_GROUP: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShaderStage {
    Vertex,
    Pixel,
}

impl ShaderStage {
    fn naga_stage(self) -> naga::ShaderStage {
        match self {
            ShaderStage::Vertex => naga::ShaderStage::Vertex,
            ShaderStage::Pixel => naga::ShaderStage::Fragment,
        }
    }

    /// Binding slot of this stage's constant block inside [`CONSTANT_GROUP`].
    pub fn constant_binding(self) -> u32 {
        match self {
            ShaderStage::Vertex => 0,
            ShaderStage::Pixel => 1,
        }
    }

    fn accepts_model(self, model: &str) -> bool {
        let model = model.to_ascii_lowercase();
        match self {
            ShaderStage::Vertex => model.starts_with("vs"),
            ShaderStage::Pixel => model.starts_with("ps") || model.starts_with("fs"),
        }
    }
}

/// Where shader source text comes from.
#[derive(Debug, Clone)]
pub enum ShaderSource {
    Wgsl(String),
    File(PathBuf),
}

/// Validated code in the form a device consumes.
#[derive(Debug, Clone)]
pub enum ShaderCode {
    Wgsl(String),
    SpirV(Vec<u32>),
}

/// One named member of a constant block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConstantSlot {
    pub name: String,
    pub offset: u32,
    pub size: u32,
}

/// Reflected layout of a shader's constant block.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConstantTable {
    slots: Vec<ConstantSlot>,
    block_size: u32,
}

impl ConstantTable {
    pub fn slot(&self, name: &str) -> Option<&ConstantSlot> {
        self.slots.iter().find(|s| s.name == name)
    }

    pub fn slots(&self) -> &[ConstantSlot] {
        &self.slots
    }

    /// Block size rounded up to 16 bytes (uniform buffer granularity).
    pub fn buffer_size(&self) -> usize {
        (self.block_size as usize).div_ceil(16) * 16
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

/// A constant value to write into a shader's uniform block.
#[derive(Debug, Clone, PartialEq)]
pub enum ShaderConstant {
    Float(f32),
    Vector([f32; 4]),
    /// Column-major 4x4 matrix.
    Matrix([[f32; 4]; 4]),
    Raw(Vec<u8>),
}

impl ShaderConstant {
    pub fn to_bytes(&self) -> Vec<u8> {
        match self {
            ShaderConstant::Float(v) => bytemuck::bytes_of(v).to_vec(),
            ShaderConstant::Vector(v) => bytemuck::cast_slice(v).to_vec(),
            ShaderConstant::Matrix(m) => bytemuck::cast_slice(m).to_vec(),
            ShaderConstant::Raw(bytes) => bytes.clone(),
        }
    }
}

/// A validated shader for one stage.
#[derive(Debug, Clone)]
pub struct CompiledShader {
    pub stage: ShaderStage,
    pub entry_point: String,
    pub code: ShaderCode,
    pub constants: ConstantTable,
}

/// Compile WGSL source for `stage`.
///
/// `model` names the target profile and must match the stage (`vs_*` for vertex,
/// `ps_*` or `fs_*` for pixel).
pub fn compile_source(
    source: &ShaderSource,
    entry_point: &str,
    model: &str,
    stage: ShaderStage,
) -> PresentResult<CompiledShader> {
    if !stage.accepts_model(model) {
        return Err(PresentError::ShaderCompilationError(format!(
            "model '{}' does not target the {:?} stage",
            model, stage
        )));
    }

    let text = match source {
        ShaderSource::Wgsl(text) => text.clone(),
        ShaderSource::File(path) => std::fs::read_to_string(path).map_err(|e| {
            PresentError::ShaderCompilationError(format!("{}: {}", path.display(), e))
        })?,
    };

    let module = naga::front::wgsl::parse_str(&text)
        .map_err(|e| PresentError::ShaderCompilationError(e.emit_to_string(&text)))?;
    Validator::new(ValidationFlags::all(), Capabilities::all())
        .validate(&module)
        .map_err(|e| PresentError::ShaderCompilationError(e.emit_to_string(&text)))?;

    let constants = reflect(&module, entry_point, stage)?;
    log::debug!(
        "[SHADER] Compiled {:?} shader '{}' ({} constants)",
        stage,
        entry_point,
        constants.slots().len()
    );
    Ok(CompiledShader {
        stage,
        entry_point: entry_point.to_string(),
        code: ShaderCode::Wgsl(text),
        constants,
    })
}

/// Load precompiled SPIR-V; the first entry point of `stage` is used.
pub fn compile_bytecode(bytes: &[u8], stage: ShaderStage) -> PresentResult<CompiledShader> {
    if bytes.is_empty() || bytes.len() % 4 != 0 {
        return Err(PresentError::ShaderCompilationError(format!(
            "SPIR-V length {} is not a non-zero multiple of 4",
            bytes.len()
        )));
    }
    let module = naga::front::spv::parse_u8_slice(bytes, &naga::front::spv::Options::default())
        .map_err(|e| PresentError::ShaderCompilationError(e.to_string()))?;
    Validator::new(ValidationFlags::all(), Capabilities::all())
        .validate(&module)
        .map_err(|e| PresentError::ShaderCompilationError(e.as_inner().to_string()))?;

    let entry_point = module
        .entry_points
        .iter()
        .find(|ep| ep.stage == stage.naga_stage())
        .map(|ep| ep.name.clone())
        .ok_or_else(|| {
            PresentError::ShaderCompilationError(format!("no {:?} entry point in bytecode", stage))
        })?;
    let constants = reflect(&module, &entry_point, stage)?;
    let words = bytes
        .chunks_exact(4)
        .map(|w| u32::from_le_bytes([w[0], w[1], w[2], w[3]]))
        .collect();

    Ok(CompiledShader {
        stage,
        entry_point,
        code: ShaderCode::SpirV(words),
        constants,
    })
}

/// Check the entry point and reflect the stage's uniform block.
fn reflect(
    module: &naga::Module,
    entry_point: &str,
    stage: ShaderStage,
) -> PresentResult<ConstantTable> {
    let ep = module
        .entry_points
        .iter()
        .find(|ep| ep.name == entry_point)
        .ok_or_else(|| {
            PresentError::ShaderCompilationError(format!("entry point '{}' not found", entry_point))
        })?;
    if ep.stage != stage.naga_stage() {
        return Err(PresentError::ShaderCompilationError(format!(
            "entry point '{}' is a {:?} shader, expected {:?}",
            entry_point, ep.stage, stage
        )));
    }

    let mut table = ConstantTable::default();
    for (_, var) in module.global_variables.iter() {
        if var.space != naga::AddressSpace::Uniform {
            continue;
        }
        let Some(binding) = &var.binding else {
            continue;
        };
        if binding.group != CONSTANT_GROUP || binding.binding != stage.constant_binding() {
            continue;
        }

        let ty = &module.types[var.ty];
        match &ty.inner {
            naga::TypeInner::Struct { members, span } => {
                for member in members {
                    let Some(name) = &member.name else {
                        continue;
                    };
                    table.slots.push(ConstantSlot {
                        name: name.clone(),
                        offset: member.offset,
                        size: module.types[member.ty].inner.size(module.to_ctx()),
                    });
                }
                table.block_size = *span;
            }
            inner => {
                let size = inner.size(module.to_ctx());
                table.slots.push(ConstantSlot {
                    name: var.name.clone().unwrap_or_default(),
                    offset: 0,
                    size,
                });
                table.block_size = size;
            }
        }
    }
    Ok(table)
}

/// A compiled shader plus the current contents of its constant block.
#[derive(Debug, Clone)]
pub struct ShaderProgram {
    shader: CompiledShader,
    values: Vec<u8>,
}

impl ShaderProgram {
    pub fn new(shader: CompiledShader) -> Self {
        let values = vec![0u8; shader.constants.buffer_size()];
        Self { shader, values }
    }

    pub fn shader(&self) -> &CompiledShader {
        &self.shader
    }

    /// Constant block bytes, sized to the uniform buffer.
    pub fn constant_bytes(&self) -> &[u8] {
        &self.values
    }

    /// Write a named constant.
    pub fn set_constant(&mut self, name: &str, value: &ShaderConstant) -> PresentResult<()> {
        let slot = self.shader.constants.slot(name).ok_or_else(|| {
            PresentError::InvalidArgument(format!(
                "shader '{}' has no constant named '{}'",
                self.shader.entry_point, name
            ))
        })?;
        let bytes = value.to_bytes();
        if bytes.len() > slot.size as usize {
            return Err(PresentError::InvalidArgument(format!(
                "constant '{}' holds {} bytes, value has {}",
                name,
                slot.size,
                bytes.len()
            )));
        }
        let start = slot.offset as usize;
        self.values[start..start + bytes.len()].copy_from_slice(&bytes);
        Ok(())
    }
}

/// Active shader pair. `None` means the pass-through default for that stage.
#[derive(Debug, Clone, Default)]
pub struct ShaderState {
    vertex: Option<ShaderProgram>,
    pixel: Option<ShaderProgram>,
    generation: u64,
}

impl ShaderState {
    pub fn vertex(&self) -> Option<&ShaderProgram> {
        self.vertex.as_ref()
    }

    pub fn pixel(&self) -> Option<&ShaderProgram> {
        self.pixel.as_ref()
    }

    pub fn program_mut(&mut self, stage: ShaderStage) -> Option<&mut ShaderProgram> {
        match stage {
            ShaderStage::Vertex => self.vertex.as_mut(),
            ShaderStage::Pixel => self.pixel.as_mut(),
        }
    }

    /// Install or clear a stage. Bumps the generation so devices rebuild pipelines.
    pub fn set(&mut self, stage: ShaderStage, shader: Option<CompiledShader>) {
        let program = shader.map(ShaderProgram::new);
        match stage {
            ShaderStage::Vertex => self.vertex = program,
            ShaderStage::Pixel => self.pixel = program,
        }
        self.generation += 1;
    }

    /// Changes whenever a stage is replaced or cleared.
    pub fn generation(&self) -> u64 {
        self.generation
    }
}
