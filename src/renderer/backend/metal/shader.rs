//! WGSL modules reflected with naga.
//!
//! Uniform-space globals become uniform groups named after the global
//! (`var<uniform> u_Transform: TransformBlock`), with every struct member and
//! array element flattened to a dotted leaf at its buffer offset. Texture
//! globals pair with a sampler global called `<texture>_sampler` in the same
//! group.

use std::any::Any;
use std::cell::{Ref, RefCell};
use std::num::NonZeroU64;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use rustc_hash::FxHashMap;

use crate::errors::{LumenError, Result};
use crate::renderer::layout::DataType;
use crate::renderer::shader::{
    GroupBinding, Shader, ShaderInterface, ShaderSource, ShaderStages, TextureBinding, Uniform,
    UniformElement, UniformLibrary, UniformPacking, UniformValue,
};
use crate::renderer::texture::{Texture, TextureType};

use super::device::{MetalDevice, SamplerKind};

static NEXT_SHADER_ID: AtomicU64 = AtomicU64::new(1);

pub const VERTEX_ENTRY: &str = "vs_main";
pub const FRAGMENT_ENTRY: &str = "fs_main";

/// What one reflected binding slot holds.
#[derive(Debug, Clone)]
pub enum BindingSlot {
    Uniform {
        name: String,
        size: u32,
    },
    Texture {
        name: String,
        dimension: wgpu::TextureViewDimension,
        sample_type: wgpu::TextureSampleType,
        multisampled: bool,
    },
    Sampler {
        texture: String,
        kind: SamplerKind,
    },
}

#[derive(Debug, Clone)]
pub struct ReflectedBinding {
    pub group: u32,
    pub binding: u32,
    pub slot: BindingSlot,
}

/// Compiled module plus the layouts derived from it.
struct Compiled {
    module: wgpu::ShaderModule,
    group_layouts: Vec<wgpu::BindGroupLayout>,
    pipeline_layout: wgpu::PipelineLayout,
    bindings: Vec<ReflectedBinding>,
    has_fragment: bool,
    fragment_outputs: Vec<u32>,
}

pub struct MetalShader {
    id: u64,
    name: String,
    compiled: Option<Compiled>,
    interface: RefCell<ShaderInterface>,
    bound: RefCell<FxHashMap<String, Rc<dyn Texture>>>,
}

fn data_type(inner: &naga::TypeInner) -> Option<DataType> {
    use naga::{ScalarKind, TypeInner, VectorSize};
    match *inner {
        TypeInner::Scalar(scalar) => match scalar.kind {
            ScalarKind::Float => Some(DataType::Float),
            ScalarKind::Sint | ScalarKind::Uint => Some(DataType::Int),
            ScalarKind::Bool => Some(DataType::Bool),
            _ => None,
        },
        TypeInner::Vector { size, scalar } if scalar.kind == ScalarKind::Float => Some(match size {
            VectorSize::Bi => DataType::Vec2,
            VectorSize::Tri => DataType::Vec3,
            VectorSize::Quad => DataType::Vec4,
        }),
        TypeInner::Matrix { columns, rows, .. } if columns == rows => Some(match columns {
            VectorSize::Bi => DataType::Mat2,
            VectorSize::Tri => DataType::Mat3,
            VectorSize::Quad => DataType::Mat4,
        }),
        _ => None,
    }
}

/// Registers every leaf under `ty` with `prefix` as its dotted name.
fn flatten(
    module: &naga::Module,
    ty: naga::Handle<naga::Type>,
    prefix: &str,
    offset: u32,
    uniforms: &mut UniformLibrary,
) -> Result<()> {
    let inner = &module.types[ty].inner;
    if let Some(data_type) = data_type(inner) {
        return uniforms.insert_element(
            prefix,
            UniformElement {
                ty: data_type,
                location: None,
                offset,
                size: UniformPacking::Aligned.size_of(data_type),
            },
        );
    }
    match inner {
        naga::TypeInner::Struct { members, .. } => {
            for member in members {
                let Some(name) = &member.name else { continue };
                flatten(module, member.ty, &format!("{prefix}.{name}"), offset + member.offset, uniforms)?;
            }
        }
        naga::TypeInner::Array {
            base,
            size: naga::ArraySize::Constant(count),
            stride,
        } => {
            for i in 0..count.get() {
                flatten(module, *base, &format!("{prefix}[{i}]"), offset + i * stride, uniforms)?;
            }
        }
        _ => log::debug!("Skipping uniform member '{prefix}' of unsupported type"),
    }
    Ok(())
}

fn texture_kind(dim: naga::ImageDimension, class: naga::ImageClass) -> Option<(TextureType, bool, bool)> {
    let multi = match class {
        naga::ImageClass::Sampled { multi, .. } | naga::ImageClass::Depth { multi } => multi,
        _ => return None,
    };
    let ty = match dim {
        naga::ImageDimension::D1 => TextureType::Texture1D,
        naga::ImageDimension::D2 if multi => TextureType::Texture2DMultisample,
        naga::ImageDimension::D2 => TextureType::Texture2D,
        naga::ImageDimension::D3 => TextureType::Texture3D,
        naga::ImageDimension::Cube => TextureType::TextureCube,
    };
    Some((ty, matches!(class, naga::ImageClass::Depth { .. }), multi))
}

const fn view_dimension(dim: naga::ImageDimension) -> wgpu::TextureViewDimension {
    match dim {
        naga::ImageDimension::D1 => wgpu::TextureViewDimension::D1,
        naga::ImageDimension::D2 => wgpu::TextureViewDimension::D2,
        naga::ImageDimension::D3 => wgpu::TextureViewDimension::D3,
        naga::ImageDimension::Cube => wgpu::TextureViewDimension::Cube,
    }
}

struct Reflection {
    uniforms: UniformLibrary,
    textures: FxHashMap<String, TextureBinding>,
    bindings: Vec<ReflectedBinding>,
    has_fragment: bool,
    fragment_outputs: Vec<u32>,
}

fn reflect(module: &naga::Module, info: &naga::valid::ModuleInfo) -> Result<Reflection> {
    let mut uniforms = UniformLibrary::new(UniformPacking::Aligned);
    let mut textures = FxHashMap::default();
    let mut bindings = Vec::new();
    let mut samplers: Vec<(u32, u32, String, bool)> = Vec::new();

    for (handle, var) in module.global_variables.iter() {
        let (Some(binding), Some(name)) = (&var.binding, &var.name) else {
            continue;
        };
        let mut stages = ShaderStages::empty();
        for (i, entry) in module.entry_points.iter().enumerate() {
            if !info.get_entry_point(i)[handle].is_empty() {
                stages |= match entry.stage {
                    naga::ShaderStage::Vertex => ShaderStages::VERTEX,
                    _ => ShaderStages::FRAGMENT,
                };
            }
        }
        let inner = &module.types[var.ty].inner;
        match (var.space, inner) {
            (naga::AddressSpace::Uniform, _) => {
                let size = inner.size(module.to_ctx());
                uniforms.add_group(Uniform::with_binding(
                    name.clone(),
                    size,
                    GroupBinding {
                        group: binding.group,
                        binding: binding.binding,
                    },
                ));
                flatten(module, var.ty, name, 0, &mut uniforms)?;
                bindings.push(ReflectedBinding {
                    group: binding.group,
                    binding: binding.binding,
                    slot: BindingSlot::Uniform {
                        name: name.clone(),
                        size,
                    },
                });
            }
            (naga::AddressSpace::Handle, naga::TypeInner::Image { dim, class, .. }) => {
                let Some((ty, depth, multisampled)) = texture_kind(*dim, *class) else {
                    log::debug!("Skipping storage image '{name}'");
                    continue;
                };
                let sample_type = match class {
                    naga::ImageClass::Depth { .. } => wgpu::TextureSampleType::Depth,
                    naga::ImageClass::Sampled { kind: naga::ScalarKind::Uint, .. } => wgpu::TextureSampleType::Uint,
                    naga::ImageClass::Sampled { kind: naga::ScalarKind::Sint, .. } => wgpu::TextureSampleType::Sint,
                    _ => wgpu::TextureSampleType::Float { filterable: true },
                };
                textures.insert(
                    name.clone(),
                    TextureBinding {
                        index: binding.binding,
                        sampler_index: None,
                        group: binding.group,
                        ty,
                        depth,
                        stages,
                    },
                );
                bindings.push(ReflectedBinding {
                    group: binding.group,
                    binding: binding.binding,
                    slot: BindingSlot::Texture {
                        name: name.clone(),
                        dimension: view_dimension(*dim),
                        sample_type,
                        multisampled,
                    },
                });
            }
            (naga::AddressSpace::Handle, naga::TypeInner::Sampler { comparison }) => {
                samplers.push((binding.group, binding.binding, name.clone(), *comparison));
            }
            _ => {}
        }
    }

    for (group, binding, name, comparison) in samplers {
        let texture = name.strip_suffix("_sampler").unwrap_or(&name).to_string();
        let kind = match textures.get_mut(&texture) {
            Some(tex) => {
                tex.sampler_index = Some(binding);
                if comparison {
                    SamplerKind::Comparison
                } else {
                    let sample_type = bindings.iter().find_map(|b| match &b.slot {
                        BindingSlot::Texture { name, sample_type, .. } if *name == texture => Some(*sample_type),
                        _ => None,
                    });
                    match sample_type {
                        Some(wgpu::TextureSampleType::Float { filterable: true }) => SamplerKind::Filtering,
                        _ => SamplerKind::NonFiltering,
                    }
                }
            }
            None => {
                log::warn!("Sampler '{name}' has no texture named '{texture}'");
                if comparison { SamplerKind::Comparison } else { SamplerKind::Filtering }
            }
        };
        bindings.push(ReflectedBinding {
            group,
            binding,
            slot: BindingSlot::Sampler { texture, kind },
        });
    }
    bindings.sort_by_key(|b| (b.group, b.binding));

    let fragment = module
        .entry_points
        .iter()
        .find(|e| e.stage == naga::ShaderStage::Fragment && e.name == FRAGMENT_ENTRY);
    let fragment_outputs = fragment
        .and_then(|entry| entry.function.result.as_ref())
        .map(|result| output_locations(module, result))
        .unwrap_or_default();

    Ok(Reflection {
        uniforms,
        textures,
        bindings,
        has_fragment: fragment.is_some(),
        fragment_outputs,
    })
}

fn output_locations(module: &naga::Module, result: &naga::FunctionResult) -> Vec<u32> {
    if let Some(naga::Binding::Location { location, .. }) = result.binding {
        return vec![location];
    }
    match &module.types[result.ty].inner {
        naga::TypeInner::Struct { members, .. } => members
            .iter()
            .filter_map(|m| match m.binding {
                Some(naga::Binding::Location { location, .. }) => Some(location),
                _ => None,
            })
            .collect(),
        _ => Vec::new(),
    }
}

fn layout_entry(binding: &ReflectedBinding) -> wgpu::BindGroupLayoutEntry {
    let ty = match &binding.slot {
        BindingSlot::Uniform { size, .. } => wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Uniform,
            has_dynamic_offset: false,
            min_binding_size: NonZeroU64::new(u64::from(*size)),
        },
        BindingSlot::Texture {
            dimension,
            sample_type,
            multisampled,
            ..
        } => wgpu::BindingType::Texture {
            sample_type: *sample_type,
            view_dimension: *dimension,
            multisampled: *multisampled,
        },
        BindingSlot::Sampler { kind, .. } => wgpu::BindingType::Sampler(kind.binding_type()),
    };
    wgpu::BindGroupLayoutEntry {
        binding: binding.binding,
        visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
        ty,
        count: None,
    }
}

impl MetalShader {
    pub(crate) fn new(device: &MetalDevice, source: &ShaderSource) -> Self {
        let mut shader = Self {
            id: NEXT_SHADER_ID.fetch_add(1, Ordering::Relaxed),
            name: source.name.clone(),
            compiled: None,
            interface: RefCell::new(ShaderInterface::new(UniformLibrary::new(UniformPacking::Aligned))),
            bound: RefCell::new(FxHashMap::default()),
        };
        match shader.compile(device, source) {
            Ok((compiled, interface)) => {
                shader.compiled = Some(compiled);
                *shader.interface.get_mut() = interface;
                log::debug!("Shader '{}' compiled", shader.name);
            }
            Err(err) => log::error!("{err}"),
        }
        shader
    }

    fn compile(&self, device: &MetalDevice, source: &ShaderSource) -> Result<(Compiled, ShaderInterface)> {
        let text = &source.text;
        let error = |stage: &str, log: String| LumenError::ShaderCompilation {
            shader: self.name.clone(),
            stage: stage.into(),
            log,
        };
        let module = naga::front::wgsl::parse_str(text).map_err(|e| error("parse", e.emit_to_string(text)))?;
        let info = naga::valid::Validator::new(naga::valid::ValidationFlags::all(), naga::valid::Capabilities::all())
            .validate(&module)
            .map_err(|e| error("validation", e.emit_to_string(text)))?;
        if !module
            .entry_points
            .iter()
            .any(|e| e.stage == naga::ShaderStage::Vertex && e.name == VERTEX_ENTRY)
        {
            return Err(error("vertex", format!("missing entry point '{VERTEX_ENTRY}'")));
        }

        let reflection = reflect(&module, &info)?;
        let group_count = reflection.bindings.iter().map(|b| b.group + 1).max().unwrap_or(0);
        let group_layouts: Vec<wgpu::BindGroupLayout> = (0..group_count)
            .map(|group| {
                let entries: Vec<_> = reflection
                    .bindings
                    .iter()
                    .filter(|b| b.group == group)
                    .map(layout_entry)
                    .collect();
                device.device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                    label: Some(&format!("{} group {group}", self.name)),
                    entries: &entries,
                })
            })
            .collect();
        let layout_refs: Vec<Option<&wgpu::BindGroupLayout>> = group_layouts.iter().map(Some).collect();
        let pipeline_layout = device.device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some(&self.name),
            bind_group_layouts: &layout_refs,
            immediate_size: 0,
        });
        let module = device.device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some(&self.name),
            source: wgpu::ShaderSource::Wgsl(std::borrow::Cow::Borrowed(text)),
        });

        let mut interface = ShaderInterface::new(reflection.uniforms);
        interface.textures = reflection.textures;
        Ok((
            Compiled {
                module,
                group_layouts,
                pipeline_layout,
                bindings: reflection.bindings,
                has_fragment: reflection.has_fragment,
                fragment_outputs: reflection.fragment_outputs,
            },
            interface,
        ))
    }

    /// Unique per compiled object; two shaders with one name never share
    /// pipelines.
    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }

    #[must_use]
    pub fn module(&self) -> Option<&wgpu::ShaderModule> {
        self.compiled.as_ref().map(|c| &c.module)
    }

    #[must_use]
    pub fn pipeline_layout(&self) -> Option<&wgpu::PipelineLayout> {
        self.compiled.as_ref().map(|c| &c.pipeline_layout)
    }

    #[must_use]
    pub fn group_layouts(&self) -> &[wgpu::BindGroupLayout] {
        self.compiled.as_ref().map_or(&[], |c| &c.group_layouts)
    }

    #[must_use]
    pub fn bindings(&self) -> &[ReflectedBinding] {
        self.compiled.as_ref().map_or(&[], |c| &c.bindings)
    }

    #[must_use]
    pub fn has_fragment(&self) -> bool {
        self.compiled.as_ref().is_some_and(|c| c.has_fragment)
    }

    #[must_use]
    pub fn writes_location(&self, location: u32) -> bool {
        self.compiled
            .as_ref()
            .is_some_and(|c| c.fragment_outputs.contains(&location))
    }

    /// The texture last set for sampler `name`.
    #[must_use]
    pub fn bound_texture(&self, name: &str) -> Option<Rc<dyn Texture>> {
        self.bound.borrow().get(name).cloned()
    }

    /// Current CPU bytes of uniform group `name`.
    #[must_use]
    pub fn group_data(&self, name: &str) -> Option<Vec<u8>> {
        self.interface
            .borrow()
            .uniforms
            .group(name)
            .map(|g| g.data().to_vec())
    }
}

impl Shader for MetalShader {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_loaded(&self) -> bool {
        self.compiled.is_some()
    }

    fn bind(&self) {}

    fn unbind(&self) {}

    fn interface(&self) -> Ref<'_, ShaderInterface> {
        self.interface.borrow()
    }

    fn set_uniform(&self, name: &str, value: UniformValue) -> bool {
        if self.compiled.is_none() {
            return false;
        }
        self.interface.borrow_mut().uniforms.set(name, value).is_some()
    }

    fn set_texture(&self, name: &str, texture: &Rc<dyn Texture>, _slot: u32) -> bool {
        if self.compiled.is_none() {
            return false;
        }
        if self.interface.borrow_mut().texture(&self.name, name).is_none() {
            return false;
        }
        self.bound.borrow_mut().insert(name.to_string(), Rc::clone(texture));
        true
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
