use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use tracing::{debug, info};
use wgpu::util::DeviceExt;
use wgpu::{BindGroupLayout, ComputePipeline, Device};

use super::error::{GpuError, Result};
use super::gpu_module::{checked, GpuModule};
use super::work_size::WorkSize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SumVariant {
    GlobalAtomic,
    LoopAtomic,
    LoopCoalesced,
    LocalTree,
}

impl SumVariant {
    pub const ALL: [SumVariant; 4] = [
        SumVariant::GlobalAtomic,
        SumVariant::LoopAtomic,
        SumVariant::LoopCoalesced,
        SumVariant::LocalTree,
    ];

    /// Values each invocation folds before touching the atomic.
    pub fn values_per_workitem(&self, configured: u32) -> u32 {
        match self {
            SumVariant::LoopAtomic | SumVariant::LoopCoalesced => configured,
            SumVariant::GlobalAtomic | SumVariant::LocalTree => 1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TransposeVariant {
    Naive,
    Tiled,
    TiledPadded,
}

impl TransposeVariant {
    pub const ALL: [TransposeVariant; 3] = [
        TransposeVariant::Naive,
        TransposeVariant::Tiled,
        TransposeVariant::TiledPadded,
    ];
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum KernelKind {
    Sum(SumVariant),
    MatrixTranspose(TransposeVariant),
    MaxPrefixSum,
}

impl KernelKind {
    pub fn entry_point(&self) -> &'static str {
        match self {
            KernelKind::Sum(SumVariant::GlobalAtomic) => "sum_global_atomic",
            KernelKind::Sum(SumVariant::LoopAtomic) => "sum_loop_atomic",
            KernelKind::Sum(SumVariant::LoopCoalesced) => "sum_loop_coalesced",
            KernelKind::Sum(SumVariant::LocalTree) => "sum_local_tree",
            KernelKind::MatrixTranspose(TransposeVariant::Naive) => "matrix_transpose_naive",
            KernelKind::MatrixTranspose(TransposeVariant::Tiled) => "matrix_transpose_tiled",
            KernelKind::MatrixTranspose(TransposeVariant::TiledPadded) => {
                "matrix_transpose_tiled_padded"
            }
            KernelKind::MaxPrefixSum => "max_prefix_sum",
        }
    }

    fn template(&self) -> Template {
        match self {
            KernelKind::Sum(_) => Template::Sum,
            KernelKind::MatrixTranspose(_) => Template::MatrixTranspose,
            KernelKind::MaxPrefixSum => Template::MaxPrefixSum,
        }
    }

    /// Storage bindings in binding order, `true` for read-only. The scalar
    /// uniform always follows them.
    fn storage_bindings(&self) -> &'static [bool] {
        match self {
            KernelKind::Sum(_) => &[false, true],
            KernelKind::MatrixTranspose(_) => &[true, false],
            KernelKind::MaxPrefixSum => &[false, false, false, true, true, true],
        }
    }
}

impl fmt::Display for KernelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.entry_point())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Template {
    Sum,
    MatrixTranspose,
    MaxPrefixSum,
}

/// `NAME=value` substitutions applied to `{{NAME}}` placeholders, the
/// counterpart of `-D NAME=value` compiler flags.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Defines {
    values: BTreeMap<String, String>,
}

impl Defines {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set<K, V>(mut self, key: K, value: V) -> Self
    where
        K: Into<String>,
        V: fmt::Display,
    {
        self.values.insert(key.into(), value.to_string());
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }
}

pub struct ShaderTemplate {
    pub template: &'static str,
    pub variables: HashMap<String, String>,
}

impl ShaderTemplate {
    pub fn new(template: &'static str) -> Self {
        Self {
            template,
            variables: HashMap::new(),
        }
    }

    pub fn set_variable<K, V>(&mut self, key: K, value: V) -> &mut Self
    where
        K: Into<String>,
        V: fmt::Display,
    {
        self.variables.insert(key.into(), value.to_string());
        self
    }

    pub fn apply(&mut self, defines: &Defines) -> &mut Self {
        for (key, value) in &defines.values {
            self.set_variable(key.clone(), value);
        }
        self
    }

    pub fn render(&self) -> String {
        let mut result = self.template.to_string();

        for (key, value) in &self.variables {
            let placeholder = format!("{{{{{}}}}}", key);
            result = result.replace(&placeholder, value);
        }

        result
    }

    /// First `{{NAME}}` placeholder still present in `source`.
    pub fn unresolved(source: &str) -> Option<String> {
        let start = source.find("{{")? + 2;
        let end = source[start..].find("}}")? + start;

        Some(source[start..end].to_string())
    }
}

pub struct Kernel {
    pub kind: KernelKind,
    pipeline: ComputePipeline,
    bind_group_layout: BindGroupLayout,
    storage_bindings: &'static [bool],
}

impl Kernel {
    /// Binds `buffers` in binding order, packs up to four `params` into the
    /// trailing uniform and submits one compute pass.
    #[track_caller]
    pub fn exec(
        &self,
        gpu: &GpuModule,
        work_size: WorkSize,
        buffers: &[&wgpu::Buffer],
        params: &[u32],
    ) -> Result<()> {
        if buffers.len() != self.storage_bindings.len() {
            return Err(GpuError::LengthMismatch {
                expected: self.storage_bindings.len(),
                actual: buffers.len(),
            });
        }
        if params.len() > 4 {
            return Err(GpuError::LengthMismatch {
                expected: 4,
                actual: params.len(),
            });
        }

        let mut packed = [0u32; 4];
        packed[..params.len()].copy_from_slice(params);

        let [x, y, z] = work_size.dispatch(gpu.max_workgroups_per_dimension())?;

        debug!(
            kernel = %self.kind,
            workgroups = ?[x, y, z],
            params = ?params,
            "Launching kernel"
        );

        return gpu.checked("kernel_exec", || {
            let params_buffer = gpu
                .device
                .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                    label: Some("Kernel Params"),
                    contents: bytemuck::cast_slice(&packed),
                    usage: wgpu::BufferUsages::UNIFORM,
                });

            let mut entries: Vec<wgpu::BindGroupEntry> = buffers
                .iter()
                .enumerate()
                .map(|(binding, buffer)| wgpu::BindGroupEntry {
                    binding: binding as u32,
                    resource: buffer.as_entire_binding(),
                })
                .collect();

            entries.push(wgpu::BindGroupEntry {
                binding: buffers.len() as u32,
                resource: params_buffer.as_entire_binding(),
            });

            let bind_group = gpu.device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some(self.kind.entry_point()),
                layout: &self.bind_group_layout,
                entries: &entries,
            });

            let mut encoder = gpu
                .device
                .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                    label: Some("Kernel Encoder"),
                });

            {
                let mut compute_pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                    label: Some(self.kind.entry_point()),
                    timestamp_writes: None,
                });

                compute_pass.set_pipeline(&self.pipeline);
                compute_pass.set_bind_group(0, &bind_group, &[]);
                compute_pass.dispatch_workgroups(x, y, z);
            }

            gpu.queue.submit(std::iter::once(encoder.finish()));
        });
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct KernelKey {
    kind: KernelKind,
    defines: Defines,
}

#[derive(Debug, Default)]
pub struct ShaderCompilationStats {
    pub total_compilations: AtomicU64,
    pub cache_hits: AtomicU64,
}

pub struct ShaderManager {
    template_cache: HashMap<Template, &'static str>,
    kernel_cache: DashMap<KernelKey, Arc<Kernel>>,
    pub stats: ShaderCompilationStats,
}

impl Default for ShaderManager {
    fn default() -> Self {
        Self::new()
    }
}

impl ShaderManager {
    pub fn new() -> Self {
        let mut template_cache = HashMap::new();

        template_cache.insert(Template::Sum, include_str!("shaders/sum.wgsl"));
        template_cache.insert(
            Template::MatrixTranspose,
            include_str!("shaders/matrix_transpose.wgsl"),
        );
        template_cache.insert(
            Template::MaxPrefixSum,
            include_str!("shaders/max_prefix_sum.wgsl"),
        );

        Self {
            template_cache,
            kernel_cache: DashMap::new(),
            stats: ShaderCompilationStats::default(),
        }
    }

    pub fn generate_shader_source(&self, kind: KernelKind, defines: &Defines) -> Result<String> {
        let template_source = self.template_cache[&kind.template()];

        let source = ShaderTemplate::new(template_source).apply(defines).render();

        if let Some(placeholder) = ShaderTemplate::unresolved(&source) {
            return Err(GpuError::MissingDefine {
                kernel: kind.to_string(),
                placeholder,
            });
        }

        Ok(source)
    }

    /// Compiles `kind` with `defines`, or returns the cached kernel.
    #[track_caller]
    pub fn compile(&self, device: &Device, kind: KernelKind, defines: &Defines) -> Result<Arc<Kernel>> {
        let key = KernelKey {
            kind,
            defines: defines.clone(),
        };

        if let Some(kernel) = self.kernel_cache.get(&key) {
            self.stats.cache_hits.fetch_add(1, Ordering::Relaxed);
            return Ok(Arc::clone(kernel.value()));
        }

        let source = self.generate_shader_source(kind, defines)?;
        let storage_bindings = kind.storage_bindings();

        let (pipeline, bind_group_layout) = checked(device, "compile_kernel", || {
            let shader_module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some(kind.entry_point()),
                source: wgpu::ShaderSource::Wgsl(source.into()),
            });

            let mut entries: Vec<wgpu::BindGroupLayoutEntry> = storage_bindings
                .iter()
                .enumerate()
                .map(|(binding, &read_only)| wgpu::BindGroupLayoutEntry {
                    binding: binding as u32,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Storage { read_only },
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                })
                .collect();

            entries.push(wgpu::BindGroupLayoutEntry {
                binding: storage_bindings.len() as u32,
                visibility: wgpu::ShaderStages::COMPUTE,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            });

            let bind_group_layout =
                device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                    label: Some(kind.entry_point()),
                    entries: &entries,
                });

            let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some(kind.entry_point()),
                bind_group_layouts: &[&bind_group_layout],
                push_constant_ranges: &[],
            });

            let pipeline = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
                label: Some(kind.entry_point()),
                layout: Some(&pipeline_layout),
                module: &shader_module,
                entry_point: Some(kind.entry_point()),
                compilation_options: wgpu::PipelineCompilationOptions::default(),
                cache: None,
            });

            (pipeline, bind_group_layout)
        })?;

        self.stats.total_compilations.fetch_add(1, Ordering::Relaxed);

        info!(kernel = %kind, defines = ?defines, "Compiled kernel");

        let kernel = Arc::new(Kernel {
            kind,
            pipeline,
            bind_group_layout,
            storage_bindings,
        });

        self.kernel_cache.insert(key, kernel.clone());

        return Ok(kernel);
    }
}

impl GpuModule {
    #[track_caller]
    pub fn kernel(&self, kind: KernelKind, defines: &Defines) -> Result<Arc<Kernel>> {
        return self.shader_manager.compile(&self.device, kind, defines);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_replaces_every_placeholder() {
        let mut template = ShaderTemplate::new("const A: u32 = {{A}}u; const B: u32 = {{B}}u; // {{A}}");
        template.set_variable("A", 16).set_variable("B", 64);

        assert_eq!(template.render(), "const A: u32 = 16u; const B: u32 = 64u; // 16");
    }

    #[test]
    fn unresolved_finds_first_placeholder() {
        assert_eq!(
            ShaderTemplate::unresolved("x = {{TILE_SIZE}}; y = {{OTHER}};"),
            Some("TILE_SIZE".to_string())
        );
        assert_eq!(ShaderTemplate::unresolved("x = 16;"), None);
    }

    #[test]
    fn missing_define_is_reported() {
        let manager = ShaderManager::new();
        let err = manager
            .generate_shader_source(
                KernelKind::MatrixTranspose(TransposeVariant::Tiled),
                &Defines::new(),
            )
            .unwrap_err();

        match err {
            GpuError::MissingDefine { kernel, placeholder } => {
                assert_eq!(kernel, "matrix_transpose_tiled");
                assert_eq!(placeholder, "TILE_SIZE");
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn every_template_renders_with_its_defines() {
        let manager = ShaderManager::new();

        let sum = manager
            .generate_shader_source(
                KernelKind::Sum(SumVariant::LocalTree),
                &Defines::new()
                    .set("WORKGROUP_SIZE", 128)
                    .set("VALUES_PER_WORKITEM", 64),
            )
            .unwrap();
        assert!(sum.contains("const WORKGROUP_SIZE: u32 = 128u;"));
        assert!(sum.contains("fn sum_local_tree"));

        let transpose = manager
            .generate_shader_source(
                KernelKind::MatrixTranspose(TransposeVariant::Naive),
                &Defines::new().set("TILE_SIZE", 16),
            )
            .unwrap();
        assert!(transpose.contains("const TILE_SIZE: u32 = 16u;"));

        let prefix = manager
            .generate_shader_source(
                KernelKind::MaxPrefixSum,
                &Defines::new().set("WORKGROUP_SIZE", 64),
            )
            .unwrap();
        assert!(prefix.contains("fn max_prefix_sum"));
        assert!(ShaderTemplate::unresolved(&prefix).is_none());
    }

    #[test]
    fn defines_compare_by_content() {
        let a = Defines::new().set("TILE_SIZE", 16).set("WORKGROUP_SIZE", 256);
        let b = Defines::new().set("WORKGROUP_SIZE", 256).set("TILE_SIZE", 16);

        assert_eq!(a, b);
        assert_eq!(a.get("TILE_SIZE"), Some("16"));
    }

    #[test]
    fn bindings_match_kernel_signatures() {
        assert_eq!(KernelKind::MaxPrefixSum.storage_bindings().len(), 6);
        assert_eq!(KernelKind::Sum(SumVariant::GlobalAtomic).storage_bindings(), &[false, true]);
        assert_eq!(
            KernelKind::MatrixTranspose(TransposeVariant::TiledPadded).entry_point(),
            "matrix_transpose_tiled_padded"
        );
    }
}
