//! Shader programs
//!
//! A program groups the stages of one pipeline: vertex + fragment (and an
//! optional geometry stage) for graphics, or a single compute stage.

use std::path::{Path, PathBuf};

use super::binding_table::ShaderBindingTable;
use super::compiler::ShaderCompiler;
use super::reflection::StageReflection;
use super::source::{ShaderError, ShaderResult, ShaderSource};
use super::stage::ShaderStage;
use crate::core::ShaderConfig;
use crate::render::api::{GpuBackend, ShaderStageDesc};

/// Compiled stages of one pipeline plus their merged binding table
#[derive(Debug)]
pub struct ShaderProgram {
    sources: Vec<ShaderSource>,
    table: ShaderBindingTable,
    work_group_size: Option<[u32; 3]>,
}

impl ShaderProgram {
    /// Program from already created sources
    pub fn from_sources(sources: Vec<ShaderSource>) -> Self {
        Self { sources, table: ShaderBindingTable::new(), work_group_size: None }
    }

    /// Vertex + fragment program
    pub fn graphics(vertex: impl AsRef<Path>, fragment: impl AsRef<Path>, config: &ShaderConfig) -> ShaderResult<Self> {
        Ok(Self::from_sources(vec![
            ShaderSource::from_file(vertex, ShaderStage::Vertex, config)?,
            ShaderSource::from_file(fragment, ShaderStage::Fragment, config)?,
        ]))
    }

    /// Vertex + geometry + fragment program
    pub fn graphics_with_geometry(
        vertex: impl AsRef<Path>,
        geometry: impl AsRef<Path>,
        fragment: impl AsRef<Path>,
        config: &ShaderConfig,
    ) -> ShaderResult<Self> {
        Ok(Self::from_sources(vec![
            ShaderSource::from_file(vertex, ShaderStage::Vertex, config)?,
            ShaderSource::from_file(geometry, ShaderStage::Geometry, config)?,
            ShaderSource::from_file(fragment, ShaderStage::Fragment, config)?,
        ]))
    }

    /// Single compute stage program
    pub fn compute(file: impl AsRef<Path>, config: &ShaderConfig) -> ShaderResult<Self> {
        Ok(Self::from_sources(vec![ShaderSource::from_file(file, ShaderStage::Compute, config)?]))
    }

    /// True when the program contains a compute stage
    pub fn is_compute(&self) -> bool {
        self.sources.iter().any(|source| source.stage() == ShaderStage::Compute)
    }

    /// True once every stage has a module
    pub fn is_compiled(&self) -> bool {
        !self.sources.is_empty() && self.sources.iter().all(ShaderSource::is_compiled)
    }

    /// Compile, reflect and install every stage
    ///
    /// Every stage is compiled, reflected and given a new module before any
    /// module is replaced, so a failure leaves the previous modules and
    /// binding table in place.
    /// The binding table is rebuilt from scratch on success.
    pub fn compile(&mut self, compiler: &dyn ShaderCompiler, backend: &mut dyn GpuBackend) -> ShaderResult<()> {
        let binaries = self
            .sources
            .iter()
            .map(|source| source.compile_binary(compiler))
            .collect::<ShaderResult<Vec<_>>>()?;

        let mut reflections: Vec<StageReflection> = Vec::with_capacity(binaries.len());
        for (source, binary) in self.sources.iter().zip(&binaries) {
            let reflection = super::reflection::reflect(binary, source.stage())
                .map_err(|err| ShaderError::Reflection { path: source.path().to_path_buf(), source: err })?;
            reflections.push(reflection);
        }

        let table = ShaderBindingTable::from_stages(&reflections).map_err(|err| {
            log::error!("[SHADER] Cannot merge stages of {}: {err}", self.describe());
            ShaderError::Reflection { path: self.primary_path(), source: err }
        })?;

        let mut modules = Vec::with_capacity(binaries.len());
        for (source, binary) in self.sources.iter().zip(&binaries) {
            match source.create_module(binary, backend) {
                Ok(module) => modules.push(module),
                Err(err) => {
                    for module in modules {
                        backend.destroy_shader_module(module);
                    }
                    return Err(err);
                }
            }
        }
        for ((source, binary), module) in self.sources.iter_mut().zip(binaries).zip(modules) {
            source.replace_module(module, binary, backend);
        }

        self.work_group_size = reflections.iter().find_map(|reflection| reflection.work_group_size);
        self.table = table;
        log::info!(
            "[SHADER] Program {} ready: {} bindings, {} push constants",
            self.describe(),
            self.table.bindings().count(),
            self.table.push_constants().count()
        );
        Ok(())
    }

    /// Merged binding table, empty before the first compile
    pub fn binding_table(&self) -> &ShaderBindingTable {
        &self.table
    }

    /// Local work-group size of the compute stage
    pub fn work_group_size(&self) -> Option<[u32; 3]> {
        self.work_group_size
    }

    /// Stage descriptions for pipeline creation, in declaration order
    pub fn stage_descs(&self) -> ShaderResult<Vec<ShaderStageDesc>> {
        self.sources.iter().map(ShaderSource::stage_desc).collect()
    }

    /// Stages of the program
    pub fn sources(&self) -> &[ShaderSource] {
        &self.sources
    }

    /// True when any stage changed on disk since it was compiled
    pub fn needs_reload(&self) -> bool {
        self.sources.iter().any(ShaderSource::needs_reload)
    }

    /// Release every shader module
    pub fn destroy(&mut self, backend: &mut dyn GpuBackend) {
        for source in &mut self.sources {
            source.destroy(backend);
        }
    }

    fn primary_path(&self) -> PathBuf {
        self.sources.first().map(|source| source.path().to_path_buf()).unwrap_or_default()
    }

    fn describe(&self) -> String {
        self.sources
            .iter()
            .map(|source| source.path().display().to_string())
            .collect::<Vec<_>>()
            .join(" + ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{Call, RecordingBackend, SpirvBuilder, StaticCompiler};

    fn lit_program() -> (ShaderProgram, StaticCompiler) {
        let mut vertex = SpirvBuilder::new(ShaderStage::Vertex);
        vertex.uniform_block("Camera", "camera", 0, 0, &[("view_projection", 64)]);
        vertex.push_block("Push", &[("model", 64)]);
        let mut fragment = SpirvBuilder::new(ShaderStage::Fragment);
        fragment.uniform_block("Camera", "camera", 0, 0, &[("view_projection", 64)]);
        fragment.combined_image("Albedo", 1, 0);

        let compiler = StaticCompiler::new().with("lit.vert", vertex.build()).with("lit.frag", fragment.build());
        let program = ShaderProgram::from_sources(vec![
            ShaderSource::new("lit.vert", ShaderStage::Vertex, "main"),
            ShaderSource::new("lit.frag", ShaderStage::Fragment, "main"),
        ]);
        (program, compiler)
    }

    #[test]
    fn compile_builds_merged_table() {
        let (mut program, compiler) = lit_program();
        let mut backend = RecordingBackend::new();
        program.compile(&compiler, &mut backend).unwrap();

        assert!(program.is_compiled());
        assert!(!program.is_compute());
        let table = program.binding_table();
        assert!(table.binding("Camera").is_some());
        assert!(table.binding("Albedo").is_some());
        assert_eq!(table.push_constant("model").unwrap().size, 64);
        assert_eq!(program.stage_descs().unwrap().len(), 2);
    }

    #[test]
    fn compute_program_reports_work_group() {
        let mut comp = SpirvBuilder::new(ShaderStage::Compute);
        comp.local_size([64, 1, 1]);
        let compiler = StaticCompiler::new().with("noise.comp", comp.build());
        let mut program = ShaderProgram::from_sources(vec![ShaderSource::new("noise.comp", ShaderStage::Compute, "main")]);

        program.compile(&compiler, &mut RecordingBackend::new()).unwrap();
        assert!(program.is_compute());
        assert_eq!(program.work_group_size(), Some([64, 1, 1]));
    }

    #[test]
    fn conflicting_stages_leave_program_untouched() {
        let (mut program, compiler) = lit_program();
        let mut backend = RecordingBackend::new();
        program.compile(&compiler, &mut backend).unwrap();
        let before = program.binding_table().clone();

        let mut moved = SpirvBuilder::new(ShaderStage::Fragment);
        moved.uniform_block("Camera", "camera", 0, 3, &[("view_projection", 64)]);
        let mut vertex = SpirvBuilder::new(ShaderStage::Vertex);
        vertex.uniform_block("Camera", "camera", 0, 0, &[("view_projection", 64)]);
        let broken = StaticCompiler::new().with("lit.vert", vertex.build()).with("lit.frag", moved.build());

        let err = program.compile(&broken, &mut backend).unwrap_err();
        assert!(matches!(err, ShaderError::Reflection { .. }));
        assert_eq!(program.binding_table(), &before);
    }

    #[test]
    fn module_failure_keeps_every_stage() {
        let (mut program, compiler) = lit_program();
        let backend = RecordingBackend::new();
        let mut gpu_backend = backend.clone();
        program.compile(&compiler, &mut gpu_backend).unwrap();
        let modules: Vec<_> = program.sources().iter().map(ShaderSource::module).collect();
        backend.clear();

        backend.fail_shader_modules_after(1);
        let err = program.compile(&compiler, &mut gpu_backend).unwrap_err();
        assert!(matches!(err, ShaderError::Module { .. }));

        let after: Vec<_> = program.sources().iter().map(ShaderSource::module).collect();
        assert_eq!(after, modules);
        let created = backend.calls().into_iter().find_map(|call| match call {
            Call::CreateShaderModule(module) => Some(module),
            _ => None,
        });
        assert_eq!(backend.calls(), vec![Call::CreateShaderModule(created.unwrap()), Call::DestroyShaderModule(created.unwrap())]);
        assert!(program.binding_table().binding("Albedo").is_some());
    }
}
