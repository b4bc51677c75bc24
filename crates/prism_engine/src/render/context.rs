//! Render context
//!
//! Owns what components need from the GPU side: the backend (absent until the
//! device is up), the shader compiler, materials and meshes.

use ash::vk;

use crate::foundation::collections::{MaterialId, MeshId, SlotMap};
use crate::render::api::GpuBackend;
use crate::render::material::{BufferRange, Material, MaterialError, MaterialResult, TextureBinding};
use crate::render::mesh::Mesh;
use crate::render::shader::ShaderCompiler;

/// Borrowed device access for material initialization
pub struct GpuContext<'a> {
    /// Device backend
    pub backend: &'a mut dyn GpuBackend,
    /// Shader compiler
    pub compiler: &'a dyn ShaderCompiler,
    /// Render pass graphics pipelines are created against
    pub render_pass: vk::RenderPass,
}

impl<'a> GpuContext<'a> {
    /// Bundle a backend, compiler and target render pass
    pub fn new(backend: &'a mut dyn GpuBackend, compiler: &'a dyn ShaderCompiler, render_pass: vk::RenderPass) -> Self {
        Self { backend, compiler, render_pass }
    }
}

pub(crate) fn backend_of(backend: &mut Option<Box<dyn GpuBackend>>) -> Option<&mut dyn GpuBackend> {
    match backend {
        Some(backend) => Some(&mut **backend),
        None => None,
    }
}

/// GPU-side state shared by every component of a hierarchy
pub struct RenderContext {
    backend: Option<Box<dyn GpuBackend>>,
    compiler: Box<dyn ShaderCompiler>,
    render_pass: vk::RenderPass,
    materials: SlotMap<MaterialId, Material>,
    meshes: SlotMap<MeshId, Mesh>,
}

impl RenderContext {
    /// Context without a device; components initialize once one is attached
    pub fn new(compiler: Box<dyn ShaderCompiler>) -> Self {
        Self {
            backend: None,
            compiler,
            render_pass: vk::RenderPass::null(),
            materials: SlotMap::with_key(),
            meshes: SlotMap::with_key(),
        }
    }

    /// Context with a device already attached
    pub fn with_backend(compiler: Box<dyn ShaderCompiler>, backend: Box<dyn GpuBackend>, render_pass: vk::RenderPass) -> Self {
        let mut context = Self::new(compiler);
        context.backend = Some(backend);
        context.render_pass = render_pass;
        context
    }

    /// True once a backend is attached
    pub fn is_ready(&self) -> bool {
        self.backend.is_some()
    }

    /// Attach the device backend
    pub fn attach_backend(&mut self, backend: Box<dyn GpuBackend>, render_pass: vk::RenderPass) {
        if self.backend.is_some() {
            log::warn!("[RENDER] Replacing an attached backend");
        }
        self.backend = Some(backend);
        self.render_pass = render_pass;
    }

    /// Render pass graphics pipelines target
    pub fn render_pass(&self) -> vk::RenderPass {
        self.render_pass
    }

    /// Attached backend
    pub fn backend_mut(&mut self) -> Option<&mut dyn GpuBackend> {
        backend_of(&mut self.backend)
    }

    /// Device access for initialization, `None` before a backend is attached
    pub fn gpu(&mut self) -> Option<GpuContext<'_>> {
        let backend = self.backend.as_mut()?;
        Some(GpuContext::new(&mut **backend, self.compiler.as_ref(), self.render_pass))
    }

    pub(crate) fn parts(
        &mut self,
    ) -> (Option<&mut dyn GpuBackend>, &dyn ShaderCompiler, vk::RenderPass, &mut SlotMap<MaterialId, Material>, &SlotMap<MeshId, Mesh>) {
        (backend_of(&mut self.backend), self.compiler.as_ref(), self.render_pass, &mut self.materials, &self.meshes)
    }

    // Materials

    /// Register a material
    pub fn add_material(&mut self, material: Material) -> MaterialId {
        self.materials.insert(material)
    }

    /// Material by id
    pub fn material(&self, id: MaterialId) -> Option<&Material> {
        self.materials.get(id)
    }

    /// Mutable material by id
    pub fn material_mut(&mut self, id: MaterialId) -> Option<&mut Material> {
        self.materials.get_mut(id)
    }

    /// Remove a material, releasing its GPU objects
    pub fn remove_material(&mut self, id: MaterialId) -> Option<Material> {
        let mut material = self.materials.remove(id)?;
        if let Some(backend) = backend_of(&mut self.backend) {
            material.destroy(backend);
        }
        Some(material)
    }

    /// Bring a material to ready; returns false while no backend is attached
    pub fn initialize_material(&mut self, id: MaterialId) -> MaterialResult<bool> {
        let material = self.materials.get_mut(id).ok_or(MaterialError::UnknownMaterial)?;
        let Some(backend) = self.backend.as_mut() else {
            return Ok(false);
        };
        let mut gpu = GpuContext::new(&mut **backend, self.compiler.as_ref(), self.render_pass);
        material.initialize(&mut gpu)?;
        Ok(true)
    }

    /// Bind a buffer range to a material property
    pub fn set_buffer(
        &mut self,
        id: MaterialId,
        name: &str,
        buffer: BufferRange,
        hint: vk::DescriptorType,
        silent: bool,
    ) -> MaterialResult<()> {
        let material = self.materials.get_mut(id).ok_or(MaterialError::UnknownMaterial)?;
        material.set_buffer(backend_of(&mut self.backend), name, buffer, hint, silent)
    }

    /// Bind a texture to a material property
    pub fn set_texture(
        &mut self,
        id: MaterialId,
        name: &str,
        texture: TextureBinding,
        hint: vk::DescriptorType,
        silent: bool,
    ) -> MaterialResult<()> {
        let material = self.materials.get_mut(id).ok_or(MaterialError::UnknownMaterial)?;
        material.set_texture(backend_of(&mut self.backend), name, texture, hint, silent)
    }

    /// Bind a sampler to a material property
    pub fn set_sampler(&mut self, id: MaterialId, name: &str, sampler: vk::Sampler, silent: bool) -> MaterialResult<()> {
        let material = self.materials.get_mut(id).ok_or(MaterialError::UnknownMaterial)?;
        material.set_sampler(backend_of(&mut self.backend), name, sampler, silent)
    }

    /// Bind a texel buffer view to a material property
    pub fn set_texel_buffer(
        &mut self,
        id: MaterialId,
        name: &str,
        view: vk::BufferView,
        hint: vk::DescriptorType,
        silent: bool,
    ) -> MaterialResult<()> {
        let material = self.materials.get_mut(id).ok_or(MaterialError::UnknownMaterial)?;
        material.set_texel_buffer(backend_of(&mut self.backend), name, view, hint, silent)
    }

    /// Reload every material whose shader files changed on disk
    ///
    /// Failures are logged and leave the previous pipeline in place. Returns
    /// the number of materials rebuilt.
    pub fn reload_changed_materials(&mut self) -> usize {
        let Some(backend) = self.backend.as_mut() else {
            return 0;
        };
        let mut gpu = GpuContext::new(&mut **backend, self.compiler.as_ref(), self.render_pass);

        let mut reloaded = 0;
        for material in self.materials.values_mut() {
            match material.reload_if_changed(&mut gpu) {
                Ok(true) => reloaded += 1,
                Ok(false) => {}
                Err(err) => log::error!("[RENDER] Hot reload of '{}' failed: {err}", material.name()),
            }
        }
        reloaded
    }

    // Meshes

    /// Register a mesh
    pub fn add_mesh(&mut self, mesh: Mesh) -> MeshId {
        self.meshes.insert(mesh)
    }

    /// Mesh by id
    pub fn mesh(&self, id: MeshId) -> Option<&Mesh> {
        self.meshes.get(id)
    }

    /// Remove a mesh
    pub fn remove_mesh(&mut self, id: MeshId) -> Option<Mesh> {
        self.meshes.remove(id)
    }

    /// Destroy every material's GPU objects
    pub fn release_materials(&mut self) {
        if let Some(backend) = backend_of(&mut self.backend) {
            for material in self.materials.values_mut() {
                material.destroy(backend);
            }
        }
    }
}

impl Drop for RenderContext {
    fn drop(&mut self) {
        self.release_materials();
    }
}

impl std::fmt::Debug for RenderContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RenderContext")
            .field("ready", &self.is_ready())
            .field("render_pass", &self.render_pass)
            .field("materials", &self.materials.len())
            .field("meshes", &self.meshes.len())
            .finish()
    }
}
