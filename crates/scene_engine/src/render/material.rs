//! Material / technique / pass data consumed by the render queue
//!
//! Materials are authored and compiled elsewhere (scripts, asset pipeline).
//! The scene core only needs their resolved shape: which passes to apply, in
//! which order, and whether blending forces depth sorting. The
//! [`MaterialSystem`] trait is the single lookup point.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::scene::{SceneError, SceneResult};

/// Opaque material identifier used as a queue grouping key
///
/// Cloning is a reference-count bump, so keys can be copied into every queue
/// entry without allocating.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MaterialKey(Arc<str>);

impl MaterialKey {
    /// Create a key from a material name
    pub fn new(name: impl AsRef<str>) -> Self {
        Self(Arc::from(name.as_ref()))
    }

    /// The material name
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MaterialKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for MaterialKey {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl From<String> for MaterialKey {
    fn from(name: String) -> Self {
        Self(Arc::from(name))
    }
}

/// Framebuffer blending applied by a pass
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SceneBlend {
    /// Source replaces destination (opaque)
    #[default]
    Replace,
    /// Source is added to destination
    Add,
    /// Source multiplies destination
    Modulate,
    /// Classic alpha blending
    AlphaBlend,
}

impl SceneBlend {
    /// Whether this blend mode reads the destination colour
    pub fn is_transparent(self) -> bool {
        !matches!(self, SceneBlend::Replace)
    }
}

/// One GPU state setup plus the draws that use it
#[derive(Debug, Clone, PartialEq)]
pub struct Pass {
    /// Pass name (for logging and debugging)
    pub name: String,
    /// Framebuffer blending
    pub scene_blend: SceneBlend,
    /// Whether the pass writes depth
    pub depth_write: bool,
    /// Whether the pass tests depth
    pub depth_check: bool,
    /// Whether dynamic lighting applies to this pass
    pub lighting: bool,
    /// Maximum number of lights handed to the backend for one draw
    pub max_lights: usize,
    /// Vertex program name, resolved by the backend
    pub vertex_program: Option<String>,
    /// Fragment program name, resolved by the backend
    pub fragment_program: Option<String>,
    /// Texture names bound by this pass, in unit order
    pub texture_units: Vec<String>,
}

impl Pass {
    /// Create an opaque, lit pass with default depth state
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            scene_blend: SceneBlend::Replace,
            depth_write: true,
            depth_check: true,
            lighting: true,
            max_lights: 8,
            vertex_program: None,
            fragment_program: None,
            texture_units: Vec::new(),
        }
    }

    /// Set the blend mode (builder pattern)
    pub fn with_blend(mut self, blend: SceneBlend) -> Self {
        self.scene_blend = blend;
        self
    }

    /// Set depth write (builder pattern)
    pub fn with_depth_write(mut self, enabled: bool) -> Self {
        self.depth_write = enabled;
        self
    }

    /// Enable or disable lighting (builder pattern)
    pub fn with_lighting(mut self, enabled: bool) -> Self {
        self.lighting = enabled;
        self
    }

    /// Set vertex and fragment program names (builder pattern)
    pub fn with_programs(mut self, vertex: impl Into<String>, fragment: impl Into<String>) -> Self {
        self.vertex_program = Some(vertex.into());
        self.fragment_program = Some(fragment.into());
        self
    }

    /// Add a texture unit (builder pattern)
    pub fn with_texture(mut self, texture: impl Into<String>) -> Self {
        self.texture_units.push(texture.into());
        self
    }

    /// Whether the pass blends with the framebuffer
    pub fn is_transparent(&self) -> bool {
        self.scene_blend.is_transparent()
    }
}

/// An ordered list of passes that together render a material
#[derive(Debug, Clone, PartialEq)]
pub struct Technique {
    /// Technique name
    pub name: String,
    /// Passes, applied in order
    pub passes: Vec<Pass>,
}

impl Technique {
    /// Create a technique from its passes
    pub fn new(name: impl Into<String>, passes: Vec<Pass>) -> Self {
        Self {
            name: name.into(),
            passes,
        }
    }

    /// Transparency of a technique is decided by its first pass
    pub fn is_transparent(&self) -> bool {
        self.passes.first().is_some_and(Pass::is_transparent)
    }

    /// Whether renderables using this technique must be drawn back-to-front
    ///
    /// Transparent techniques that still write and test depth can be batched
    /// like solids.
    pub fn requires_depth_sort(&self) -> bool {
        match self.passes.first() {
            Some(pass) => pass.is_transparent() && !(pass.depth_write && pass.depth_check),
            None => false,
        }
    }
}

/// A resolved material
#[derive(Debug, Clone, PartialEq)]
pub struct Material {
    /// Key the material is registered under
    pub key: MaterialKey,
    /// Techniques in preference order
    pub techniques: Vec<Technique>,
    /// Whether objects using this material receive shadows
    pub receive_shadows: bool,
}

impl Material {
    /// Create a material with the given techniques
    pub fn new(key: impl Into<MaterialKey>, techniques: Vec<Technique>) -> Self {
        Self {
            key: key.into(),
            techniques,
            receive_shadows: true,
        }
    }

    /// Convenience constructor for a single-technique, single-pass material
    pub fn single_pass(key: impl Into<MaterialKey>, pass: Pass) -> Self {
        Self::new(key, vec![Technique::new("default", vec![pass])])
    }

    /// The technique used for rendering: the first one that has passes
    pub fn best_technique(&self) -> Option<&Technique> {
        self.techniques.iter().find(|t| !t.passes.is_empty())
    }
}

/// External material resolution contract
pub trait MaterialSystem {
    /// Resolve a key into a material, or fail with [`SceneError::MaterialNotFound`]
    fn resolve_material(&self, key: &MaterialKey) -> SceneResult<Arc<Material>>;
}

/// In-memory material registry
#[derive(Debug, Default, Clone)]
pub struct MaterialLibrary {
    materials: HashMap<MaterialKey, Arc<Material>>,
}

impl MaterialLibrary {
    /// Name of the fallback material registered by [`MaterialLibrary::with_defaults`]
    pub const BASE_WHITE: &'static str = "BaseWhite";

    /// Create an empty library
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a library containing the opaque `BaseWhite` material
    pub fn with_defaults() -> Self {
        let mut library = Self::new();
        library.register(Material::single_pass(Self::BASE_WHITE, Pass::new("base_white")));
        library
    }

    /// Register a material, returning the one it replaced (if any)
    pub fn register(&mut self, material: Material) -> Option<Arc<Material>> {
        log::debug!(
            "Registered material '{}' with {} technique(s)",
            material.key,
            material.techniques.len()
        );
        self.materials.insert(material.key.clone(), Arc::new(material))
    }

    /// Remove a material
    pub fn unregister(&mut self, key: &MaterialKey) -> Option<Arc<Material>> {
        self.materials.remove(key)
    }

    /// Look up a material without producing an error
    pub fn get(&self, key: &MaterialKey) -> Option<&Arc<Material>> {
        self.materials.get(key)
    }

    /// Number of registered materials
    pub fn material_count(&self) -> usize {
        self.materials.len()
    }
}

impl MaterialSystem for MaterialLibrary {
    fn resolve_material(&self, key: &MaterialKey) -> SceneResult<Arc<Material>> {
        self.materials
            .get(key)
            .cloned()
            .ok_or_else(|| SceneError::MaterialNotFound(key.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_depth_sort_requires_blend_without_depth_write() {
        let solid = Technique::new("solid", vec![Pass::new("p")]);
        assert!(!solid.is_transparent());
        assert!(!solid.requires_depth_sort());

        let blended = Technique::new(
            "glass",
            vec![Pass::new("p").with_blend(SceneBlend::AlphaBlend).with_depth_write(false)],
        );
        assert!(blended.is_transparent());
        assert!(blended.requires_depth_sort());

        // Transparent but still writing and testing depth: batched like a solid
        let cutout = Technique::new("cutout", vec![Pass::new("p").with_blend(SceneBlend::AlphaBlend)]);
        assert!(cutout.is_transparent());
        assert!(!cutout.requires_depth_sort());
    }

    #[test]
    fn test_library_resolution() {
        let mut library = MaterialLibrary::with_defaults();
        library.register(Material::single_pass("Rock", Pass::new("rock")));
        assert_eq!(library.material_count(), 2);

        let rock = library.resolve_material(&MaterialKey::from("Rock")).unwrap();
        assert_eq!(rock.key.as_str(), "Rock");

        let missing = library.resolve_material(&MaterialKey::from("Missing"));
        assert!(matches!(missing, Err(SceneError::MaterialNotFound(ref k)) if k.as_str() == "Missing"));
    }

    #[test]
    fn test_best_technique_skips_empty() {
        let material = Material::new(
            "Layered",
            vec![
                Technique::new("empty", Vec::new()),
                Technique::new("real", vec![Pass::new("a"), Pass::new("b")]),
            ],
        );
        assert_eq!(material.best_technique().map(|t| t.name.as_str()), Some("real"));
    }
}
