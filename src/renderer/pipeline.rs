//! Pipeline-state cache.
//!
//! Explicit backends materialize one pipeline object per distinct
//! `{shader, vertex layout, attachment set}` combination plus the fixed
//! function state baked into it. Objects live in a contiguous `Vec` and are
//! addressed through [`PipelineId`] handles; lookups go through an FxHash of
//! the full [`PipelineKey`].

use std::hash::{Hash, Hasher};

use rustc_hash::FxHashMap;

use crate::renderer::api::{DepthFunction, FaceCulling, Primitive};
use crate::renderer::layout::BufferLayout;
use crate::renderer::texture::TextureFormat;

/// Handle to a cached pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PipelineId(pub(crate) u32);

impl PipelineId {
    #[inline]
    #[must_use]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Formats and sample count of the targets a pipeline renders into.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct AttachmentSet {
    pub colors: Vec<TextureFormat>,
    pub depth: Option<TextureFormat>,
    pub samples: u32,
}

/// Everything that identifies a pipeline object.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PipelineKey {
    pub shader: String,
    pub layouts: Vec<BufferLayout>,
    pub attachments: AttachmentSet,
    pub primitive: Primitive,
    pub depth_test: bool,
    pub depth_function: DepthFunction,
    pub face_culling: FaceCulling,
}

#[must_use]
pub fn fx_hash_key<K: Hash>(key: &K) -> u64 {
    let mut hasher = rustc_hash::FxHasher::default();
    key.hash(&mut hasher);
    hasher.finish()
}

/// Hit/miss counters, for diagnostics and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PipelineCacheStats {
    pub hits: u64,
    pub misses: u64,
}

/// Central pipeline storage and deduplication cache.
pub struct PipelineCache<P> {
    pipelines: Vec<P>,
    lookup: FxHashMap<u64, PipelineId>,
    stats: PipelineCacheStats,
}

impl<P> Default for PipelineCache<P> {
    fn default() -> Self {
        Self::new()
    }
}

impl<P> PipelineCache<P> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            pipelines: Vec::with_capacity(32),
            lookup: FxHashMap::default(),
            stats: PipelineCacheStats::default(),
        }
    }

    /// Returns the pipeline for `key`, building it with `create` on a miss.
    pub fn get_or_create(&mut self, key: &PipelineKey, create: impl FnOnce(&PipelineKey) -> P) -> PipelineId {
        let hash = fx_hash_key(key);
        if let Some(&id) = self.lookup.get(&hash) {
            self.stats.hits += 1;
            return id;
        }
        self.insert(hash, key, create(key))
    }

    /// Like [`Self::get_or_create`], for builders that can fail. Failures
    /// are not cached.
    pub fn try_get_or_create(
        &mut self,
        key: &PipelineKey,
        create: impl FnOnce(&PipelineKey) -> Option<P>,
    ) -> Option<PipelineId> {
        let hash = fx_hash_key(key);
        if let Some(&id) = self.lookup.get(&hash) {
            self.stats.hits += 1;
            return Some(id);
        }
        let pipeline = create(key)?;
        Some(self.insert(hash, key, pipeline))
    }

    fn insert(&mut self, hash: u64, key: &PipelineKey, pipeline: P) -> PipelineId {
        self.stats.misses += 1;
        log::debug!("Creating pipeline for shader '{}' ({:?})", key.shader, key.primitive);
        let id = PipelineId(self.pipelines.len() as u32);
        self.pipelines.push(pipeline);
        self.lookup.insert(hash, id);
        id
    }

    /// Retrieves a pipeline by handle. **Panics** if the id is invalid.
    #[inline]
    #[must_use]
    pub fn get(&self, id: PipelineId) -> &P {
        &self.pipelines[id.index()]
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.pipelines.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pipelines.is_empty()
    }

    #[must_use]
    pub fn stats(&self) -> PipelineCacheStats {
        self.stats
    }

    /// Drops every pipeline (after a device or surface format change).
    pub fn clear(&mut self) {
        self.pipelines.clear();
        self.lookup.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::renderer::layout::DataType;

    fn key(shader: &str) -> PipelineKey {
        PipelineKey {
            shader: shader.into(),
            layouts: vec![BufferLayout::from_types([
                ("a_Position", DataType::Vec3),
                ("a_Normal", DataType::Vec3),
            ])],
            attachments: AttachmentSet {
                colors: vec![TextureFormat::Rgba8],
                depth: Some(TextureFormat::Depth24),
                samples: 1,
            },
            primitive: Primitive::Triangle,
            depth_test: true,
            depth_function: DepthFunction::Less,
            face_culling: FaceCulling::Back,
        }
    }

    #[test]
    fn identical_descriptors_share_one_pipeline() {
        let mut cache = PipelineCache::new();
        let mut built = 0;
        let a = cache.get_or_create(&key("phong_color"), |_| {
            built += 1;
            "a"
        });
        let b = cache.get_or_create(&key("phong_color"), |_| {
            built += 1;
            "b"
        });
        assert_eq!(a, b);
        assert_eq!(built, 1);
        assert_eq!(*cache.get(a), "a");
        assert_eq!(cache.stats(), PipelineCacheStats { hits: 1, misses: 1 });
    }

    #[test]
    fn different_attachments_miss() {
        let mut cache = PipelineCache::new();
        let a = cache.get_or_create(&key("depth"), |_| 0);
        let mut other = key("depth");
        other.attachments.colors.clear();
        let b = cache.get_or_create(&other, |_| 1);
        assert_ne!(a, b);
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn failed_builds_are_not_cached() {
        let mut cache: PipelineCache<u32> = PipelineCache::new();
        assert!(cache.try_get_or_create(&key("broken"), |_| None).is_none());
        assert!(cache.is_empty());
        let id = cache.try_get_or_create(&key("broken"), |_| Some(7));
        assert_eq!(id.map(|id| *cache.get(id)), Some(7));
    }
}
