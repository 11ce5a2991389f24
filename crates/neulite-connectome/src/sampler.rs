// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Compartment sampling
//!
//! Each worker owns one [`CompartmentSampler`] and with it a private skeleton
//! cache keyed by morphology reference. Load failures are cached too, so a
//! broken file is reported once per worker.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use ahash::AHashMap;
use neulite_morphology::{load_canonical, CompartmentId, MorphologyError, MorphologySkeleton};
use rand::seq::SliceRandom;
use rand::Rng;
use tracing::{debug, warn};

use crate::catalog::{NodeCatalog, NodeId, TargetSection};
use crate::error::ResolutionError;

/// Source of canonical skeletons by morphology reference
pub trait SkeletonLoader: Send + Sync {
    fn load(&self, reference: &str) -> Result<MorphologySkeleton, MorphologyError>;
}

/// Loads `<converted_dir>/<reference>` when it exists, otherwise
/// canonicalizes `<morphologies_dir>/<reference>` in memory
#[derive(Debug, Clone)]
pub struct DirectorySkeletonLoader {
    morphologies_dir: PathBuf,
    converted_dir: Option<PathBuf>,
}

impl DirectorySkeletonLoader {
    pub fn new(morphologies_dir: impl Into<PathBuf>, converted_dir: Option<PathBuf>) -> Self {
        Self {
            morphologies_dir: morphologies_dir.into(),
            converted_dir,
        }
    }

    /// File that [`SkeletonLoader::load`] reads for `reference`
    pub fn resolve_path(&self, reference: &str) -> PathBuf {
        if let Some(converted) = self
            .converted_dir
            .as_deref()
            .map(|dir| dir.join(reference))
            .filter(|path| path.is_file())
        {
            return converted;
        }
        self.morphologies_dir.join(reference)
    }

    pub fn morphologies_dir(&self) -> &Path {
        &self.morphologies_dir
    }
}

impl SkeletonLoader for DirectorySkeletonLoader {
    fn load(&self, reference: &str) -> Result<MorphologySkeleton, MorphologyError> {
        let path = self.resolve_path(reference);
        debug!(target: "neulite-connectome", "Loading skeleton {}", path.display());
        load_canonical(&path)
    }
}

type CachedSkeleton = Result<Arc<MorphologySkeleton>, String>;

/// Per-worker skeleton cache
pub struct SkeletonCache<'l, L: SkeletonLoader + ?Sized> {
    loader: &'l L,
    entries: AHashMap<String, CachedSkeleton>,
    loads: usize,
}

impl<'l, L: SkeletonLoader + ?Sized> SkeletonCache<'l, L> {
    pub fn new(loader: &'l L) -> Self {
        Self {
            loader,
            entries: AHashMap::new(),
            loads: 0,
        }
    }

    pub fn get(&mut self, reference: &str) -> Result<Arc<MorphologySkeleton>, ResolutionError> {
        if !self.entries.contains_key(reference) {
            self.loads += 1;
            let loaded = self.loader.load(reference).map(Arc::new).map_err(|e| {
                warn!(
                    target: "neulite-connectome",
                    "Morphology '{}' could not be loaded: {}",
                    reference,
                    e
                );
                e.to_string()
            });
            self.entries.insert(reference.to_string(), loaded);
        }

        match self.entries.get(reference) {
            Some(Ok(skeleton)) => Ok(Arc::clone(skeleton)),
            Some(Err(reason)) => Err(ResolutionError::Unloadable {
                reference: reference.to_string(),
                reason: reason.clone(),
            }),
            None => Err(ResolutionError::Unloadable {
                reference: reference.to_string(),
                reason: "not cached".to_string(),
            }),
        }
    }

    /// Number of loader calls so far
    pub fn loads(&self) -> usize {
        self.loads
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Resolves a target compartment per synapse
pub struct CompartmentSampler<'a, L: SkeletonLoader + ?Sized> {
    nodes: &'a NodeCatalog,
    cache: SkeletonCache<'a, L>,
}

impl<'a, L: SkeletonLoader + ?Sized> CompartmentSampler<'a, L> {
    pub fn new(nodes: &'a NodeCatalog, loader: &'a L) -> Self {
        Self {
            nodes,
            cache: SkeletonCache::new(loader),
        }
    }

    /// Pick one compartment of `target`'s skeleton, uniformly among those in
    /// `sections`. Names outside the known section table match nothing.
    pub fn sample<R: Rng + ?Sized>(
        &mut self,
        target: NodeId,
        sections: &[TargetSection],
        rng: &mut R,
    ) -> Result<CompartmentId, ResolutionError> {
        let (node_type_id, info) = self.nodes.node_type(target)?;
        let reference = info
            .morphology
            .as_deref()
            .ok_or(ResolutionError::NoMorphology(node_type_id))?;
        let skeleton = self.cache.get(reference)?;

        let allowed: Vec<_> = sections.iter().filter_map(TargetSection::section).collect();
        let candidates = skeleton.compartments_in(&allowed);
        candidates
            .choose(rng)
            .copied()
            .ok_or_else(|| ResolutionError::NoMatchingSection {
                reference: reference.to_string(),
            })
    }

    pub fn cache(&self) -> &SkeletonCache<'a, L> {
        &self.cache
    }
}
