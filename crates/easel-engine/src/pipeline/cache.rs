use std::collections::HashMap;
use std::rc::Rc;

use crate::backend::RenderPass;
use crate::device::handles::SharedBackend;
use crate::device::Pipeline;
use crate::paint::{BlendMode, PaintKind};
use crate::Result;

use super::BuiltinShader;

/// Cache slot: one resident pipeline per paint kind and blend equation.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct PipelineKey {
    pub kind: PaintKind,
    pub blend: BlendMode,
}

impl PipelineKey {
    #[inline]
    pub const fn new(kind: PaintKind, blend: BlendMode) -> Self {
        Self { kind, blend }
    }
}

/// Cache activity counters.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub compiles: u64,
    /// Compiles that evicted an entry built for another target shape.
    pub replacements: u64,
    pub failures: u64,
}

#[derive(Debug)]
struct CacheEntry {
    pass: RenderPass,
    width: u32,
    height: u32,
    pipeline: Rc<Pipeline>,
}

impl CacheEntry {
    fn matches(&self, pass: RenderPass, width: u32, height: u32) -> bool {
        self.pass == pass && self.width == width && self.height == height
    }
}

/// Lazily compiled builtin paint pipelines.
///
/// Each slot holds exactly one pipeline, valid for the target shape it was
/// compiled against. `pipeline_for` populates or replaces the slot: asking
/// for another shape recompiles and evicts the previous pipeline, so
/// alternating between two shapes recompiles every time.
///
/// Callers must resolve again whenever paint state or shape may have changed.
/// Draws already recorded keep their own `Rc`, so an evicted pipeline stays
/// valid until they are gone.
#[derive(Debug, Default)]
pub struct PipelineCache {
    entries: HashMap<PipelineKey, CacheEntry>,
    stats: CacheStats,
}

impl PipelineCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the slot's pipeline for `(pass, width, height)`, compiling on a
    /// miss or a shape change.
    ///
    /// A failed compile leaves the slot untouched and is not retried.
    pub(crate) fn pipeline_for(
        &mut self,
        gpu: &Rc<SharedBackend>,
        pass: RenderPass,
        key: PipelineKey,
        width: u32,
        height: u32,
    ) -> Result<Rc<Pipeline>> {
        if let Some(entry) = self.entries.get(&key)
            && entry.matches(pass, width, height)
        {
            self.stats.hits += 1;
            return Ok(Rc::clone(&entry.pipeline));
        }

        let shader = BuiltinShader::for_kind(key.kind);
        let pipeline = match gpu.create_pipeline(&shader.desc(key, pass, width, height)) {
            Ok(pipeline) => Rc::new(pipeline),
            Err(err) => {
                self.stats.failures += 1;
                log::warn!("pipeline compile failed for {key:?} at {width}x{height}: {err}");
                return Err(err);
            }
        };
        self.stats.compiles += 1;

        let entry = CacheEntry {
            pass,
            width,
            height,
            pipeline: Rc::clone(&pipeline),
        };
        if let Some(old) = self.entries.insert(key, entry) {
            self.stats.replacements += 1;
            log::debug!(
                "pipeline {key:?}: replaced {}x{} with {width}x{height}",
                old.width,
                old.height
            );
        } else {
            log::debug!("pipeline {key:?}: compiled for {width}x{height}");
        }
        Ok(pipeline)
    }

    /// The resident pipeline of a slot, if any, without compiling.
    pub fn peek(&self, key: PipelineKey) -> Option<&Rc<Pipeline>> {
        self.entries.get(&key).map(|e| &e.pipeline)
    }

    /// Number of resident pipelines.
    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[inline]
    pub fn stats(&self) -> CacheStats {
        self.stats
    }

    /// Drops every resident pipeline.
    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
