use std::collections::BTreeMap;
use std::fmt;

use super::AnimationState;
use crate::error::{BridgeError, Result};
use crate::session::SessionBackend;

/// Integer id a host uses to select an animation.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct AnimationId(pub u32);

impl fmt::Display for AnimationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Builds the GPU program (pipelines, buffers, bind groups) for an animation.
pub type BuildFn<B> = fn(&B) -> Result<<B as SessionBackend>::Program>;

/// Encodes one frame of an animation into the backend's frame.
pub type EncodeFn<B> = fn(
    &B,
    &mut <B as SessionBackend>::Program,
    &AnimationState,
    &mut <B as SessionBackend>::Frame,
) -> Result<()>;

/// Immutable description of a registered animation.
pub struct AnimationDescriptor<B: SessionBackend> {
    pub id: AnimationId,
    pub name: &'static str,
    /// Advance of `AnimationState::elapsed` per frame.
    pub step: f32,
    pub build: BuildFn<B>,
    pub encode: EncodeFn<B>,
}

impl<B: SessionBackend> Clone for AnimationDescriptor<B> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<B: SessionBackend> Copy for AnimationDescriptor<B> {}

impl<B: SessionBackend> fmt::Debug for AnimationDescriptor<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnimationDescriptor")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("step", &self.step)
            .finish_non_exhaustive()
    }
}

/// Lookup table `id -> descriptor`.
///
/// Populated before the bridge is built and shared read-only afterwards.
pub struct AnimationRegistry<B: SessionBackend> {
    entries: BTreeMap<AnimationId, AnimationDescriptor<B>>,
}

impl<B: SessionBackend> AnimationRegistry<B> {
    pub fn new() -> Self {
        Self {
            entries: BTreeMap::new(),
        }
    }

    /// Registers `descriptor`. Returns `false` and keeps the existing entry if
    /// the id is already taken.
    pub fn register(&mut self, descriptor: AnimationDescriptor<B>) -> bool {
        if self.entries.contains_key(&descriptor.id) {
            log::warn!(
                "animation id {} already registered; ignoring \"{}\"",
                descriptor.id,
                descriptor.name
            );
            return false;
        }
        self.entries.insert(descriptor.id, descriptor);
        true
    }

    /// Builder form of [`register`](Self::register).
    pub fn with(mut self, descriptor: AnimationDescriptor<B>) -> Self {
        self.register(descriptor);
        self
    }

    pub fn get(&self, id: AnimationId) -> Result<&AnimationDescriptor<B>> {
        self.entries
            .get(&id)
            .ok_or(BridgeError::UnknownAnimation(id))
    }

    pub fn contains(&self, id: AnimationId) -> bool {
        self.entries.contains_key(&id)
    }

    /// Registered descriptors in id order.
    pub fn iter(&self) -> impl Iterator<Item = &AnimationDescriptor<B>> {
        self.entries.values()
    }

    pub fn ids(&self) -> Vec<AnimationId> {
        self.entries.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<B: SessionBackend> Default for AnimationRegistry<B> {
    fn default() -> Self {
        Self::new()
    }
}
