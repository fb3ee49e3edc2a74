//! Activations captured during a single forward pass
//!
//! Instrumented models record intermediate tensors into the
//! [`ForwardContext`](crate::nn::ForwardContext) of the call that produced them.
//! The context is created per forward pass, so a capture can only ever hold
//! entries from the pass that just completed.

use crate::error::{Error, Result};
use ndarray::ArrayD;
use std::collections::BTreeMap;

/// Local image patches, `[batch, channels, h, w]`
pub const LOCAL_IMAGES: &str = "Block.local_images.images";
/// Local routing weights, `[batch, regions, topk]`
pub const LOCAL_ROUTING_WEIGHT: &str = "Block.local_r_weight.r_weight";
/// Local routing indices, `[batch, regions, topk]`
pub const LOCAL_ROUTING_INDEX: &str = "Block.local_r_idx.r_idx";
/// Windowed attention weights, `[batch * regions, heads, window, kv]`
pub const LOCAL_ATTENTION_WEIGHT: &str = "Block.local_attn_weight.attn_weight";

/// Mapping from qualified tensor name to captured array
#[derive(Debug, Clone, Default)]
pub struct ActivationCapture {
    entries: BTreeMap<String, ArrayD<f32>>,
}

impl ActivationCapture {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a tensor, replacing any previous entry with the same name
    pub fn insert(&mut self, name: impl Into<String>, tensor: ArrayD<f32>) {
        self.entries.insert(name.into(), tensor);
    }

    /// Look up a captured tensor
    pub fn get(&self, name: &str) -> Result<&ArrayD<f32>> {
        self.entries
            .get(name)
            .ok_or_else(|| Error::MissingActivation(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
