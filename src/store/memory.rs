// Copyright (c) 2019, 2020 Codethink Ltd.
//
// Permission is hereby granted, free of charge, to any person obtaining a copy
// of this software and associated documentation files (the "Software"), to deal
// in the Software without restriction, including without limitation the rights
// to use, copy, modify, merge, publish, distribute, sublicense, and/or sell
// copies of the Software, and to permit persons to whom the Software is
// furnished to do so, subject to the following conditions:
//
// The above copyright notice and this permission notice shall be included in all
// copies or substantial portions of the Software.
//
// THE SOFTWARE IS PROVIDED "AS IS", WITHOUT WARRANTY OF ANY KIND, EXPRESS OR
// IMPLIED, INCLUDING BUT NOT LIMITED TO THE WARRANTIES OF MERCHANTABILITY,
// FITNESS FOR A PARTICULAR PURPOSE AND NONINFRINGEMENT. IN NO EVENT SHALL THE
// AUTHORS OR COPYRIGHT HOLDERS BE LIABLE FOR ANY CLAIM, DAMAGES OR OTHER
// LIABILITY, WHETHER IN AN ACTION OF CONTRACT, TORT OR OTHERWISE, ARISING FROM,
// OUT OF OR IN CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER DEALINGS IN THE
// SOFTWARE.

//! Store kept entirely in memory.

use std::collections::HashMap;
use std::io::{self, Read};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::digest::ContentDigest;
use crate::error::{Error, Result};
use crate::layer::LayerNode;
use crate::reference::Reference;
use crate::rootfs::chain_ids;
use crate::store::{ImageStore, ReferenceStore};

#[derive(Debug, Clone)]
pub struct MemoryLayer {
    diff_id: String,
    media_type: String,
    content: Arc<[u8]>,
    parent: Option<Box<MemoryLayer>>,
    _lease: Option<Arc<Lease>>,
}

/// Counts a handed-out layer until it is dropped.
#[derive(Debug)]
struct Lease(Arc<AtomicUsize>);

impl Lease {
    fn acquire(active: &Arc<AtomicUsize>) -> Self {
        active.fetch_add(1, Ordering::SeqCst);
        Lease(Arc::clone(active))
    }
}

impl Drop for Lease {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl MemoryLayer {
    pub fn new(diff_id: &str, media_type: &str, content: &[u8]) -> Self {
        MemoryLayer {
            diff_id: diff_id.to_string(),
            media_type: media_type.to_string(),
            content: Arc::from(content),
            parent: None,
            _lease: None,
        }
    }

    pub fn with_parent(mut self, parent: MemoryLayer) -> Self {
        self.parent = Some(Box::new(parent));
        self
    }
}

impl LayerNode for MemoryLayer {
    fn open(&self) -> io::Result<Box<dyn Read + Send + '_>> {
        Ok(Box::new(&self.content[..]))
    }

    fn media_type(&self) -> &str {
        &self.media_type
    }

    fn diff_id(&self) -> &str {
        &self.diff_id
    }

    fn parent(&self) -> Option<&Self> {
        self.parent.as_deref()
    }
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    references: HashMap<Reference, ContentDigest>,
    configs: HashMap<ContentDigest, Vec<u8>>,
    layers: HashMap<ContentDigest, MemoryLayer>,
    active: Arc<AtomicUsize>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a configuration under its own digest and tag it.
    pub fn insert_image(&mut self, reference: Reference, config: Vec<u8>) -> ContentDigest {
        let id = ContentDigest::of_bytes(&config);
        self.configs.insert(id.clone(), config);
        self.references.insert(reference, id.clone());
        id
    }

    /// Store a chain of layers given base to top as `(media type, content)`.
    ///
    /// Each diff id is the digest of the stored bytes. Returns the diff ids,
    /// base to top, for use in the image's `rootfs`.
    pub fn insert_chain(&mut self, layers: &[(&str, &[u8])]) -> Vec<ContentDigest> {
        let diff_ids: Vec<ContentDigest> = layers
            .iter()
            .map(|(_, content)| ContentDigest::of_bytes(content))
            .collect();

        let mut below: Option<MemoryLayer> = None;
        for ((media_type, content), chain_id) in layers.iter().zip(chain_ids(&diff_ids)) {
            let diff_id = ContentDigest::of_bytes(content).to_string();
            let mut layer = MemoryLayer::new(&diff_id, media_type, content);
            if let Some(parent) = below.take() {
                layer = layer.with_parent(parent);
            }
            self.layers.insert(chain_id, layer.clone());
            below = Some(layer);
        }
        diff_ids
    }

    /// Layers handed out and not yet released.
    pub fn active_layers(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }
}

impl ReferenceStore for MemoryStore {
    fn resolve(&self, reference: &Reference) -> Result<ContentDigest> {
        self.references
            .get(reference)
            .cloned()
            .ok_or_else(|| Error::ReferenceNotFound(reference.to_string()))
    }
}

impl ImageStore for MemoryStore {
    type Layer = MemoryLayer;

    fn config(&self, image_id: &ContentDigest) -> Result<Vec<u8>> {
        self.configs
            .get(image_id)
            .cloned()
            .ok_or_else(|| Error::ImageNotFound(image_id.to_string()))
    }

    fn layer(&self, chain_id: &ContentDigest) -> Result<MemoryLayer> {
        let mut layer = self
            .layers
            .get(chain_id)
            .cloned()
            .ok_or_else(|| Error::LayerNotFound(chain_id.to_string()))?;
        layer._lease = Some(Arc::new(Lease::acquire(&self.active)));
        Ok(layer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::MEDIA_TYPE_LAYER;

    #[test]
    fn chain_lookup_and_release() {
        let mut store = MemoryStore::new();
        let diff_ids = store.insert_chain(&[(MEDIA_TYPE_LAYER, &b"base"[..]), (MEDIA_TYPE_LAYER, &b"top"[..])]);
        let top_id = chain_ids(&diff_ids).pop().unwrap();

        {
            let top = store.layer(&top_id).unwrap();
            assert_eq!(store.active_layers(), 1);
            assert_eq!(top.diff_id(), diff_ids[1].to_string());
            let base = top.parent().unwrap();
            assert_eq!(base.diff_id(), diff_ids[0].to_string());
            assert!(base.parent().is_none());
        }
        assert_eq!(store.active_layers(), 0);
    }

    #[test]
    fn missing_entries() {
        let store = MemoryStore::new();
        let reference = Reference::parse("nothing:here").unwrap();
        assert!(matches!(store.resolve(&reference), Err(Error::ReferenceNotFound(_))));
        let id = ContentDigest::of_bytes(b"x");
        assert!(matches!(store.config(&id), Err(Error::ImageNotFound(_))));
        assert!(matches!(store.layer(&id), Err(Error::LayerNotFound(_))));
    }
}
