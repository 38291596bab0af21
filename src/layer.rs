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

//! Walking a stored layer chain into layer descriptors.

use std::io::{self, Read};
use std::iter;
use std::thread;

use tracing::debug;

use crate::compress::compress;
use crate::config::BuildConfig;
use crate::descriptor::{Descriptor, MEDIA_TYPE_LAYER, MEDIA_TYPE_UNCOMPRESSED_LAYER};
use crate::digest::digest_reader;
use crate::error::{Error, Result};

/// A layer borrowed from a layer store.
///
/// The handle is released when it is dropped; parents are borrowed from the
/// handle and live exactly as long as it does.
pub trait LayerNode {
    /// Open the layer's content stream.
    fn open(&self) -> io::Result<Box<dyn Read + Send + '_>>;

    /// Encoding of the content returned by [`open`](LayerNode::open).
    fn media_type(&self) -> &str;

    /// Identifier of the uncompressed layer content.
    fn diff_id(&self) -> &str;

    fn parent(&self) -> Option<&Self>;
}

/// Compute the compressed-layer descriptor for a single layer.
pub fn layer_descriptor<L: LayerNode>(layer: &L, conf: &BuildConfig) -> Result<Descriptor> {
    let media_type = layer.media_type();
    let compressed = match media_type {
        MEDIA_TYPE_UNCOMPRESSED_LAYER => false,
        MEDIA_TYPE_LAYER => true,
        other => return Err(Error::UnsupportedEncoding(other.to_string())),
    };

    let content = layer.open().map_err(Error::read)?;
    if compressed {
        return Descriptor::from_reader(MEDIA_TYPE_LAYER, content);
    }

    // The helper owns `content`; the scope guarantees it is finished with it
    // before `layer` can be released.
    thread::scope(|scope| {
        let (reader, done) = compress(scope, content, conf);
        let hashed = digest_reader(reader);
        let drained = done.wait();
        let (size, digest) = hashed?;
        drained?;
        Ok(Descriptor {
            media_type: MEDIA_TYPE_LAYER.to_string(),
            size,
            digest,
        })
    })
}

/// Walk `expected` layers from `top` towards the base, one descriptor per
/// layer, in discovery (top-to-base) order.
pub fn walk_chain<L: LayerNode>(
    top: Option<&L>,
    expected: usize,
    conf: &BuildConfig,
) -> Result<Vec<Descriptor>> {
    // One past `expected` is enough to see a chain that is too long.
    let walked = iter::successors(top, |layer| layer.parent())
        .take(expected + 1)
        .count();
    if walked != expected {
        return Err(Error::ChainLengthMismatch { expected, walked });
    }

    let mut descriptors = Vec::with_capacity(expected);
    for layer in iter::successors(top, |layer| layer.parent()) {
        let desc = layer_descriptor(layer, conf)?;
        debug!(
            diff_id = layer.diff_id(),
            media_type = layer.media_type(),
            digest = %desc.digest,
            size = desc.size,
            "described layer"
        );
        descriptors.push(desc);
    }
    Ok(descriptors)
}

/// Reverse discovery order into base-to-top order.
pub fn canonical_order<T>(mut discovered: Vec<T>) -> Vec<T> {
    discovered.reverse();
    discovered
}
