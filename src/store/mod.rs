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

//! Lookup capabilities the generator needs from local image storage.

pub mod fs;
pub mod memory;

use crate::digest::ContentDigest;
use crate::error::Result;
use crate::layer::LayerNode;
use crate::reference::Reference;

pub trait ReferenceStore {
    /// Image id the reference currently points at.
    fn resolve(&self, reference: &Reference) -> Result<ContentDigest>;
}

pub trait ImageStore {
    type Layer: LayerNode;

    /// Raw configuration bytes of an image.
    fn config(&self, image_id: &ContentDigest) -> Result<Vec<u8>>;

    /// Acquire the layer stored under `chain_id` together with its parents.
    /// The layer is released when the returned handle is dropped.
    fn layer(&self, chain_id: &ContentDigest) -> Result<Self::Layer>;
}
