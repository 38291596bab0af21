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

//! Build a Docker image manifest (schema 2) for a locally stored image.
//!
//! The layers of the image are walked from the top of the stored chain to
//! its base. Each one is hashed, gzip-compressing it on the fly when it is
//! stored uncompressed, and the resulting descriptors are put in base-to-top
//! order next to the configuration descriptor. The serialized manifest is
//! byte-for-byte reproducible for the same stored content.

pub mod compress;
pub mod config;
pub mod descriptor;
pub mod digest;
pub mod error;
pub mod layer;
pub mod manifest;
pub mod pipe;
pub mod reference;
pub mod retry;
pub mod rootfs;
pub mod store;
pub mod util;

use tracing::info;

pub use crate::config::BuildConfig;
pub use crate::descriptor::{config_descriptor, Descriptor};
pub use crate::digest::ContentDigest;
pub use crate::error::{Error, FailureKind, Result};
pub use crate::layer::{canonical_order, walk_chain, LayerNode};
pub use crate::manifest::{assemble, Manifest, SerializedManifest};
pub use crate::reference::Reference;
pub use crate::retry::RetryPolicy;
pub use crate::rootfs::RootFs;
pub use crate::store::{ImageStore, ReferenceStore};

use crate::descriptor::MEDIA_TYPE_IMAGE_CONFIG;

/// Build the manifest for `config` and the `chain_len` layers below `top`.
///
/// Either a complete manifest is returned or nothing is: the first failure
/// aborts the whole build.
pub fn build_manifest<L: LayerNode>(
    conf: &BuildConfig,
    config: &[u8],
    config_media_type: &str,
    top: Option<&L>,
    chain_len: usize,
) -> Result<SerializedManifest> {
    conf.validate()?;
    let layers = canonical_order(walk_chain(top, chain_len, conf)?);
    let config = config_descriptor(config_media_type, config)?;
    let manifest = assemble(config, layers)?;
    info!(
        digest = %manifest.descriptor.digest,
        size = manifest.descriptor.size,
        layers = manifest.manifest.layers.len(),
        "built manifest"
    );
    Ok(manifest)
}

/// Resolve `reference` in the stores and build its manifest.
///
/// The top layer is held for the duration of the build and released on
/// return, whether the build succeeded or not.
pub fn generate_manifest<R, I>(
    references: &R,
    images: &I,
    reference: &Reference,
    conf: &BuildConfig,
) -> Result<SerializedManifest>
where
    R: ReferenceStore,
    I: ImageStore,
{
    let image_id = references.resolve(reference)?;
    let config = images.config(&image_id)?;
    let rootfs = RootFs::from_config(&config)?;
    let top = rootfs
        .chain_id()
        .map(|chain_id| images.layer(&chain_id))
        .transpose()?;
    info!(%reference, image = %image_id, layers = rootfs.diff_ids.len(), "generating manifest");
    build_manifest(
        conf,
        &config,
        MEDIA_TYPE_IMAGE_CONFIG,
        top.as_ref(),
        rootfs.diff_ids.len(),
    )
}
