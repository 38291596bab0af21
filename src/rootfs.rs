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

use serde::Deserialize;

use crate::digest::ContentDigest;
use crate::error::{Error, Result};

/// The `rootfs` section of an image configuration: diff ids, base to top.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RootFs {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub diff_ids: Vec<ContentDigest>,
}

#[derive(Deserialize)]
struct ImageConfig {
    rootfs: Option<RootFs>,
}

impl RootFs {
    pub fn from_config(config: &[u8]) -> Result<Self> {
        let parsed: ImageConfig = serde_json::from_slice(config)
            .map_err(|e| Error::InvalidConfig(format!("image config: {}", e)))?;
        parsed
            .rootfs
            .ok_or_else(|| Error::InvalidConfig("image config has no rootfs".into()))
    }

    /// Key of the topmost layer in the layer store, if there are any layers.
    pub fn chain_id(&self) -> Option<ContentDigest> {
        chain_ids(&self.diff_ids).pop()
    }
}

/// Chain ids for every prefix of `diff_ids`.
///
/// The first chain id is the first diff id; each later one is the digest of
/// `"<previous chain id> <diff id>"`.
pub fn chain_ids(diff_ids: &[ContentDigest]) -> Vec<ContentDigest> {
    let mut out: Vec<ContentDigest> = Vec::with_capacity(diff_ids.len());
    for diff_id in diff_ids {
        let next = match out.last() {
            None => diff_id.clone(),
            Some(prev) => ContentDigest::of_bytes(format!("{} {}", prev, diff_id).as_bytes()),
        };
        out.push(next);
    }
    out
}
