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

use serde::{Deserialize, Serialize};
use serde_json::ser::{PrettyFormatter, Serializer};

use crate::descriptor::{Descriptor, MEDIA_TYPE_MANIFEST};
use crate::digest::ContentDigest;
use crate::error::{Error, Result};

pub const SCHEMA_VERSION: u32 = 2;

/// Image manifest, layers ordered base to top.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Manifest {
    pub schema_version: u32,
    pub media_type: String,
    pub config: Descriptor,
    pub layers: Vec<Descriptor>,
}

/// A manifest together with its canonical bytes and their descriptor.
#[derive(Debug, Clone)]
pub struct SerializedManifest {
    pub manifest: Manifest,
    pub payload: Vec<u8>,
    pub descriptor: Descriptor,
}

impl Manifest {
    pub fn new(config: Descriptor, layers: Vec<Descriptor>) -> Self {
        Manifest {
            schema_version: SCHEMA_VERSION,
            media_type: MEDIA_TYPE_MANIFEST.to_string(),
            config,
            layers,
        }
    }

    /// Canonical payload: declaration-ordered keys, three-space indent.
    pub fn to_payload(&self) -> Result<Vec<u8>> {
        let mut payload = Vec::new();
        let mut ser = Serializer::with_formatter(&mut payload, PrettyFormatter::with_indent(b"   "));
        self.serialize(&mut ser).map_err(Error::SerializationFailure)?;
        Ok(payload)
    }
}

pub fn assemble(config: Descriptor, layers: Vec<Descriptor>) -> Result<SerializedManifest> {
    let manifest = Manifest::new(config, layers);
    let payload = manifest.to_payload()?;
    let descriptor = Descriptor {
        media_type: MEDIA_TYPE_MANIFEST.to_string(),
        size: payload.len() as u64,
        digest: ContentDigest::of_bytes(&payload),
    };
    Ok(SerializedManifest {
        manifest,
        payload,
        descriptor,
    })
}
