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

//! Store backed by a directory tree.
//!
//! ```text
//! <root>/
//! +-- repositories.json                 # {"Repositories": {repo: {"repo:tag": image id}}}
//! +-- imagedb/content/sha256/<hex>      # raw image configuration
//! +-- layerdb/sha256/<chain hex>/
//!     +-- diff                          # diff id
//!     +-- parent                        # parent chain id, absent for the base
//!     +-- media-type                    # optional, defaults to an uncompressed tar
//!     +-- layer.tar                     # layer content
//! ```

use std::collections::{HashMap, HashSet};
use std::fs::{self, File};
use std::io::{self, BufReader, Read};
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::debug;

use crate::descriptor::MEDIA_TYPE_UNCOMPRESSED_LAYER;
use crate::digest::ContentDigest;
use crate::error::{Error, Result};
use crate::layer::LayerNode;
use crate::reference::Reference;
use crate::store::{ImageStore, ReferenceStore};
use crate::util::advise_sequential;

const IO_BUF_SIZE: usize = 1024 * 1024;
const LAYER_CONTENT: &str = "layer.tar";

#[derive(Debug, Clone)]
pub struct FsStore {
    root: PathBuf,
}

#[derive(Deserialize)]
struct Repositories {
    #[serde(rename = "Repositories", default)]
    repositories: HashMap<String, HashMap<String, String>>,
}

impl FsStore {
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        if !root.is_dir() {
            return Err(Error::Store(io::Error::new(
                io::ErrorKind::NotFound,
                format!("store root {} is not a directory", root.display()),
            )));
        }
        Ok(FsStore { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn layer_dir(&self, chain_id: &ContentDigest) -> PathBuf {
        self.root
            .join("layerdb")
            .join(chain_id.algorithm())
            .join(chain_id.hex())
    }
}

impl ReferenceStore for FsStore {
    fn resolve(&self, reference: &Reference) -> Result<ContentDigest> {
        let path = self.root.join("repositories.json");
        let data = match fs::read(&path) {
            Ok(data) => data,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(Error::ReferenceNotFound(reference.to_string()))
            }
            Err(e) => return Err(Error::Store(e)),
        };
        let repos: Repositories = serde_json::from_slice(&data)
            .map_err(|e| Error::CorruptStore(format!("{}: {}", path.display(), e)))?;
        let id = repos
            .repositories
            .get(reference.repository())
            .and_then(|tags| tags.get(&reference.to_string()))
            .ok_or_else(|| Error::ReferenceNotFound(reference.to_string()))?;
        id.parse()
    }
}

impl ImageStore for FsStore {
    type Layer = FsLayer;

    fn config(&self, image_id: &ContentDigest) -> Result<Vec<u8>> {
        let path = self
            .root
            .join("imagedb")
            .join("content")
            .join(image_id.algorithm())
            .join(image_id.hex());
        fs::read(&path).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => Error::ImageNotFound(image_id.to_string()),
            _ => Error::Store(e),
        })
    }

    fn layer(&self, chain_id: &ContentDigest) -> Result<FsLayer> {
        // Collect top to base, then link from the base up.
        let mut records = Vec::new();
        let mut seen = HashSet::new();
        let mut next = Some(chain_id.clone());
        while let Some(id) = next {
            if !seen.insert(id.clone()) {
                return Err(Error::CorruptStore(format!("layer chain loops at {}", id)));
            }
            let record = LayerRecord::load(&self.layer_dir(&id), &id)?;
            next = record.parent.clone();
            records.push(record);
        }
        debug!(chain_id = %chain_id, depth = records.len(), "acquired layer chain");

        let mut below: Option<FsLayer> = None;
        for record in records.into_iter().rev() {
            below = Some(FsLayer {
                dir: record.dir,
                diff_id: record.diff_id,
                media_type: record.media_type,
                parent: below.map(Box::new),
            });
        }
        below.ok_or_else(|| Error::LayerNotFound(chain_id.to_string()))
    }
}

struct LayerRecord {
    dir: PathBuf,
    diff_id: String,
    media_type: String,
    parent: Option<ContentDigest>,
}

impl LayerRecord {
    fn load(dir: &Path, id: &ContentDigest) -> Result<Self> {
        let diff_id = match fs::read_to_string(dir.join("diff")) {
            Ok(s) => s.trim().to_string(),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(Error::LayerNotFound(id.to_string()))
            }
            Err(e) => return Err(Error::Store(e)),
        };
        let parent: Option<ContentDigest> = read_optional(&dir.join("parent"))?
            .map(|p| p.parse())
            .transpose()?;
        let media_type = read_optional(&dir.join("media-type"))?
            .unwrap_or_else(|| MEDIA_TYPE_UNCOMPRESSED_LAYER.to_string());
        Ok(LayerRecord {
            dir: dir.to_path_buf(),
            diff_id,
            media_type,
            parent,
        })
    }
}

fn read_optional(path: &Path) -> Result<Option<String>> {
    match fs::read_to_string(path) {
        Ok(s) => Ok(Some(s.trim().to_string())),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(Error::Store(e)),
    }
}

#[derive(Debug)]
pub struct FsLayer {
    dir: PathBuf,
    diff_id: String,
    media_type: String,
    parent: Option<Box<FsLayer>>,
}

impl LayerNode for FsLayer {
    fn open(&self) -> io::Result<Box<dyn Read + Send + '_>> {
        let file = File::open(self.dir.join(LAYER_CONTENT))?;
        advise_sequential(&file);
        Ok(Box::new(BufReader::with_capacity(IO_BUF_SIZE, file)))
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

#[cfg(test)]
mod tests {
    use super::*;

    fn write_layer(root: &Path, id: &ContentDigest, parent: Option<&ContentDigest>, content: &[u8]) {
        let dir = root.join("layerdb").join("sha256").join(id.hex());
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("diff"), id.to_string()).unwrap();
        if let Some(parent) = parent {
            fs::write(dir.join("parent"), parent.to_string()).unwrap();
        }
        fs::write(dir.join(LAYER_CONTENT), content).unwrap();
    }

    #[test]
    fn loads_chain_base_last() {
        let tmp = tempfile::tempdir().unwrap();
        let base = ContentDigest::of_bytes(b"base");
        let top = ContentDigest::of_bytes(b"top");
        write_layer(tmp.path(), &base, None, b"base");
        write_layer(tmp.path(), &top, Some(&base), b"top");

        let store = FsStore::open(tmp.path()).unwrap();
        let layer = store.layer(&top).unwrap();
        assert_eq!(layer.diff_id(), top.to_string());
        assert_eq!(layer.media_type(), MEDIA_TYPE_UNCOMPRESSED_LAYER);
        let parent = layer.parent().unwrap();
        assert_eq!(parent.diff_id(), base.to_string());
        assert!(parent.parent().is_none());

        let mut content = Vec::new();
        parent.open().unwrap().read_to_end(&mut content).unwrap();
        assert_eq!(content, b"base");
    }

    #[test]
    fn loop_is_corrupt() {
        let tmp = tempfile::tempdir().unwrap();
        let a = ContentDigest::of_bytes(b"a");
        let b = ContentDigest::of_bytes(b"b");
        write_layer(tmp.path(), &a, Some(&b), b"a");
        write_layer(tmp.path(), &b, Some(&a), b"b");

        let store = FsStore::open(tmp.path()).unwrap();
        assert!(matches!(store.layer(&a), Err(Error::CorruptStore(_))));
    }

    #[test]
    fn missing_things() {
        let tmp = tempfile::tempdir().unwrap();
        let store = FsStore::open(tmp.path()).unwrap();
        let id = ContentDigest::of_bytes(b"x");
        assert!(matches!(store.layer(&id), Err(Error::LayerNotFound(_))));
        assert!(matches!(store.config(&id), Err(Error::ImageNotFound(_))));
        let reference = Reference::parse("busybox").unwrap();
        assert!(matches!(store.resolve(&reference), Err(Error::ReferenceNotFound(_))));

        assert!(FsStore::open(tmp.path().join("nope")).is_err());
    }

    #[test]
    fn resolves_tagged_reference() {
        let tmp = tempfile::tempdir().unwrap();
        let id = ContentDigest::of_bytes(b"config");
        let repos = serde_json::json!({
            "Repositories": {
                "library/busybox": { "library/busybox:1.36": id.to_string() }
            }
        });
        fs::write(tmp.path().join("repositories.json"), repos.to_string()).unwrap();

        let store = FsStore::open(tmp.path()).unwrap();
        let found = store
            .resolve(&Reference::parse("library/busybox:1.36").unwrap())
            .unwrap();
        assert_eq!(found, id);
        assert!(store
            .resolve(&Reference::parse("library/busybox").unwrap())
            .is_err());
    }
}
