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

use std::io::Read;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use tracing::info;
use tracing_subscriber::EnvFilter;

use manifest_gen::util::write_payload;
use manifest_gen::store::fs::FsStore;
use manifest_gen::{generate_manifest, BuildConfig, Reference, RetryPolicy};

#[derive(Debug, Clone)]
pub struct GlobalConfig {
    pub store: PathBuf,
    pub image: Reference,
    pub output: PathBuf,
    pub build: BuildConfig,
    pub retry: RetryPolicy,
}

fn required_str<'a>(data: &'a serde_json::Value, key: &str) -> Result<&'a str> {
    match data.get(key) {
        Some(v) => v
            .as_str()
            .with_context(|| format!("'{}' must be a string", key)),
        None => bail!("missing required key '{}'", key),
    }
}

fn parse_config(data: &serde_json::Value) -> Result<GlobalConfig> {
    let store = PathBuf::from(required_str(data, "store")?);
    let image = Reference::parse(required_str(data, "image")?)?;
    let output = PathBuf::from(required_str(data, "output")?);

    let mut build = BuildConfig::default();
    if let Some(level) = data.get("compression-level") {
        let level = level
            .as_u64()
            .context("'compression-level' must be an integer")?;
        if level > 9 {
            bail!("Compression level must be between 0 and 9, got: {}", level);
        }
        build.compression_level = level as u32;
    }

    let max_attempts = data
        .get("retries")
        .map(|v| v.as_u64().context("'retries' must be an integer"))
        .transpose()?
        .unwrap_or(3)
        .max(1) as u32;
    let retry = RetryPolicy {
        max_attempts,
        delay: Duration::from_secs(1),
    };

    Ok(GlobalConfig {
        store,
        image,
        output,
        build,
        retry,
    })
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let mut input = String::new();
    std::io::stdin().read_to_string(&mut input)?;

    let data: serde_json::Value = serde_yaml::from_str(&input)?;
    let conf = parse_config(&data)?;

    let store = FsStore::open(&conf.store)?;
    let manifest = conf
        .retry
        .run(|| generate_manifest(&store, &store, &conf.image, &conf.build))
        .with_context(|| format!("generating manifest for {}", conf.image))?;

    write_payload(&conf.output, &manifest.payload)
        .with_context(|| format!("writing {}", conf.output.display()))?;

    info!(
        output = %conf.output.display(),
        digest = %manifest.descriptor.digest,
        "manifest written"
    );

    Ok(())
}
