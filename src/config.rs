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

use crate::error::{Error, Result};

/// Tuning for the layer compressor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildConfig {
    /// gzip level, 0..=9.
    pub compression_level: u32,
    /// Size of the compressor's write buffer and of each chunk handed through
    /// the pipe.
    pub buffer_size: usize,
    /// Number of chunks the pipe holds before the compressor blocks.
    pub pipe_depth: usize,
}

pub const COMPRESSION_BUF_SIZE: usize = 32768;

impl Default for BuildConfig {
    fn default() -> Self {
        BuildConfig {
            compression_level: 6,
            buffer_size: COMPRESSION_BUF_SIZE,
            pipe_depth: 1,
        }
    }
}

impl BuildConfig {
    pub fn validate(&self) -> Result<()> {
        if self.compression_level > 9 {
            return Err(Error::InvalidConfig(format!(
                "compression level must be 0-9, got {}",
                self.compression_level
            )));
        }
        if self.buffer_size == 0 {
            return Err(Error::InvalidConfig("buffer size must be non-zero".into()));
        }
        if self.pipe_depth == 0 {
            return Err(Error::InvalidConfig("pipe depth must be non-zero".into()));
        }
        Ok(())
    }
}
