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

//! Gzip compression of uncompressed layer content on a helper thread.
//!
//! The compressor runs inside a caller-provided [`thread::Scope`] and writes
//! into a [`pipe`]; the caller reads the compressed stream from the returned
//! [`PipeReader`]. The source stream is owned by the helper and is dropped
//! before [`CompressionDone::wait`] returns, so a layer handle borrowed by
//! the source always outlives the compression.

use std::io::{self, BufWriter, Read, Write};
use std::thread::{self, ScopedJoinHandle};

use flate2::write::GzEncoder;
use tracing::debug;

use crate::config::BuildConfig;
use crate::error::{duplicate, Error, FailureKind, Result};
use crate::pipe::{pipe, PipeReader};

/// Completion signal for a running compression.
pub struct CompressionDone<'scope> {
    handle: ScopedJoinHandle<'scope, io::Result<u64>>,
}

impl CompressionDone<'_> {
    /// Wait for the helper to finish. Returns the number of uncompressed bytes
    /// read from the source.
    pub fn wait(self) -> Result<u64> {
        match self.handle.join() {
            Ok(Ok(consumed)) => Ok(consumed),
            Ok(Err(err)) => Err(Error::read(err)),
            Err(_) => Err(Error::ReadFailure {
                kind: FailureKind::Fatal,
                source: io::Error::other("compression thread panicked"),
            }),
        }
    }
}

/// Start gzip-compressing `source` on a thread of `scope`.
pub fn compress<'scope, 'env, R>(
    scope: &'scope thread::Scope<'scope, 'env>,
    mut source: R,
    conf: &BuildConfig,
) -> (PipeReader, CompressionDone<'scope>)
where
    R: Read + Send + 'scope,
{
    let (writer, reader) = pipe(conf.buffer_size, conf.pipe_depth);
    let level = flate2::Compression::new(conf.compression_level);
    let buffer_size = conf.buffer_size;

    let handle = scope.spawn(move || {
        let signal = writer.clone();
        match gzip_into(&mut source, writer, level, buffer_size) {
            Ok(consumed) => {
                debug!(consumed, "layer compression finished");
                Ok(consumed)
            }
            Err(err) => {
                let copy = duplicate(&err);
                signal.close_with_error(err);
                Err(copy)
            }
        }
    });

    (reader, CompressionDone { handle })
}

fn gzip_into<R: Read, W: Write>(
    source: &mut R,
    sink: W,
    level: flate2::Compression,
    buffer_size: usize,
) -> io::Result<u64> {
    let mut encoder = GzEncoder::new(BufWriter::with_capacity(buffer_size, sink), level);
    let consumed = io::copy(source, &mut encoder)?;
    encoder.finish()?.flush()?;
    Ok(consumed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::digest::{digest_reader, ContentDigest};
    use flate2::read::GzDecoder;

    struct FailAfter {
        remaining: usize,
    }

    impl Read for FailAfter {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            if self.remaining == 0 {
                return Err(io::Error::new(io::ErrorKind::TimedOut, "layer read timed out"));
            }
            let n = buf.len().min(self.remaining);
            buf[..n].fill(b'z');
            self.remaining -= n;
            Ok(n)
        }
    }

    /// Records how many chunks were ever waiting in the pipe at once.
    struct Probe {
        inner: PipeReader,
        high_water: usize,
    }

    impl Read for Probe {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            self.high_water = self.high_water.max(self.inner.queued());
            let small = buf.len().min(97);
            self.inner.read(&mut buf[..small])
        }
    }

    fn noise(len: usize) -> Vec<u8> {
        let mut state: u32 = 0x2545_f491;
        (0..len)
            .map(|_| {
                state ^= state << 13;
                state ^= state >> 17;
                state ^= state << 5;
                state as u8
            })
            .collect()
    }

    #[test]
    fn output_matches_reference_gzip() {
        let input = "A".repeat(1000).into_bytes();
        let conf = BuildConfig::default();

        let (size, digest) = thread::scope(|scope| {
            let (reader, done) = compress(scope, &input[..], &conf);
            let hashed = digest_reader(reader).unwrap();
            assert_eq!(done.wait().unwrap(), input.len() as u64);
            hashed
        });

        let mut reference = GzEncoder::new(Vec::new(), flate2::Compression::new(6));
        reference.write_all(&input).unwrap();
        let reference = reference.finish().unwrap();

        assert_eq!(size, reference.len() as u64);
        assert_eq!(digest, ContentDigest::of_bytes(&reference));
    }

    #[test]
    fn large_source_with_slow_reader_stays_bounded() {
        let input = noise(2 * 1024 * 1024);
        let conf = BuildConfig {
            compression_level: 1,
            buffer_size: 1024,
            pipe_depth: 2,
        };

        let (decompressed, high_water, consumed) = thread::scope(|scope| {
            let (reader, done) = compress(scope, &input[..], &conf);
            let mut probe = Probe {
                inner: reader,
                high_water: 0,
            };
            let mut out = Vec::new();
            GzDecoder::new(&mut probe).read_to_end(&mut out).unwrap();
            let high_water = probe.high_water;
            drop(probe);
            (out, high_water, done.wait().unwrap())
        });

        assert_eq!(consumed, input.len() as u64);
        assert!(decompressed == input);
        assert!(high_water <= conf.pipe_depth);
    }

    #[test]
    fn source_error_surfaces_instead_of_truncating() {
        let conf = BuildConfig::default();
        let (hashed, waited) = thread::scope(|scope| {
            let (reader, done) = compress(scope, FailAfter { remaining: 100_000 }, &conf);
            let hashed = digest_reader(reader);
            (hashed, done.wait())
        });

        match hashed.unwrap_err() {
            Error::ReadFailure { kind, source } => {
                assert_eq!(kind, FailureKind::Retryable);
                assert_eq!(source.kind(), io::ErrorKind::TimedOut);
            }
            other => panic!("unexpected error {other:?}"),
        }
        assert!(waited.unwrap_err().is_retryable());
    }

    #[test]
    fn abandoned_reader_does_not_hang_the_helper() {
        let input = noise(512 * 1024);
        let conf = BuildConfig {
            buffer_size: 512,
            pipe_depth: 1,
            ..Default::default()
        };
        let waited = thread::scope(|scope| {
            let (mut reader, done) = compress(scope, &input[..], &conf);
            let mut first = [0u8; 10];
            reader.read_exact(&mut first).unwrap();
            drop(reader);
            done.wait()
        });
        assert!(waited.is_err());
    }
}
