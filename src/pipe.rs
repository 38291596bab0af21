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

//! In-memory pipe between the compressor thread and the hashing side.
//!
//! Chunks travel over a bounded channel, so the writer blocks once `depth`
//! chunks are waiting and the reader blocks until a chunk, an error or the
//! close arrives. An error sent by the writer is returned by the reader in
//! place of end-of-stream, and on every read after it.

use std::io::{self, Read, Write};

use crossbeam_channel::{bounded, Receiver, Sender};

type Chunk = io::Result<Vec<u8>>;

pub fn pipe(chunk_size: usize, depth: usize) -> (PipeWriter, PipeReader) {
    let (tx, rx) = bounded(depth);
    (
        PipeWriter {
            tx,
            chunk_size: chunk_size.max(1),
        },
        PipeReader {
            rx,
            current: Vec::new(),
            pos: 0,
            failed: None,
        },
    )
}

/// Write end. Dropping every clone closes the pipe cleanly.
#[derive(Clone)]
pub struct PipeWriter {
    tx: Sender<Chunk>,
    chunk_size: usize,
}

impl PipeWriter {
    /// Make the reader fail with `err` once it has drained what was written.
    pub fn close_with_error(self, err: io::Error) {
        // Reader already gone: nobody left to tell.
        let _ = self.tx.send(Err(err));
    }
}

impl Write for PipeWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        let n = buf.len().min(self.chunk_size);
        self.tx
            .send(Ok(buf[..n].to_vec()))
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "pipe reader dropped"))?;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

pub struct PipeReader {
    rx: Receiver<Chunk>,
    current: Vec<u8>,
    pos: usize,
    failed: Option<(io::ErrorKind, String)>,
}

impl PipeReader {
    /// Chunks written but not yet picked up by the reader.
    pub fn queued(&self) -> usize {
        self.rx.len()
    }

    pub fn capacity(&self) -> usize {
        self.rx.capacity().unwrap_or(0)
    }
}

impl Read for PipeReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        loop {
            if self.pos < self.current.len() {
                let n = buf.len().min(self.current.len() - self.pos);
                buf[..n].copy_from_slice(&self.current[self.pos..self.pos + n]);
                self.pos += n;
                return Ok(n);
            }
            if let Some((kind, msg)) = &self.failed {
                return Err(io::Error::new(*kind, msg.clone()));
            }
            match self.rx.recv() {
                Ok(Ok(chunk)) => {
                    self.current = chunk;
                    self.pos = 0;
                }
                Ok(Err(err)) => {
                    self.failed = Some((err.kind(), err.to_string()));
                    return Err(err);
                }
                Err(_) => return Ok(0),
            }
        }
    }
}
