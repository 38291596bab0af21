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

use std::thread;
use std::time::Duration;

use tracing::warn;

use crate::error::Result;

/// Re-run an operation while it fails with a retryable error.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            max_attempts: 3,
            delay: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    pub fn run<T, F>(&self, mut op: F) -> Result<T>
    where
        F: FnMut() -> Result<T>,
    {
        let mut attempt = 1;
        loop {
            match op() {
                Err(err) if err.is_retryable() && attempt < self.max_attempts => {
                    warn!(attempt, max = self.max_attempts, error = %err, "retrying");
                    thread::sleep(self.delay);
                    attempt += 1;
                }
                result => return result,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use std::io;

    fn policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            delay: Duration::ZERO,
        }
    }

    #[test]
    fn retries_transient_until_success() {
        let mut calls = 0;
        let out = policy(3)
            .run(|| {
                calls += 1;
                if calls < 3 {
                    Err(Error::read(io::Error::new(io::ErrorKind::TimedOut, "slow")))
                } else {
                    Ok(calls)
                }
            })
            .unwrap();
        assert_eq!(out, 3);
    }

    #[test]
    fn gives_up_after_max_attempts() {
        let mut calls = 0;
        let err = policy(2)
            .run(|| -> Result<()> {
                calls += 1;
                Err(Error::read(io::Error::new(io::ErrorKind::TimedOut, "slow")))
            })
            .unwrap_err();
        assert!(err.is_retryable());
        assert_eq!(calls, 2);
    }

    #[test]
    fn never_retries_fatal() {
        let mut calls = 0;
        let err = policy(5)
            .run(|| -> Result<()> {
                calls += 1;
                Err(Error::UnsupportedEncoding("text/plain".into()))
            })
            .unwrap_err();
        assert!(matches!(err, Error::UnsupportedEncoding(_)));
        assert_eq!(calls, 1);
    }
}
