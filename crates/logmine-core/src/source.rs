//! Line source with a replay queue.
//!
//! [`LineSource`] lazily reads lines from its inputs and interleaves
//! [`Feed::Boundary`] markers at quiescent points. Each cycle it:
//!
//! 1. drains the [`ReplayQueue`] (most recently pushed line first),
//! 2. drains the underlying inputs until they are exhausted,
//! 3. emits one boundary marker.
//!
//! The cycle repeats until, right after a boundary, the replay queue is
//! found empty. Downstream stages push lines into the queue while the
//! source is mid-iteration; the source observes those pushes the next time
//! it looks at the queue.

use std::collections::VecDeque;
use std::io::{self, BufRead};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::models::Feed;

/// Shared queue of lines to re-yield before new input resumes.
///
/// Cloning yields another handle to the same queue. The clusterer is the
/// only writer and the line source the only reader; the mutex serializes
/// them when stages run on different threads.
#[derive(Debug, Clone, Default)]
pub struct ReplayQueue {
    inner: Arc<Mutex<Vec<String>>>,
}

impl ReplayQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append lines for replay. They come back out in reverse push order.
    pub fn send(&self, lines: Vec<String>) {
        self.lock().extend(lines);
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn pop(&self) -> Option<String> {
        self.lock().pop()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<String>> {
        // A panic while holding the lock cannot leave the Vec half-written.
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Replay,
    Input,
    AfterBoundary,
    Done,
}

/// Lazy, finite sequence of [`Feed`] items. Restartable only by building a
/// new source.
pub struct LineSource {
    inputs: VecDeque<Box<dyn BufRead + Send>>,
    replay: ReplayQueue,
    max_len: usize,
    phase: Phase,
    buf: Vec<u8>,
    lines_read: u64,
    lines_replayed: u64,
}

impl LineSource {
    /// Build a source over `inputs`, read in order. Lines longer than
    /// `max_len` characters are truncated.
    pub fn new(inputs: Vec<Box<dyn BufRead + Send>>, max_len: usize) -> Self {
        Self {
            inputs: inputs.into(),
            replay: ReplayQueue::new(),
            max_len,
            phase: Phase::Replay,
            buf: Vec::new(),
            lines_read: 0,
            lines_replayed: 0,
        }
    }

    /// Convenience constructor over in-memory text, one input per string.
    pub fn from_texts<I, S>(texts: I, max_len: usize) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let inputs = texts
            .into_iter()
            .map(|t| Box::new(io::Cursor::new(t.into().into_bytes())) as Box<dyn BufRead + Send>)
            .collect();
        Self::new(inputs, max_len)
    }

    /// Writer handle for the replay queue.
    pub fn replay_queue(&self) -> ReplayQueue {
        self.replay.clone()
    }

    /// Lines read from the inputs so far (replays excluded).
    pub fn lines_read(&self) -> u64 {
        self.lines_read
    }

    /// Lines re-yielded from the replay queue so far.
    pub fn lines_replayed(&self) -> u64 {
        self.lines_replayed
    }

    fn read_line(&mut self) -> io::Result<Option<String>> {
        while let Some(input) = self.inputs.front_mut() {
            self.buf.clear();
            if input.read_until(b'\n', &mut self.buf)? == 0 {
                self.inputs.pop_front();
                continue;
            }
            if self.buf.last() == Some(&b'\n') {
                self.buf.pop();
                if self.buf.last() == Some(&b'\r') {
                    self.buf.pop();
                }
            }
            let line = String::from_utf8_lossy(&self.buf);
            return Ok(Some(truncate_chars(&line, self.max_len)));
        }
        Ok(None)
    }
}

impl Iterator for LineSource {
    type Item = io::Result<Feed>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            match self.phase {
                Phase::Replay => match self.replay.pop() {
                    Some(line) => {
                        self.lines_replayed += 1;
                        return Some(Ok(Feed::Line(line)));
                    }
                    None => self.phase = Phase::Input,
                },
                Phase::Input => match self.read_line() {
                    Ok(Some(line)) => {
                        self.lines_read += 1;
                        return Some(Ok(Feed::Line(line)));
                    }
                    Ok(None) => {
                        self.phase = Phase::AfterBoundary;
                        return Some(Ok(Feed::Boundary));
                    }
                    Err(e) => {
                        self.phase = Phase::Done;
                        return Some(Err(e));
                    }
                },
                Phase::AfterBoundary => {
                    if self.replay.is_empty() {
                        self.phase = Phase::Done;
                        return None;
                    }
                    self.phase = Phase::Replay;
                }
                Phase::Done => return None,
            }
        }
    }
}

fn truncate_chars(line: &str, max_len: usize) -> String {
    match line.char_indices().nth(max_len) {
        Some((idx, _)) => line[..idx].to_string(),
        None => line.to_string(),
    }
}
