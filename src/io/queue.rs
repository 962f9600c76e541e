//! Channel-backed byte stream feeding the XML reader.

use std::io::{self, BufRead, Read};
use std::sync::mpsc::Receiver;

/// Adapts the bounded input channel to `BufRead` so the XML reader can
/// pull bytes across chunk boundaries transparently. An empty chunk (or a
/// disconnected sender) ends the stream. Consumed bytes are counted into a
/// line/column position for error reporting.
#[derive(Debug)]
pub struct ChunkStream {
    input: Receiver<Vec<u8>>,
    chunk: Vec<u8>,
    pos: usize,
    done: bool,
    line: u64,
    column: u64,
}

impl ChunkStream {
    pub fn new(input: Receiver<Vec<u8>>) -> ChunkStream {
        ChunkStream {
            input,
            chunk: Vec::new(),
            pos: 0,
            done: false,
            line: 1,
            column: 0,
        }
    }

    /// 1-based line of the last consumed byte.
    pub fn line(&self) -> u64 {
        self.line
    }

    /// Column within the current line, in bytes.
    pub fn column(&self) -> u64 {
        self.column
    }
}

impl Read for ChunkStream {
    fn read(&mut self, out: &mut [u8]) -> io::Result<usize> {
        let available = self.fill_buf()?;
        let n = available.len().min(out.len());
        out[..n].copy_from_slice(&available[..n]);
        self.consume(n);
        Ok(n)
    }
}

impl BufRead for ChunkStream {
    fn fill_buf(&mut self) -> io::Result<&[u8]> {
        while self.pos >= self.chunk.len() && !self.done {
            match self.input.recv() {
                Ok(chunk) if chunk.is_empty() => self.done = true,
                Ok(chunk) => {
                    self.chunk = chunk;
                    self.pos = 0;
                }
                // a vanished producer ends the stream like an empty chunk
                Err(_) => self.done = true,
            }
        }
        if self.pos >= self.chunk.len() {
            return Ok(&[]);
        }
        Ok(&self.chunk[self.pos..])
    }

    fn consume(&mut self, amt: usize) {
        for byte in &self.chunk[self.pos..self.pos + amt] {
            if *byte == b'\n' {
                self.line += 1;
                self.column = 0;
            } else {
                self.column += 1;
            }
        }
        self.pos += amt;
    }
}
