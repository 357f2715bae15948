use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::Path;

use anyhow::Result;

/// Unified capture reader handling both file and pipe input.
pub struct InputReader {
    reader: Box<dyn Read>,
    length: Option<u64>,
}

impl InputReader {
    /// Open the given path for reading. Use "-" for stdin pipe input.
    pub fn new<P: AsRef<Path>>(input_path: P) -> Result<Self> {
        let path = input_path.as_ref();

        if path.to_string_lossy() == "-" {
            return Ok(Self {
                reader: Box::new(io::stdin().lock()),
                length: None,
            });
        }

        let file = File::open(path)?;
        let length = file.metadata().ok().map(|m| m.len());

        Ok(Self {
            reader: Box::new(BufReader::new(file)),
            length,
        })
    }

    /// Total input size in bytes, when known (files only).
    pub fn length(&self) -> Option<u64> {
        self.length
    }

    /// Drive `callback` with consecutive chunks of input until EOF or
    /// until the callback returns `Ok(false)`.
    pub fn process_chunks<F>(&mut self, chunk_size: usize, mut callback: F) -> Result<()>
    where
        F: FnMut(&[u8]) -> Result<bool>,
    {
        let mut buffer = vec![0u8; chunk_size];

        loop {
            let bytes_read = self.reader.read(&mut buffer)?;
            if bytes_read == 0 {
                break;
            }

            if !callback(&buffer[..bytes_read])? {
                break;
            }
        }

        Ok(())
    }
}

impl Read for InputReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.reader.read(buf)
    }
}
