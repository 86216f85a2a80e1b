//! Newline-delimited event input.
//!
//! Each non-empty line is one already serialized event. A trailing `\r`
//! is stripped so CRLF input behaves like LF input.

use std::path::Path;
use std::pin::Pin;

use anyhow::Result;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader, Lines};

use evfwd_output::EventRecord;

use crate::cli::STDIN_INPUT;

/// Boxed reader for file or stdin input.
pub type InputReader = Pin<Box<dyn AsyncRead + Send>>;

/// Open `path` for reading, or standard input when it is `-`.
pub async fn open_input(path: &str) -> Result<InputReader> {
    if path == STDIN_INPUT {
        return Ok(Box::pin(tokio::io::stdin()));
    }
    let file = tokio::fs::File::open(Path::new(path))
        .await
        .map_err(|e| anyhow::anyhow!("failed to open input '{}': {}", path, e))?;
    Ok(Box::pin(file))
}

/// Turns input lines into [`EventRecord`]s.
pub struct LineSource<R> {
    lines: Lines<BufReader<R>>,
    routing_key: Option<String>,
    lines_read: u64,
    skipped: u64,
}

impl<R: AsyncRead + Unpin> LineSource<R> {
    pub fn new(reader: R) -> Self {
        Self {
            lines: BufReader::new(reader).lines(),
            routing_key: None,
            lines_read: 0,
            skipped: 0,
        }
    }

    /// Attach `key` to every record produced.
    pub fn with_routing_key(mut self, key: Option<String>) -> Self {
        self.routing_key = key.filter(|k| !k.is_empty());
        self
    }

    /// Next record, or `None` at end of input.
    ///
    /// Cancel safe: no line is lost if the future is dropped before completion.
    pub async fn next_record(&mut self) -> Result<Option<EventRecord>> {
        loop {
            let Some(line) = self
                .lines
                .next_line()
                .await
                .map_err(|e| anyhow::anyhow!("failed to read input: {}", e))?
            else {
                return Ok(None);
            };
            self.lines_read += 1;

            let text = line.strip_suffix('\r').unwrap_or(&line);
            if text.trim().is_empty() {
                self.skipped += 1;
                continue;
            }

            let record = EventRecord::new(text.to_owned());
            return Ok(Some(match &self.routing_key {
                Some(key) => record.with_routing_key(key.clone()),
                None => record,
            }));
        }
    }

    /// Lines consumed so far, blank ones included.
    pub fn lines_read(&self) -> u64 {
        self.lines_read
    }

    /// Blank lines skipped so far.
    pub fn skipped(&self) -> u64 {
        self.skipped
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn collect(input: &'static [u8], key: Option<&str>) -> Vec<EventRecord> {
        let mut source = LineSource::new(input).with_routing_key(key.map(str::to_owned));
        let mut out = Vec::new();
        while let Some(record) = source.next_record().await.unwrap() {
            out.push(record);
        }
        out
    }

    #[tokio::test]
    async fn skips_blank_lines() {
        let records = collect(b"{\"a\":1}\n\n   \n{\"b\":2}\n", None).await;
        let texts: Vec<&[u8]> = records.iter().map(|r| r.text().as_ref()).collect();
        assert_eq!(texts, vec![&b"{\"a\":1}"[..], &b"{\"b\":2}"[..]]);
    }

    #[tokio::test]
    async fn strips_carriage_return() {
        let records = collect(b"one\r\ntwo\r\n", None).await;
        assert_eq!(records[0].text().as_ref(), b"one");
        assert_eq!(records[1].text().as_ref(), b"two");
    }

    #[tokio::test]
    async fn last_line_without_newline_is_read() {
        let records = collect(b"first\nlast", None).await;
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].text().as_ref(), b"last");
    }

    #[tokio::test]
    async fn routing_key_is_attached() {
        let records = collect(b"x\ny\n", Some("watchlist.hit")).await;
        assert!(records.iter().all(|r| r.routing_key() == Some("watchlist.hit")));

        let records = collect(b"x\n", Some("")).await;
        assert_eq!(records[0].routing_key(), None);
    }

    #[tokio::test]
    async fn counts_lines() {
        let mut source = LineSource::new(&b"a\n\nb\n"[..]);
        while source.next_record().await.unwrap().is_some() {}
        assert_eq!(source.lines_read(), 3);
        assert_eq!(source.skipped(), 1);
    }

    #[tokio::test]
    async fn missing_input_file_fails() {
        let err = open_input("/nonexistent-evfwd/input.ndjson").await.err().unwrap();
        assert!(err.to_string().contains("failed to open input"));
    }
}
