// src/parser.rs
use crate::event::Record;
use crate::metrics;
use anyhow::Context;
use log::{debug, error, info, warn};
use std::fs::File;
use std::io::{self, BufRead, BufReader, Lines};
use std::path::Path;
use std::str::FromStr;

pub const FIELD_COUNT: usize = 6;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("expected {FIELD_COUNT} fields, found {0}")]
    FieldCount(usize),
    #[error("invalid {field}: {value:?}")]
    InvalidField { field: &'static str, value: String },
}

fn field<T: FromStr>(name: &'static str, raw: &str) -> Result<T, ParseError> {
    raw.trim()
        .parse::<T>()
        .map_err(|_| ParseError::InvalidField { field: name, value: raw.to_string() })
}

/// `timestamp,event_type,order_id,quantity,price,direction`
pub fn parse_record(line: &str) -> Result<Record, ParseError> {
    let parts: Vec<&str> = line.trim_end_matches(['\r', '\n']).split(',').collect();
    if parts.len() != FIELD_COUNT {
        return Err(ParseError::FieldCount(parts.len()));
    }
    let timestamp: f64 = field("timestamp", parts[0])?;
    if !timestamp.is_finite() {
        return Err(ParseError::InvalidField { field: "timestamp", value: parts[0].to_string() });
    }
    Ok(Record {
        timestamp,
        event_type: field("event_type", parts[1])?,
        order_id: field("order_id", parts[2])?,
        quantity: field("quantity", parts[3])?,
        price: field("price", parts[4])?,
        direction: field("direction", parts[5])?,
    })
}

/// Iterates the well-formed records of a feed. Malformed lines are counted
/// and skipped; a read error ends the iteration.
pub struct FeedReader<R> {
    lines: Lines<R>,
    line_no: u64,
    records: u64,
    dropped: u64,
    done: bool,
}

impl FeedReader<BufReader<File>> {
    pub fn open(path: &Path) -> anyhow::Result<Self> {
        let f = File::open(path).with_context(|| format!("open feed {:?}", path))?;
        info!("reading feed {:?}", path);
        Ok(Self::new(BufReader::with_capacity(1 << 20, f)))
    }
}

impl<R: BufRead> FeedReader<R> {
    pub fn new(reader: R) -> Self {
        Self { lines: reader.lines(), line_no: 0, records: 0, dropped: 0, done: false }
    }

    #[cfg(test)]
    pub fn dropped(&self) -> u64 { self.dropped }
    #[cfg(test)]
    pub fn records(&self) -> u64 { self.records }

    fn finish(&mut self, err: Option<io::Error>) {
        self.done = true;
        match err {
            Some(e) => error!("feed read failed after line {}: {e}", self.line_no),
            None => info!("feed exhausted: lines={} records={} dropped={}", self.line_no, self.records, self.dropped),
        }
    }
}

impl<R: BufRead> Iterator for FeedReader<R> {
    type Item = Record;

    fn next(&mut self) -> Option<Record> {
        if self.done {
            return None;
        }
        loop {
            let line = match self.lines.next() {
                Some(Ok(line)) => line,
                Some(Err(e)) => {
                    self.finish(Some(e));
                    return None;
                }
                None => {
                    self.finish(None);
                    return None;
                }
            };
            self.line_no += 1;
            if line.trim().is_empty() {
                continue;
            }
            match parse_record(&line) {
                Ok(rec) => {
                    self.records += 1;
                    return Some(rec);
                }
                Err(e) => {
                    self.dropped += 1;
                    metrics::inc_records_dropped();
                    match e {
                        ParseError::FieldCount(_) => debug!("line {}: {e}", self.line_no),
                        ParseError::InvalidField { .. } => warn!("line {}: {e}", self.line_no),
                    }
                }
            }
        }
    }
}
