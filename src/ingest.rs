use std::{
    fs::File,
    io::{self, BufRead, BufReader},
    path::{Path, PathBuf},
};

use thiserror::Error;

use crate::{
    features::parse_timestamp,
    types::{Event, EventStatus},
};

const COLUMNS: [&str; 4] = ["user_id", "timestamp", "status", "booked_end"];

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("data file not found at {0}")]
    NotFound(PathBuf),

    #[error("I/O error reading event log: {0}")]
    Io(#[from] io::Error),

    #[error("event log is empty")]
    MissingHeader,

    #[error("event log has no `{0}` column")]
    MissingColumn(&'static str),

    #[error("line {line}: {reason}")]
    Row { line: usize, reason: String },
}

pub fn read_events(path: &Path) -> Result<Vec<Event>, IngestError> {
    let file = File::open(path).map_err(|e| match e.kind() {
        io::ErrorKind::NotFound => IngestError::NotFound(path.to_path_buf()),
        _ => IngestError::Io(e),
    })?;
    let events = parse_events(BufReader::new(file))?;
    tracing::info!("loaded {} events from {}", events.len(), path.display());
    Ok(events)
}

/// Comma-separated log with a header row. Columns are found by name,
/// extra columns are ignored, blank lines skipped. Fields may be wrapped in
/// double quotes, which protects commas and allows `""` for a literal quote.
/// A quoted field cannot span lines.
pub fn parse_events(reader: impl BufRead) -> Result<Vec<Event>, IngestError> {
    let mut lines = reader
        .lines()
        .enumerate()
        .map(|(i, l)| l.map(|l| (i + 1, l)));

    let header = loop {
        match lines.next() {
            Some(line) => {
                let (n, line) = line?;
                if !line.trim().is_empty() {
                    break split_fields(&line)
                        .map_err(|reason| IngestError::Row { line: n, reason })?;
                }
            }
            None => return Err(IngestError::MissingHeader),
        }
    };
    let mut idx = [0usize; 4];
    for (slot, name) in idx.iter_mut().zip(COLUMNS) {
        *slot = header
            .iter()
            .position(|h| h.as_str() == name)
            .ok_or(IngestError::MissingColumn(name))?;
    }
    let [user_i, ts_i, status_i, end_i] = idx;

    let mut events = Vec::new();
    for line in lines {
        let (n, line) = line?;
        if line.trim().is_empty() {
            continue;
        }
        let row_err = |reason: String| IngestError::Row { line: n, reason };
        let fields = split_fields(&line).map_err(row_err)?;
        if fields.len() < header.len() {
            return Err(row_err(format!(
                "expected {} fields, found {}",
                header.len(),
                fields.len()
            )));
        }
        let user_id = fields[user_i].as_str();
        if user_id.is_empty() {
            return Err(row_err("empty user_id".into()));
        }
        let status: EventStatus = fields[status_i].parse().map_err(row_err)?;
        let timestamp = parse_timestamp(&fields[ts_i]).map_err(|e| row_err(e.to_string()))?;
        let booked_end = match fields[end_i].as_str() {
            "" => None,
            raw => Some(parse_timestamp(raw).map_err(|e| row_err(e.to_string()))?),
        };
        events.push(Event {
            user_id: user_id.to_string(),
            timestamp,
            status,
            booked_end,
        });
    }
    Ok(events)
}

fn split_fields(line: &str) -> Result<Vec<String>, String> {
    let mut fields = Vec::new();
    let mut chars = line.chars().peekable();
    loop {
        while chars.next_if(|c| c.is_whitespace()).is_some() {}
        let mut field = String::new();
        let more = if chars.next_if_eq(&'"').is_some() {
            loop {
                match chars.next() {
                    Some('"') if chars.next_if_eq(&'"').is_some() => field.push('"'),
                    Some('"') => break,
                    Some(c) => field.push(c),
                    None => return Err(format!("unterminated quote in field {}", fields.len() + 1)),
                }
            }
            while chars.next_if(|c| c.is_whitespace()).is_some() {}
            match chars.next() {
                None => false,
                Some(',') => true,
                Some(c) => {
                    return Err(format!(
                        "unexpected {c:?} after closing quote in field {}",
                        fields.len() + 1
                    ))
                }
            }
        } else {
            let mut more = false;
            for c in chars.by_ref() {
                if c == ',' {
                    more = true;
                    break;
                }
                field.push(c);
            }
            field.truncate(field.trim_end().len());
            more
        };
        fields.push(field);
        if !more {
            return Ok(fields);
        }
    }
}
