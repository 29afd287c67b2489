//! Wire format of the production telemetry source.
//!
//! Request: `hora:<H>,segundo:<S>`
//!
//! Response: `<name>:<production>,<factor>;...;total:<value>`, segments separated by `;`.
//! Segments without a `:` are ignored, and `total` is reserved for the aggregate.

use super::model::{Query, Reading, ReadingSet};
use std::fmt::Write as _;
use thiserror::Error;

const SEGMENT_DELIMITER: char = ';';
const NAME_DELIMITER: char = ':';
const FIELD_DELIMITER: char = ',';
const TOTAL_KEY: &str = "total";

#[derive(Debug, Error, Clone, PartialEq)]
pub enum DecodeError {
    #[error("response is not valid UTF-8: {0}")]
    InvalidUtf8(#[from] std::str::Utf8Error),

    #[error("invalid number for {field}: {value:?}")]
    InvalidNumber { field: String, value: String },

    #[error("segment {name:?} has {found} field(s), expected production and factor")]
    FieldCount { name: String, found: usize },

    #[error("response has no total segment")]
    MissingTotal,
}

pub fn encode_request(query: &Query) -> Vec<u8> {
    format!("hora:{},segundo:{}", query.hour(), query.second()).into_bytes()
}

/// Decode a response buffer. Either every segment is well-formed or nothing is returned.
pub fn decode_response(raw: &[u8]) -> Result<ReadingSet, DecodeError> {
    let text = std::str::from_utf8(raw)?;

    let mut readings = Vec::new();
    let mut total = None;

    for segment in text.split(SEGMENT_DELIMITER) {
        let Some((name, body)) = segment.split_once(NAME_DELIMITER) else {
            continue;
        };

        if name == TOTAL_KEY {
            total = Some(parse_number(TOTAL_KEY, body)?);
            continue;
        }

        let fields: Vec<&str> = body.split(FIELD_DELIMITER).collect();
        let [production, factor] = fields.as_slice() else {
            return Err(DecodeError::FieldCount {
                name: name.to_string(),
                found: fields.len(),
            });
        };

        readings.push(Reading {
            source: name.to_string(),
            production: parse_number(&format!("{name}.production"), production)?,
            factor: parse_number(&format!("{name}.factor"), factor)?,
        });
    }

    let mut set = ReadingSet::new(total.ok_or(DecodeError::MissingTotal)?);
    for reading in readings {
        set.insert(reading);
    }
    Ok(set)
}

/// Render a reading set the way the telemetry source sends it, `total` last.
pub fn encode_response(set: &ReadingSet) -> String {
    let mut out = String::new();
    for r in set.iter() {
        // Writing into a String cannot fail
        let _ = write!(out, "{}:{},{};", r.source, r.production, r.factor);
    }
    let _ = write!(out, "{TOTAL_KEY}:{}", set.total());
    out
}

fn parse_number(field: &str, value: &str) -> Result<f64, DecodeError> {
    value
        .trim()
        .parse::<f64>()
        .map_err(|_| DecodeError::InvalidNumber {
            field: field.to_string(),
            value: value.to_string(),
        })
}
