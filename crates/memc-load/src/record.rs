//! Installed-apps log line parser
//!
//! # Line Format
//! Five tab-separated columns, after trimming whitespace around the line:
//!
//! ```text
//! dev_type \t dev_id \t lat \t lon \t app_id,app_id,...
//! idfa     \t 1rfw452y52g2gq4g \t 55.55 \t 42.42 \t 1423,43,567,3,7,23
//! ```
//!
//! Column count and device type/id are structural: a line failing them is
//! rejected. Coordinates and app ids are soft: a bad value is defaulted or
//! dropped and reported as a [`FieldWarning`], and the line still parses.

use std::fmt;

use crate::error::ParseError;

const FIELD_COUNT: usize = 5;

/// One parsed log line
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    dev_type: String,
    dev_id: String,
    pub lat: f64,
    pub lon: f64,
    pub apps: Vec<u32>,
}

impl Record {
    pub fn dev_type(&self) -> &str {
        &self.dev_type
    }

    pub fn dev_id(&self) -> &str {
        &self.dev_id
    }
}

/// Data-quality problem that did not fail the line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldWarning {
    /// Latitude was not a number and was replaced with 0.0
    InvalidLatitude(String),
    /// Longitude was not a number and was replaced with 0.0
    InvalidLongitude(String),
    /// App id token was not an unsigned 32-bit integer and was dropped
    InvalidAppId(String),
}

impl fmt::Display for FieldWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldWarning::InvalidLatitude(v) => write!(f, "invalid latitude `{}`", v),
            FieldWarning::InvalidLongitude(v) => write!(f, "invalid longitude `{}`", v),
            FieldWarning::InvalidAppId(v) => write!(f, "invalid app id `{}`", v),
        }
    }
}

/// A successfully parsed line plus any soft field warnings
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedLine {
    pub record: Record,
    pub warnings: Vec<FieldWarning>,
}

/// Parse one raw line
///
/// Pure: warnings are returned for the caller to log.
pub fn parse_line(line: &str) -> Result<ParsedLine, ParseError> {
    let fields: Vec<&str> = line.trim().split('\t').collect();
    if fields.len() != FIELD_COUNT {
        return Err(ParseError::MalformedLine(fields.len()));
    }

    let dev_type = fields[0].trim();
    let dev_id = fields[1].trim();

    if dev_id.is_empty() {
        return Err(ParseError::MissingDeviceId);
    }
    if dev_type.is_empty() {
        return Err(ParseError::MissingDeviceType);
    }

    let mut warnings = Vec::new();

    let lat = parse_coordinate(fields[2]).unwrap_or_else(|| {
        warnings.push(FieldWarning::InvalidLatitude(fields[2].to_string()));
        0.0
    });
    let lon = parse_coordinate(fields[3]).unwrap_or_else(|| {
        warnings.push(FieldWarning::InvalidLongitude(fields[3].to_string()));
        0.0
    });

    let mut apps = Vec::new();
    for token in fields[4].split(',').map(str::trim).filter(|t| !t.is_empty()) {
        match token.parse::<u32>() {
            Ok(app) => apps.push(app),
            Err(_) => warnings.push(FieldWarning::InvalidAppId(token.to_string())),
        }
    }

    Ok(ParsedLine {
        record: Record {
            dev_type: dev_type.to_string(),
            dev_id: dev_id.to_string(),
            lat,
            lon,
            apps,
        },
        warnings,
    })
}

fn parse_coordinate(raw: &str) -> Option<f64> {
    raw.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}
