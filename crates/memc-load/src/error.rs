//! Error types for the loader
//!
//! Per-record errors (`ParseError`, `EncodeError`, `StoreError`, unroutable
//! device types) are absorbed by the worker that hits them and only show up
//! as counters. `FileError` is the one error that escapes a file's pipeline.

use std::path::PathBuf;
use thiserror::Error;

use crate::stats::FileResult;

/// Structural failure of a single input line
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("malformed line: expected 5 tab-separated fields, got {0}")]
    MalformedLine(usize),

    #[error("empty device type is not allowed")]
    MissingDeviceType,

    #[error("empty device id is not allowed")]
    MissingDeviceId,
}

/// Failure turning a parsed record into a store write
#[derive(Error, Debug)]
pub enum EncodeError {
    #[error("invalid store key `{key}`: {reason}")]
    InvalidKey { key: String, reason: &'static str },

    #[error("payload serialization failed: {0}")]
    Serialize(#[from] memc_common::CommonError),
}

/// Failure writing to a store partition, after retries are exhausted
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("connection to {addr} failed: {source}")]
    Connect {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("I/O with {addr} failed: {source}")]
    Io {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("request to {addr} timed out after {timeout_ms}ms")]
    Timeout { addr: String, timeout_ms: u64 },

    #[error("{addr} rejected write: {response}")]
    Rejected { addr: String, response: String },
}

/// File-level failure; the file is reported and left unmarked
#[derive(Error, Debug)]
pub enum FileError {
    #[error("cannot open {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot read {path} after {} lines: {source}", .partial.lines_read)]
    Read {
        path: PathBuf,
        /// Counts of the lines handled before the input broke off
        partial: FileResult,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot mark {path} as processed: {source}")]
    Rename {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("worker for {path} crashed: {message}")]
    WorkerPanicked { path: PathBuf, message: String },
}

/// Invalid loader configuration
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("{0} must be greater than 0")]
    Zero(&'static str),

    #[error("{what} must be below {limit}, got {value}")]
    TooMany {
        what: &'static str,
        limit: usize,
        value: usize,
    },

    #[error("error threshold must be within (0, 1], got {0}")]
    Threshold(f64),

    #[error("no partition routes configured")]
    NoRoutes,

    #[error("invalid partition route `{0}`: {1}")]
    Route(String, &'static str),

    #[error("invalid file pattern: {0}")]
    Pattern(#[from] regex::Error),
}

impl FileError {
    /// Work already committed for the file, when the failure came mid-stream
    pub fn partial_result(&self) -> Option<&FileResult> {
        match self {
            FileError::Read { partial, .. } => Some(partial),
            _ => None,
        }
    }
}
