use std::{fmt, path::PathBuf};

use reqwest::StatusCode;
use thiserror::Error;

use crate::timestamp::Timestamp;

/// Why a single history action was not turned into a [crate::action::NodeAction]. The batch always continues.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum DecodeError {
    #[error(
        "chain producerjson action data @{timestamp} could not be decoded as JSON, actor={actor}: {reason}"
    )]
    MalformedPayload {
        owner: String,
        actor: String,
        timestamp: Timestamp,
        reason: String,
    },
    #[error("unknown action name ({kind}) is present @{timestamp}")]
    UnknownActionKind {
        owner: String,
        kind: String,
        timestamp: Timestamp,
    },
    #[error("history entry #{index} could not be decoded: {reason}")]
    MalformedEntry { index: usize, reason: String },
}

impl DecodeError {
    /// The producer the failed action belongs to, when that much could be read.
    pub fn owner(&self) -> Option<&str> {
        match self {
            DecodeError::MalformedPayload { owner, .. }
            | DecodeError::UnknownActionKind { owner, .. } => Some(owner),
            DecodeError::MalformedEntry { .. } => None,
        }
    }
}

/// Failure to obtain an external artifact, either over the network or from a local cache file.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("{url}: {source}")]
    Http {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("{url}: HTTP status {status}")]
    Status { url: String, status: StatusCode },
    #[error("{url}: {reason}")]
    Response { url: String, reason: String },
    #[error("{}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("{} could not be decoded as JSON: {source}", .path.display())]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

impl FetchError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        FetchError::Io {
            path: path.into(),
            source,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, FetchError::Io { source, .. } if source.kind() == std::io::ErrorKind::NotFound)
    }
}

/// Which copy of a producer's bp.json a warning refers to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Source {
    Chain,
    Url,
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Source::Chain => "chain",
            Source::Url => "url",
        })
    }
}

/// A missing or malformed field. Reported, never blocks output generation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StructuralWarning {
    MissingProducerFields {
        owner: String,
        fields: Vec<&'static str>,
    },
    InvalidCountryCode {
        owner: String,
        location: String,
    },
    MissingLocation {
        source: Source,
        owner: String,
    },
    MissingCoordinate {
        source: Source,
        owner: String,
        coordinate: &'static str,
        location: String,
    },
}

impl StructuralWarning {
    /// Regenerating which cache would fix this, as the CLI flag that forces it.
    pub fn regenerate_flag(&self) -> &'static str {
        match self {
            StructuralWarning::MissingProducerFields { .. }
            | StructuralWarning::InvalidCountryCode { .. } => "-p",
            StructuralWarning::MissingLocation { .. }
            | StructuralWarning::MissingCoordinate { .. } => "-b",
        }
    }
}

impl fmt::Display for StructuralWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StructuralWarning::MissingProducerFields { owner, fields } => {
                write!(
                    f,
                    "producer {owner} does not have a setting for {}",
                    fields.join(", ")
                )
            }
            StructuralWarning::InvalidCountryCode { owner, location } => write!(
                f,
                "producer {owner} has an invalid value {location} for a country code (see ISO3166)"
            ),
            StructuralWarning::MissingLocation { source, owner } => {
                write!(f, "{source} bp.json of {owner} has a node without a location")
            }
            StructuralWarning::MissingCoordinate {
                source,
                owner,
                coordinate,
                location,
            } => write!(
                f,
                "{source} bp.json of {owner} does not have a {coordinate} for location {location}"
            ),
        }
    }
}
