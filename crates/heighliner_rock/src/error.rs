// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::path::PathBuf;

use heighliner_cache::{EncodingError, ProducerError};
use http::StatusCode;

use crate::transport::TransportError;

/// Convenience alias for results of Rock operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised while talking to Rock or translating its records.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// One of the base URL, token name or token is empty.
    #[error("Rock api credentials are missing")]
    MissingCredentials,

    /// The settings document could not be read.
    #[error("cannot read Rock settings from {}", .path.display())]
    ReadSettings {
        /// The file that was read.
        path: PathBuf,
        /// The underlying I/O failure.
        #[source]
        source: std::io::Error,
    },

    /// The settings document is not valid.
    #[error("invalid Rock settings")]
    InvalidSettings(#[source] serde_json::Error),

    /// The request could not be built, usually because the endpoint is not a valid URI.
    #[error("invalid Rock request")]
    Request(#[from] http::Error),

    /// The request did not produce a response.
    #[error("Rock request failed")]
    Transport(#[from] TransportError),

    /// Rock answered with a status outside `2xx`.
    #[error("Rock responded with {} {status_text}", .status.as_u16())]
    Status {
        /// The response status.
        status: StatusCode,
        /// The canonical reason phrase of `status`, empty if it has none.
        status_text: String,
    },

    /// A request body could not be serialized or a response body could not be decoded.
    #[error("Rock exchanged a body that is not the expected JSON")]
    Json(#[source] serde_json::Error),

    /// Request parameters could not be turned into a cache key.
    #[error(transparent)]
    Encoding(#[from] EncodingError),

    /// A read this call joined failed in another caller.
    ///
    /// The failure is shared by every caller that waited on the same read; look at the
    /// source (or use [`Error::status`]) for the underlying error.
    #[error(transparent)]
    Shared(ProducerError),

    /// A payment gateway record could not be translated.
    #[error("cannot translate NMI transaction: {0}")]
    Translate(String),
}

impl Error {
    /// The HTTP status Rock answered with, if this error (or the shared error it wraps)
    /// is a [`Error::Status`].
    #[must_use]
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Self::Status { status, .. } => Some(*status),
            Self::Shared(shared) => shared.downcast_ref::<Self>().and_then(Self::status),
            _ => None,
        }
    }
}

impl From<heighliner_cache::Error> for Error {
    fn from(error: heighliner_cache::Error) -> Self {
        match error {
            heighliner_cache::Error::Producer(shared) => Self::Shared(shared),
            heighliner_cache::Error::Encoding(encoding) => Self::Encoding(encoding),
        }
    }
}
