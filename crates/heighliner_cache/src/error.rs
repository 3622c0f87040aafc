// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Error types for cache operations.

use std::{fmt, sync::Arc};

use crate::encode::EncodingError;

/// A specialized [`Result`] type for cache operations.
pub type Result<T> = std::result::Result<T, Error>;

/// An error from a cache operation.
///
/// Neither variant leaves anything behind in the cache: a later call for the same key
/// starts over.
#[derive(Clone, Debug, thiserror::Error)]
pub enum Error {
    /// The producer for a missed key failed. Every caller that waited on that producer
    /// receives a clone of the same error.
    #[error(transparent)]
    Producer(#[from] ProducerError),

    /// A cache key could not be built from the request parameters.
    #[error(transparent)]
    Encoding(#[from] EncodingError),
}

impl Error {
    /// Returns the producer error, if this is one.
    #[must_use]
    pub fn as_producer(&self) -> Option<&ProducerError> {
        match self {
            Self::Producer(error) => Some(error),
            Self::Encoding(_) => None,
        }
    }
}

/// The error a producer returned, shared between every waiter of one execution.
///
/// The original error is kept intact and can be recovered with
/// [`downcast_ref`](Self::downcast_ref) or [`std::error::Error::source`].
///
/// # Examples
///
/// ```
/// use heighliner_cache::ProducerError;
///
/// let error = ProducerError::new(std::io::Error::other("connection reset"));
/// let shared = error.clone();
///
/// assert!(shared.downcast_ref::<std::io::Error>().is_some());
/// assert_eq!(error.to_string(), "producer failed: connection reset");
/// ```
#[derive(Clone)]
pub struct ProducerError {
    inner: Arc<dyn std::error::Error + Send + Sync>,
}

impl ProducerError {
    /// Wraps a producer failure.
    pub fn new(error: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        Self {
            inner: Arc::from(error.into()),
        }
    }

    /// Attempts to view the original error as `E`.
    #[must_use]
    pub fn downcast_ref<E>(&self) -> Option<&E>
    where
        E: std::error::Error + 'static,
    {
        self.inner.downcast_ref::<E>()
    }

    /// Returns `true` if both handles refer to the same failure.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for ProducerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ProducerError").field(&self.inner).finish()
    }
}

impl fmt::Display for ProducerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "producer failed: {}", self.inner)
    }
}

impl std::error::Error for ProducerError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&*self.inner)
    }
}
