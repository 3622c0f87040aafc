// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Structured cache events emitted through `tracing`.

use std::time::Duration;

use crate::cache::CacheName;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CacheOperation {
    Get,
    Insert,
    Invalidate,
    Clear,
}

impl CacheOperation {
    pub(crate) fn as_str(self) -> &'static str {
        match self {
            Self::Get => "cache.get",
            Self::Insert => "cache.insert",
            Self::Invalidate => "cache.invalidate",
            Self::Clear => "cache.clear",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CacheActivity {
    Hit,
    Miss,
    /// Waited on a producer another caller started.
    Joined,
    Expired,
    Inserted,
    Invalidated,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Severity {
    Debug,
    Info,
    Warn,
}

impl CacheActivity {
    pub(crate) fn as_str(self) -> &'static str {
        match self {
            Self::Hit => "cache.hit",
            Self::Miss => "cache.miss",
            Self::Joined => "cache.joined",
            Self::Expired => "cache.expired",
            Self::Inserted => "cache.inserted",
            Self::Invalidated => "cache.invalidated",
            Self::Error => "cache.error",
        }
    }

    fn severity(self) -> Severity {
        match self {
            Self::Hit | Self::Miss | Self::Joined => Severity::Debug,
            Self::Expired | Self::Inserted | Self::Invalidated => Severity::Info,
            Self::Error => Severity::Warn,
        }
    }
}

pub(crate) fn record(cache_name: CacheName, operation: CacheOperation, activity: CacheActivity, duration: Option<Duration>) {
    let op = operation.as_str();
    let ev = activity.as_str();
    let duration_ns = duration.map(|d| d.as_nanos());

    // Tracing level must be constant, so a macro picks the call per severity.
    macro_rules! emit_event {
        ($level:ident) => {
            tracing::$level!(
                cache.name = cache_name,
                cache.operation = op,
                cache.activity = ev,
                cache.duration_ns = ?duration_ns,
                "cache.event"
            )
        };
    }

    match activity.severity() {
        Severity::Warn => emit_event!(warn),
        Severity::Info => emit_event!(info),
        Severity::Debug => emit_event!(debug),
    }
}

#[cfg(test)]
mod tests {
    use heighliner_testing::LogCapture;

    use super::*;

    #[test]
    fn operation_names() {
        assert_eq!(CacheOperation::Get.as_str(), "cache.get");
        assert_eq!(CacheOperation::Insert.as_str(), "cache.insert");
        assert_eq!(CacheOperation::Invalidate.as_str(), "cache.invalidate");
        assert_eq!(CacheOperation::Clear.as_str(), "cache.clear");
    }

    #[test]
    fn record_contains_all_fields_and_values() {
        let capture = LogCapture::new();
        let _guard = tracing::subscriber::set_default(capture.subscriber());

        record("rock", CacheOperation::Get, CacheActivity::Error, Some(Duration::from_nanos(12345)));

        capture.assert_contains("cache.name");
        capture.assert_contains("cache.operation");
        capture.assert_contains("cache.activity");
        capture.assert_contains("cache.duration_ns");
        capture.assert_contains("cache.event");
        capture.assert_contains("rock");
        capture.assert_contains("cache.error");
        capture.assert_contains("12345");
    }

    #[test]
    fn record_uses_activity_severity() {
        let capture = LogCapture::new();
        let _guard = tracing::subscriber::set_default(capture.subscriber());
        record("rock", CacheOperation::Get, CacheActivity::Error, None);
        capture.assert_contains("WARN");

        let capture = LogCapture::new();
        let _guard = tracing::subscriber::set_default(capture.subscriber());
        record("rock", CacheOperation::Get, CacheActivity::Expired, None);
        capture.assert_contains("INFO");

        let capture = LogCapture::new();
        let _guard = tracing::subscriber::set_default(capture.subscriber());
        record("rock", CacheOperation::Get, CacheActivity::Joined, None);
        capture.assert_contains("DEBUG");
    }
}
