//! Gateway error taxonomy and the backend → gateway error mapping.

use crate::backend::ClientError;
use std::{fmt, io, panic::Location};
use thiserror::Error;

/// A backend failure tagged with the source location that observed it.
#[derive(Debug)]
pub struct TracedError {
    source: ClientError,
    location: &'static Location<'static>,
}

impl TracedError {
    /// Wrap `source`, recording the caller's location.
    #[track_caller]
    pub fn new(source: ClientError) -> Self {
        Self {
            source,
            location: Location::caller(),
        }
    }

    pub fn location(&self) -> &'static Location<'static> {
        self.location
    }

    pub fn inner(&self) -> &ClientError {
        &self.source
    }
}

impl fmt::Display for TracedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (at {})", self.source, self.location)
    }
}

impl std::error::Error for TracedError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.source)
    }
}

/// Coarse classification callers use to pick a protocol response.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    ResourceNotFound,
    AccessDenied,
    InvalidName,
    BackendUnavailable,
    TranslationFailure,
}

#[derive(Debug, Error)]
pub enum ObjectLayerError {
    #[error("bucket `{bucket}` not found")]
    BucketNotFound {
        bucket: String,
        #[source]
        source: Option<TracedError>,
    },
    #[error("object `{object}` not found in bucket `{bucket}`")]
    ObjectNotFound {
        bucket: String,
        object: String,
        #[source]
        source: TracedError,
    },
    #[error("access denied to `{bucket}/{object}`")]
    AccessDenied {
        bucket: String,
        object: String,
        #[source]
        source: TracedError,
    },
    #[error("bucket name `{bucket}` is invalid")]
    BucketNameInvalid {
        bucket: String,
        #[source]
        source: TracedError,
    },
    #[error("object name `{object}` is invalid in bucket `{bucket}`")]
    ObjectNameInvalid {
        bucket: String,
        object: String,
        #[source]
        source: TracedError,
    },
    #[error("backend unavailable while accessing `{bucket}/{object}`")]
    BackendUnavailable {
        bucket: String,
        object: String,
        #[source]
        source: TracedError,
    },
    #[error("cannot translate backend response for `{bucket}/{object}`: {reason}")]
    Translation {
        bucket: String,
        object: String,
        reason: String,
    },
}

impl ObjectLayerError {
    /// Local "bucket not found", raised without a backend failure behind it.
    pub fn bucket_not_found(bucket: &str) -> Self {
        Self::BucketNotFound {
            bucket: bucket.to_string(),
            source: None,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::BucketNotFound { .. } | Self::ObjectNotFound { .. } => {
                ErrorKind::ResourceNotFound
            }
            Self::AccessDenied { .. } => ErrorKind::AccessDenied,
            Self::BucketNameInvalid { .. } | Self::ObjectNameInvalid { .. } => {
                ErrorKind::InvalidName
            }
            Self::BackendUnavailable { .. } => ErrorKind::BackendUnavailable,
            Self::Translation { .. } => ErrorKind::TranslationFailure,
        }
    }

    pub fn bucket(&self) -> &str {
        match self {
            Self::BucketNotFound { bucket, .. }
            | Self::ObjectNotFound { bucket, .. }
            | Self::AccessDenied { bucket, .. }
            | Self::BucketNameInvalid { bucket, .. }
            | Self::ObjectNameInvalid { bucket, .. }
            | Self::BackendUnavailable { bucket, .. }
            | Self::Translation { bucket, .. } => bucket,
        }
    }

    /// The wrapped backend failure, if this error came from the backend.
    pub fn trace(&self) -> Option<&TracedError> {
        match self {
            Self::BucketNotFound { source, .. } => source.as_ref(),
            Self::ObjectNotFound { source, .. }
            | Self::AccessDenied { source, .. }
            | Self::BucketNameInvalid { source, .. }
            | Self::ObjectNameInvalid { source, .. }
            | Self::BackendUnavailable { source, .. } => Some(source),
            Self::Translation { .. } => None,
        }
    }

    /// Object key, or `""` for bucket-scoped errors.
    pub fn object(&self) -> &str {
        match self {
            Self::BucketNotFound { .. } | Self::BucketNameInvalid { .. } => "",
            Self::ObjectNotFound { object, .. }
            | Self::AccessDenied { object, .. }
            | Self::ObjectNameInvalid { object, .. }
            | Self::BackendUnavailable { object, .. }
            | Self::Translation { object, .. } => object,
        }
    }
}

pub type ObjectLayerResult<T> = Result<T, ObjectLayerError>;

/// Wrap a backend error with the caller's location, then classify it.
///
/// `object` is empty for bucket-scoped calls. Every `ClientError` lands on
/// exactly one variant.
#[track_caller]
pub fn to_object_err(err: ClientError, bucket: &str, object: &str) -> ObjectLayerError {
    classify(TracedError::new(err), bucket, object)
}

fn classify(traced: TracedError, bucket: &str, object: &str) -> ObjectLayerError {
    let bucket = bucket.to_string();
    let object = object.to_string();

    enum Class {
        NoBucket,
        NoObject,
        Denied,
        BadBucket,
        BadObject,
        Unavailable,
    }

    let class = match (traced.inner().code(), traced.inner()) {
        (Some("NoSuchBucket"), _) => Class::NoBucket,
        (Some("NoSuchKey" | "NoSuchObject"), _) if object.is_empty() => Class::NoBucket,
        (Some("NoSuchKey" | "NoSuchObject"), _) => Class::NoObject,
        (Some("AccessDenied"), _) => Class::Denied,
        (Some("InvalidBucketName"), _) => Class::BadBucket,
        (Some("XMinioInvalidObjectName" | "InvalidObjectName"), _) => Class::BadObject,
        (_, ClientError::Io(io_err))
            if io_err.kind() == io::ErrorKind::NotFound && !object.is_empty() =>
        {
            Class::NoObject
        }
        _ => Class::Unavailable,
    };

    match class {
        Class::NoBucket => ObjectLayerError::BucketNotFound {
            bucket,
            source: Some(traced),
        },
        Class::NoObject => ObjectLayerError::ObjectNotFound {
            bucket,
            object,
            source: traced,
        },
        Class::Denied => ObjectLayerError::AccessDenied {
            bucket,
            object,
            source: traced,
        },
        Class::BadBucket => ObjectLayerError::BucketNameInvalid {
            bucket,
            source: traced,
        },
        Class::BadObject => ObjectLayerError::ObjectNameInvalid {
            bucket,
            object,
            source: traced,
        },
        Class::Unavailable => ObjectLayerError::BackendUnavailable {
            bucket,
            object,
            source: traced,
        },
    }
}
