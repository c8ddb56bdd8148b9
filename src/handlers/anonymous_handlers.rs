//! HTTP handlers for anonymous bucket and object reads.
//! Object bodies are streamed through a pipe so they are never buffered
//! whole; everything else is delegated to `AnonGateway`.

use crate::{
    errors::AppError,
    gateway::AnonGateway,
    models::{list::ListObjectsInfo, object::ObjectInfo},
};
use axum::{
    body::Body,
    extract::{Path, Query, State},
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::Response,
};
use chrono::SecondsFormat;
use serde::Deserialize;
use tokio_util::io::ReaderStream;

/// Pipe capacity between the backend copy and the response body.
const STREAM_BUFFER_SIZE: usize = 64 * 1024;
const DEFAULT_MAX_KEYS: usize = 1000;

/// Query params accepted by ListObjects (v1).
#[derive(Debug, Deserialize)]
pub struct ListObjectsQuery {
    pub prefix: Option<String>,
    pub marker: Option<String>,
    pub delimiter: Option<String>,
    #[serde(rename = "max-keys")]
    pub max_keys: Option<usize>,
}

/// A parsed HTTP `Range` header.
#[derive(Debug, PartialEq, Eq)]
pub enum RangeSpec {
    /// bytes=X-Y or bytes=X- (from X to Y or to end)
    FromTo(u64, u64),
    /// bytes=-Y (last Y bytes)
    SuffixLength(u64),
}

/// Parse a single-range `bytes=` header.
///
/// Returns `None` for anything that is not one well-formed byte range
/// (multiple ranges included); such headers are ignored and the whole object
/// is served.
pub fn parse_range_header(header: &str) -> Option<RangeSpec> {
    let range = header.trim().strip_prefix("bytes=")?;
    if range.contains(',') {
        return None;
    }
    let (start, end) = range.split_once('-')?;
    let (start, end) = (start.trim(), end.trim());

    if start.is_empty() {
        return end.parse().ok().map(RangeSpec::SuffixLength);
    }

    let start: u64 = start.parse().ok()?;
    let end: u64 = if end.is_empty() {
        u64::MAX
    } else {
        end.parse().ok()?
    };
    if end < start {
        return None;
    }

    Some(RangeSpec::FromTo(start, end))
}

/// Resolve a range against an object of `size` bytes into
/// `(start_offset, length)`.
pub fn resolve_range(spec: &RangeSpec, size: u64) -> Result<(u64, u64), AppError> {
    let unsatisfiable = || AppError::invalid_range("The requested range is not satisfiable");

    match *spec {
        RangeSpec::FromTo(start, end) => {
            if start >= size {
                return Err(unsatisfiable());
            }
            let end = end.min(size - 1);
            Ok((start, end - start + 1))
        }
        RangeSpec::SuffixLength(n) => {
            if n == 0 || size == 0 {
                return Err(unsatisfiable());
            }
            let length = n.min(size);
            Ok((size - length, length))
        }
    }
}

/// GET `/{bucket}/{*key}` — whole object, or one `Range`.
pub async fn get_object(
    State(gateway): State<AnonGateway>,
    Path((bucket, key)): Path<(String, String)>,
    headers: HeaderMap,
) -> Result<Response, AppError> {
    let info = gateway.anon_get_object_info(&bucket, &key).await?;

    let range = match headers.get(header::RANGE) {
        Some(value) => match value.to_str().ok().and_then(parse_range_header) {
            Some(spec) => Some(resolve_range(&spec, info.size)?),
            None => {
                tracing::debug!(bucket = %bucket, key = %key, "ignoring unusable Range header");
                None
            }
        },
        None => None,
    };
    let (start_offset, length) = range.unwrap_or((0, info.size));

    let object = gateway.anon_open_object(&bucket, &key, start_offset).await?;

    let (mut writer, reader) = tokio::io::duplex(STREAM_BUFFER_SIZE);
    tokio::spawn(async move {
        if let Err(err) =
            AnonGateway::anon_copy_object(object, &bucket, &key, length, &mut writer).await
        {
            tracing::warn!(
                bucket = %bucket,
                key = %key,
                "object stream ended early: {}",
                err
            );
        }
    });

    let mut response = Response::new(Body::from_stream(ReaderStream::new(reader)));
    set_object_headers(response.headers_mut(), &info, length);

    if range.is_some() {
        *response.status_mut() = StatusCode::PARTIAL_CONTENT;
        let content_range = format!(
            "bytes {}-{}/{}",
            start_offset,
            start_offset + length - 1,
            info.size
        );
        if let Ok(value) = HeaderValue::from_str(&content_range) {
            response.headers_mut().insert(header::CONTENT_RANGE, value);
        }
    } else {
        *response.status_mut() = StatusCode::OK;
    }

    Ok(response)
}

/// HEAD `/{bucket}/{*key}` — same headers as GET but no body.
pub async fn head_object(
    State(gateway): State<AnonGateway>,
    Path((bucket, key)): Path<(String, String)>,
) -> Result<Response, AppError> {
    let info = gateway.anon_get_object_info(&bucket, &key).await?;
    let mut response = Response::new(Body::empty());
    *response.status_mut() = StatusCode::OK;
    set_object_headers(response.headers_mut(), &info, info.size);

    Ok(response)
}

/// GET `/{bucket}` — list objects, supports ?prefix=&marker=&delimiter=&max-keys=
pub async fn list_objects(
    State(gateway): State<AnonGateway>,
    Path(bucket): Path<String>,
    Query(q): Query<ListObjectsQuery>,
) -> Result<Response, AppError> {
    let prefix = q.prefix.unwrap_or_default();
    let marker = q.marker.unwrap_or_default();
    let delimiter = q.delimiter.unwrap_or_default();
    let max_keys = q.max_keys.unwrap_or(DEFAULT_MAX_KEYS);
    if max_keys == 0 {
        return Err(AppError::invalid_argument("max-keys must be positive"));
    }

    let result = gateway
        .anon_list_objects(&bucket, &prefix, &marker, &delimiter, max_keys)
        .await?;
    let xml = build_list_objects_xml(&bucket, &prefix, &marker, &delimiter, max_keys, &result);

    let mut response = Response::new(Body::from(xml));
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/xml"),
    );
    *response.status_mut() = StatusCode::OK;
    Ok(response)
}

/// HEAD `/{bucket}` — 200 when the bucket exists and is listed.
pub async fn head_bucket(
    State(gateway): State<AnonGateway>,
    Path(bucket): Path<String>,
) -> Result<StatusCode, AppError> {
    let info = gateway.anon_get_bucket_info(&bucket).await?;
    tracing::debug!(bucket = %info.name, created = %info.created, "bucket found");
    Ok(StatusCode::OK)
}

fn set_object_headers(headers: &mut HeaderMap, info: &ObjectInfo, length: u64) {
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_str(&info.content_type)
            .unwrap_or_else(|_| HeaderValue::from_static("application/octet-stream")),
    );

    headers.insert(header::CONTENT_LENGTH, HeaderValue::from(length));
    headers.insert(header::ACCEPT_RANGES, HeaderValue::from_static("bytes"));

    if !info.etag.is_empty() {
        let quoted = format!("\"{}\"", info.etag);
        if let Ok(value) = HeaderValue::from_str(&quoted) {
            headers.insert(header::ETAG, value);
        }
    }

    if let Ok(value) = HeaderValue::from_str(&info.mod_time.to_rfc2822()) {
        headers.insert(header::LAST_MODIFIED, value);
    }
}

fn build_list_objects_xml(
    bucket: &str,
    prefix: &str,
    marker: &str,
    delimiter: &str,
    max_keys: usize,
    result: &ListObjectsInfo,
) -> String {
    let mut xml = String::from(
        r#"<?xml version="1.0" encoding="UTF-8"?><ListBucketResult xmlns="http://s3.amazonaws.com/doc/2006-03-01/">"#,
    );
    xml.push_str(&format!("<Name>{}</Name>", xml_escape(bucket)));
    xml.push_str(&format!("<Prefix>{}</Prefix>", xml_escape(prefix)));
    xml.push_str(&format!("<Marker>{}</Marker>", xml_escape(marker)));
    xml.push_str(&format!("<MaxKeys>{}</MaxKeys>", max_keys));
    if !delimiter.is_empty() {
        xml.push_str(&format!("<Delimiter>{}</Delimiter>", xml_escape(delimiter)));
    }
    xml.push_str(&format!(
        "<IsTruncated>{}</IsTruncated>",
        if result.is_truncated { "true" } else { "false" }
    ));
    if result.is_truncated && !result.next_marker.is_empty() {
        xml.push_str(&format!(
            "<NextMarker>{}</NextMarker>",
            xml_escape(&result.next_marker)
        ));
    }

    for obj in &result.objects {
        xml.push_str("<Contents>");
        xml.push_str(&format!("<Key>{}</Key>", xml_escape(&obj.name)));
        xml.push_str(&format!(
            "<LastModified>{}</LastModified>",
            obj.mod_time.to_rfc3339_opts(SecondsFormat::Millis, true)
        ));
        xml.push_str(&format!("<ETag>\"{}\"</ETag>", xml_escape(&obj.etag)));
        xml.push_str(&format!("<Size>{}</Size>", obj.size));
        xml.push_str("<StorageClass>STANDARD</StorageClass>");
        xml.push_str("</Contents>");
    }

    for prefix in &result.prefixes {
        xml.push_str("<CommonPrefixes><Prefix>");
        xml.push_str(&xml_escape(prefix));
        xml.push_str("</Prefix></CommonPrefixes>");
    }

    xml.push_str("</ListBucketResult>");
    xml
}

fn xml_escape(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}
