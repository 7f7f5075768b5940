//! S3-compatible object store source.
//!
//! Lists a bucket (optionally below a key prefix) with `ListObjectsV2`. Object
//! content is never downloaded: the entity tag returned by the listing stands
//! in for the content digest. For single-part uploads that is the MD5 of the
//! content, for multipart uploads it is not, so the same bytes uploaded two
//! different ways won't be recognised as duplicates.
//!
//! # Credentials
//!
//! Credentials are provided explicitly via the configuration file, the same
//! way for AWS S3, Backblaze B2, MinIO and friends.

use super::{Source, WalkStream, Walked};
use crate::error::{ErrorKind, Result};
use crate::models::{ObjectInfo, Origin};
use async_stream::stream;
use async_trait::async_trait;
use aws_sdk_s3::config::http::HttpResponse;
use aws_sdk_s3::error::{DisplayErrorContext, SdkError};
use aws_sdk_s3::operation::list_objects_v2::ListObjectsV2Error;
use aws_sdk_s3::{
    Client,
    config::{BehaviorVersion, Credentials, Region, retry::RetryConfig},
    primitives::DateTime,
    types::Object,
};
use exn::ResultExt;
use std::fmt::{Debug, Formatter};
use std::path::PathBuf;
use time::OffsetDateTime;

/// Connection settings shared by every S3 root.
#[derive(Clone)]
pub struct S3Credentials {
    /// AWS region or provider-specific region (e.g., "us-west-004" for Backblaze)
    pub region: String,
    /// Custom endpoint URL for S3-compatible services
    pub endpoint: Option<String>,
    pub key_id: String,
    pub key_secret: String,
}
impl Debug for S3Credentials {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("S3Credentials")
            .field("region", &self.region)
            .field("endpoint", &self.endpoint)
            .field("key_id", &self.key_id)
            .finish_non_exhaustive()
    }
}

/// S3-compatible object store source.
///
/// # Examples
///
/// ```no_run
/// use fchange_source::{S3Credentials, S3Source};
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let credentials = S3Credentials {
///     region: "us-west-004".to_string(),
///     endpoint: Some("https://s3.us-west-004.backblazeb2.com".to_string()),
///     key_id: "access_key_id".to_string(),
///     key_secret: "secret_access_key".to_string(),
/// };
/// let source = S3Source::new("s3://photos/2019", "photos", Some("2019".to_string()), &credentials)?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct S3Source {
    root: String,
    client: Client,
    bucket: String,
    /// Key prefix without a trailing slash; treated as a directory.
    prefix: Option<String>,
}
impl S3Source {
    pub fn new(
        root: impl Into<String>,
        bucket: impl Into<String>,
        prefix: Option<String>,
        credentials: &S3Credentials,
    ) -> Result<Self> {
        let region = Region::new(credentials.region.clone());
        let provider = Credentials::new(&credentials.key_id, &credentials.key_secret, None, None, "fchange-config");
        let mut config_builder = aws_sdk_s3::Config::builder()
            .behavior_version(BehaviorVersion::latest())
            .credentials_provider(provider)
            .region(region)
            // 1 initial attempt + 3 retries, with exponential backoff
            .retry_config(RetryConfig::standard().with_max_attempts(4))
            // Path-style addressing works with every S3-compatible service.
            .force_path_style(true);
        if let Some(endpoint_url) = &credentials.endpoint {
            config_builder = config_builder.endpoint_url(endpoint_url);
        }
        Self::from_client(root, bucket, prefix, Client::from_conf(config_builder.build()))
    }

    /// Use an already configured client.
    pub fn from_client(
        root: impl Into<String>,
        bucket: impl Into<String>,
        prefix: Option<String>,
        client: Client,
    ) -> Result<Self> {
        let bucket = bucket.into();
        if bucket.is_empty() || bucket.contains('/') {
            exn::bail!(ErrorKind::InvalidLocation(bucket));
        }
        let prefix = prefix.map(|p| crate::validate_key(&p)).transpose()?;
        Ok(Self {
            root: root.into(),
            client,
            bucket,
            prefix,
        })
    }

    /// Listing prefix: `2019` must not match `2019-backup/`.
    fn list_prefix(&self) -> Option<String> {
        self.prefix.as_ref().map(|prefix| format!("{prefix}/"))
    }

    fn list_error(&self, err: &SdkError<ListObjectsV2Error, HttpResponse>) -> ErrorKind {
        let message = DisplayErrorContext(err).to_string();
        match err {
            SdkError::ServiceError(service) if service.err().is_no_such_bucket() => {
                ErrorKind::NotFound(PathBuf::from(&self.root))
            },
            SdkError::ServiceError(service) if matches!(service.raw().status().as_u16(), 401 | 403) => {
                ErrorKind::PermissionDenied(PathBuf::from(&self.root))
            },
            SdkError::DispatchFailure(_) | SdkError::TimeoutError(_) | SdkError::ResponseError(_) => {
                ErrorKind::Network(message)
            },
            _ => ErrorKind::BackendError(message),
        }
    }
}

/// Convert AWS DateTime to OffsetDateTime.
fn parse_datetime(dt: &DateTime) -> Result<OffsetDateTime> {
    OffsetDateTime::from_unix_timestamp_nanos(dt.as_nanos())
        .or_raise(|| ErrorKind::BackendError("S3 datetime out of range".to_string()))
}

/// Turn one listed object into [`ObjectInfo`]. Zero-byte "folder" markers
/// (keys ending in `/`) are not objects.
fn object_info(bucket: &str, object: &Object) -> Result<Option<ObjectInfo>> {
    let Some(key) = object.key() else {
        return Ok(None);
    };
    if key.ends_with('/') {
        return Ok(None);
    }
    let location = format!("s3://{bucket}/{key}");
    let size = u64::try_from(object.size().unwrap_or_default())
        .or_raise(|| ErrorKind::BackendError(format!("negative size for {location}")))?;
    let modified = match object.last_modified() {
        Some(dt) => parse_datetime(dt)?,
        None => OffsetDateTime::UNIX_EPOCH,
    };
    let info = ObjectInfo::new(location, size, modified, Origin::Remote);
    Ok(Some(match object.e_tag() {
        Some(etag) => info.with_digest(etag.trim_matches('"')),
        None => info,
    }))
}

#[async_trait]
impl Source for S3Source {
    fn root(&self) -> &str {
        &self.root
    }

    async fn check(&self) -> Result<()> {
        self.client
            .list_objects_v2()
            .bucket(&self.bucket)
            .set_prefix(self.list_prefix())
            .max_keys(1)
            .send()
            .await
            .map_err(|e| self.list_error(&e))?;
        Ok(())
    }

    /// Each listing page counts as one directory.
    fn walk(&self) -> WalkStream<'_> {
        Box::pin(stream! {
            let mut continuation: Option<String> = None;
            let mut pages = 0usize;
            loop {
                let response = self
                    .client
                    .list_objects_v2()
                    .bucket(&self.bucket)
                    .set_prefix(self.list_prefix())
                    .set_continuation_token(continuation.take())
                    .send()
                    .await;
                let page = match response {
                    Ok(page) => page,
                    Err(e) => {
                        yield Err(exn::Exn::from(self.list_error(&e)));
                        break;
                    },
                };
                pages += 1;
                tracing::debug!(bucket = %self.bucket, page = pages, objects = page.contents().len(), "listed page");
                for object in page.contents() {
                    match object_info(&self.bucket, object) {
                        Ok(Some(info)) => yield Ok(Walked::Object(info)),
                        Ok(None) => {},
                        Err(e) => yield Err(e),
                    }
                }
                yield Ok(Walked::Directory(self.root.clone()));
                match page.next_continuation_token() {
                    Some(token) if page.is_truncated().unwrap_or(false) => continuation = Some(token.to_string()),
                    _ => break,
                }
            }
        })
    }

    async fn digest(&self, object: &ObjectInfo) -> Result<String> {
        match &object.digest {
            Some(digest) => Ok(digest.clone()),
            None => exn::bail!(ErrorKind::BackendError(format!("no entity tag listed for {}", object.location))),
        }
    }
}
