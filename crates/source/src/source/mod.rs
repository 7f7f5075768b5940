//! Source trait and implementations.
//!
//! A source enumerates every object below one scan root as a [`Stream`],
//! depth first, and knows how to digest the objects it yields. Sources don't
//! know anything about the index; they only describe what is there right
//! now.

mod archive;
mod local;
#[cfg(feature = "mock")]
mod mock;
#[cfg(feature = "s3")]
mod s3;

pub use self::archive::ArchiveOptions;
pub use self::local::LocalSource;
#[cfg(feature = "mock")]
pub use self::mock::MockSource;
#[cfg(feature = "s3")]
pub use self::s3::{S3Credentials, S3Source};
use crate::error::{ErrorKind, Result};
use crate::location::Location;
use crate::models::ObjectInfo;
use async_trait::async_trait;
#[cfg(feature = "s3")]
use exn::OptionExt;
use futures::{Stream, TryStreamExt};
use std::pin::Pin;
use std::sync::Arc;

pub type WalkStream<'a> = Pin<Box<dyn Stream<Item = Result<Walked>> + Send + 'a>>;
pub type SourceHandle = Arc<dyn Source + Send + Sync>;

/// One step of a walk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Walked {
    Object(ObjectInfo),
    /// Every object of one directory (or listing page) has been yielded.
    Directory(String),
}

/// Unified interface for enumerating a scan root.
///
/// # Errors while walking
/// A walk yields an `Err` for every object (or directory) it could not
/// inspect and carries on with the next one. Only [`check()`](Self::check)
/// reports problems with the root itself.
///
/// # Examples
///
/// ```no_run
/// use futures::TryStreamExt;
/// use fchange_source::{Source, Walked, error::Result};
///
/// async fn total_size(source: &dyn Source) -> Result<u64> {
///     source.check().await?;
///     let mut total = 0;
///     let mut walk = source.walk();
///     while let Some(step) = walk.try_next().await? {
///         if let Walked::Object(object) = step {
///             total += object.size;
///         }
///     }
///     Ok(total)
/// }
/// ```
#[async_trait]
pub trait Source: Send + Sync {
    /// Location string of the root, exactly as it was registered.
    fn root(&self) -> &str;

    /// Make sure the root exists and can be listed.
    async fn check(&self) -> Result<()>;

    /// Stream every object below the root.
    fn walk(&self) -> WalkStream<'_>;

    /// Collect every object of a walk, failing on the first error.
    async fn list(&self) -> Result<Vec<ObjectInfo>> {
        self.walk()
            .try_filter_map(|step| async move {
                Ok(match step {
                    Walked::Object(object) => Some(object),
                    Walked::Directory(_) => None,
                })
            })
            .try_collect()
            .await
    }

    /// Content digest of an object previously yielded by [`walk()`](Self::walk).
    ///
    /// Objects that arrived with a digest return it without any I/O.
    async fn digest(&self, object: &ObjectInfo) -> Result<String>;
}

/// Everything needed to open a source for any kind of [`Location`].
#[derive(Debug, Clone, Default)]
pub struct SourceOptions {
    pub archives: ArchiveOptions,
    #[cfg(feature = "s3")]
    pub s3: Option<S3Credentials>,
}

/// Open the right kind of source for a registered root location.
pub fn open(location: &str, options: &SourceOptions) -> Result<SourceHandle> {
    match Location::parse(location)? {
        Location::Local(path) => Ok(Arc::new(LocalSource::new(path)?.with_archives(options.archives.clone()))),
        #[cfg(feature = "s3")]
        Location::S3 { bucket, prefix } => {
            let credentials = options
                .s3
                .as_ref()
                .ok_or_raise(|| ErrorKind::InvalidLocation(format!("no S3 credentials configured for {location}")))?;
            Ok(Arc::new(S3Source::new(location, bucket, prefix, credentials)?))
        },
        #[cfg(not(feature = "s3"))]
        Location::S3 { .. } => {
            exn::bail!(ErrorKind::InvalidLocation(format!("S3 support is not enabled: {location}")))
        },
    }
}
