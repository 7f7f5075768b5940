//! Object key validation.

use crate::error::{ErrorKind, Result};
use std::path::PathBuf;

/// Validates and normalizes a `/`-separated object key or key prefix.
///
/// Keys may not climb above their root (`..` past the first component) and
/// may not contain null bytes. Empty and `.` components are dropped, so
/// `"a//./b/"` becomes `"a/b"`.
///
/// # Examples
///
/// ```
/// use fchange_source::validate_key;
/// assert_eq!(validate_key("photos/2019/").unwrap(), "photos/2019");
/// assert_eq!(validate_key("a/../b.jpg").unwrap(), "b.jpg");
/// assert!(validate_key("../etc/passwd").is_err());
/// assert!(validate_key("a\0b").is_err());
/// ```
pub fn validate_key(key: &str) -> Result<String> {
    let invalid = || ErrorKind::InvalidPath(PathBuf::from(key));
    let mut components = Vec::new();
    for component in key.split('/') {
        match component {
            "" | "." => {},
            ".." => {
                if components.pop().is_none() {
                    exn::bail!(invalid());
                }
            },
            c if c.contains('\0') => exn::bail!(invalid()),
            c => components.push(c),
        }
    }
    if components.is_empty() {
        exn::bail!(invalid());
    }
    Ok(components.join("/"))
}
