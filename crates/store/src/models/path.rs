use serde::Serialize;

/// An interned path with both of its components resolved.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, sqlx::FromRow)]
pub struct PathName {
    pub pathid: i64,
    pub dirnameid: i64,
    pub dirname: String,
    pub filenameid: i64,
    pub filename: String,
}
impl PathName {
    pub fn full_path(&self) -> String {
        join_path(&self.dirname, &self.filename)
    }
}

/// Split a full location into its directory and file name at the last `/`.
///
/// A location directly under the filesystem root keeps `/` as its directory;
/// a location without any `/` has an empty directory.
pub fn split_path(full: &str) -> (&str, &str) {
    match full.rsplit_once('/') {
        Some(("", filename)) => ("/", filename),
        Some((dirname, filename)) => (dirname, filename),
        None => ("", full),
    }
}

pub(crate) fn join_path(dirname: &str, filename: &str) -> String {
    if dirname.is_empty() {
        filename.to_string()
    } else if dirname.ends_with('/') {
        format!("{dirname}{filename}")
    } else {
        format!("{dirname}/{filename}")
    }
}
