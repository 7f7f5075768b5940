use fchange_source::{ObjectInfo, Origin};
use std::ffi::OsStr;

fn normalize(extension: &str) -> String {
    format!(".{}", extension.trim_start_matches('.').to_ascii_lowercase())
}

/// Extension allow and deny lists.
///
/// Extensions match case-insensitively, with or without their leading dot.
/// The deny list wins over the allow list. Archive members are judged by the
/// archive file they were found in, never by their own name: an archive that
/// is filtered out takes all of its members with it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtensionFilter {
    only: Vec<String>,
    ignore: Vec<String>,
}
impl ExtensionFilter {
    pub fn new<S: AsRef<str>>(only: &[S], ignore: &[S]) -> Self {
        Self {
            only: only.iter().map(|ext| normalize(ext.as_ref())).collect(),
            ignore: ignore.iter().map(|ext| normalize(ext.as_ref())).collect(),
        }
    }

    pub fn accepts(&self, object: &ObjectInfo) -> bool {
        match &object.origin {
            Origin::ArchiveMember { archive, .. } => {
                self.accepts_extension(archive.extension().and_then(OsStr::to_str).map(normalize))
            },
            Origin::File(_) | Origin::Remote => self.accepts_extension(object.extension()),
        }
    }

    fn accepts_extension(&self, extension: Option<String>) -> bool {
        if let Some(ext) = &extension
            && self.ignore.contains(ext)
        {
            return false;
        }
        match extension {
            _ if self.only.is_empty() => true,
            Some(ext) => self.only.contains(&ext),
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::path::PathBuf;
    use time::OffsetDateTime;

    fn object(location: &str) -> ObjectInfo {
        ObjectInfo::new(location, 0, OffsetDateTime::UNIX_EPOCH, Origin::Remote)
    }

    #[rstest]
    #[case::everything(&[], &[], "/a/b.txt", true)]
    #[case::ignored(&[], &[".tmp"], "/a/b.tmp", false)]
    #[case::ignored_without_dot(&[], &["TMP"], "/a/b.tmp", false)]
    #[case::only_match(&["jpg"], &[], "/a/b.JPG", true)]
    #[case::only_miss(&[".jpg"], &[], "/a/b.png", false)]
    #[case::only_no_extension(&[".jpg"], &[], "/a/README", false)]
    #[case::deny_wins(&[".jpg"], &[".jpg"], "/a/b.jpg", false)]
    #[case::dotfile(&[], &[".bashrc"], "/home/.bashrc", true)]
    fn test_accepts(#[case] only: &[&str], #[case] ignore: &[&str], #[case] location: &str, #[case] expected: bool) {
        assert_eq!(ExtensionFilter::new(only, ignore).accepts(&object(location)), expected);
    }

    #[rstest]
    #[case::archive_ignored(&[], &[".zip"], false)]
    #[case::archive_allowed(&[".ZIP"], &[], true)]
    #[case::member_extension_is_irrelevant(&[".txt"], &[], false)]
    #[case::member_not_ignored_itself(&[], &[".txt"], true)]
    fn test_members_follow_their_archive(#[case] only: &[&str], #[case] ignore: &[&str], #[case] expected: bool) {
        let member = ObjectInfo::new(
            "/srv/bundle.zip/inner.txt",
            0,
            OffsetDateTime::UNIX_EPOCH,
            Origin::ArchiveMember {
                archive: PathBuf::from("/srv/bundle.zip"),
                index: 0,
            },
        );
        assert_eq!(ExtensionFilter::new(only, ignore).accepts(&member), expected);
    }
}
