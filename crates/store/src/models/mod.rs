mod file;
mod path;
mod scan;

pub use self::file::{FileRecord, NewFileRecord};
pub(crate) use self::file::FileRow;
pub use self::path::{PathName, split_path};
pub use self::scan::Scan;
pub(crate) use self::scan::{ScanRow, duration_millis, format_time};
