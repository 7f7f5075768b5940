use crate::error::{Error, ErrorKind};
use exn::ResultExt;
use serde::Serialize;
use std::time::Duration;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

/// One traversal of every enabled root.
///
/// A scan without a duration was never completed: it is either still
/// running or the ingest crashed part way through.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Scan {
    pub scanid: i64,
    #[serde(with = "time::serde::rfc3339")]
    pub time: OffsetDateTime,
    pub duration: Option<Duration>,
}
impl Scan {
    pub fn is_complete(&self) -> bool {
        self.duration.is_some()
    }
}

#[derive(sqlx::FromRow)]
pub(crate) struct ScanRow {
    scanid: i64,
    time: String,
    duration: Option<i64>,
}
impl TryFrom<ScanRow> for Scan {
    type Error = Error;
    fn try_from(row: ScanRow) -> Result<Self, Self::Error> {
        let duration = row
            .duration
            .map(|ms| u64::try_from(ms).map(Duration::from_millis))
            .transpose()
            .or_raise(|| ErrorKind::InvalidData("scan duration"))?;
        Ok(Self {
            scanid: row.scanid,
            time: OffsetDateTime::parse(&row.time, &Rfc3339).or_raise(|| ErrorKind::InvalidData("scan time"))?,
            duration,
        })
    }
}

/// Scan start times are stored as RFC 3339 text so that they sort and
/// compare the same way on every backend.
pub(crate) fn format_time(time: OffsetDateTime) -> Result<String, Error> {
    time.to_offset(time::UtcOffset::UTC)
        .format(&Rfc3339)
        .or_raise(|| ErrorKind::InvalidData("scan time"))
}

pub(crate) fn duration_millis(duration: Duration) -> Result<i64, Error> {
    i64::try_from(duration.as_millis()).or_raise(|| ErrorKind::InvalidData("scan duration"))
}
