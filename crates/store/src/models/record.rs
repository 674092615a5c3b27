use crate::error::{Error, ErrorKind};
use exn::ResultExt;
use std::time::Duration;
use time::UtcDateTime;

/// Status of a successful capture; the only status served as cached content.
pub const STATUS_OK: u16 = 200;
/// Status recorded when a request failed before the server produced a status
/// (connection refused, DNS failure, timeout).
pub const STATUS_REQUEST_ERROR: u16 = 0;

/// A fetch attempt that has not been written to the log yet.
///
/// Produced by the direct fetcher and by remote backends; `created_at` is when
/// the page was actually fetched, which for a backend may be long before now.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Capture {
    pub url: String,
    pub created_at: UtcDateTime,
    pub status: u16,
    /// Decoded response text; `None` records a failed attempt.
    pub body: Option<String>,
}
impl Capture {
    pub fn success(url: impl Into<String>, created_at: UtcDateTime, body: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            created_at,
            status: STATUS_OK,
            body: Some(body.into()),
        }
    }

    pub fn failure(url: impl Into<String>, created_at: UtcDateTime, status: u16) -> Self {
        Self { url: url.into(), created_at, status, body: None }
    }
}

/// One row of the fetch log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchRecord {
    /// Monotonically increasing; defines "most recent".
    pub id: i64,
    pub created_at: UtcDateTime,
    /// Canonical URL.
    pub url: String,
    pub status: u16,
    pub body: Option<String>,
    /// Deployment/process tag the record was written by.
    pub source: Option<String>,
}
impl FetchRecord {
    pub fn is_success(&self) -> bool {
        self.status == STATUS_OK
    }

    /// Whether the capture is older than `threshold` at `now`.
    ///
    /// A capture exactly `threshold` old is still fresh.
    pub fn is_musty(&self, threshold: Duration, now: UtcDateTime) -> bool {
        now - self.created_at > threshold
    }
}

#[derive(sqlx::FromRow)]
pub(crate) struct WebRow {
    id: i64,
    created_at: i64,
    url: String,
    status: i64,
    body: Option<Vec<u8>>,
    source: Option<String>,
}
impl TryFrom<WebRow> for FetchRecord {
    type Error = Error;
    fn try_from(row: WebRow) -> Result<Self, Self::Error> {
        let body = match row.body {
            None => None,
            Some(frame) => {
                let bytes = hermes_compress::unframe(&frame).or_raise(|| ErrorKind::Corrupt(row.id))?;
                Some(String::from_utf8(bytes).or_raise(|| ErrorKind::Corrupt(row.id))?)
            },
        };
        Ok(Self {
            id: row.id,
            created_at: UtcDateTime::from_unix_timestamp(row.created_at)
                .or_raise(|| ErrorKind::InvalidData("created_at"))?,
            url: row.url,
            status: u16::try_from(row.status).or_raise(|| ErrorKind::InvalidData("status"))?,
            body,
            source: row.source,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hermes_compress::Compression;
    use rstest::rstest;

    fn row(body: Option<Vec<u8>>) -> WebRow {
        WebRow {
            id: 7,
            created_at: 1_600_000_000,
            url: "https://archiveofourown.org/works/123".to_string(),
            status: 200,
            body,
            source: Some("test".to_string()),
        }
    }

    #[test]
    fn test_row_to_model() {
        let frame = Compression::Zlib.frame("<html>\u{2019}</html>".as_bytes()).unwrap();
        let record = FetchRecord::try_from(row(Some(frame))).unwrap();
        assert_eq!(record.id, 7);
        assert_eq!(record.created_at.unix_timestamp(), 1_600_000_000);
        assert_eq!(record.body.as_deref(), Some("<html>\u{2019}</html>"));
        assert!(record.is_success());
    }

    #[test]
    fn test_row_without_body_is_failure_record() {
        let mut failed = row(None);
        failed.status = 503;
        let record = FetchRecord::try_from(failed).unwrap();
        assert_eq!(record.body, None);
        assert!(!record.is_success());
    }

    #[test]
    fn test_row_with_corrupt_body_fails_loudly() {
        let mut frame = Compression::Zlib.frame(b"some archived chapter text").unwrap();
        frame[..4].copy_from_slice(&3u32.to_be_bytes());
        let err = FetchRecord::try_from(row(Some(frame))).unwrap_err();
        assert_eq!(*err, ErrorKind::Corrupt(7));
    }

    #[test]
    fn test_row_with_invalid_status() {
        let mut bad = row(None);
        bad.status = -1;
        assert!(matches!(*FetchRecord::try_from(bad).unwrap_err(), ErrorKind::InvalidData("status")));
    }

    #[rstest]
    #[case(59, false)]
    #[case(60, false)]
    #[case(61, true)]
    fn test_is_musty(#[case] age: i64, #[case] expected: bool) {
        let record = FetchRecord::try_from(row(None)).unwrap();
        let now = record.created_at + time::Duration::seconds(age);
        assert_eq!(record.is_musty(Duration::from_secs(60), now), expected);
    }
}
