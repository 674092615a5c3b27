mod record;

pub use self::record::{Capture, FetchRecord, STATUS_OK, STATUS_REQUEST_ERROR};
pub(crate) use self::record::WebRow;
