//! NZB document handling.
//!
//! Parses nzb.org v1.1 XML into a file/segment tree and provides the
//! bounded yEnc decoder used on article bodies.

mod parser;
mod yenc;

pub use parser::{parse_nzb, NzbDocument, NzbFile, NzbSegment};
pub use yenc::{decode_yenc, YencError};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum NzbError {
    #[error("Invalid NZB XML: {0}")]
    InvalidXml(String),

    #[error("NZB contains no files")]
    Empty,
}
