use derive_more::{Display, Error};

pub type Error = exn::Exn<ErrorKind>;
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Display, Error, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    #[display("could not load configuration")]
    Config,
    #[display("could not set up logging")]
    Logging,
    #[display("could not open the fetch cache")]
    Setup,
    #[display("fetch failed")]
    Fetch,
    #[display("input/output error")]
    Io,
    #[display("invalid argument: {_0}")]
    InvalidArgument(#[error(not(source))] String),
}
