mod connection;
mod error;
mod resolver;

pub use connection::{ConnectionService, HttpConnectionService, StaticConnectionService};
pub use error::{ConnectionError, ResolveError};
pub use resolver::{PropsResolver, REDACTED, ResolvedInput};
