mod connection;
mod query;

#[cfg(test)]
pub(crate) mod mock;

pub use connection::*;
pub use query::*;
