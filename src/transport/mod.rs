//! The connection layer: one live link per [`connection::Connection`],
//! shared admission and idle reuse in [`pool`].

pub mod connection;
pub mod connector;
pub mod pool;
pub mod stream;
pub mod tls;


pub use connection::Phase;
