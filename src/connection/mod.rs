mod transport;
mod connection;

pub use transport::*;
pub use connection::*;
