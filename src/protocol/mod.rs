mod message;
mod command;
mod data;
mod control;
mod url;
pub mod constants;

pub use message::*;
pub use command::*;
pub use data::*;
pub use control::*;
pub use url::*;
pub use constants::*;
