mod config;
mod events;
mod fifo;
mod link;
mod push;
mod source;
mod state;

pub use config::*;
pub use events::*;
pub use fifo::MediaFifo;
pub use push::PushSession;
pub use source::SourceSession;
pub use state::{PushState, SourceState};
