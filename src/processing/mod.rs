mod audio;
mod video;
mod avc;
mod metadata;
mod flv;

pub use audio::*;
pub use video::*;
pub use avc::*;
pub use metadata::*;
pub use flv::*;
