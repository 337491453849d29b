//! Request handlers.

pub mod admin;
pub mod budget;
pub mod chat;
pub mod gallery;
pub mod handoff;
pub mod health;
pub mod sessions;
pub mod status;
pub mod upload;
pub mod video;

pub use admin::*;
pub use budget::*;
pub use chat::*;
pub use gallery::*;
pub use handoff::*;
pub use health::*;
pub use sessions::*;
pub use status::*;
pub use upload::*;
pub use video::*;
