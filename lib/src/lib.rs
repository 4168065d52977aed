mod api;
mod bridge;
#[cfg(feature = "client")]
mod client;
mod competitor;
mod config;
mod error;
mod leg;
mod listener;
mod live;
mod message;
mod score_as_you_go;
mod session;
mod statistics;

pub use api::*;
pub use bridge::*;
#[cfg(feature = "client")]
pub use client::*;
pub use competitor::*;
pub use config::*;
pub use error::*;
pub use leg::*;
pub use listener::*;
pub use live::*;
pub use message::*;
pub use score_as_you_go::*;
pub use session::*;
pub use statistics::*;
