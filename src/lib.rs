//! Download a web video, splice a fixed clip into it and re-encode the result.
//!
//! The binary wires the real `yt-dlp`, `ffmpeg` and HTTP implementations
//! together, every piece here only depends on the traits
//! [`outside::VideoHost`], [`outside::StreamTransformer`] and [`proxy::IpEcho`].

pub mod cli;
pub mod config;
pub mod dispatch;
pub mod io;
pub mod logging;
pub mod outside;
pub mod pipeline;
pub mod proxy;
pub mod resolver;
pub mod result;
pub mod splicer;
pub mod types;
