mod command;
mod ffmpeg;
mod ytdl;

pub use command::CommandError;
pub use ffmpeg::{Ffmpeg, StreamTransformer};
pub use ytdl::{HostFailure, VideoHost, Ytdl, YtdlTimeouts};
