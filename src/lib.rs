pub mod api;
pub mod config;
pub mod error;
pub mod ffmpeg;
pub mod footage;
pub mod generator;
pub mod init;
pub mod music;
pub mod narration;
pub mod progress;
pub mod server;
pub mod subtitles;
pub mod video;
