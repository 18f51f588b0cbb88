pub mod assemblyai;
pub mod openai;
pub mod pexels;
pub mod tiktok;
pub mod youtube;
