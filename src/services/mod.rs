// Services module - business logic layer

pub mod mediainfo;
pub mod metadata;
pub mod playback;
pub mod subtitles;
pub mod thumbnail;

// Metadata sources
pub mod matroska;
pub mod tmdb;
