//! reelbot core library — config, channels, pattern router, conversation
//! sessions, user storage, TMDB client, and the webhook server used by the CLI.

pub mod bot;
pub mod channels;
pub mod config;
pub mod init;
pub mod movies;
pub mod router;
pub mod server;
pub mod session;
pub mod storage;
pub mod tmdb;
