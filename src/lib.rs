#![forbid(unsafe_code)]

pub mod admin;
pub mod archive;
pub mod auth;
pub mod cli;
pub mod config;
pub mod content;
pub mod error;
pub mod filter;
pub mod logging;
pub mod model;
pub mod server;
pub mod slug;
pub mod store;
pub mod token;
pub mod upstream;
