pub mod app;
pub mod client;
pub mod config;
pub mod domain;
pub mod error;
pub mod fs_util;
pub mod manifest;
pub mod output;
pub mod restore;
pub mod retrieval;
pub mod search;
pub mod selection;
pub mod store;
pub mod version;
