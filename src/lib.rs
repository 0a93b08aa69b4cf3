pub mod config;
pub mod daemon;
pub mod domain;
pub mod error;
pub mod mail;
