pub mod auth;
pub mod classify;
pub mod config;
pub mod domain;
pub mod mail;
pub mod normalize;
pub mod pipeline;
