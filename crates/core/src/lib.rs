#![deny(warnings)]

pub mod archive;
pub mod config;
pub mod credential;
pub mod poem;
pub mod resolver;
