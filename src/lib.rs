extern crate log;
pub mod app;
pub mod config;
pub mod feature;
pub mod map;
pub mod source;
pub mod view;
