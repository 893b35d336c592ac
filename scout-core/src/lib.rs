pub mod app;
pub mod colorize;
pub mod config;
pub mod event;
pub mod log;
pub mod picker;
pub mod project;
pub mod runner;
pub mod session;
pub mod store;
pub mod view;

#[cfg(test)]
pub(crate) mod testing;
