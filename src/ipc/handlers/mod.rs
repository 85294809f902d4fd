pub mod catalog;
pub mod core;
pub mod drag;
pub mod grid;
pub mod schedule;
pub mod session;
pub mod setup;
pub mod swap;
