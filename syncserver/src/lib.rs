#![warn(rust_2018_idioms)]
#![allow(clippy::try_err)]

#[macro_use]
extern crate slog_scope;

pub mod error;
pub mod logging;
pub mod server;
pub mod web;

pub use server::Server;
