pub mod audiotags;
pub mod cache;
pub mod catalog;
pub mod common;
pub mod config;
pub mod error;
pub mod filetags;
pub mod http;
pub mod inventory;
pub mod mediaindex;
pub mod processor;
pub mod ratelimit;
pub mod scanner;
pub mod tagdiff;
pub mod tagwriter;
pub mod tools;

pub use error::{AutotagError, AutotagExpectedError, Result};

#[cfg(test)]
mod testing;

#[cfg(test)]
mod audiotags_test;
#[cfg(test)]
mod mediaindex_test;
