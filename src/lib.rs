//! A read-only reader for extensible storage engine (ISAM) databases.
//!
//! A [`Session`](session::Session) attaches a database through an
//! [`Engine`](engine::Engine) backend, falling back to log recovery and repair
//! when allowed. Tables are then listed, described and scanned into typed
//! rows, each failing table being reported without aborting the others.

pub mod error;

pub mod catalog;
pub mod config;
pub mod engine;

pub mod process;
pub mod repair;

pub mod db;
pub mod exec;
pub mod schema;
pub mod session;

pub mod util;

pub use db::{dump, dump_with_consent, Db, DumpOptions};
pub use error::{DbResult, Error};
