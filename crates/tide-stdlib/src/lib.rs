//! Tide Standard Library
//!
//! Library functions written against the engine's resumable function
//! convention. Functions that call back into scripts (`string.gsub`,
//! `string.format`, `tostring`) or may block on I/O (`io`) suspend and
//! resume like any script frame; the rest run to completion.
//!
//! Each library is installed into an environment table explicitly:
//!
//! ```ignore
//! let env = tide_engine::Table::new_ref();
//! tide_stdlib::install_all(&env);
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

pub mod args;
pub mod basic;
pub mod io;
pub mod string;

pub use args::Args;
pub use io::{IoFile, IoLib};

use tide_engine::{Table, TableRef};

/// Install `basic`, `string` and `io` (on the process's standard streams) into `env`
pub fn install_all(env: &TableRef) {
    install_with_io(env, &IoLib::new());
}

/// Install every library, using `io` for the `io` table
pub fn install_with_io(env: &TableRef, io: &IoLib) {
    basic::install(env);
    string::install(env);
    io.install(env);
}

/// A fresh environment with every library installed
pub fn environment() -> TableRef {
    let env = Table::new_ref();
    install_all(&env);
    env
}
