//! The implementation of the `ARMGEN_LOG` environment variable.
//!
//! Logging goes to stderr and is filtered by a level read once at startup:
//! `ARMGEN_LOG=<level>` with levels numbered as in [Verbosity]. The default
//! is [Verbosity::Error].

use std::{
    env,
    sync::OnceLock,
};
use strum::{EnumCount, FromRepr};

/// How verbose should the backend's logging be?
#[repr(u8)]
#[derive(Copy, Clone, Debug, EnumCount, FromRepr, PartialEq, PartialOrd)]
pub(crate) enum Verbosity {
    /// Disable logging entirely.
    Disabled,
    /// Log errors.
    Error,
    /// Log one summary line per compiled method.
    MethodSummary,
    /// Dump the full listing of each compiled method.
    Listing,
}

static LEVEL: OnceLock<Verbosity> = OnceLock::new();

fn level() -> Verbosity {
    *LEVEL.get_or_init(|| match env::var("ARMGEN_LOG") {
        Ok(s) => {
            let l = s.parse::<u8>().unwrap_or_else(|e| {
                eprintln!("armgen: invalid ARMGEN_LOG level '{s}': {e}");
                Verbosity::Error as u8
            });
            let max = u8::try_from(Verbosity::COUNT).unwrap() - 1;
            Verbosity::from_repr(l).unwrap_or_else(|| {
                eprintln!("armgen: ARMGEN_LOG level {l} exceeds maximum {max}");
                Verbosity::Error
            })
        }
        Err(_) => Verbosity::Error,
    })
}

/// Log `msg` if the requested verbosity is at least `verbosity`.
pub(crate) fn log(verbosity: Verbosity, msg: &str) {
    debug_assert_ne!(verbosity, Verbosity::Disabled);
    if verbosity <= level() {
        eprintln!("armgen: {msg}");
    }
}
