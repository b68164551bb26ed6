//! Process-wide settings read from environment variables.
//!
//! - `VM1_TRACE=1` prints every executed instruction to stderr.
//! - `VM1_MINIMAL=1` forces plain reports, as if `--minimal` was passed.

use std::{cell::Cell, ffi::OsStr};

#[derive(Clone, Copy, Debug, Default)]
pub struct Env {
    pub trace: bool,
    pub minimal: bool,
}

thread_local! {
    /// Must only be set within `init`
    static ENV: Cell<Option<Env>> = const { Cell::new(None) };
}

/// Must be called once, before any getter.
pub fn init() {
    let value = Env {
        trace: var_is("VM1_TRACE", "1"),
        minimal: var_is("VM1_MINIMAL", "1"),
    };
    let previous = ENV.with(|env| env.replace(Some(value)));
    assert!(
        previous.is_none(),
        "tried to initialize environment state multiple times"
    );
}

pub fn get() -> Env {
    ENV.with(|env| env.get())
        .unwrap_or_else(|| panic!("tried to access environment state before initialization"))
}

fn var_is(name: impl AsRef<OsStr>, value: impl AsRef<str>) -> bool {
    std::env::var(name.as_ref()).is_ok_and(|v| v == value.as_ref())
}
