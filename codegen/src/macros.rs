//! Crate-internal macros.

/// A macro for trace-level logging in hot paths.
///
/// Forwards to `log::trace!`, but keeps a single point where tracing can be
/// compiled out entirely if it ever shows up in profiles.
macro_rules! trace {
    ($($tt:tt)*) => {
        log::trace!($($tt)*)
    };
}
