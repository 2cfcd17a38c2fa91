//! Per-term tracing that is compiled out unless the `hcons_debug-trace`
//! feature is enabled, since it is far too verbose for normal use.

/// Logs at trace level when the `hcons_debug-trace` feature is enabled, and
/// expands to nothing otherwise. The arguments are not evaluated in the
/// latter case.
///
/// # Examples
///
/// ```
/// use hcons_utilities::debug_trace;
///
/// let node = 42;
/// debug_trace!("Reclaimed node {node}");
/// ```
#[macro_export]
#[cfg(feature = "hcons_debug-trace")]
macro_rules! debug_trace {
    ($($arg:tt)*) => {
        {
            log::trace!($($arg)*);
        }
    };
}

#[macro_export]
#[cfg(not(feature = "hcons_debug-trace"))]
macro_rules! debug_trace {
    ($($arg:tt)*) => {{}};
}
