//! Logging macros that compile to no-ops unless the `log` feature is enabled,
//! mirroring the optional `log` dependency used throughout this crate.

macro_rules! lzip_trace {
    ($($arg:tt)*) => {
        #[cfg(feature = "log")]
        log::trace!($($arg)*);
    };
}

macro_rules! lzip_debug {
    ($($arg:tt)*) => {
        #[cfg(feature = "log")]
        log::debug!($($arg)*);
    };
}

macro_rules! lzip_info {
    ($($arg:tt)*) => {
        #[cfg(feature = "log")]
        log::info!($($arg)*);
    };
}

#[allow(unused_macros)]
macro_rules! lzip_warn {
    ($($arg:tt)*) => {
        #[cfg(feature = "log")]
        log::warn!($($arg)*);
    };
}

pub(crate) use lzip_debug;
pub(crate) use lzip_info;
#[allow(unused_imports)]
pub(crate) use lzip_trace;
#[allow(unused_imports)]
pub(crate) use lzip_warn;
