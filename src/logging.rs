//! Feature-gated tracing macros.
//!
//! With the `logging` feature the macros forward to `tracing`; without it
//! they expand to nothing and their arguments are never evaluated. The
//! library never installs a subscriber.
//!
//! # Example
//!
//! ```rust,ignore
//! use crate::logging::{debug, trace};
//!
//! debug!(name = layout.name(), size = layout.size(), "layout computed");
//! trace!(address, size, "arena allocation");
//! ```

#[cfg(feature = "logging")]
mod enabled {
    /// Per-field and per-allocation detail.
    macro_rules! trace {
        ($($arg:tt)*) => { tracing::trace!($($arg)*) }
    }

    /// Layout computation and protocol transitions.
    macro_rules! debug {
        ($($arg:tt)*) => { tracing::debug!($($arg)*) }
    }

    /// Schema lifecycle.
    macro_rules! info {
        ($($arg:tt)*) => { tracing::info!($($arg)*) }
    }

    /// Recoverable protocol anomalies.
    macro_rules! warn_ {
        ($($arg:tt)*) => { tracing::warn!($($arg)*) }
    }

    /// Failures about to be returned as errors.
    macro_rules! error {
        ($($arg:tt)*) => { tracing::error!($($arg)*) }
    }

    pub(crate) use {debug, error, info, trace, warn_ as warn};
}

#[cfg(not(feature = "logging"))]
mod enabled {
    macro_rules! discard {
        ($($arg:tt)*) => {};
    }

    pub(crate) use {
        discard as debug, discard as error, discard as info, discard as trace, discard as warn,
    };
}

pub(crate) use enabled::{debug, error, info, trace, warn};
