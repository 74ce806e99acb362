//! Crate-internal observability macros.
//!
//! Precedence:
//! 1) `tracing` feature => emit `tracing::*` events
//! 2) `logging` feature => emit `log::*` records
//! 3) neither enabled => no-op (but still evaluates format args)
//!
//! Every macro accepts an optional leading [`LogFields`] followed by `;`. The fields are
//! rendered after the message as `message (key=value ...)`, so per-call context reaches the
//! record without touching global logger state.

use std::fmt;

use crate::context::LogFields;

/// A message followed by the fields of the call it belongs to.
pub(crate) struct Record<'a> {
    message: fmt::Arguments<'a>,
    fields: &'a LogFields,
}

impl<'a> Record<'a> {
    pub(crate) fn new(message: fmt::Arguments<'a>, fields: &'a LogFields) -> Self {
        Self { message, fields }
    }
}

impl fmt::Display for Record<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.message, f)?;
        if !self.fields.is_empty() {
            write!(f, " ({})", self.fields)?;
        }
        Ok(())
    }
}

#[allow(unused_macros)]
macro_rules! log_debug {
    ($fields:expr; $($arg:tt)*) => {
        $crate::observability::log_debug!(
            "{}",
            $crate::observability::Record::new(format_args!($($arg)*), $fields)
        )
    };
    ($($arg:tt)*) => {{
        #[cfg(feature = "tracing")]
        { tracing::debug!($($arg)*); }

        #[cfg(all(not(feature = "tracing"), feature = "logging"))]
        { log::debug!($($arg)*); }

        #[cfg(all(not(feature = "tracing"), not(feature = "logging")))]
        { let _ = format_args!($($arg)*); }
    }};
}

#[allow(unused_macros)]
macro_rules! log_info {
    ($fields:expr; $($arg:tt)*) => {
        $crate::observability::log_info!(
            "{}",
            $crate::observability::Record::new(format_args!($($arg)*), $fields)
        )
    };
    ($($arg:tt)*) => {{
        #[cfg(feature = "tracing")]
        { tracing::info!($($arg)*); }

        #[cfg(all(not(feature = "tracing"), feature = "logging"))]
        { log::info!($($arg)*); }

        #[cfg(all(not(feature = "tracing"), not(feature = "logging")))]
        { let _ = format_args!($($arg)*); }
    }};
}

#[allow(unused_macros)]
macro_rules! log_warn {
    ($fields:expr; $($arg:tt)*) => {
        $crate::observability::log_warn!(
            "{}",
            $crate::observability::Record::new(format_args!($($arg)*), $fields)
        )
    };
    ($($arg:tt)*) => {{
        #[cfg(feature = "tracing")]
        { tracing::warn!($($arg)*); }

        #[cfg(all(not(feature = "tracing"), feature = "logging"))]
        { log::warn!($($arg)*); }

        #[cfg(all(not(feature = "tracing"), not(feature = "logging")))]
        { let _ = format_args!($($arg)*); }
    }};
}

#[allow(unused_macros)]
macro_rules! log_error {
    ($fields:expr; $($arg:tt)*) => {
        $crate::observability::log_error!(
            "{}",
            $crate::observability::Record::new(format_args!($($arg)*), $fields)
        )
    };
    ($($arg:tt)*) => {{
        #[cfg(feature = "tracing")]
        { tracing::error!($($arg)*); }

        #[cfg(all(not(feature = "tracing"), feature = "logging"))]
        { log::error!($($arg)*); }

        #[cfg(all(not(feature = "tracing"), not(feature = "logging")))]
        { let _ = format_args!($($arg)*); }
    }};
}

pub(crate) use log_debug;
pub(crate) use log_error;
pub(crate) use log_info;
pub(crate) use log_warn;
