//! Status values and the helpers that build them.
//!
//! Whole-call failures are returned as [`tonic::Status`]; each batch item carries a
//! [`Status`]. Failures are logged with the call's [`LogFields`] when they are built.

use std::error::Error;
use std::fmt;

use tonic::Code;

use crate::context::LogFields;
use crate::prelude::{error, info, warn};

/// Outcome of a single batch item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Status {
    code: Code,
    message: String,
}

impl Status {
    /// The status of a successful item.
    pub fn ok() -> Self {
        Self {
            code: Code::Ok,
            message: "OK".to_owned(),
        }
    }

    /// Creates a status with the given code and message.
    pub fn new(code: Code, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// Returns the status code.
    pub fn code(&self) -> Code {
        self.code
    }

    /// Returns the status message.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Returns `true` for [`Code::Ok`].
    pub fn is_ok(&self) -> bool {
        self.code == Code::Ok
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}: {}", self.code, self.message)
    }
}

impl From<Status> for tonic::Status {
    fn from(status: Status) -> Self {
        tonic::Status::new(status.code, status.message)
    }
}

/// Builds and logs a whole-call error.
pub(crate) fn make_err(
    log: &LogFields,
    code: Code,
    msg: &str,
    cause: Option<&dyn Error>,
) -> tonic::Status {
    make_status(log, code, msg, cause).into()
}

/// Builds and logs the status of a failed batch item.
///
/// The message is `msg`, followed by `": <cause>"` when a cause is given.
pub(crate) fn make_status(
    log: &LogFields,
    code: Code,
    msg: &str,
    cause: Option<&dyn Error>,
) -> Status {
    let message = match cause {
        Some(cause) => format!("{msg}: {cause}"),
        None => msg.to_owned(),
    };

    match code {
        Code::NotFound | Code::AlreadyExists => {
            info!(log; "{}", capitalize(&message));
        }
        Code::InvalidArgument => {
            warn!(log; "Invalid argument: {message}");
        }
        Code::ResourceExhausted | Code::FailedPrecondition | Code::Cancelled => {
            warn!(log; "{}", capitalize(&message));
        }
        _ => {
            error!(log; "{}", capitalize(&message));
        }
    }

    Status::new(code, message)
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
