// This file is part of guacplay, a Guacamole session recording player.
// Copyright (C) 2026 The guacplay Authors.
// SPDX-License-Identifier: GPL-3.0-or-later

//! Structured errors: a kind for classification, a message for humans,
//! and an optional source chain.

use std::fmt;

/// Error kind.
///
/// These codes are taken from
/// [grpc::StatusCode](https://github.com/grpc/grpc/blob/0e00c430827e81d61e1e7164ef04ca21ccbfaa77/include/grpcpp/impl/codegen/status_code_enum.h),
/// which is a nice general-purpose classification of errors. See that link for descriptions of
/// each error.
#[derive(Copy, Clone, Eq, PartialEq, Debug, thiserror::Error)]
#[non_exhaustive]
#[rustfmt::skip]
pub enum ErrorKind {
    #[error("Cancelled")] Cancelled,
    #[error("Unknown")] Unknown,
    #[error("Invalid argument")] InvalidArgument,
    #[error("Not found")] NotFound,
    #[error("Failed precondition")] FailedPrecondition,
    #[error("Aborted")] Aborted,
    #[error("Out of range")] OutOfRange,
    #[error("Internal")] Internal,
    #[error("Unavailable")] Unavailable,
    #[error("Data loss")] DataLoss,
}

type BoxedSource = Box<dyn std::error::Error + Send + Sync + 'static>;

struct Inner {
    kind: ErrorKind,
    msg: Option<String>,
    source: Option<BoxedSource>,
}

/// An error with a [`ErrorKind`], an optional message, and an optional source.
///
/// Construct these via the [`crate::err`] and [`crate::bail`] macros, which
/// support the `msg(...)` and `source(...)` argument forms:
///
/// ```
/// use guacplay_base::{bail, Error, ErrorKind};
/// fn check(len: usize) -> Result<(), Error> {
///     if len > 4096 {
///         bail!(OutOfRange, msg("length {len} too large"));
///     }
///     Ok(())
/// }
/// assert_eq!(check(8192).unwrap_err().kind(), ErrorKind::OutOfRange);
/// ```
pub struct Error(Box<Inner>);

impl Error {
    pub fn new(kind: ErrorKind, msg: Option<String>) -> Self {
        Error(Box::new(Inner {
            kind,
            msg,
            source: None,
        }))
    }

    pub fn with_source<S: Into<BoxedSource>>(
        kind: ErrorKind,
        msg: Option<String>,
        source: S,
    ) -> Self {
        Error(Box::new(Inner {
            kind,
            msg,
            source: Some(source.into()),
        }))
    }

    pub fn kind(&self) -> ErrorKind {
        self.0.kind
    }

    pub fn msg(&self) -> Option<&str> {
        self.0.msg.as_deref()
    }

    /// Returns an object which `Display`s the full chain of causes,
    /// separated by `: `. Handy for log lines.
    pub fn chain(&self) -> Chain<'_> {
        Chain(self)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0.msg.as_deref() {
            Some(msg) => write!(f, "{}: {}", self.0.kind, msg),
            None => fmt::Display::fmt(&self.0.kind, f),
        }
    }
}

impl fmt::Debug for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.chain())
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.0
            .source
            .as_ref()
            .map(|s| s.as_ref() as &(dyn std::error::Error + 'static))
    }
}

/// Displays an [`Error`] and all its causes.
pub struct Chain<'a>(&'a Error);

impl fmt::Display for Chain<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self.0, f)?;
        let mut cur: Option<&(dyn std::error::Error + 'static)> =
            std::error::Error::source(self.0);
        while let Some(e) = cur {
            write!(f, ": {e}")?;
            cur = e.source();
        }
        Ok(())
    }
}

/// Constructs an [`Error`] from an `ErrorKind` name and optional
/// `msg(format, args...)` / `source(expr)` clauses.
#[macro_export]
macro_rules! err {
    ($kind:ident) => {
        $crate::Error::new($crate::ErrorKind::$kind, None)
    };
    ($kind:ident, msg($($msg:tt)+)) => {
        $crate::Error::new($crate::ErrorKind::$kind, Some(format!($($msg)+)))
    };
    ($kind:ident, source($source:expr)) => {
        $crate::Error::with_source($crate::ErrorKind::$kind, None, $source)
    };
    ($kind:ident, msg($($msg:tt)+), source($source:expr)) => {
        $crate::Error::with_source($crate::ErrorKind::$kind, Some(format!($($msg)+)), $source)
    };
}

/// Like [`err`], but returns the error from the enclosing function.
#[macro_export]
macro_rules! bail {
    ($($t:tt)*) => {
        return Err($crate::err!($($t)*))
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_kind_and_msg() {
        let e = err!(DataLoss, msg("bad length at offset {}", 42));
        assert_eq!(e.kind(), ErrorKind::DataLoss);
        assert_eq!(e.msg().unwrap(), "bad length at offset 42");
        assert_eq!(e.to_string(), "Data loss: bad length at offset 42");
    }

    #[test]
    fn display_bare_kind() {
        let e = err!(Cancelled);
        assert_eq!(e.to_string(), "Cancelled");
        assert!(e.msg().is_none());
    }

    #[test]
    fn chain_includes_sources() {
        let io = std::io::Error::new(std::io::ErrorKind::Other, "disk on fire");
        let e = err!(Unavailable, msg("read failed"), source(io));
        assert_eq!(e.chain().to_string(), "Unavailable: read failed: disk on fire");
    }

    #[test]
    fn bail_returns_early() {
        fn f() -> Result<(), Error> {
            bail!(InvalidArgument, msg("nope"));
        }
        assert_eq!(f().unwrap_err().kind(), ErrorKind::InvalidArgument);
    }
}
