//! Dynamic error type for the instruction evaluation core.
//!
//! Errors carry a typed code (a canonical subset of the W3C XSLT/XQuery
//! error codes plus engine-specific ones), an optional source location and
//! an optional chained cause. Location enrichment is write-once: the first
//! instruction that sees an unlocated error stamps its own location on it;
//! outer frames never overwrite it.

use crate::consts::ERR_NS;
use crate::location::SourceLocation;
use crate::model::QName;
use core::fmt;
use std::sync::Arc;

/// Canonicalized set of error codes currently emitted by the runtime.
/// Expansion strategy: introduce variants when first needed; keep `Unknown`
/// as a safe fallback for codes supplied by collaborators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    // Template invocation
    XTDE0040, // named template does not exist
    XTDE0050, // required global parameter not supplied
    XTDE0700, // required template parameter not supplied
    // Structural ordering
    XTDE0410, // attribute/namespace node written after child content
    XTDE0420, // attribute/namespace at top level of a document constructor
    // Computed names
    XTDE0820, // invalid computed element name
    XTDE0850, // invalid computed attribute name
    XTDE0890, // invalid PI target (bad NCName or "xml")
    // Grouping / collations
    XTDE1110, // unknown collation URI
    // Result documents
    XTDE1490, // two result documents written to the same URI
    XTDE1500, // result document URI was already read as a source
    // Global variables
    XTDE0640, // circular definition of a global variable
    // Messages
    XTMM9000, // xsl:message with terminate="yes"
    // Validation (host-language specific mapping: strict / lax / by-type)
    XTTE1510,
    XTTE1515,
    XTTE1540,
    // XQuery-host constructor errors
    XQDY0025, // duplicate attribute name
    XQDY0026, // PI data contains "?>"
    XQDY0072, // comment content contains "--" or ends in "-"
    // Updating expressions
    XUST0001, // mixture of updating and non-updating operands
    // Engine-specific
    SXLM0001, // too-deep recursion: the stylesheet may be looping
    // Value-level errors surfaced by the expression leaves
    FOAR0001, // divide by zero
    FORG0001, // invalid lexical form
    XPTY0004, // type error
    // Fallback / collaborator-supplied (kept last)
    Unknown,
}

impl ErrorCode {
    /// The QName of this code in the xqt-errors namespace.
    pub fn qname(self) -> QName {
        QName::new(Some(ERR_NS), None, self.local())
    }

    pub fn local(self) -> &'static str {
        use ErrorCode::*;
        match self {
            XTDE0040 => "XTDE0040",
            XTDE0050 => "XTDE0050",
            XTDE0700 => "XTDE0700",
            XTDE0410 => "XTDE0410",
            XTDE0420 => "XTDE0420",
            XTDE0820 => "XTDE0820",
            XTDE0850 => "XTDE0850",
            XTDE0890 => "XTDE0890",
            XTDE1110 => "XTDE1110",
            XTDE1490 => "XTDE1490",
            XTDE1500 => "XTDE1500",
            XTDE0640 => "XTDE0640",
            XTMM9000 => "XTMM9000",
            XTTE1510 => "XTTE1510",
            XTTE1515 => "XTTE1515",
            XTTE1540 => "XTTE1540",
            XQDY0025 => "XQDY0025",
            XQDY0026 => "XQDY0026",
            XQDY0072 => "XQDY0072",
            XUST0001 => "XUST0001",
            SXLM0001 => "SXLM0001",
            FOAR0001 => "FOAR0001",
            FORG0001 => "FORG0001",
            XPTY0004 => "XPTY0004",
            Unknown => "UNKNOWN",
        }
    }
}

/// A dynamic error raised during instruction evaluation.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{}", render(.code, .user_code, .message, .location))]
pub struct Error {
    pub code: ErrorCode,
    /// User-supplied code (e.g. the error code of `xsl:message terminate`);
    /// when present it takes precedence over `code` for reporting.
    pub user_code: Option<QName>,
    pub message: String,
    pub location: Option<SourceLocation>,
    #[source]
    pub source: Option<Arc<dyn std::error::Error + Send + Sync>>,
}

impl Error {
    pub fn from_code(code: ErrorCode, msg: impl Into<String>) -> Self {
        Self {
            code,
            user_code: None,
            message: msg.into(),
            location: None,
            source: None,
        }
    }

    /// The distinguished "explicit termination requested" error
    /// (`xsl:message terminate="yes"`), optionally with a user error code.
    pub fn termination(msg: impl Into<String>, user_code: Option<QName>) -> Self {
        Self {
            code: ErrorCode::XTMM9000,
            user_code,
            message: msg.into(),
            location: None,
            source: None,
        }
    }

    pub fn is_termination(&self) -> bool {
        self.code == ErrorCode::XTMM9000
    }

    pub fn is_circularity(&self) -> bool {
        self.code == ErrorCode::XTDE0640
    }

    /// Compose with a chained cause.
    pub fn with_source(
        mut self,
        source: impl Into<Option<Arc<dyn std::error::Error + Send + Sync>>>,
    ) -> Self {
        self.source = source.into();
        self
    }

    /// Stamp a location on the error unless one is already recorded.
    #[must_use]
    pub fn with_location(mut self, loc: Option<SourceLocation>) -> Self {
        if self.location.is_none() {
            self.location = loc;
        }
        self
    }

    /// Human-readable code string (err:LOCAL, or Q{ns}local for user codes).
    pub fn format_code(&self) -> String {
        render_code(self.code, &self.user_code)
    }
}

fn render_code(code: ErrorCode, user_code: &Option<QName>) -> String {
    match user_code {
        Some(q) => q.eqname(),
        None => format!("err:{}", code.local()),
    }
}

fn render(
    code: &ErrorCode,
    user_code: &Option<QName>,
    message: &str,
    location: &Option<SourceLocation>,
) -> String {
    let mut out = format!("error: {message} ({})", render_code(*code, user_code));
    if let Some(loc) = location {
        let _ = fmt::Write::write_fmt(&mut out, format_args!(" at {loc}"));
    }
    out
}
