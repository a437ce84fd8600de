//! Shared namespace and collation URI constants.

/// The reserved `xml` namespace.
pub const XML_URI: &str = "http://www.w3.org/XML/1998/namespace";

/// Namespace URI used for W3C-defined XSLT/XQuery error codes (xqt-errors).
pub const ERR_NS: &str = "http://www.w3.org/2005/xqt-errors";

/// The XSLT namespace (used for reserved-name checks on computed names).
pub const XSLT_NS: &str = "http://www.w3.org/1999/XSL/Transform";

/// Unicode codepoint collation.
pub const CODEPOINT_URI: &str =
    "http://www.w3.org/2005/xpath-functions/collation/codepoint";

/// Simple case-blind collation (engine extension).
pub const CASE_BLIND_URI: &str = "urn:x-xslt-runtime:collation:case-blind";
