//! Status code lookup tables.
//!
//! Reason phrases come from [`http::StatusCode::canonical_reason`], which
//! covers the IANA registry. A code with no reason phrase is treated as
//! unregistered: the error sink replaces it with 500.
//!
//! ```rust
//! use strata::status;
//!
//! assert_eq!(status::reason(404), Some("Not Found"));
//! assert_eq!(status::reason(299), None);
//! assert!(status::is_empty_body(204));
//! ```

use http::StatusCode;

/// Canonical reason phrase for a registered status code.
pub fn reason(code: u16) -> Option<&'static str> {
    StatusCode::from_u16(code).ok()?.canonical_reason()
}

/// `true` if `code` has an entry in the reason table.
pub fn is_registered(code: u16) -> bool {
    reason(code).is_some()
}

/// Statuses whose responses must not carry a body.
pub fn is_empty_body(code: u16) -> bool {
    matches!(code, 204 | 205 | 304)
}

/// Statuses that redirect the client.
pub fn is_redirect(code: u16) -> bool {
    matches!(code, 300 | 301 | 302 | 303 | 305 | 307 | 308)
}
