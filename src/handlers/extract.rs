//! Extractors that reject with the portal error envelope
//!
//! axum's own `Json`, `Query` and `Path` answer bad input with a plain-text
//! 4xx. These wrappers turn the same rejections into a 400 `PortalError`
//! naming the offending field.

use crate::error::PortalError;
use axum::extract::{FromRequest, FromRequestParts};

/// JSON request body
#[derive(Debug, FromRequest)]
#[from_request(via(axum::Json), rejection(PortalError))]
pub struct PortalJson<T>(pub T);

/// Query string
#[derive(Debug, FromRequestParts)]
#[from_request(via(axum::extract::Query), rejection(PortalError))]
pub struct PortalQuery<T>(pub T);

/// Path parameters
#[derive(Debug, FromRequestParts)]
#[from_request(via(axum::extract::Path), rejection(PortalError))]
pub struct PortalPath<T>(pub T);
