//! Result type alias for Ponte
//!
//! This module provides a convenient Result type alias that uses PonteError
//! as the error type.

use super::errors::PonteError;

/// Result type alias for Ponte operations
///
/// Use this throughout the codebase for fallible operations.
///
/// # Examples
///
/// ```
/// use ponte::domain::result::Result;
/// use ponte::domain::errors::PonteError;
///
/// fn example_function() -> Result<String> {
///     Ok("success".to_string())
/// }
///
/// fn failing_function() -> Result<()> {
///     Err(PonteError::Mapping("missing subject".to_string()))
/// }
/// ```
pub type Result<T> = std::result::Result<T, PonteError>;
