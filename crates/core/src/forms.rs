//! Sign-in and sign-up form validation.
//!
//! Checked locally before any request is made, so obviously bad input
//! never reaches the backend.

use serde::Serialize;
use validator::{Validate, ValidationErrors};

/// Credentials for `auth/login`.
#[derive(Debug, Clone, Serialize, Validate)]
pub struct LoginForm {
    #[validate(email(message = "Enter a valid email address"))]
    pub email: String,
    #[validate(length(min = 1, message = "Password is required"))]
    pub password: String,
}

/// New account details for `auth/register`.
#[derive(Debug, Clone, Serialize, Validate)]
pub struct RegisterForm {
    #[validate(length(min = 1, max = 64, message = "Nickname must be 1-64 characters"))]
    pub nick_name: String,
    #[validate(email(message = "Enter a valid email address"))]
    pub email: String,
    #[validate(length(min = 1, message = "Password is required"))]
    pub password: String,
    /// Local only; never sent.
    #[serde(skip)]
    #[validate(must_match(other = "password", message = "Passwords don't match"))]
    pub confirm_password: String,
}

/// Flatten validation errors into one line per failing field, sorted by
/// field name.
pub fn describe_errors(errors: &ValidationErrors) -> Vec<String> {
    let mut lines: Vec<String> = errors
        .field_errors()
        .into_iter()
        .flat_map(|(field, errs)| {
            errs.iter().map(move |e| match &e.message {
                Some(msg) => format!("{field}: {msg}"),
                None => format!("{field}: invalid ({})", e.code),
            })
        })
        .collect();
    lines.sort();
    lines
}
