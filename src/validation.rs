//! Request body validation.
//!
//! Each check yields a human-readable message; all failing checks for one
//! request are reported together as a single [`Error::Validation`].

use uuid::Uuid;

use crate::error::{Error, Result};
use crate::models::{LoginRequest, RegisterRequest, ReviewRequest, UpdateReviewRequest};

pub const USERNAME_MIN: usize = 3;
pub const USERNAME_MAX: usize = 50;
pub const PASSWORD_MIN: usize = 6;
pub const NAME_MAX: usize = 100;
pub const CONTENT_MIN: usize = 10;
pub const CONTENT_MAX: usize = 5000;
pub const RATE_MAX: i64 = 5;

/// Validated review content and rate
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReviewInput {
    pub content: String,
    pub rate: u8,
}

#[derive(Default)]
struct Violations(Vec<String>);

impl Violations {
    fn check(&mut self, ok: bool, message: &str) {
        if !ok {
            self.0.push(message.to_string());
        }
    }

    fn finish(self) -> Result<()> {
        if self.0.is_empty() {
            Ok(())
        } else {
            Err(Error::Validation(self.0.join("; ")))
        }
    }
}

fn is_blank(s: &str) -> bool {
    s.trim().is_empty()
}

/// Loose structural email check: one `@` with non-empty parts, no whitespace
fn is_email(s: &str) -> bool {
    let mut parts = s.split('@');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(local), Some(domain), None) => {
            !local.is_empty()
                && !domain.is_empty()
                && !domain.starts_with('.')
                && !domain.ends_with('.')
                && !s.chars().any(char::is_whitespace)
        }
        _ => false,
    }
}

impl RegisterRequest {
    pub fn validate(&self) -> Result<()> {
        let mut v = Violations::default();
        let username_len = self.username.chars().count();

        if is_blank(&self.username) {
            v.check(false, "Username is required");
        } else {
            v.check(
                (USERNAME_MIN..=USERNAME_MAX).contains(&username_len),
                "Username must be between 3 and 50 characters",
            );
        }

        if is_blank(&self.password) {
            v.check(false, "Password is required");
        } else {
            v.check(
                self.password.chars().count() >= PASSWORD_MIN,
                "Password must be at least 6 characters",
            );
        }

        if is_blank(&self.name) {
            v.check(false, "Name is required");
        } else {
            v.check(
                self.name.chars().count() <= NAME_MAX,
                "Name must not exceed 100 characters",
            );
        }

        if is_blank(&self.surname) {
            v.check(false, "Surname is required");
        } else {
            v.check(
                self.surname.chars().count() <= NAME_MAX,
                "Surname must not exceed 100 characters",
            );
        }

        if is_blank(&self.email) {
            v.check(false, "Email is required");
        } else {
            v.check(is_email(&self.email), "Email should be valid");
        }

        v.finish()
    }
}

impl LoginRequest {
    pub fn validate(&self) -> Result<()> {
        let mut v = Violations::default();
        v.check(!is_blank(&self.username), "Username is required");
        v.check(!is_blank(&self.password), "Password is required");
        v.finish()
    }
}

fn review_input(content: &str, rate: Option<i64>, v: &mut Violations) -> Option<ReviewInput> {
    let content_len = content.chars().count();

    if is_blank(content) {
        v.check(false, "Content is required");
    } else {
        v.check(
            (CONTENT_MIN..=CONTENT_MAX).contains(&content_len),
            "Content must be between 10 and 5000 characters",
        );
    }

    match rate {
        None => v.check(false, "Rate is required"),
        Some(r) => {
            v.check(r >= 0, "Rate must be at least 0");
            v.check(r <= RATE_MAX, "Rate must not exceed 5");
        }
    }

    let rate = rate.and_then(|r| u8::try_from(r).ok()).filter(|r| i64::from(*r) <= RATE_MAX)?;
    Some(ReviewInput {
        content: content.to_string(),
        rate,
    })
}

impl ReviewRequest {
    /// Returns the target pub id with the validated content and rate
    pub fn validate(&self) -> Result<(Uuid, ReviewInput)> {
        let mut v = Violations::default();
        v.check(self.pub_id.is_some(), "Pub ID is required");
        let input = review_input(&self.content, self.rate, &mut v);
        v.finish()?;

        match (self.pub_id, input) {
            (Some(pub_id), Some(input)) => Ok((pub_id, input)),
            _ => Err(Error::validation("Invalid review")),
        }
    }
}

impl UpdateReviewRequest {
    pub fn validate(&self) -> Result<ReviewInput> {
        let mut v = Violations::default();
        let input = review_input(&self.content, self.rate, &mut v);
        v.finish()?;
        input.ok_or_else(|| Error::validation("Invalid review"))
    }
}
