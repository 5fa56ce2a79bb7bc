//! Book model and related types

use chrono::{DateTime, NaiveDate, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;
use validator::{Validate, ValidationError, ValidationErrors};

use super::author::{reject_null, AuthorSummary};

/// ISBN-10 (last character may be X) or ISBN-13, no separators
static ISBN_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(?:\d{9}[\dX]|\d{13})$").expect("valid ISBN regex"));

pub fn validate_isbn(isbn: &str) -> Result<(), ValidationError> {
    if ISBN_RE.is_match(isbn) {
        Ok(())
    } else {
        let mut err = ValidationError::new("isbn");
        err.message = Some("Must be 10 or 13 characters of digits (ISBN-10 may end in X)".into());
        Err(err)
    }
}

/// Full book record with its authors
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Book {
    pub id: Uuid,
    pub title: String,
    pub summary: Option<String>,
    pub isbn: String,
    pub publication_date: NaiveDate,
    #[sqlx(skip)]
    pub authors: Vec<AuthorSummary>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Book {
    pub fn author_ids(&self) -> Vec<Uuid> {
        self.authors.iter().map(|a| a.id).collect()
    }
}

/// Create / full update book request
#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct BookInput {
    #[validate(length(min = 1, max = 255, message = "Must be between 1 and 255 characters"))]
    pub title: String,
    pub summary: Option<String>,
    #[validate(custom(function = "validate_isbn"))]
    pub isbn: String,
    pub publication_date: NaiveDate,
    #[validate(length(min = 1, message = "A book needs at least one author"))]
    pub author_ids: Vec<Uuid>,
}

/// Partial update book request.
///
/// Every field is a double option so an explicit `null` is told apart from
/// an absent field. Only `summary` may be cleared; `null` anywhere else is
/// rejected by [`BookPatch::check`]. `author_ids` absent leaves the
/// association set untouched; an empty list is rejected.
#[derive(Debug, Clone, Default, Deserialize, Validate, ToSchema)]
pub struct BookPatch {
    #[serde(default, with = "::serde_with::rust::double_option")]
    #[schema(value_type = Option<String>)]
    #[validate(length(min = 1, max = 255, message = "Must be between 1 and 255 characters"))]
    pub title: Option<Option<String>>,
    #[serde(default, with = "::serde_with::rust::double_option")]
    #[schema(value_type = Option<String>)]
    pub summary: Option<Option<String>>,
    #[serde(default, with = "::serde_with::rust::double_option")]
    #[schema(value_type = Option<String>)]
    #[validate(custom(function = "validate_isbn"))]
    pub isbn: Option<Option<String>>,
    #[serde(default, with = "::serde_with::rust::double_option")]
    #[schema(value_type = Option<NaiveDate>)]
    pub publication_date: Option<Option<NaiveDate>>,
    #[serde(default, with = "::serde_with::rust::double_option")]
    #[schema(value_type = Option<Vec<Uuid>>)]
    #[validate(length(min = 1, message = "A book needs at least one author"))]
    pub author_ids: Option<Option<Vec<Uuid>>>,
}

impl BookPatch {
    /// Field validation plus rejection of `null` on required columns
    pub fn check(&self) -> Result<(), ValidationErrors> {
        let mut errors = self.validate().err().unwrap_or_else(ValidationErrors::new);
        reject_null(&mut errors, "title", &self.title);
        reject_null(&mut errors, "isbn", &self.isbn);
        reject_null(&mut errors, "publication_date", &self.publication_date);
        reject_null(&mut errors, "author_ids", &self.author_ids);
        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Replacement author set, if one was sent
    pub fn author_ids(&self) -> Option<&[Uuid]> {
        self.author_ids.as_ref().and_then(|ids| ids.as_deref())
    }
}

impl From<BookInput> for BookPatch {
    fn from(input: BookInput) -> Self {
        Self {
            title: Some(Some(input.title)),
            summary: input.summary.map(Some),
            isbn: Some(Some(input.isbn)),
            publication_date: Some(Some(input.publication_date)),
            author_ids: Some(Some(input.author_ids)),
        }
    }
}

/// Validated data handed to the store on creation
#[derive(Debug, Clone)]
pub struct NewBook {
    pub title: String,
    pub summary: Option<String>,
    pub isbn: String,
    pub publication_date: NaiveDate,
    /// Deduplicated, non-empty
    pub author_ids: Vec<Uuid>,
}

/// Collapse repeated author ids, keeping first-seen order
pub fn dedup_ids(ids: &[Uuid]) -> Vec<Uuid> {
    let mut seen = std::collections::HashSet::with_capacity(ids.len());
    ids.iter().copied().filter(|id| seen.insert(*id)).collect()
}
