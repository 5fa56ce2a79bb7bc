//! Author model and related types

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;
use validator::{Validate, ValidationError, ValidationErrors};

/// Full author record, with the derived `book_count`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Author {
    pub id: Uuid,
    pub first_name: String,
    pub last_name: String,
    /// "{first_name} {last_name}"
    pub full_name: String,
    pub birth_date: Option<NaiveDate>,
    pub biography: Option<String>,
    /// Number of books currently referencing this author
    pub book_count: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Author as embedded in book payloads
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow, ToSchema)]
pub struct AuthorSummary {
    pub id: Uuid,
    pub first_name: String,
    pub last_name: String,
    pub full_name: String,
    pub birth_date: Option<NaiveDate>,
    pub biography: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<&Author> for AuthorSummary {
    fn from(author: &Author) -> Self {
        Self {
            id: author.id,
            first_name: author.first_name.clone(),
            last_name: author.last_name.clone(),
            full_name: author.full_name.clone(),
            birth_date: author.birth_date,
            biography: author.biography.clone(),
            created_at: author.created_at,
        }
    }
}

pub fn full_name(first_name: &str, last_name: &str) -> String {
    format!("{} {}", first_name, last_name)
}

/// Create / full update author request
#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct AuthorInput {
    #[validate(length(min = 1, max = 100, message = "Must be between 1 and 100 characters"))]
    pub first_name: String,
    #[validate(length(min = 1, max = 100, message = "Must be between 1 and 100 characters"))]
    pub last_name: String,
    pub biography: Option<String>,
    pub birth_date: Option<NaiveDate>,
}

/// Partial update author request.
///
/// Every field is a double option: absent keeps the stored value, `null`
/// clears it. Names cannot be cleared, see [`AuthorPatch::check`].
#[derive(Debug, Clone, Default, Deserialize, Validate, ToSchema)]
pub struct AuthorPatch {
    #[serde(default, with = "::serde_with::rust::double_option")]
    #[schema(value_type = Option<String>)]
    #[validate(length(min = 1, max = 100, message = "Must be between 1 and 100 characters"))]
    pub first_name: Option<Option<String>>,
    #[serde(default, with = "::serde_with::rust::double_option")]
    #[schema(value_type = Option<String>)]
    #[validate(length(min = 1, max = 100, message = "Must be between 1 and 100 characters"))]
    pub last_name: Option<Option<String>>,
    #[serde(default, with = "::serde_with::rust::double_option")]
    #[schema(value_type = Option<String>)]
    pub biography: Option<Option<String>>,
    #[serde(default, with = "::serde_with::rust::double_option")]
    #[schema(value_type = Option<NaiveDate>)]
    pub birth_date: Option<Option<NaiveDate>>,
}

impl From<AuthorInput> for AuthorPatch {
    /// A full update replaces names; optional fields only change when sent
    fn from(input: AuthorInput) -> Self {
        Self {
            first_name: Some(Some(input.first_name)),
            last_name: Some(Some(input.last_name)),
            biography: input.biography.map(Some),
            birth_date: input.birth_date.map(Some),
        }
    }
}

impl AuthorPatch {
    pub fn is_empty(&self) -> bool {
        self.first_name.is_none()
            && self.last_name.is_none()
            && self.biography.is_none()
            && self.birth_date.is_none()
    }

    /// Field validation plus rejection of `null` names
    pub fn check(&self) -> Result<(), ValidationErrors> {
        let mut errors = self.validate().err().unwrap_or_else(ValidationErrors::new);
        reject_null(&mut errors, "first_name", &self.first_name);
        reject_null(&mut errors, "last_name", &self.last_name);
        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

/// Record an error when a required field was sent as `null`
pub(crate) fn reject_null<T>(errors: &mut ValidationErrors, field: &'static str, value: &Option<Option<T>>) {
    if matches!(value, Some(None)) {
        errors.add(
            field,
            ValidationError::new("null").with_message("This field may not be null.".into()),
        );
    }
}
