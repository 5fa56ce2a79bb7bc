//! List query parameters: filters, search terms and ordering for authors and books.
//!
//! Parsing is strict: unknown parameters, unknown ordering fields and
//! malformed typed values are reported as validation errors naming the
//! offending parameter. The parsed queries are store-agnostic; each
//! repository adapter translates them into its own query language.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde_json::Value;
use url::form_urlencoded;
use uuid::Uuid;

use crate::error::{AppError, AppResult};

pub const PAGE_PARAM: &str = "page";
pub const SEARCH_PARAM: &str = "search";
pub const ORDERING_PARAM: &str = "ordering";

/// Raw query-string pairs as sent by the caller
#[derive(Debug, Clone, Default)]
pub struct ListParams {
    pairs: Vec<(String, String)>,
}

impl ListParams {
    pub fn new(pairs: Vec<(String, String)>) -> Self {
        Self { pairs }
    }

    /// Last non-empty value for `key`; empty values count as absent
    pub fn get(&self, key: &str) -> Option<&str> {
        self.pairs
            .iter()
            .rev()
            .find(|(k, v)| k == key && !v.trim().is_empty())
            .map(|(_, v)| v.trim())
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.pairs.iter().map(|(k, _)| k.as_str())
    }

    /// 1-indexed page number, defaulting to 1
    pub fn page(&self) -> AppResult<usize> {
        match self.get(PAGE_PARAM) {
            None => Ok(1),
            Some(raw) => match raw.parse::<usize>() {
                Ok(page) if page >= 1 => Ok(page),
                _ => Err(AppError::invalid_field(PAGE_PARAM, "A valid page number (>= 1) is required.")),
            },
        }
    }

    /// Order-independent representation used for cache keys.
    ///
    /// `page` and empty values are dropped so every page of the same
    /// listing shares one cache entry.
    pub fn canonical(&self) -> String {
        // Later values overwrite earlier ones, matching `get`
        let pairs: BTreeMap<&str, &str> = self
            .pairs
            .iter()
            .filter(|(k, v)| k != PAGE_PARAM && !v.trim().is_empty())
            .map(|(k, v)| (k.as_str(), v.trim()))
            .collect();
        form_urlencoded::Serializer::new(String::new())
            .extend_pairs(pairs)
            .finish()
    }

    /// Same pairs with `page` replaced; page 1 drops the parameter
    pub fn with_page(&self, page: usize) -> String {
        let mut serializer = form_urlencoded::Serializer::new(String::new());
        for (k, v) in self.pairs.iter().filter(|(k, _)| k != PAGE_PARAM) {
            serializer.append_pair(k, v);
        }
        if page > 1 {
            serializer.append_pair(PAGE_PARAM, &page.to_string());
        }
        serializer.finish()
    }
}

/// Collects per-parameter validation messages
#[derive(Default)]
struct ParamErrors(BTreeMap<String, Vec<String>>);

impl ParamErrors {
    fn add(&mut self, param: &str, message: impl Into<String>) {
        self.0.entry(param.to_string()).or_default().push(message.into());
    }

    fn check_known(&mut self, params: &ListParams, known: &[&str]) {
        for key in params.keys() {
            if !known.contains(&key) && !self.0.contains_key(key) {
                self.add(key, "Unknown query parameter.");
            }
        }
    }

    fn date(&mut self, params: &ListParams, key: &str) -> Option<NaiveDate> {
        let raw = params.get(key)?;
        match NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
            Ok(date) => Some(date),
            Err(_) => {
                self.add(key, "Enter a valid date (YYYY-MM-DD).");
                None
            }
        }
    }

    fn uuid(&mut self, params: &ListParams, key: &str) -> Option<Uuid> {
        let raw = params.get(key)?;
        match Uuid::parse_str(raw) {
            Ok(id) => Some(id),
            Err(_) => {
                self.add(key, "Enter a valid UUID.");
                None
            }
        }
    }

    fn ordering<F: OrderField>(&mut self, params: &ListParams) -> Vec<OrderTerm<F>> {
        let Some(raw) = params.get(ORDERING_PARAM) else {
            return Vec::new();
        };
        let mut terms: Vec<OrderTerm<F>> = Vec::new();
        for token in raw.split(',').map(str::trim).filter(|t| !t.is_empty()) {
            let (descending, name) = match token.strip_prefix('-') {
                Some(name) => (true, name),
                None => (false, token),
            };
            match F::parse(name) {
                Some(field) if terms.iter().all(|t| t.field != field) => {
                    terms.push(OrderTerm { field, descending })
                }
                Some(_) => {}
                None => self.add(ORDERING_PARAM, format!("Cannot order by '{}'.", name)),
            }
        }
        terms
    }

    fn finish(self) -> AppResult<()> {
        if self.0.is_empty() {
            return Ok(());
        }
        let details = self
            .0
            .into_iter()
            .map(|(k, v)| (k, Value::Array(v.into_iter().map(Value::String).collect())))
            .collect();
        Err(AppError::Validation(Value::Object(details)))
    }
}

/// Split a search string into terms; every term must match some field
pub fn search_terms(params: &ListParams) -> Vec<String> {
    params
        .get(SEARCH_PARAM)
        .map(|raw| {
            raw.split(|c: char| c.is_whitespace() || c == ',')
                .filter(|t| !t.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

/// A sortable field of a listing
pub trait OrderField: Copy + PartialEq + Sized {
    fn parse(name: &str) -> Option<Self>;
    fn name(&self) -> &'static str;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrderTerm<F> {
    pub field: F,
    pub descending: bool,
}

impl<F> OrderTerm<F> {
    pub fn asc(field: F) -> Self {
        Self { field, descending: false }
    }

    pub fn desc(field: F) -> Self {
        Self { field, descending: true }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthorOrderField {
    LastName,
    FirstName,
    BirthDate,
    BookCount,
}

impl OrderField for AuthorOrderField {
    fn parse(name: &str) -> Option<Self> {
        match name {
            "last_name" => Some(Self::LastName),
            "first_name" => Some(Self::FirstName),
            "birth_date" => Some(Self::BirthDate),
            "book_count" => Some(Self::BookCount),
            _ => None,
        }
    }

    fn name(&self) -> &'static str {
        match self {
            Self::LastName => "last_name",
            Self::FirstName => "first_name",
            Self::BirthDate => "birth_date",
            Self::BookCount => "book_count",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BookOrderField {
    Title,
    PublicationDate,
}

impl OrderField for BookOrderField {
    fn parse(name: &str) -> Option<Self> {
        match name {
            "title" => Some(Self::Title),
            "publication_date" => Some(Self::PublicationDate),
            _ => None,
        }
    }

    fn name(&self) -> &'static str {
        match self {
            Self::Title => "title",
            Self::PublicationDate => "publication_date",
        }
    }
}

/// Author listing query
#[derive(Debug, Clone, PartialEq)]
pub struct AuthorQuery {
    pub last_name: Option<String>,
    pub birth_date: Option<NaiveDate>,
    pub search: Vec<String>,
    /// Never empty: defaults to (last_name, first_name) ascending
    pub ordering: Vec<OrderTerm<AuthorOrderField>>,
}

impl Default for AuthorQuery {
    fn default() -> Self {
        Self {
            last_name: None,
            birth_date: None,
            search: Vec::new(),
            ordering: Self::default_ordering(),
        }
    }
}

impl AuthorQuery {
    pub const PARAMS: &'static [&'static str] =
        &["last_name", "birth_date", SEARCH_PARAM, ORDERING_PARAM, PAGE_PARAM];

    pub fn default_ordering() -> Vec<OrderTerm<AuthorOrderField>> {
        vec![
            OrderTerm::asc(AuthorOrderField::LastName),
            OrderTerm::asc(AuthorOrderField::FirstName),
        ]
    }

    pub fn from_params(params: &ListParams) -> AppResult<Self> {
        let mut errors = ParamErrors::default();
        errors.check_known(params, Self::PARAMS);

        let birth_date = errors.date(params, "birth_date");
        let ordering = errors.ordering(params);
        if params.page().is_err() {
            errors.add(PAGE_PARAM, "A valid page number (>= 1) is required.");
        }
        errors.finish()?;

        Ok(Self {
            last_name: params.get("last_name").map(str::to_string),
            birth_date,
            search: search_terms(params),
            ordering: if ordering.is_empty() { Self::default_ordering() } else { ordering },
        })
    }
}

/// Book listing query
#[derive(Debug, Clone, PartialEq)]
pub struct BookQuery {
    pub isbn: Option<String>,
    pub publication_date: Option<NaiveDate>,
    pub publication_date_gte: Option<NaiveDate>,
    pub publication_date_lte: Option<NaiveDate>,
    pub author_id: Option<Uuid>,
    pub search: Vec<String>,
    /// Never empty: defaults to publication_date descending
    pub ordering: Vec<OrderTerm<BookOrderField>>,
}

impl Default for BookQuery {
    fn default() -> Self {
        Self {
            isbn: None,
            publication_date: None,
            publication_date_gte: None,
            publication_date_lte: None,
            author_id: None,
            search: Vec::new(),
            ordering: Self::default_ordering(),
        }
    }
}

impl BookQuery {
    pub const PARAMS: &'static [&'static str] = &[
        "isbn",
        "publication_date",
        "publication_date__gte",
        "publication_date__lte",
        "author_id",
        SEARCH_PARAM,
        ORDERING_PARAM,
        PAGE_PARAM,
    ];

    pub fn default_ordering() -> Vec<OrderTerm<BookOrderField>> {
        vec![OrderTerm::desc(BookOrderField::PublicationDate)]
    }

    pub fn from_params(params: &ListParams) -> AppResult<Self> {
        let mut errors = ParamErrors::default();
        errors.check_known(params, Self::PARAMS);

        let publication_date = errors.date(params, "publication_date");
        let publication_date_gte = errors.date(params, "publication_date__gte");
        let publication_date_lte = errors.date(params, "publication_date__lte");
        let author_id = errors.uuid(params, "author_id");
        let ordering = errors.ordering(params);
        if params.page().is_err() {
            errors.add(PAGE_PARAM, "A valid page number (>= 1) is required.");
        }
        errors.finish()?;

        Ok(Self {
            isbn: params.get("isbn").map(str::to_string),
            publication_date,
            publication_date_gte,
            publication_date_lte,
            author_id,
            search: search_terms(params),
            ordering: if ordering.is_empty() { Self::default_ordering() } else { ordering },
        })
    }
}
