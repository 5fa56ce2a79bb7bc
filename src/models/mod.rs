//! Data models for the catalog

pub mod author;
pub mod book;
pub mod book_author;
pub mod query;
pub mod token;

// Re-export commonly used types
pub use author::{Author, AuthorInput, AuthorPatch, AuthorSummary};
pub use book::{Book, BookInput, BookPatch, NewBook};
pub use book_author::BookAuthor;
pub use query::{AuthorQuery, BookQuery, ListParams};
