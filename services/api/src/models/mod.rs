//! API service models

pub mod note;
pub mod tag;

pub use note::{CreateNoteRequest, Note, UpdateNoteRequest};
pub use tag::{CreateTagRequest, Tag};
