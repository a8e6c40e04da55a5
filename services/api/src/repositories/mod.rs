//! API service repositories

pub mod note;
pub mod tag;

pub use note::NoteRepository;
pub use tag::TagRepository;
