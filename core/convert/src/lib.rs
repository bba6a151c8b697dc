//! Document conversion for docsync.
//!
//! The sync engine never converts text itself. It hands a source file and a
//! pair of formats to a [`Converter`] and waits for the result.

pub mod converter;
pub mod pandoc;
pub mod passthrough;

pub use converter::Converter;
pub use pandoc::PandocConverter;
pub use passthrough::PassthroughConverter;
