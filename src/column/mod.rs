//! The multi-genome column walk.

pub mod column_iterator;

pub use column_iterator::{Column, ColumnIterator, ColumnIteratorFlags, ColumnTree};
