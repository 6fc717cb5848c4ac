//! Shared data model for compiled Parley dialogue programs.

pub mod defs;
pub mod markup;
pub mod validate;

pub use defs::*;
pub use markup::{MarkupResult, MarkupValue, Segment, SegmentBuilder, Wrapper, WrapperKind, parse_markup, slice_markup};
pub use validate::{ValidationError, validate_program};
