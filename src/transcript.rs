//! Assistant transcript model
//!
//! Folds the streamed events of one assistant run into the content blocks of
//! a single turn.

mod block;
mod event;
mod reducer;
pub(crate) mod turn;

#[cfg(test)]
mod proptests;

pub use block::ContentBlock;
pub use event::{Annotation, Event, Usage};
pub use reducer::{
    reduce, CitationFormat, ReducerOptions, StreamInterrupted, TurnUpdate, UsagePlacement,
};
pub use turn::{ChatHistory, Turn};
