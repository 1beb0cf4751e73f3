#![allow(dead_code)]

pub mod store;
pub mod tags;

pub use store::{FakeStore, Op, record};
pub use tags::StaticTags;
