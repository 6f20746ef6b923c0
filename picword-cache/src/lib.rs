pub mod cache;

pub use cache::{intern_key, Atom};
