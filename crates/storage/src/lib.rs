#![forbid(unsafe_code)]

mod store;

pub use store::{StoreError, TreeConfig, TreeStore};
