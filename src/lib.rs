pub mod config;
pub mod dictionary;
pub mod dom;
pub mod error;
pub mod extract;
pub mod fetch;
pub mod harness;
pub mod listing;
pub mod locator;
pub mod model;
pub mod navigator;
pub mod normalize;
pub mod pagination;
pub mod pipeline;
pub mod store;
pub mod traversal;
