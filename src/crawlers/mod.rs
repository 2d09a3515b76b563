pub mod engine;
pub mod fetcher;
pub mod frontier;
pub mod web;

#[cfg(test)]
mod tests;

pub use engine::Engine;
pub use fetcher::Fetcher;
pub use frontier::{Frontier, FrontierEntry};
pub use web::{BrowserSession, FetchError};
