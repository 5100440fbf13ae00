//! CLI command implementations.

pub mod extract;
pub mod fetch;
pub mod relay;
pub mod tables;

pub use extract::ExtractCommand;
pub use fetch::{FetchCommand, ImageSink};
pub use relay::RelayCommand;
pub use tables::TablesCommand;
