pub mod csv;
pub mod history;

pub use csv::{load, save, LoadSummary};
pub use history::{History, CAPACITY, SMOOTHING_WINDOW};
