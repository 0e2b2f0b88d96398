//! Domain types for barflow

pub mod bar;
pub mod series;
pub mod window;

pub use bar::{AggregatedBar, Bar, RawBar};
pub use series::{SeriesScope, TimeSeries};
pub use window::{DateWindow, WindowError};

/// Symbol type alias
pub type Symbol = String;
