//! Data providers, frame codecs and sinks

pub mod frame;
pub mod memory;
pub mod provider;
pub mod schema;
pub mod sink;
pub mod synthetic;
pub mod yahoo;

pub use memory::MemoryProvider;
pub use provider::{DataProvider, DataSource, FetchError, FetchResult};
pub use schema::{BarSchema, SchemaError};
pub use sink::{file_sink, Ack, CsvSink, OutputFormat, ParquetSink, Sink, SinkMeta, WriteError};
pub use synthetic::SyntheticProvider;
pub use yahoo::YahooProvider;
