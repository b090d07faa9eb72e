pub mod writer;

pub use writer::RecordWriter;
