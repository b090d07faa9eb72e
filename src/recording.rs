pub mod assembler;
pub mod identity;
pub mod record;
pub mod recorder;
pub mod timeline;

pub use record::{RecordBase, RecordKind, RequestRecord, ResponseRecord};
pub use recorder::Recorder;
pub use timeline::RecordingTimeline;
