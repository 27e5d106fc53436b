// Test Helpers Module - in-memory collaborators for the batch writer
//
// Stand-ins for the blob store, relational sink and sequence source with
// observable state, plus record builders. Used by unit tests and by the
// integration tests under tests/.

pub mod blob_store;
pub mod records;
pub mod sequence;
pub mod sink;

pub use blob_store::MemoryBlobStore;
pub use records::{
    fixed_time, log_record, png_attachment, png_bytes, record_at, text_attachment,
    unreadable_attachment, FailingPayload,
};
pub use sequence::{AllocationCall, RecordingSequenceSource};
pub use sink::MemoryRelationalSink;
