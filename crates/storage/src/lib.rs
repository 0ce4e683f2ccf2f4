pub mod codec;
pub mod conformance;
mod error;
pub mod fs;
pub mod key;
pub mod memory;
mod record;
mod traits;

pub use codec::CodecError;
pub use error::StorageError;
pub use key::{
    HashPolicy, KeyError, PartitionKeyPolicy, PartitionScheme, PrefixPolicy, RecordKey,
};
pub use record::Record;
pub use traits::{ArchiveStore, PrimaryStore, PutStatus, RecordStream};
