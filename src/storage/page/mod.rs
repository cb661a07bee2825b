pub mod bucket;
pub mod directory;
pub mod error;
pub mod record;

pub use bucket::{HashBucket, IndexKey, BUCKET_ARRAY_SIZE};
pub use directory::{HashDirectory, DIRECTORY_ARRAY_SIZE, MAX_DEPTH};
pub use error::PageError;
pub use record::{RecordPage, RecordPageHeader};
