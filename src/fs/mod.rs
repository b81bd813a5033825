//! Hierarchical filesystem view over a flat object store

pub mod attributes;
pub mod filesystem;
pub mod listing;
pub mod path;

pub use attributes::{AttributeResolver, AttributeValue, AttributeView, FileAttributes, FileKind, Permissions, Resolution};
pub use filesystem::S3FileSystem;
pub use listing::{DirectoryEntry, DirectoryStream, EntryFilter, KeyScan};
pub use path::{FileSystemId, S3Path, SEPARATOR};
