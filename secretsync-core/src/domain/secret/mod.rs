// secretsync-core/src/domain/secret/mod.rs

pub mod merge;
pub mod path;
pub mod value;

pub use merge::{merge, merge_n, merge_with_mode, ListMergeMode};
pub use path::SecretPath;
pub use value::{SecretValue, Version, VersionedSecret};
