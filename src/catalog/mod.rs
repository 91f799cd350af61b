//! Release catalog, board environment catalog and build-config hot patches

pub mod environments;
pub mod hotpatch;
pub mod releases;

pub use environments::BoardEnvironmentCatalog;
pub use hotpatch::{HotPatchReport, apply_hot_patches};
pub use releases::{GithubReleaseCatalog, ReleaseSource};
