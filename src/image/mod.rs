//! Image module
//!
//! Composes build contexts from language defaults and example files, pins
//! dependency versions and builds the images examples run from.

pub mod builder;
pub mod context;
pub mod versions;

pub use builder::{image_tag, BuildContext, ImageBuilder};
pub use context::{copy_dir_contents, BuildContextComposer, DOCKERFILE_NAME};
pub use versions::Versions;
