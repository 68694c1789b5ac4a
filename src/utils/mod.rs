//! Small shared helpers used by binding resolution and the pipelines.

pub mod json_ext;
