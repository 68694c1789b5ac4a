//! Local filesystem writes for synthesized audio buffers.

use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde_json::{Value, json};

use crate::registry::{Capability, CapabilityError, NamedInputs};

/// `fs.write`: decode a base64 buffer and write it to a path, creating
/// parent directories as needed.
///
/// Inputs: `path`, `buffer`. Output: `{"path": ...}`.
pub struct FsWrite;

#[async_trait]
impl Capability for FsWrite {
    async fn invoke(&self, inputs: NamedInputs, _params: &Value) -> Result<Value, CapabilityError> {
        let path = inputs.require_str("path")?;
        let encoded = inputs.require_str("buffer")?;
        let bytes = BASE64
            .decode(encoded)
            .map_err(|e| CapabilityError::MissingInput {
                what: format!("buffer (invalid base64: {e})"),
            })?;

        if let Some(parent) = std::path::Path::new(path).parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(path, &bytes).await?;
        Ok(json!({"path": path}))
    }
}
