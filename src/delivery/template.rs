//! Template rendering seam.
//!
//! Template syntax is out of scope for this crate: delivery only needs
//! "template id + context in, manifest text out". Deployments plug their own
//! engine in; the default emits the context as a canonical JSON manifest so
//! the delivery path works end to end without one.

use crate::error::JobError;
use crate::jobs::Payload;

pub trait TemplateEngine: Send + Sync {
    fn render(&self, template_id: &str, context: &Payload) -> Result<String, JobError>;
}

/// Default engine: pretty-printed JSON of the render context.
#[derive(Debug, Default)]
pub struct JsonManifestEngine;

impl TemplateEngine for JsonManifestEngine {
    fn render(&self, template_id: &str, context: &Payload) -> Result<String, JobError> {
        let mut manifest = Payload::new();
        manifest.insert(
            "template".to_string(),
            serde_json::Value::String(template_id.to_string()),
        );
        for (key, value) in context {
            manifest.insert(key.clone(), value.clone());
        }
        serde_json::to_string_pretty(&manifest)
            .map_err(|err| JobError::Delivery(format!("manifest serialization failed: {err}")))
    }
}
