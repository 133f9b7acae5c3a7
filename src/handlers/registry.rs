//! Static category → handler registry.
//!
//! Built once at start-up and read-only afterwards. Lookup is O(1) with no
//! prefix fallback; unregistered categories resolve to a fallback handler
//! that fails pre-checks with `UnknownCategory` instead of silently
//! no-opping.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::JobError;

use super::{compute, k8s, misc, networking, storage, Capabilities, HandlerContext, JobHandler};

pub struct HandlerRegistry {
    handlers: HashMap<String, Arc<dyn JobHandler>>,
    fallback: Arc<dyn JobHandler>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
            fallback: Arc::new(UnsupportedCategoryHandler),
        }
    }

    pub fn register(&mut self, handler: Arc<dyn JobHandler>) {
        self.handlers.insert(handler.category().to_string(), handler);
    }

    /// Resolve a category to its handler. Unknown categories get the
    /// fallback handler so the failure surfaces through the normal
    /// pre-check path.
    pub fn resolve(&self, category: &str) -> Arc<dyn JobHandler> {
        self.handlers
            .get(category)
            .cloned()
            .unwrap_or_else(|| self.fallback.clone())
    }

    pub fn contains(&self, category: &str) -> bool {
        self.handlers.contains_key(category)
    }

    pub fn categories(&self) -> Vec<&str> {
        let mut categories: Vec<&str> = self.handlers.keys().map(String::as_str).collect();
        categories.sort_unstable();
        categories
    }
}

impl Default for HandlerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Registry with every category handler this crate ships.
pub fn default_registry() -> HandlerRegistry {
    let mut registry = HandlerRegistry::new();
    registry.register(Arc::new(k8s::NamespaceHandler));
    registry.register(Arc::new(k8s::PersistentVolumesHandler));
    registry.register(Arc::new(k8s::ServiceMeshHandler));
    registry.register(Arc::new(compute::VirtualMachinesHandler));
    registry.register(Arc::new(compute::OsImagesHandler));
    registry.register(Arc::new(networking::LoadBalancerHandler));
    registry.register(Arc::new(networking::CnameHandler));
    registry.register(Arc::new(networking::FirewallHandler));
    registry.register(Arc::new(storage::S3TenantHandler));
    registry.register(Arc::new(storage::S3BucketHandler));
    registry.register(Arc::new(misc::MiscHandler));
    registry
}

/// Fallback for categories nothing was registered for.
struct UnsupportedCategoryHandler;

#[async_trait]
impl JobHandler for UnsupportedCategoryHandler {
    fn category(&self) -> &'static str {
        "unsupported"
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::NONE
    }

    async fn pre_checks(&self, ctx: &HandlerContext) -> Result<(), JobError> {
        Err(JobError::UnknownCategory(ctx.request.category.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::{JobRequest, JobType, Payload};

    fn context(category: &str) -> HandlerContext {
        HandlerContext {
            request: JobRequest {
                job_id: "job-1".to_string(),
                tenant_id: "acme".to_string(),
                category: category.to_string(),
                job_type: JobType::Create,
                payload: Payload::new(),
            },
            tenant_name: "acme".to_string(),
            correlation_id: "corr".to_string(),
        }
    }

    #[test]
    fn default_registry_covers_all_categories() {
        let registry = default_registry();
        for category in [
            "k8s/namespace",
            "k8s/pvs",
            "k8s/service_mesh",
            "compute/vms",
            "compute/osimages",
            "enterprise_networking/lb",
            "enterprise_networking/cname",
            "enterprise_networking/fw",
            "storage/s3tenant",
            "storage/s3bucket",
            "misc",
        ] {
            assert!(registry.contains(category), "missing {category}");
        }
    }

    #[tokio::test]
    async fn unknown_category_resolves_to_failing_fallback() {
        let registry = default_registry();
        let handler = registry.resolve("dns/zones");
        assert_eq!(handler.capabilities(), Capabilities::NONE);

        let err = handler.pre_checks(&context("dns/zones")).await.unwrap_err();
        assert!(matches!(err, JobError::UnknownCategory(cat) if cat == "dns/zones"));
    }

    #[test]
    fn no_prefix_fallback() {
        let registry = default_registry();
        assert!(!registry.contains("k8s"));
        let handler = registry.resolve("k8s");
        assert_eq!(handler.category(), "unsupported");
    }
}
