/// Request-scoped identity extracted by the authentication layer and
/// threaded explicitly through the request pipeline. Nothing is attached
/// to the raw request object.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RequestContext {
    pub project_id: String,
    pub tenant_id: Option<String>,
    /// The service the request is addressed to, when known.
    pub service: Option<String>,
}

impl RequestContext {
    pub fn new(project_id: impl Into<String>) -> Self {
        RequestContext {
            project_id: project_id.into(),
            tenant_id: None,
            service: None,
        }
    }

    pub fn with_service(mut self, service: impl Into<String>) -> Self {
        self.service = Some(service.into());
        self
    }

    pub fn with_tenant(mut self, tenant_id: impl Into<String>) -> Self {
        self.tenant_id = Some(tenant_id.into());
        self
    }
}
