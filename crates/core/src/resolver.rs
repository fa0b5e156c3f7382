use crate::error::ConfigurationError;
use crate::trigger::{FunctionReference, FunctionReferenceKind};

use std::fmt::Debug;

use url::Url;

/// Path segment under which the router exposes functions by name.
pub const DEFAULT_FUNCTION_PATH_PREFIX: &str = "function";

/// Resolves a function reference to the address it is invoked at.
pub trait EndpointResolver
where
    Self: Clone + Debug + Send + Sync + 'static,
{
    /// Resolves `reference`.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigurationError` if the reference cannot be resolved.
    fn resolve(&self, reference: &FunctionReference) -> Result<Url, ConfigurationError>;
}

/// Resolves functions by name to `{router_url}/{path_prefix}/{name}`.
#[derive(Clone, Debug)]
pub struct RouterResolver {
    path_prefix: String,
    router_url: Url,
}

impl RouterResolver {
    /// Creates a resolver using `DEFAULT_FUNCTION_PATH_PREFIX`.
    #[must_use]
    pub fn new(router_url: Url) -> Self {
        Self {
            path_prefix: DEFAULT_FUNCTION_PATH_PREFIX.to_string(),
            router_url,
        }
    }

    /// Overrides the path prefix. An empty prefix puts functions directly
    /// under the router URL.
    #[must_use]
    pub fn with_path_prefix(mut self, path_prefix: impl Into<String>) -> Self {
        self.path_prefix = path_prefix.into().trim_matches('/').to_string();
        self
    }
}

impl EndpointResolver for RouterResolver {
    fn resolve(&self, reference: &FunctionReference) -> Result<Url, ConfigurationError> {
        if reference.kind != FunctionReferenceKind::Name {
            return Err(ConfigurationError::UnsupportedFunctionReference(
                reference.kind,
            ));
        }

        let name = reference.name.trim_matches('/');
        if name.is_empty() {
            return Err(ConfigurationError::InvalidEndpoint(
                "function name must not be empty".to_string(),
            ));
        }

        let base = self.router_url.as_str().trim_end_matches('/');
        let endpoint = if self.path_prefix.is_empty() {
            format!("{base}/{name}")
        } else {
            format!("{base}/{}/{name}", self.path_prefix)
        };

        Url::parse(&endpoint).map_err(|e| ConfigurationError::InvalidEndpoint(e.to_string()))
    }
}
