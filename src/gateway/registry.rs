// ============================================================================
// Service Registry
// ============================================================================
//
// The mounted services, in registration order. Built once at startup by
// ServiceRegistryBuilder and read-only afterwards.
//
// A backend that fails to construct is replaced by a placeholder so the
// gateway still starts and the prefix still answers `GET /health`.
//
// ============================================================================

use crate::gateway::backend::{Backend, BackendKind, LocalBackend};
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    #[error("invalid prefix `{prefix}` for service {name}: {reason}")]
    InvalidPrefix {
        name: String,
        prefix: String,
        reason: &'static str,
    },

    #[error("prefix `{prefix}` is already mounted by service {existing}")]
    DuplicatePrefix { prefix: String, existing: String },

    #[error("service name `{0}` is already registered")]
    DuplicateName(String),
}

/// One mounted service
#[derive(Clone)]
pub struct Registration {
    pub name: String,
    pub prefix: String,
    pub backend: Arc<dyn Backend>,
}

impl Registration {
    pub fn kind(&self) -> BackendKind {
        self.backend.kind()
    }
}

impl std::fmt::Debug for Registration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registration")
            .field("name", &self.name)
            .field("prefix", &self.prefix)
            .field("kind", &self.kind())
            .finish()
    }
}

fn validate_prefix(name: &str, prefix: &str) -> Result<(), RegistryError> {
    let invalid = |reason| RegistryError::InvalidPrefix {
        name: name.to_string(),
        prefix: prefix.to_string(),
        reason,
    };

    if prefix.is_empty() || prefix == "/" {
        return Err(invalid("prefix must name a path segment"));
    }
    if !prefix.starts_with('/') {
        return Err(invalid("prefix must start with '/'"));
    }
    if prefix.ends_with('/') {
        return Err(invalid("prefix must not end with '/'"));
    }
    Ok(())
}

#[derive(Default, Debug)]
pub struct ServiceRegistryBuilder {
    registrations: Vec<Registration>,
}

impl ServiceRegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        mut self,
        name: &str,
        prefix: &str,
        backend: Arc<dyn Backend>,
    ) -> Result<Self, RegistryError> {
        validate_prefix(name, prefix)?;

        if let Some(existing) = self.registrations.iter().find(|r| r.prefix == prefix) {
            return Err(RegistryError::DuplicatePrefix {
                prefix: prefix.to_string(),
                existing: existing.name.clone(),
            });
        }
        if self.registrations.iter().any(|r| r.name == name) {
            return Err(RegistryError::DuplicateName(name.to_string()));
        }

        tracing::info!(
            service = %name,
            prefix = %prefix,
            kind = %backend.kind(),
            "Mounted service"
        );

        self.registrations.push(Registration {
            name: name.to_string(),
            prefix: prefix.to_string(),
            backend,
        });
        Ok(self)
    }

    /// Register `backend`, or a placeholder if it could not be constructed
    pub fn register_or_placeholder(
        self,
        name: &str,
        prefix: &str,
        backend: anyhow::Result<Arc<dyn Backend>>,
    ) -> Result<Self, RegistryError> {
        let backend = match backend {
            Ok(backend) => backend,
            Err(e) => {
                tracing::warn!(
                    service = %name,
                    prefix = %prefix,
                    error = %e,
                    "Service backend unavailable, mounting placeholder"
                );
                Arc::new(LocalBackend::placeholder(name))
            }
        };
        self.register(name, prefix, backend)
    }

    pub fn build(self) -> ServiceRegistry {
        ServiceRegistry {
            registrations: Arc::from(self.registrations),
        }
    }
}

/// Immutable, ordered list of mounted services
#[derive(Clone, Debug)]
pub struct ServiceRegistry {
    registrations: Arc<[Registration]>,
}

impl ServiceRegistry {
    pub fn builder() -> ServiceRegistryBuilder {
        ServiceRegistryBuilder::new()
    }

    pub fn all(&self) -> &[Registration] {
        &self.registrations
    }

    pub fn get(&self, name: &str) -> Option<&Registration> {
        self.registrations.iter().find(|r| r.name == name)
    }

    pub fn len(&self) -> usize {
        self.registrations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.registrations.is_empty()
    }
}
