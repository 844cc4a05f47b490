// ============================================================================
// API Gateway
// ============================================================================
//
// Single entry point for the Tutor Stack services. It handles:
// - Bearer token verification (auth gate)
// - Prefix routing to the mounted services
// - Forwarding to remote services with a per-service circuit breaker
//
// Architecture:
// - Stateless apart from circuit breaker counters (can scale horizontally)
// - Registry is built once at startup and never changes
// - Services that cannot be mounted degrade to placeholders
//
// ============================================================================

pub mod backend;
pub mod bootstrap;
pub mod circuit_breaker;
pub mod middleware;
pub mod registry;
pub mod router;

pub use backend::{Backend, BackendError, BackendKind, LocalBackend, RemoteBackend};
pub use bootstrap::build_registry;
pub use middleware::{auth_gate, ExemptPaths, GateDecision, GateState};
pub use registry::{Registration, RegistryError, ServiceRegistry, ServiceRegistryBuilder};
pub use router::{route_request, Dispatcher, GatewayState, RouteMatch};
