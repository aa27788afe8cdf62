//! Name-based lookup of configured providers.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Arc, Mutex};

use tracing::{debug, warn};

use crate::error::GatewayError;
use crate::http::DynHttpTransport;
use crate::provider::DynProvider;
use crate::resilience::{CircuitBreakers, CircuitSnapshot, ResilientClient, TransportConfig};
use crate::types::{CapabilityDescriptor, Operation};

/// Builds a provider on first use.
pub type ProviderFactory =
    Arc<dyn Fn(&ProviderContext) -> Result<DynProvider, GatewayError> + Send + Sync>;

/// Shared resources handed to provider factories.
///
/// Every [`ResilientClient`] built from one context shares the same breaker map, so
/// providers that talk to the same host observe one circuit.
#[derive(Clone)]
pub struct ProviderContext {
    transport: DynHttpTransport,
    config: TransportConfig,
    breakers: Arc<CircuitBreakers>,
}

impl ProviderContext {
    pub fn new(transport: DynHttpTransport, config: TransportConfig) -> Self {
        let breakers = Arc::new(CircuitBreakers::new(config.circuit_breaker.clone()));
        Self {
            transport,
            config,
            breakers,
        }
    }

    /// Resilient client for `provider`, bound to the shared breakers.
    pub fn client(&self, provider: &'static str) -> ResilientClient {
        ResilientClient::with_breakers(
            provider,
            self.transport.clone(),
            &self.config,
            self.breakers.clone(),
        )
    }

    pub fn transport_config(&self) -> &TransportConfig {
        &self.config
    }

    pub fn breakers(&self) -> &Arc<CircuitBreakers> {
        &self.breakers
    }
}

struct Slot {
    factory: ProviderFactory,
    instance: Mutex<Option<DynProvider>>,
}

impl Slot {
    fn eager(provider: DynProvider) -> Self {
        let instance = provider.clone();
        Self {
            factory: Arc::new(move |_| Ok(instance.clone())),
            instance: Mutex::new(Some(provider)),
        }
    }

    fn lazy(factory: ProviderFactory) -> Self {
        Self {
            factory,
            instance: Mutex::new(None),
        }
    }
}

/// Resolves provider names to adapters.
///
/// Names are matched case-insensitively. Factories run at most once per name; the
/// slot lock is held while a factory runs, so concurrent first calls build a single
/// instance. Factories are synchronous and never touch the network.
pub struct ProviderRegistry {
    context: ProviderContext,
    slots: HashMap<String, Slot>,
}

impl ProviderRegistry {
    pub fn builder(context: ProviderContext) -> ProviderRegistryBuilder {
        ProviderRegistryBuilder {
            context,
            slots: HashMap::new(),
        }
    }

    /// Returns the adapter registered under `name`, constructing it on first use.
    ///
    /// # Errors
    ///
    /// [`GatewayError::UnknownProvider`] when nothing is registered under the name, or
    /// the factory's own error when construction fails.
    pub fn resolve(&self, name: &str) -> Result<DynProvider, GatewayError> {
        let key = normalize_name(name);
        let slot = self
            .slots
            .get(&key)
            .ok_or_else(|| GatewayError::UnknownProvider {
                name: name.to_string(),
            })?;

        let mut instance = slot
            .instance
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(provider) = instance.as_ref() {
            return Ok(provider.clone());
        }
        debug!(provider = %key, "constructing provider");
        let provider = (slot.factory)(&self.context)?;
        *instance = Some(provider.clone());
        Ok(provider)
    }

    /// Registered provider names, lower-cased.
    pub fn available_providers(&self) -> BTreeSet<String> {
        self.slots.keys().cloned().collect()
    }

    pub fn is_registered(&self, name: &str) -> bool {
        self.slots.contains_key(&normalize_name(name))
    }

    pub fn capabilities(&self, name: &str) -> Result<CapabilityDescriptor, GatewayError> {
        Ok(self.resolve(name)?.capabilities())
    }

    /// Every operation the provider implements, required ones first.
    pub fn supported_operations(&self, name: &str) -> Result<Vec<Operation>, GatewayError> {
        let capabilities = self.capabilities(name)?;
        Ok(Operation::REQUIRED
            .into_iter()
            .chain(Operation::OPTIONAL)
            .filter(|operation| capabilities.supports(*operation))
            .collect())
    }

    /// Names of providers that implement `operation`, sorted.
    ///
    /// Providers whose construction fails are logged and left out.
    pub fn providers_supporting(&self, operation: Operation) -> Vec<String> {
        self.available_providers()
            .into_iter()
            .filter(|name| match self.capabilities(name) {
                Ok(capabilities) => capabilities.supports(operation),
                Err(err) => {
                    warn!(provider = %name, error = %err, "provider could not be constructed");
                    false
                }
            })
            .collect()
    }

    /// Circuit snapshots for every upstream host contacted so far.
    pub fn circuit_states(&self) -> BTreeMap<String, CircuitSnapshot> {
        self.context.breakers.snapshot()
    }

    pub fn context(&self) -> &ProviderContext {
        &self.context
    }
}

/// Collects provider registrations for a [`ProviderRegistry`].
pub struct ProviderRegistryBuilder {
    context: ProviderContext,
    slots: HashMap<String, Slot>,
}

impl ProviderRegistryBuilder {
    /// Registers an already constructed provider.
    pub fn register<S: AsRef<str>>(mut self, name: S, provider: DynProvider) -> Self {
        self.insert(name.as_ref(), Slot::eager(provider));
        self
    }

    /// Registers a factory that builds the provider on first resolution.
    pub fn register_factory<S, F>(mut self, name: S, factory: F) -> Self
    where
        S: AsRef<str>,
        F: Fn(&ProviderContext) -> Result<DynProvider, GatewayError> + Send + Sync + 'static,
    {
        self.insert(name.as_ref(), Slot::lazy(Arc::new(factory)));
        self
    }

    fn insert(&mut self, name: &str, slot: Slot) {
        let key = normalize_name(name);
        if self.slots.insert(key.clone(), slot).is_some() {
            debug!(provider = %key, "replacing earlier registration");
        }
    }

    /// Shared context the registered factories will receive.
    pub fn context(&self) -> &ProviderContext {
        &self.context
    }

    pub fn build(self) -> ProviderRegistry {
        ProviderRegistry {
            context: self.context,
            slots: self.slots,
        }
    }
}

fn normalize_name(name: &str) -> String {
    name.trim().to_ascii_lowercase()
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    use super::*;
    use crate::http::{HttpRequest, HttpResponse, HttpTransport, TransportError};
    use crate::provider::esimgo::EsimGoProvider;

    struct UnreachableTransport;

    #[async_trait]
    impl HttpTransport for UnreachableTransport {
        async fn send(&self, _request: HttpRequest) -> Result<HttpResponse, TransportError> {
            Err(TransportError::Connect {
                message: "no network in unit tests".to_string(),
            })
        }
    }

    fn context() -> ProviderContext {
        ProviderContext::new(Arc::new(UnreachableTransport), TransportConfig::default())
    }

    #[test]
    fn resolve_is_case_insensitive_and_lazy_exactly_once() {
        let builds = Arc::new(AtomicUsize::new(0));
        let counter = builds.clone();
        let registry = ProviderRegistry::builder(context())
            .register_factory("eSIMgo", move |ctx: &ProviderContext| {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(Arc::new(EsimGoProvider::new(ctx.client("esimgo"), "key")) as DynProvider)
            })
            .build();

        assert_eq!(builds.load(Ordering::SeqCst), 0);
        let first = registry.resolve("ESIMGO").expect("resolve");
        let second = registry.resolve(" esimgo ").expect("resolve");
        assert_eq!(builds.load(Ordering::SeqCst), 1);
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(first.name(), "esimgo");
    }

    #[test]
    fn unknown_provider_never_falls_back() {
        let registry = ProviderRegistry::builder(context())
            .register_factory("esimgo", |ctx: &ProviderContext| {
                Ok(Arc::new(EsimGoProvider::new(ctx.client("esimgo"), "key")) as DynProvider)
            })
            .build();

        match registry.resolve("unknown-vendor") {
            Err(GatewayError::UnknownProvider { name }) => assert_eq!(name, "unknown-vendor"),
            Err(other) => panic!("unexpected error type: {other:?}"),
            Ok(provider) => panic!("unexpected provider {}", provider.name()),
        }
        assert!(!registry.is_registered("unknown-vendor"));
    }

    #[test]
    fn failed_construction_is_retried_on_next_resolve() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let counter = attempts.clone();
        let registry = ProviderRegistry::builder(context())
            .register_factory("flaky", move |ctx: &ProviderContext| {
                if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                    return Err(GatewayError::InvalidConfig {
                        field: "flaky".to_string(),
                        reason: "first build fails".to_string(),
                    });
                }
                Ok(Arc::new(EsimGoProvider::new(ctx.client("esimgo"), "key")) as DynProvider)
            })
            .build();

        assert!(matches!(
            registry.resolve("flaky"),
            Err(GatewayError::InvalidConfig { .. })
        ));
        assert!(registry.resolve("flaky").is_ok());
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn reports_optional_operation_support() {
        let ctx = context();
        let esimgo: DynProvider = Arc::new(EsimGoProvider::new(ctx.client("esimgo"), "key"));
        let registry = ProviderRegistry::builder(ctx)
            .register("esimgo", esimgo)
            .build();

        let operations = registry.supported_operations("esimgo").expect("operations");
        assert!(operations.contains(&Operation::RequestRefund));
        assert!(!operations.contains(&Operation::ListTransactions));
        assert_eq!(
            registry.providers_supporting(Operation::GetEsimHistory),
            vec!["esimgo".to_string()]
        );
        assert!(registry.providers_supporting(Operation::ListTransactions).is_empty());
        assert_eq!(
            registry.available_providers().into_iter().collect::<Vec<_>>(),
            vec!["esimgo".to_string()]
        );
    }
}
