//! Dependency resolution and the service registry.

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use thiserror::Error;
use url::Url;

use crate::config::EnvSource;
use crate::observability::tracing::SharedPropagator;
use crate::services::channel::{connect_traced, endpoint_uri, TracedChannel};

/// A backend the frontend depends on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Dependency {
    ProductCatalog,
    Currency,
    Cart,
    Recommendation,
    Checkout,
    Shipping,
    Ad,
    ShoppingAssistant,
    Collector,
}

/// How the frontend talks to a dependency.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transport {
    Grpc,
    Http,
}

impl Dependency {
    /// Dependencies whose address must always be present.
    pub const REQUIRED: [Dependency; 8] = [
        Dependency::ProductCatalog,
        Dependency::Currency,
        Dependency::Cart,
        Dependency::Recommendation,
        Dependency::Checkout,
        Dependency::Shipping,
        Dependency::Ad,
        Dependency::ShoppingAssistant,
    ];

    /// Environment variable holding the dependency's address.
    pub fn env_var(self) -> &'static str {
        match self {
            Dependency::ProductCatalog => "PRODUCT_CATALOG_SERVICE_ADDR",
            Dependency::Currency => "CURRENCY_SERVICE_ADDR",
            Dependency::Cart => "CART_SERVICE_ADDR",
            Dependency::Recommendation => "RECOMMENDATION_SERVICE_ADDR",
            Dependency::Checkout => "CHECKOUT_SERVICE_ADDR",
            Dependency::Shipping => "SHIPPING_SERVICE_ADDR",
            Dependency::Ad => "AD_SERVICE_ADDR",
            Dependency::ShoppingAssistant => "SHOPPING_ASSISTANT_SERVICE_ADDR",
            Dependency::Collector => "COLLECTOR_SERVICE_ADDR",
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Dependency::ProductCatalog => "product-catalog",
            Dependency::Currency => "currency",
            Dependency::Cart => "cart",
            Dependency::Recommendation => "recommendation",
            Dependency::Checkout => "checkout",
            Dependency::Shipping => "shipping",
            Dependency::Ad => "ad",
            Dependency::ShoppingAssistant => "shopping-assistant",
            Dependency::Collector => "collector",
        }
    }

    pub fn transport(self) -> Transport {
        match self {
            Dependency::ShoppingAssistant => Transport::Http,
            _ => Transport::Grpc,
        }
    }
}

impl fmt::Display for Dependency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Fatal bootstrap failures.
#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error("missing required environment variable(s): {}", .0.join(", "))]
    MissingEnv(Vec<&'static str>),

    #[error("invalid address '{address}' for {dependency} service: {reason}")]
    InvalidAddress {
        dependency: Dependency,
        address: String,
        reason: String,
    },
}

/// Addresses read from the environment, one per dependency.
#[derive(Debug, Clone)]
pub struct ServiceAddresses {
    addresses: BTreeMap<Dependency, String>,
}

impl ServiceAddresses {
    /// Resolve every required address. The collector is required only when
    /// tracing is enabled. All missing variables are reported together.
    pub fn resolve(env: &dyn EnvSource, tracing_enabled: bool) -> Result<Self, BootstrapError> {
        let wanted = Dependency::REQUIRED
            .into_iter()
            .chain(tracing_enabled.then_some(Dependency::Collector));

        let mut addresses = BTreeMap::new();
        let mut missing = Vec::new();
        for dependency in wanted {
            match env.non_empty(dependency.env_var()) {
                Some(address) => {
                    addresses.insert(dependency, address.trim().to_string());
                }
                None => missing.push(dependency.env_var()),
            }
        }

        if !missing.is_empty() {
            return Err(BootstrapError::MissingEnv(missing));
        }
        Ok(Self { addresses })
    }

    pub fn get(&self, dependency: Dependency) -> Option<&str> {
        self.addresses.get(&dependency).map(String::as_str)
    }

    /// The trace collector address, present only when tracing is enabled.
    pub fn collector(&self) -> Option<&str> {
        self.get(Dependency::Collector)
    }

    pub fn iter(&self) -> impl Iterator<Item = (Dependency, &str)> {
        self.addresses.iter().map(|(d, a)| (*d, a.as_str()))
    }
}

/// An established handle to one dependency.
#[derive(Clone)]
pub enum ServiceEndpoint {
    Grpc { address: String, channel: TracedChannel },
    Http { address: String, url: Url },
}

impl ServiceEndpoint {
    pub fn address(&self) -> &str {
        match self {
            ServiceEndpoint::Grpc { address, .. } | ServiceEndpoint::Http { address, .. } => address,
        }
    }
}

impl fmt::Debug for ServiceEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServiceEndpoint::Grpc { address, .. } => f.debug_struct("Grpc").field("address", address).finish(),
            ServiceEndpoint::Http { url, .. } => f.debug_struct("Http").field("url", &url.as_str()).finish(),
        }
    }
}

/// Read-only registry of backend handles, built once at startup.
///
/// Channels are cheap to clone and safe to use from any number of
/// concurrent requests.
#[derive(Debug, Clone)]
pub struct ServiceRegistry {
    endpoints: BTreeMap<Dependency, ServiceEndpoint>,
}

impl ServiceRegistry {
    /// Create a handle for every required dependency.
    ///
    /// The collector is skipped here; it belongs to the tracer setup.
    pub fn connect(
        addresses: &ServiceAddresses,
        setup_timeout: Duration,
        propagator: &SharedPropagator,
    ) -> Result<Self, BootstrapError> {
        let mut endpoints = BTreeMap::new();

        for (dependency, address) in addresses.iter() {
            if dependency == Dependency::Collector {
                continue;
            }
            let endpoint = match dependency.transport() {
                Transport::Grpc => {
                    let channel = connect_traced(address, setup_timeout, propagator.clone())
                        .map_err(|e| invalid(dependency, address, e))?;
                    ServiceEndpoint::Grpc {
                        address: address.to_string(),
                        channel,
                    }
                }
                Transport::Http => {
                    let url = Url::parse(&endpoint_uri(address)).map_err(|e| invalid(dependency, address, e))?;
                    if url.host_str().is_none() {
                        return Err(invalid(dependency, address, "missing host"));
                    }
                    ServiceEndpoint::Http {
                        address: address.to_string(),
                        url,
                    }
                }
            };

            tracing::info!(
                service = %dependency,
                address = %address,
                setup_timeout_secs = setup_timeout.as_secs(),
                "Service endpoint ready"
            );
            endpoints.insert(dependency, endpoint);
        }

        Ok(Self { endpoints })
    }

    /// A traced channel to a gRPC dependency.
    pub fn channel(&self, dependency: Dependency) -> Option<TracedChannel> {
        match self.endpoints.get(&dependency)? {
            ServiceEndpoint::Grpc { channel, .. } => Some(channel.clone()),
            ServiceEndpoint::Http { .. } => None,
        }
    }

    /// The base URL of an HTTP dependency.
    pub fn url(&self, dependency: Dependency) -> Option<&Url> {
        match self.endpoints.get(&dependency)? {
            ServiceEndpoint::Http { url, .. } => Some(url),
            ServiceEndpoint::Grpc { .. } => None,
        }
    }

    pub fn address(&self, dependency: Dependency) -> Option<&str> {
        self.endpoints.get(&dependency).map(ServiceEndpoint::address)
    }

    pub fn len(&self) -> usize {
        self.endpoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
    }
}

fn invalid(dependency: Dependency, address: &str, reason: impl fmt::Display) -> BootstrapError {
    BootstrapError::InvalidAddress {
        dependency,
        address: address.to_string(),
        reason: reason.to_string(),
    }
}
