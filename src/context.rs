//! Per-run context
//!
//! Everything a flow needs to talk to the cluster and the gateway, built
//! once from the effective settings and passed by reference to each phase.

use std::sync::Arc;
use std::time::Duration;

use mesh_manifest::ResourceKind;
use tracing::info;

use crate::cluster::{CommandRunner, Kubectl, ProcessRunner};
use crate::config::SmokeConfig;
use crate::console::Console;
use crate::inference::{GatewayEndpoint, GatewayError, HttpTransport, InferenceClient, Transport};
use crate::poll::{CheckError, ResourceCheck, Sleeper, ThreadSleeper};

/// How the gateway address was obtained
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GatewaySource {
    Configured,
    Discovered,
    Fallback,
}

pub struct RunContext {
    pub settings: SmokeConfig,
    pub kubectl: Kubectl,
    pub transport: Arc<dyn Transport>,
    pub sleeper: Arc<dyn Sleeper>,
    pub console: Console,
}

impl RunContext {
    /// Context backed by real kubectl processes and HTTP
    pub fn live(settings: SmokeConfig, console: Console) -> Result<Self, GatewayError> {
        let runner = Arc::new(ProcessRunner::new(Duration::from_secs(
            settings.kubectl.timeout_seconds,
        )));
        let transport = Arc::new(HttpTransport::new(Duration::from_secs(
            settings.gateway.timeout_seconds,
        ))?);
        Ok(Self::new(settings, runner, transport, Arc::new(ThreadSleeper), console))
    }

    pub fn new(
        settings: SmokeConfig,
        runner: Arc<dyn CommandRunner>,
        transport: Arc<dyn Transport>,
        sleeper: Arc<dyn Sleeper>,
        console: Console,
    ) -> Self {
        let kubectl = Kubectl::new(runner)
            .with_binary(settings.kubectl.binary.clone())
            .with_context(settings.kubectl.context.clone());
        Self {
            settings,
            kubectl,
            transport,
            sleeper,
            console,
        }
    }

    pub fn namespace(&self) -> &str {
        &self.settings.namespace
    }

    /// A readiness check using the configured interval and `max_attempts`
    pub fn check(
        &self,
        kind: ResourceKind,
        name: &str,
        max_attempts: u32,
    ) -> Result<ResourceCheck, CheckError> {
        ResourceCheck::new(
            kind,
            name,
            self.namespace(),
            Duration::from_secs(self.settings.poll.interval_seconds),
            max_attempts,
        )
    }

    /// Configured host, else the gateway Service's external address, else
    /// the fallback host
    pub fn resolve_gateway(&self) -> (GatewayEndpoint, GatewaySource) {
        let gateway = &self.settings.gateway;
        if let Some(ref host) = gateway.host {
            return (GatewayEndpoint::new(host.clone(), gateway.port), GatewaySource::Configured);
        }

        match self
            .kubectl
            .load_balancer_address(&gateway.service, &gateway.service_namespace)
        {
            Ok(Some(address)) => {
                info!(address = %address, "discovered gateway address");
                self.console.success(format!("Gateway IP: {}", address));
                (GatewayEndpoint::new(address, gateway.port), GatewaySource::Discovered)
            }
            Ok(None) => {
                self.console.warn(format!(
                    "Gateway {} has no external address, using {}",
                    gateway.service, gateway.fallback_host
                ));
                self.fallback()
            }
            Err(e) => {
                self.console.warn(format!(
                    "Could not look up gateway {}: {}; using {}",
                    gateway.service, e, gateway.fallback_host
                ));
                self.fallback()
            }
        }
    }

    fn fallback(&self) -> (GatewayEndpoint, GatewaySource) {
        let gateway = &self.settings.gateway;
        (
            GatewayEndpoint::new(gateway.fallback_host.clone(), gateway.port),
            GatewaySource::Fallback,
        )
    }

    pub fn client(&self, endpoint: GatewayEndpoint) -> InferenceClient {
        InferenceClient::new(self.transport.clone(), endpoint)
    }
}
