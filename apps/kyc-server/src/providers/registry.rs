// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Maps a [`ProviderKind`] to its active adapter instance.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{info, warn};

use super::jumio::JumioProvider;
use super::onfido::OnfidoProvider;
use super::sumsub::SumsubProvider;
use super::{ProviderError, ProviderKind, VerificationProvider};
use crate::config::ProvidersConfig;

#[derive(Clone)]
pub struct ProviderRegistry {
    adapters: HashMap<ProviderKind, Arc<dyn VerificationProvider>>,
    default_kind: ProviderKind,
}

impl std::fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut kinds: Vec<_> = self.adapters.keys().map(|k| k.as_str()).collect();
        kinds.sort_unstable();
        f.debug_struct("ProviderRegistry")
            .field("adapters", &kinds)
            .field("default_kind", &self.default_kind)
            .finish()
    }
}

/// Build the adapter for one vendor.
pub fn build_adapter(
    kind: ProviderKind,
    config: &ProvidersConfig,
) -> Result<Arc<dyn VerificationProvider>, ProviderError> {
    let policy = config.retry.clone();
    let adapter: Arc<dyn VerificationProvider> = match kind {
        ProviderKind::Onfido => Arc::new(OnfidoProvider::new(&config.onfido, policy, config.simulate)?),
        ProviderKind::Jumio => Arc::new(JumioProvider::new(&config.jumio, policy, config.simulate)?),
        ProviderKind::Sumsub => Arc::new(SumsubProvider::new(&config.sumsub, policy, config.simulate)?),
    };
    Ok(adapter)
}

impl ProviderRegistry {
    /// An empty registry; adapters are added with [`ProviderRegistry::register`].
    pub fn new(default_kind: ProviderKind) -> Self {
        Self {
            adapters: HashMap::new(),
            default_kind,
        }
    }

    /// Build every adapter from configuration.
    pub fn from_config(config: &ProvidersConfig) -> Result<Self, ProviderError> {
        let mut registry = Self::new(config.default_provider);
        for kind in ProviderKind::ALL {
            let adapter = build_adapter(kind, config)?;
            if adapter.is_simulated() {
                warn!(provider = %kind, "verification provider running in SIMULATION mode");
            } else {
                info!(provider = %kind, "verification provider configured");
            }
            if adapter.webhook_secret().is_none() {
                warn!(provider = %kind, "no webhook secret configured");
            }
            registry.register(adapter);
        }
        Ok(registry)
    }

    pub fn register(&mut self, adapter: Arc<dyn VerificationProvider>) -> &mut Self {
        self.adapters.insert(adapter.kind(), adapter);
        self
    }

    pub fn default_kind(&self) -> ProviderKind {
        self.default_kind
    }

    pub fn get(&self, kind: ProviderKind) -> Option<Arc<dyn VerificationProvider>> {
        self.adapters.get(&kind).cloned()
    }

    /// The explicit hint when given, otherwise the configured default.
    pub fn resolve(&self, hint: Option<ProviderKind>) -> Option<Arc<dyn VerificationProvider>> {
        self.get(hint.unwrap_or(self.default_kind))
    }

    pub fn active(&self) -> Option<Arc<dyn VerificationProvider>> {
        self.get(self.default_kind)
    }
}
