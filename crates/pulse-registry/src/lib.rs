//! Source bookkeeping for the marketpulse readiness aggregator.
//!
//! Records which source-ids produced which feeds and metrics, and when;
//! resolves which source-ids are contractually expected per
//! (symbol, market type, block) from a layered configuration.

pub mod expected;
pub mod registry;

pub use expected::{BlockSources, ExpectedSourcesConfig, ExpectedSourcesResolver, SymbolSources};
pub use registry::{
    RegistrySnapshot, SourceRegistry, SourceRegistryHandle, SuppressionCode, SuppressionRecord,
};
