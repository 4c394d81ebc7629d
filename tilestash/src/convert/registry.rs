//! Explicit protocol-to-converter registry.

use super::TileConverter;
use crate::sniff::Protocol;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Converters keyed by the protocol they handle.
#[derive(Clone, Default)]
pub struct ConverterRegistry {
    converters: HashMap<Protocol, Arc<dyn TileConverter>>,
}

impl ConverterRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `converter` for `protocol`, replacing any previous one.
    pub fn register(&mut self, protocol: Protocol, converter: Arc<dyn TileConverter>) {
        self.converters.insert(protocol, converter);
    }

    /// Builder-style [`register`](Self::register).
    pub fn with(mut self, protocol: Protocol, converter: Arc<dyn TileConverter>) -> Self {
        self.register(protocol, converter);
        self
    }

    /// Converter for `protocol`, if one is registered.
    pub fn get(&self, protocol: &Protocol) -> Option<Arc<dyn TileConverter>> {
        self.converters.get(protocol).cloned()
    }

    /// Returns true if `protocol` has a converter.
    pub fn supports(&self, protocol: &Protocol) -> bool {
        self.converters.contains_key(protocol)
    }

    /// Registered protocols, sorted by scheme.
    pub fn protocols(&self) -> Vec<Protocol> {
        let mut protocols: Vec<_> = self.converters.keys().cloned().collect();
        protocols.sort_by(|a, b| a.scheme().cmp(b.scheme()));
        protocols
    }
}

impl fmt::Debug for ConverterRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: HashMap<&str, &str> = self
            .converters
            .iter()
            .map(|(protocol, converter)| (protocol.scheme(), converter.name()))
            .collect();
        f.debug_struct("ConverterRegistry")
            .field("converters", &names)
            .finish()
    }
}
