use crate::checks::{Check, approved, diy, nobody, provenance, sbom, snakeoil};
use crate::{Result, VoucherError};
use log::debug;
use std::collections::HashMap;
use std::fmt;

/// Builds a fresh check instance for every evaluation
pub type CheckFactory = Box<dyn Fn() -> Box<dyn Check> + Send + Sync>;

/// Name to factory table, populated once at startup.
#[derive(Default)]
pub struct CheckRegistry {
    factories: HashMap<String, CheckFactory>,
}

impl CheckRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding every built-in check.
    pub fn with_builtin_checks() -> Self {
        let mut registry = Self::new();
        register_builtin_checks(&mut registry);
        registry
    }

    /// Register a factory. The first registration for a name wins; returns
    /// whether this call registered anything.
    pub fn register<F>(&mut self, name: impl Into<String>, factory: F) -> bool
    where
        F: Fn() -> Box<dyn Check> + Send + Sync + 'static,
    {
        let name = name.into();
        if self.factories.contains_key(&name) {
            debug!("Check {} is already registered, ignoring", name);
            return false;
        }
        self.factories.insert(name, Box::new(factory));
        true
    }

    pub fn is_registered(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.factories.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// One new instance per requested name. Fails without returning any
    /// checks if a single name is unknown.
    pub fn get<S: AsRef<str>>(&self, names: &[S]) -> Result<Vec<(String, Box<dyn Check>)>> {
        if let Some(missing) = names
            .iter()
            .map(AsRef::as_ref)
            .find(|name| !self.factories.contains_key(*name))
        {
            return Err(VoucherError::UnknownCheck(missing.to_string()));
        }

        Ok(names
            .iter()
            .map(|name| {
                let name = name.as_ref();
                (name.to_string(), (self.factories[name])())
            })
            .collect())
    }
}

impl fmt::Debug for CheckRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CheckRegistry")
            .field("checks", &self.names())
            .finish()
    }
}

/// Register every check this crate ships.
pub fn register_builtin_checks(registry: &mut CheckRegistry) {
    registry.register(approved::NAME, || Box::new(approved::ApprovedCheck::default()));
    registry.register(diy::NAME, || Box::new(diy::DiyCheck::default()));
    registry.register(nobody::NAME, || Box::new(nobody::NobodyCheck::default()));
    registry.register(provenance::NAME, || Box::new(provenance::TrustedBuildCheck::default()));
    registry.register(sbom::NAME, || Box::new(sbom::SbomExistsCheck::default()));
    registry.register(snakeoil::NAME, || Box::new(snakeoil::SnakeoilCheck::default()));
}
