///
/// Registration Scopes and Host Registries
///
/// HostRegistries owns the typing and lowering registries consulted by
/// builds. A Registry is one registration scope on top of a host: it owns
/// a SignatureCatalog and installs a typing rule and a lowering rule for
/// every signature it accepts. Dropping a Registry removes its rules from
/// the host again.
///
/// Several registries may share a host; their rules for the same name
/// become overloads (see typing). A process-wide host and scope are
/// available through `HostRegistries::global()` and `Registry::global()`.
///

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};

use crate::catalog::{BulkReport, RegisterOutcome, RegistryError, SignatureCatalog, SignatureTable};
use crate::lowering::LoweringRegistry;
use crate::signature::Signature;
use crate::typing::TypingRegistry;
use crate::types::{Parameter, Primitive};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ScopeId(u64);

impl ScopeId {
    pub(crate) fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        ScopeId(NEXT.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ScopeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "scope#{}", self.0)
    }
}

#[derive(Debug, Default)]
pub struct HostRegistries {
    typing: TypingRegistry,
    lowering: LoweringRegistry,
}

impl HostRegistries {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn global() -> &'static Arc<HostRegistries> {
        static GLOBAL: OnceLock<Arc<HostRegistries>> = OnceLock::new();
        GLOBAL.get_or_init(|| Arc::new(HostRegistries::new()))
    }

    pub fn typing(&self) -> &TypingRegistry {
        &self.typing
    }

    pub fn lowering(&self) -> &LoweringRegistry {
        &self.lowering
    }

    /// Lowering goes in first and typing comes out first, so a name that
    /// type-checks always has a lowering rule.
    fn install(&self, scope: ScopeId, signature: &Arc<Signature>) {
        self.lowering.install(scope, signature);
        self.typing.install(scope, signature);
    }

    fn remove_scope(&self, scope: ScopeId) {
        self.typing.remove_scope(scope);
        self.lowering.remove_scope(scope);
    }
}

#[derive(Debug)]
pub struct Registry {
    label: String,
    scope: ScopeId,
    catalog: SignatureCatalog,
    host: Arc<HostRegistries>,
}

impl Registry {
    pub fn new(host: &Arc<HostRegistries>, label: impl Into<String>) -> Self {
        let registry = Self {
            label: label.into(),
            scope: ScopeId::next(),
            catalog: SignatureCatalog::new(),
            host: Arc::clone(host),
        };
        tracing::debug!(scope = %registry.scope, label = %registry.label, "created registration scope");
        registry
    }

    /// Default scope on the global host.
    pub fn global() -> &'static Registry {
        static GLOBAL: OnceLock<Registry> = OnceLock::new();
        GLOBAL.get_or_init(|| Registry::new(HostRegistries::global(), "global"))
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn scope(&self) -> ScopeId {
        self.scope
    }

    pub fn host(&self) -> &Arc<HostRegistries> {
        &self.host
    }

    pub fn catalog(&self) -> &SignatureCatalog {
        &self.catalog
    }

    pub fn register(
        &self,
        name: impl Into<String>,
        return_type: Primitive,
        params: impl IntoIterator<Item = Parameter>,
    ) -> Result<Arc<Signature>, RegistryError> {
        self.register_signature(Signature::new(name, return_type, params))
    }

    pub fn register_signature(&self, signature: Signature) -> Result<Arc<Signature>, RegistryError> {
        self.insert(signature).map(|(stored, _)| stored)
    }

    /// Registers every entry of `table` independently.
    pub fn register_bulk(&self, table: &SignatureTable) -> BulkReport {
        let mut report = BulkReport::default();
        for signature in table.signatures() {
            let name = signature.name.clone();
            match self.insert(signature) {
                Ok((_, RegisterOutcome::Inserted)) => report.registered.push(name),
                Ok((_, RegisterOutcome::Unchanged)) => report.unchanged.push(name),
                Err(e) => report.conflicts.push(e),
            }
        }
        tracing::info!(
            scope = %self.scope,
            registered = report.registered.len(),
            unchanged = report.unchanged.len(),
            conflicts = report.conflicts.len(),
            "bulk registration finished"
        );
        report
    }

    pub fn lookup(&self, name: &str) -> Result<Arc<Signature>, RegistryError> {
        self.catalog.lookup(name)
    }

    fn insert(&self, signature: Signature) -> Result<(Arc<Signature>, RegisterOutcome), RegistryError> {
        let result = self
            .catalog
            .insert_with(signature, |stored| self.host.install(self.scope, stored));
        match &result {
            Ok((stored, RegisterOutcome::Inserted)) => {
                tracing::debug!(scope = %self.scope, signature = %stored, "registered external function");
            }
            Ok((stored, RegisterOutcome::Unchanged)) => {
                tracing::trace!(scope = %self.scope, signature = %stored, "identical signature already registered");
            }
            Err(e) => {
                tracing::warn!(scope = %self.scope, error = %e, "registration rejected");
            }
        }
        result
    }
}

impl Drop for Registry {
    fn drop(&mut self) {
        self.host.remove_scope(self.scope);
        tracing::debug!(scope = %self.scope, label = %self.label, "dropped registration scope");
    }
}
