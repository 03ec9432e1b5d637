//! Operation catalog.
//!
//! Static registry of every transformation the engine can run. The
//! catalog is immutable after startup; planners and shells query it,
//! the executor resolves parameters through it.

pub mod descriptors;
pub mod params;

use std::sync::OnceLock;

use thiserror::Error;

pub use descriptors::{Category, OperationDescriptor, OPERATIONS};
pub use params::{ParamKind, ParamLookup, ParamMap, ParamSpec, ParamValue};

/// Errors raised by catalog queries.
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("unknown operation '{0}'")]
    NotFound(String),

    #[error("invalid parameter '{name}' for operation '{operation}': {reason}")]
    InvalidParameter {
        operation: String,
        name: String,
        reason: String,
    },
}

impl CatalogError {
    pub fn not_found(id: impl Into<String>) -> Self {
        CatalogError::NotFound(id.into())
    }

    pub fn invalid_parameter(
        operation: impl Into<String>,
        name: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        CatalogError::InvalidParameter {
            operation: operation.into(),
            name: name.into(),
            reason: reason.into(),
        }
    }
}

/// Queryable view over the built-in operation set.
pub struct Catalog {
    operations: &'static [OperationDescriptor],
}

impl Catalog {
    /// The built-in catalog. Constructed once, shared for the process
    /// lifetime.
    pub fn builtin() -> &'static Catalog {
        static CATALOG: OnceLock<Catalog> = OnceLock::new();
        CATALOG.get_or_init(|| Catalog {
            operations: OPERATIONS,
        })
    }

    /// All operations in stable catalog order (category, then
    /// declaration order within the category).
    pub fn list(&self) -> &'static [OperationDescriptor] {
        self.operations
    }

    /// Operations belonging to one category, in declaration order.
    pub fn list_category(&self, category: Category) -> Vec<&'static OperationDescriptor> {
        self.operations
            .iter()
            .filter(|op| op.category == category)
            .collect()
    }

    /// Look up a descriptor by id.
    pub fn get(&self, id: &str) -> Result<&'static OperationDescriptor, CatalogError> {
        self.operations
            .iter()
            .find(|op| op.id == id)
            .ok_or_else(|| CatalogError::not_found(id))
    }

    /// Whether an id names a catalog operation.
    pub fn contains(&self, id: &str) -> bool {
        self.operations.iter().any(|op| op.id == id)
    }

    /// Validate user-supplied overrides against the declared schema.
    ///
    /// Unknown parameter names and out-of-range values are rejected;
    /// the overrides map may cover any subset of declared parameters.
    pub fn validate_parameters(&self, id: &str, overrides: &ParamMap) -> Result<(), CatalogError> {
        let desc = self.get(id)?;
        for (name, value) in overrides {
            let spec = desc
                .params
                .iter()
                .find(|p| p.name == name.as_str())
                .ok_or_else(|| {
                    CatalogError::invalid_parameter(id, name.clone(), "no such parameter")
                })?;
            spec.check(value)
                .map_err(|reason| CatalogError::invalid_parameter(id, name.clone(), reason))?;
        }
        Ok(())
    }

    /// Merge overrides onto the declared defaults into a full map.
    pub fn resolve_parameters(
        &self,
        id: &str,
        overrides: &ParamMap,
    ) -> Result<ParamMap, CatalogError> {
        self.validate_parameters(id, overrides)?;
        let desc = self.get(id)?;
        let mut resolved = ParamMap::new();
        for spec in desc.params {
            let value = overrides
                .get(spec.name)
                .cloned()
                .unwrap_or_else(|| spec.default_value());
            resolved.insert(spec.name.to_string(), value);
        }
        Ok(resolved)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_by_id() {
        let catalog = Catalog::builtin();
        assert!(catalog.get("mirror").is_ok());
        assert!(matches!(
            catalog.get("nonexistent"),
            Err(CatalogError::NotFound(_))
        ));
    }

    #[test]
    fn rejects_unknown_parameter_name() {
        let catalog = Catalog::builtin();
        let mut overrides = ParamMap::new();
        overrides.insert("angle".into(), ParamValue::Float(1.0));
        let err = catalog.validate_parameters("rotate", &overrides).unwrap_err();
        assert!(matches!(err, CatalogError::InvalidParameter { .. }));
    }

    #[test]
    fn rejects_out_of_range_override() {
        let catalog = Catalog::builtin();
        let mut overrides = ParamMap::new();
        overrides.insert("max_degrees".into(), ParamValue::Float(45.0));
        assert!(catalog.validate_parameters("rotate", &overrides).is_err());
    }

    #[test]
    fn resolve_merges_defaults_and_overrides() {
        let catalog = Catalog::builtin();
        let mut overrides = ParamMap::new();
        overrides.insert("crf".into(), ParamValue::Int(20));
        let resolved = catalog.resolve_parameters("encode", &overrides).unwrap();
        assert_eq!(resolved.int("crf"), Some(20));
        assert_eq!(resolved.text("preset"), Some("medium"));
    }

    #[test]
    fn empty_overrides_resolve_to_defaults() {
        let catalog = Catalog::builtin();
        let resolved = catalog
            .resolve_parameters("mirror", &ParamMap::new())
            .unwrap();
        assert_eq!(resolved.text("direction"), Some("horizontal"));
    }
}
