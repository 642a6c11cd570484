//! Type discovery: which types belong to a unit's schema.
//!
//! ## Algorithm Overview
//!
//! 1. Resolve the unit's root types (explicit `includeClasses`, or every
//!    top-level type under `basePackages`, or every top-level type when
//!    neither is set), minus excluded classes
//! 2. Traverse breadth-first from the roots in declaration order, visiting
//!    fields in declaration order
//! 3. Admit each referenced type that the inclusion policy accepts, record a
//!    cross-unit reference for types another unit already owns, and fail on
//!    anything else
//!
//! Enums are leaves. Lexical nesting grants nothing: a nested type is only
//! discovered through a field path, never because its enclosing type was.

use crate::error::{Error, Result};
use crate::metadata::{TypeDescriptor, TypeKind, TypeMetadataProvider};
use crate::unit::UnitConfig;
use std::collections::{BTreeMap, HashSet, VecDeque};
use tracing::{debug, trace};

/// Type ownership across units: each type has at most one owner
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Ownership {
    owners: BTreeMap<String, String>,
}

impl Ownership {
    /// Creates an empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the owning unit of a type
    pub fn owner(&self, type_name: &str) -> Option<&str> {
        self.owners.get(type_name).map(String::as_str)
    }

    /// Claims `type_name` for `unit` unless already owned.
    ///
    /// Returns the owner after the call.
    pub fn claim(&mut self, type_name: &str, unit: &str) -> &str {
        self.owners
            .entry(type_name.to_string())
            .or_insert_with(|| unit.to_string())
    }

    /// Iterates `(type, owner)` pairs ordered by type name
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.owners.iter().map(|(t, u)| (t.as_str(), u.as_str()))
    }

    /// Number of owned types
    pub fn len(&self) -> usize {
        self.owners.len()
    }

    /// Returns true if nothing is owned
    pub fn is_empty(&self) -> bool {
        self.owners.is_empty()
    }
}

/// A reference from one unit's schema to a type owned by another unit
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CrossUnitRef {
    /// The referenced type
    pub type_name: String,
    /// The unit owning it
    pub owner: String,
}

/// Result of one unit's discovery pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Discovery {
    /// Discovered types in visit order
    pub types: Vec<String>,
    /// Types imported from other units, in first-reference order
    pub imports: Vec<CrossUnitRef>,
}

/// The combination of include/exclude/package/auto-import options
#[derive(Debug, Clone)]
pub struct InclusionPolicy {
    include: HashSet<String>,
    exclude: HashSet<String>,
    base_packages: Vec<String>,
    auto_import: bool,
}

impl InclusionPolicy {
    /// Extracts the policy from a unit's options
    pub fn from_unit(unit: &UnitConfig) -> Self {
        Self {
            include: unit.include_classes.iter().cloned().collect(),
            exclude: unit.exclude_classes.iter().cloned().collect(),
            base_packages: unit.base_packages.clone(),
            auto_import: unit.auto_import_classes,
        }
    }

    /// Returns true if the policy admits the type into the unit's schema
    pub fn admits(&self, descriptor: &TypeDescriptor) -> bool {
        let full_name = descriptor.full_name();
        if self.exclude.contains(&full_name) {
            return false;
        }
        if self.include.contains(&full_name) {
            return true;
        }
        if self.base_packages.is_empty() {
            self.auto_import
        } else {
            self.in_base_packages(descriptor)
        }
    }

    fn in_base_packages(&self, descriptor: &TypeDescriptor) -> bool {
        self.base_packages
            .iter()
            .any(|package| descriptor.is_in_package(package))
    }

    /// Resolves the unit's root types.
    ///
    /// Package scanning only yields top-level types.
    pub fn roots(
        &self,
        unit: &UnitConfig,
        provider: &dyn TypeMetadataProvider,
    ) -> Result<Vec<String>> {
        if !unit.include_classes.is_empty() {
            let mut seen = HashSet::new();
            let mut roots = Vec::new();
            for class in &unit.include_classes {
                provider.require(class)?;
                if seen.insert(class.as_str()) {
                    roots.push(class.clone());
                }
            }
            return Ok(roots);
        }

        Ok(provider
            .types()
            .filter(|t| !t.is_nested())
            .filter(|t| self.base_packages.is_empty() || self.in_base_packages(t))
            .map(TypeDescriptor::full_name)
            .filter(|name| !self.exclude.contains(name))
            .collect())
    }
}

/// Computes the closed type set of a single unit
pub struct DiscoveryEngine<'a> {
    provider: &'a dyn TypeMetadataProvider,
    unit: &'a UnitConfig,
    policy: InclusionPolicy,
}

impl<'a> DiscoveryEngine<'a> {
    /// Creates an engine for a validated unit
    pub fn new(provider: &'a dyn TypeMetadataProvider, unit: &'a UnitConfig) -> Self {
        Self {
            provider,
            unit,
            policy: InclusionPolicy::from_unit(unit),
        }
    }

    /// Returns the unit's inclusion policy
    pub fn policy(&self) -> &InclusionPolicy {
        &self.policy
    }

    /// Resolves the unit's root types
    pub fn roots(&self) -> Result<Vec<String>> {
        self.policy.roots(self.unit, self.provider)
    }

    /// Runs discovery from `roots`, claiming admitted types in `ownership`.
    ///
    /// Types already owned by another unit are imported rather than
    /// discovered. Running twice against the same ownership table yields the
    /// same result.
    pub fn discover(&self, roots: &[String], ownership: &mut Ownership) -> Result<Discovery> {
        let unit = self.unit.name.as_str();
        let mut discovery = Discovery::default();
        let mut seen: HashSet<String> = HashSet::new();
        let mut imported: HashSet<String> = HashSet::new();
        let mut frontier: VecDeque<&TypeDescriptor> = VecDeque::new();

        for root in roots {
            let descriptor = self.provider.require(root)?;
            if !seen.insert(root.clone()) {
                continue;
            }
            let owner = ownership.claim(root, unit);
            if owner != unit {
                trace!("{}: root {} already owned by {}", unit, root, owner);
                if imported.insert(root.clone()) {
                    discovery.imports.push(CrossUnitRef {
                        type_name: root.clone(),
                        owner: owner.to_string(),
                    });
                }
                continue;
            }
            discovery.types.push(root.clone());
            frontier.push_back(descriptor);
        }

        while let Some(current) = frontier.pop_front() {
            if current.kind == TypeKind::Enum {
                continue;
            }
            for field in &current.fields {
                let Some(referenced) = field.kind.referenced_type() else {
                    continue;
                };
                if seen.contains(referenced) || imported.contains(referenced) {
                    continue;
                }
                let descriptor = self.provider.lookup(referenced).ok_or_else(|| {
                    Error::invalid_metadata(
                        current.full_name(),
                        format!("field '{}' references unknown type '{}'", field.name, referenced),
                    )
                })?;

                match ownership.owner(referenced) {
                    Some(owner) if owner != unit => {
                        trace!(
                            "{}: {}.{} imports {} from {}",
                            unit,
                            current.full_name(),
                            field.name,
                            referenced,
                            owner
                        );
                        imported.insert(referenced.to_string());
                        discovery.imports.push(CrossUnitRef {
                            type_name: referenced.to_string(),
                            owner: owner.to_string(),
                        });
                        continue;
                    }
                    Some(_) => {}
                    None if self.policy.admits(descriptor) => {
                        ownership.claim(referenced, unit);
                    }
                    None => return Err(Error::policy_violation(unit, referenced)),
                }

                trace!(
                    "{}: discovered {} via {}.{}",
                    unit,
                    referenced,
                    current.full_name(),
                    field.name
                );
                seen.insert(referenced.to_string());
                discovery.types.push(referenced.to_string());
                frontier.push_back(descriptor);
            }
        }

        debug!(
            "{}: discovered {} types, {} imports",
            unit,
            discovery.types.len(),
            discovery.imports.len()
        );
        Ok(discovery)
    }

    /// Resolves the roots and runs discovery
    pub fn run(&self, ownership: &mut Ownership) -> Result<Discovery> {
        let roots = self.roots()?;
        self.discover(&roots, ownership)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::sample_universe;
    use pretty_assertions::assert_eq;

    fn discover(unit: &UnitConfig, ownership: &mut Ownership) -> Result<Discovery> {
        let universe = sample_universe();
        DiscoveryEngine::new(&universe, unit).run(ownership)
    }

    #[test]
    fn test_basic_discovery_order() {
        let unit = UnitConfig::new("test_basic_stuff.FirstInitializer").base_package("test_basic_stuff");
        let mut ownership = Ownership::new();
        let discovery = discover(&unit, &mut ownership).unwrap();

        assert_eq!(
            discovery.types,
            vec![
                "test_basic_stuff.TestMessage",
                "test_basic_stuff.Details",
                "test_basic_stuff.Status",
            ]
        );
        assert!(discovery.imports.is_empty());
        assert_eq!(
            ownership.owner("test_basic_stuff.Details"),
            Some("test_basic_stuff.FirstInitializer")
        );
    }

    #[test]
    fn test_include_classes_with_auto_import() {
        let unit = UnitConfig::new("u").include("test_basic_stuff.TestMessage");
        let discovery = discover(&unit, &mut Ownership::new()).unwrap();
        assert_eq!(discovery.types.len(), 3);
        assert_eq!(discovery.types[0], "test_basic_stuff.TestMessage");
    }

    #[test]
    fn test_discovery_without_auto_import_fails() {
        let unit = UnitConfig::new("test_discovery_without_auto_import.Unit")
            .include("test_discovery.OuterMessage1")
            .auto_import(false);
        let err = discover(&unit, &mut Ownership::new()).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Found a reference to class test_discovery_inner.InnerMessage1 which was not explicitly included by test_discovery_without_auto_import.Unit and the combination of relevant attributes (basePackages, includeClasses, excludeClasses, autoImportClasses) do not allow it to be included."
        );
    }

    #[test]
    fn test_base_packages_do_not_admit_foreign_packages() {
        let unit = UnitConfig::new("u").base_package("test_discovery");
        let err = discover(&unit, &mut Ownership::new()).unwrap_err();
        assert!(matches!(err, Error::DiscoveryPolicyViolation { .. }));
    }

    #[test]
    fn test_nested_types_need_a_field_path() {
        let unit = UnitConfig::new("u").base_package("test_nested").auto_import(false);
        let discovery = discover(&unit, &mut Ownership::new()).unwrap();

        assert!(discovery.types.contains(&"test_nested.OuterMessage2.InnerMessage2".to_string()));
        assert!(discovery.types.contains(&"test_nested.OuterMessage3".to_string()));
        assert!(!discovery.types.contains(&"test_nested.OuterMessage3.InnerMessage3".to_string()));
        assert!(discovery.types.contains(&"test_nested.OuterMessage4.InnerMessage4".to_string()));
        assert!(discovery.types.contains(&"test_nested.Color".to_string()));
    }

    #[test]
    fn test_excluded_type_reachable_by_field_is_a_violation() {
        let unit = UnitConfig::new("u")
            .base_package("test_nested")
            .exclude("test_nested.OuterMessage2.InnerMessage2");
        let err = discover(&unit, &mut Ownership::new()).unwrap_err();
        assert!(matches!(
            err,
            Error::DiscoveryPolicyViolation { ref type_name, .. } if type_name == "test_nested.OuterMessage2.InnerMessage2"
        ));
    }

    #[test]
    fn test_types_owned_elsewhere_are_imported() {
        let mut ownership = Ownership::new();
        let first = UnitConfig::new("first").base_package("test_basic_stuff");
        discover(&first, &mut ownership).unwrap();

        let dependent = UnitConfig::new("dependent")
            .base_package("test_basic_stuff_dependent")
            .auto_import(false);
        let discovery = discover(&dependent, &mut ownership).unwrap();

        assert_eq!(discovery.types, vec!["test_basic_stuff_dependent.Dependent"]);
        assert_eq!(
            discovery.imports,
            vec![CrossUnitRef {
                type_name: "test_basic_stuff.TestMessage".to_string(),
                owner: "first".to_string(),
            }]
        );
    }

    #[test]
    fn test_discovery_is_idempotent() {
        let unit = UnitConfig::new("u").base_package("test_nested");
        let mut ownership = Ownership::new();
        let first = discover(&unit, &mut ownership).unwrap();
        let second = discover(&unit, &mut ownership).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_roots_skip_nested_and_excluded_types() {
        let universe = sample_universe();
        let unit = UnitConfig::new("u")
            .base_package("test_nested")
            .exclude("test_nested.OuterMessage3");
        let roots = DiscoveryEngine::new(&universe, &unit).roots().unwrap();
        assert_eq!(
            roots,
            vec![
                "test_nested.OuterMessage2",
                "test_nested.OuterMessage4",
                "test_nested.Color",
            ]
        );
    }

    #[test]
    fn test_ownership_claim_keeps_first_owner() {
        let mut ownership = Ownership::new();
        assert_eq!(ownership.claim("t", "a"), "a");
        assert_eq!(ownership.claim("t", "b"), "a");
        assert_eq!(ownership.len(), 1);
    }
}
