//! Multi-unit resolution.
//!
//! The resolver runs the whole analysis for a set of units:
//!
//! 1. Validate every unit; a rejected unit (and any unit depending on it) is
//!    dropped with an error diagnostic while the others continue
//! 2. Order the units by their declared `dependsOn` edges (cycles are fatal)
//! 3. Let each unit claim its root types, in that order
//! 4. Run discovery for each unit against the shared ownership table,
//!    deferring a unit that needs a type nobody has claimed yet
//! 5. Rebuild the graph from declared and inferred edges, reject cycles and
//!    compute the emission order
//!
//! Discovery policy violations and cycles abort the whole resolution, since
//! ownership cannot be trusted once any unit is inconsistent. An aborted
//! resolution keeps every diagnostic gathered up to that point.

use crate::diagnostic::Diagnostic;
use crate::discovery::{CrossUnitRef, Discovery, DiscoveryEngine, Ownership};
use crate::error::{Error, Result};
use crate::graph::DependencyGraph;
use crate::metadata::TypeMetadataProvider;
use crate::unit::{validate_unit, UnitConfig};
use std::collections::{HashMap, HashSet};
use tracing::{debug, info, warn};

/// A unit after successful discovery
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaUnit {
    /// Declared options
    pub config: UnitConfig,
    /// Root types the unit started from
    pub roots: Vec<String>,
    /// Types owned and emitted by this unit, in discovery order
    pub types: Vec<String>,
    /// Types referenced from other units
    pub imports: Vec<CrossUnitRef>,
    /// Units this unit depends on (declared and inferred)
    pub depends_on: Vec<String>,
}

impl SchemaUnit {
    /// Unit identity
    pub fn name(&self) -> &str {
        &self.config.name
    }

    /// Schema file the unit is emitted to
    pub fn schema_file_name(&self) -> String {
        self.config.effective_schema_file_name()
    }

    /// Proto package of the emitted schema
    pub fn schema_package(&self) -> Option<&str> {
        self.config.schema_package_name.as_deref()
    }

    /// Returns true if the unit owns `type_name`
    pub fn owns(&self, type_name: &str) -> bool {
        self.types.iter().any(|t| t == type_name)
    }
}

/// Outcome of resolving a project
#[derive(Debug, Clone, Default)]
pub struct Resolution {
    /// Successfully resolved units, in emission order
    pub units: Vec<SchemaUnit>,
    /// Final type ownership
    pub ownership: Ownership,
    /// Dependencies before dependents
    pub emission_order: Vec<String>,
    /// Warnings, per-unit rejections and, for an aborted project, every
    /// fatal finding
    pub diagnostics: Vec<Diagnostic>,
    /// True if a policy violation, cycle or metadata error stopped the whole
    /// project; `units` is then empty
    pub aborted: bool,
}

impl Resolution {
    fn abort_with(mut diagnostics: Vec<Diagnostic>, aborting: Vec<Diagnostic>) -> Self {
        warn!("Resolution aborted with {} fatal diagnostics", aborting.len());
        diagnostics.extend(aborting);
        Self {
            diagnostics,
            aborted: true,
            ..Self::default()
        }
    }

    /// Looks up a resolved unit
    pub fn unit(&self, name: &str) -> Option<&SchemaUnit> {
        self.units.iter().find(|u| u.name() == name)
    }

    /// Returns true if the project aborted or any unit was rejected
    pub fn has_errors(&self) -> bool {
        self.aborted || self.diagnostics.iter().any(Diagnostic::is_error)
    }
}

/// Resolves a set of units against one metadata provider
pub struct ProjectResolver<'a> {
    provider: &'a dyn TypeMetadataProvider,
    units: Vec<UnitConfig>,
}

impl<'a> ProjectResolver<'a> {
    /// Creates a resolver
    pub fn new(provider: &'a dyn TypeMetadataProvider, units: Vec<UnitConfig>) -> Self {
        Self { provider, units }
    }

    /// Runs validation, discovery and graph resolution.
    ///
    /// Analysis failures never surface as `Err`: a rejected unit becomes an
    /// error diagnostic, and a failure that invalidates the whole project
    /// yields an [aborted](Resolution::aborted) resolution that still carries
    /// every diagnostic collected before it. Only duplicate unit names are
    /// returned as an error.
    pub fn resolve(&self) -> Result<Resolution> {
        let mut names = HashSet::new();
        for unit in &self.units {
            if !names.insert(unit.name.as_str()) {
                return Err(Error::DuplicateUnit {
                    unit: unit.name.clone(),
                });
            }
        }

        let mut diagnostics = Vec::new();
        let mut aborting = Vec::new();
        let mut accepted = self.validate_all(&mut diagnostics, &mut aborting);
        reject_broken_dependents(&mut accepted, &names, &mut diagnostics);
        if !aborting.is_empty() {
            return Ok(Resolution::abort_with(diagnostics, aborting));
        }

        match self.resolve_accepted(&accepted) {
            Ok(resolution) => Ok(Resolution {
                diagnostics,
                ..resolution
            }),
            Err(aborting) => Ok(Resolution::abort_with(diagnostics, aborting)),
        }
    }

    fn resolve_accepted(
        &self,
        accepted: &[&UnitConfig],
    ) -> std::result::Result<Resolution, Vec<Diagnostic>> {
        let mut declared = DependencyGraph::new();
        for unit in accepted {
            declared.add_node(&unit.name);
            for dependency in &unit.depends_on {
                declared.add_edge(&unit.name, dependency);
            }
        }
        let processing_order = declared.resolve().map_err(|err| vec![fatal(&err, PROJECT)])?;
        debug!("Processing order: {:?}", processing_order);

        let by_name: HashMap<&str, &UnitConfig> =
            accepted.iter().map(|u| (u.name.as_str(), *u)).collect();
        let ordered: Vec<&UnitConfig> = processing_order
            .iter()
            .filter_map(|name| by_name.get(name.as_str()).copied())
            .collect();

        let mut ownership = Ownership::new();
        let mut all_roots = Vec::with_capacity(ordered.len());
        for unit in &ordered {
            let roots = DiscoveryEngine::new(self.provider, unit)
                .roots()
                .map_err(|err| vec![fatal(&err, &unit.name)])?;
            for root in &roots {
                ownership.claim(root, &unit.name);
            }
            all_roots.push(roots);
        }

        let discoveries = self.discover_all(&ordered, &all_roots, &mut ownership)?;

        let mut graph = DependencyGraph::new();
        for (unit, discovery) in ordered.iter().zip(&discoveries) {
            graph.add_node(&unit.name);
            for dependency in &unit.depends_on {
                graph.add_edge(&unit.name, dependency);
            }
            for import in &discovery.imports {
                graph.add_edge(&unit.name, &import.owner);
            }
        }
        let emission_order = graph.resolve().map_err(|err| vec![fatal(&err, PROJECT)])?;

        let mut resolved: HashMap<&str, SchemaUnit> = HashMap::new();
        for ((unit, discovery), roots) in ordered.iter().zip(discoveries).zip(all_roots) {
            resolved.insert(
                unit.name.as_str(),
                SchemaUnit {
                    config: (*unit).clone(),
                    roots,
                    types: discovery.types,
                    imports: discovery.imports,
                    depends_on: graph
                        .dependencies(&unit.name)
                        .into_iter()
                        .map(str::to_string)
                        .collect(),
                },
            );
        }
        let units: Vec<SchemaUnit> = emission_order
            .iter()
            .filter_map(|name| resolved.remove(name.as_str()))
            .collect();

        info!(
            "Resolved {} of {} units ({} types owned)",
            units.len(),
            self.units.len(),
            ownership.len()
        );

        Ok(Resolution {
            units,
            ownership,
            emission_order,
            ..Resolution::default()
        })
    }

    /// Runs discovery for every unit, returning results in `ordered` order.
    ///
    /// A unit that reaches an unowned type its policy does not admit is
    /// deferred, since another unit may still claim that type. Deferred units
    /// are retried against the grown ownership table until a pass makes no
    /// progress; whatever is left then fails with its policy violation. A
    /// failed attempt leaves no claims behind, so the outcome does not depend
    /// on the order units are declared in.
    fn discover_all(
        &self,
        ordered: &[&UnitConfig],
        roots: &[Vec<String>],
        ownership: &mut Ownership,
    ) -> std::result::Result<Vec<Discovery>, Vec<Diagnostic>> {
        let mut done: Vec<(usize, Discovery)> = Vec::with_capacity(ordered.len());
        let mut pending: Vec<usize> = (0..ordered.len()).collect();

        while !pending.is_empty() {
            let mut deferred = Vec::new();
            let mut violations = Vec::new();

            for index in pending.iter().copied() {
                let unit = ordered[index];
                let engine = DiscoveryEngine::new(self.provider, unit);
                let mut attempt = ownership.clone();
                match engine.discover(&roots[index], &mut attempt) {
                    Ok(discovery) => {
                        *ownership = attempt;
                        done.push((index, discovery));
                    }
                    Err(err @ Error::DiscoveryPolicyViolation { .. }) => {
                        debug!("Deferring {}: {}", unit.name, err);
                        deferred.push(index);
                        violations.push(fatal(&err, &unit.name));
                    }
                    Err(err) => return Err(vec![fatal(&err, &unit.name)]),
                }
            }

            if deferred.len() == pending.len() {
                return Err(violations);
            }
            pending = deferred;
        }

        done.sort_by_key(|(index, _)| *index);
        Ok(done.into_iter().map(|(_, discovery)| discovery).collect())
    }

    fn validate_all(
        &self,
        diagnostics: &mut Vec<Diagnostic>,
        fatal_diagnostics: &mut Vec<Diagnostic>,
    ) -> Vec<&UnitConfig> {
        let mut accepted = Vec::with_capacity(self.units.len());
        for unit in &self.units {
            match validate_unit(unit, self.provider) {
                Ok(warnings) => {
                    diagnostics.extend(warnings);
                    accepted.push(unit);
                }
                Err(err) if !err.aborts_project() => {
                    warn!("Rejected unit {}: {}", unit.name, err);
                    if let Some(diagnostic) = err.to_diagnostic() {
                        diagnostics.push(diagnostic);
                    }
                }
                Err(err) => fatal_diagnostics.push(fatal(&err, &unit.name)),
            }
        }
        accepted
    }
}

/// Unit label for project-wide findings that name no unit
const PROJECT: &str = "<project>";

/// Turns a project-aborting error into a diagnostic, attributed to `unit`
/// when the error does not name one itself
fn fatal(err: &Error, unit: &str) -> Diagnostic {
    err.to_diagnostic()
        .unwrap_or_else(|| Diagnostic::error(unit, err.to_string()))
}

/// Drops units whose declared dependencies are unknown or were rejected,
/// repeating until nothing changes
fn reject_broken_dependents(
    accepted: &mut Vec<&UnitConfig>,
    declared: &HashSet<&str>,
    diagnostics: &mut Vec<Diagnostic>,
) {
    loop {
        let alive: HashSet<String> = accepted.iter().map(|u| u.name.clone()).collect();
        let before = accepted.len();

        accepted.retain(|unit| {
            let broken = unit
                .depends_on
                .iter()
                .find(|dependency| !alive.contains(dependency.as_str()));
            match broken {
                None => true,
                Some(dependency) => {
                    let message = if declared.contains(dependency.as_str()) {
                        format!("dependsOn refers to unit '{}' which failed validation", dependency)
                    } else {
                        format!("dependsOn refers to unknown unit '{}'", dependency)
                    };
                    warn!("Rejected unit {}: {}", unit.name, message);
                    diagnostics.push(Diagnostic::error(&unit.name, message));
                    false
                }
            }
        });

        if accepted.len() == before {
            break;
        }
    }
}
