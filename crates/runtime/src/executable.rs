//! The compiled, immutable package a controller executes.
//!
//! An [`Executable`] owns the named-template table, the global variable
//! definitions (slot-addressed), the interned parameter names and the
//! location table. It is built once by an [`ExecutableBuilder`] and shared
//! read-only between runs and threads; per-run state (computed globals,
//! supplied parameters, output bookkeeping) lives on the controller.

use std::collections::HashMap;
use std::sync::Arc;

use crate::bindery::DependencyGraph;
use crate::error::Error;
use crate::instruct::{Expression, Template};
use crate::location::{LocationId, LocationMap};
use crate::model::QName;
use crate::param::ParamId;

/// A global variable or stylesheet parameter definition.
#[derive(Debug)]
pub struct GlobalVariableDef {
    pub name: QName,
    pub select: Expression,
    /// Parameters take a supplied value in preference to their default.
    pub is_param: bool,
    /// A required parameter with no supplied value is an error.
    pub required: bool,
    /// Local frame slots the initializer needs.
    pub slots: usize,
    pub loc: LocationId,
}

#[derive(Debug)]
pub struct Executable {
    named_templates: HashMap<QName, Arc<Template>>,
    globals: Vec<GlobalVariableDef>,
    param_names: Vec<QName>,
    locations: Arc<LocationMap>,
}

impl Executable {
    pub fn builder() -> ExecutableBuilder {
        ExecutableBuilder::new()
    }

    pub fn named_template(&self, name: &QName) -> Option<&Arc<Template>> {
        self.named_templates.get(name)
    }

    pub fn global(&self, slot: usize) -> Option<&GlobalVariableDef> {
        self.globals.get(slot)
    }

    pub fn global_count(&self) -> usize {
        self.globals.len()
    }

    pub fn param_name(&self, id: ParamId) -> Option<&QName> {
        self.param_names.get(id.0 as usize)
    }

    pub fn locations(&self) -> &LocationMap {
        &self.locations
    }
}

/// Accumulates compiled components; `build` freezes them into an
/// [`Executable`], failing if the global variables form a dependency cycle.
pub struct ExecutableBuilder {
    named_templates: HashMap<QName, Arc<Template>>,
    globals: Vec<GlobalVariableDef>,
    param_names: Vec<QName>,
    locations: Arc<LocationMap>,
    dependencies: DependencyGraph,
}

impl Default for ExecutableBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ExecutableBuilder {
    pub fn new() -> Self {
        Self {
            named_templates: HashMap::new(),
            globals: Vec::new(),
            param_names: Vec::new(),
            locations: Arc::new(LocationMap::new()),
            dependencies: DependencyGraph::new(),
        }
    }

    /// Intern a (module, line) pair for use on instruction nodes.
    pub fn allocate_location(&self, system_id: &str, line: u32) -> LocationId {
        self.locations.allocate(system_id, line)
    }

    /// Intern a parameter name, returning the id callers and callees share.
    pub fn param_id(&mut self, name: &QName) -> ParamId {
        if let Some(pos) = self.param_names.iter().position(|n| n == name) {
            return ParamId(pos as u32);
        }
        self.param_names.push(name.clone());
        ParamId((self.param_names.len() - 1) as u32)
    }

    pub fn add_named_template(&mut self, template: Arc<Template>) -> &mut Self {
        if let Some(name) = &template.name {
            self.named_templates.insert(name.clone(), template);
        }
        self
    }

    /// Register a global variable; returns the slot its references use.
    /// Dependencies on other globals are read off the initializer so the
    /// freeze-time cycle check sees the full graph.
    pub fn add_global(&mut self, def: GlobalVariableDef) -> usize {
        let slot = self.globals.len();
        let mut refs = Vec::new();
        def.select.global_references(&mut refs);
        for dep in refs {
            self.dependencies.register(slot, dep);
        }
        self.globals.push(def);
        slot
    }

    /// Record a dependency the reference scan cannot see (a global read
    /// through a collaborator, for instance).
    pub fn add_global_dependency(&mut self, from: usize, to: usize) -> &mut Self {
        self.dependencies.register(from, to);
        self
    }

    pub fn build(self) -> Result<Arc<Executable>, Error> {
        let names: Vec<QName> = self.globals.iter().map(|g| g.name.clone()).collect();
        self.dependencies.check_for_cycles(&names)?;
        Ok(Arc::new(Executable {
            named_templates: self.named_templates,
            globals: self.globals,
            param_names: self.param_names,
            locations: self.locations,
        }))
    }
}
