//! Archetype declarations and the two ability maps.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use crate::anchor::{Archetype, ArchetypeKind, EDGE, NODE, ROOT, WALKER};
use crate::error::Result;
use crate::walker::step::Step;

/// A handler invoked when a walker is dispatched at a node or edge.
pub type Ability = Arc<dyn Fn(&mut Step<'_>) -> Result<()> + Send + Sync>;

/// A declared archetype.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeInfo {
    pub name: String,
    pub kind: ArchetypeKind,
    pub parent: Option<String>,
}

/// Which side of a dispatch an ability belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Side {
    /// Declared on the walker, keyed by the visited type
    Walker,
    /// Declared on the node or edge, keyed by the visiting walker type
    Target,
}

/// Immutable set of archetypes and abilities shared by every context.
///
/// Abilities live in two independent maps, one per [`Side`]. Both are keyed
/// by `(owner type, other type)`.
pub struct Registry {
    types: HashMap<String, TypeInfo>,
    walker_side: HashMap<(String, String), Ability>,
    target_side: HashMap<(String, String), Ability>,
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("types", &self.types.len())
            .field("walker_side", &self.walker_side.len())
            .field("target_side", &self.target_side.len())
            .finish()
    }
}

impl Registry {
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::new()
    }

    pub fn type_info(&self, name: &str) -> Option<&TypeInfo> {
        self.types.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.types.contains_key(name)
    }

    pub fn kind_of(&self, name: &str) -> Option<ArchetypeKind> {
        self.types.get(name).map(|t| t.kind)
    }

    /// `name` followed by its declared ancestors, ending at the base type of
    /// `kind`. Undeclared names go straight to the base type.
    pub fn ancestry(&self, name: &str, kind: ArchetypeKind) -> Vec<String> {
        let mut chain = Vec::new();
        let mut seen = HashSet::new();
        let mut current = Some(name.to_string());

        while let Some(type_name) = current.take() {
            if !seen.insert(type_name.clone()) {
                break;
            }
            current = self.types.get(&type_name).and_then(|t| t.parent.clone());
            chain.push(type_name);
        }

        let base = kind.base_type();
        if !seen.contains(base) {
            chain.push(base.to_string());
        }
        chain
    }

    /// Whether `name` is `ancestor` or derives from it.
    pub fn is_a(&self, name: &str, ancestor: &str) -> bool {
        let kind = self.kind_of(name).unwrap_or(ArchetypeKind::Node);
        self.ancestry(name, kind).iter().any(|t| t == ancestor)
    }

    /// Most specific ability for a walker of type `walker` dispatched at an
    /// anchor of type `target`.
    ///
    /// The owner's ancestry is walked first (a subtype overrides its parent),
    /// then, for each owner type, the other party's ancestry (a handler for
    /// `City` beats one for `Node`).
    pub fn lookup(
        &self,
        side: Side,
        walker: (&str, ArchetypeKind),
        target: (&str, ArchetypeKind),
    ) -> Option<Ability> {
        let (abilities, owner, other) = match side {
            Side::Walker => (&self.walker_side, walker, target),
            Side::Target => (&self.target_side, target, walker),
        };
        if abilities.is_empty() {
            return None;
        }
        let others = self.ancestry(other.0, other.1);
        for owner_type in self.ancestry(owner.0, owner.1) {
            for other_type in &others {
                if let Some(ability) = abilities.get(&(owner_type.clone(), other_type.clone())) {
                    return Some(Arc::clone(ability));
                }
            }
        }
        None
    }
}

/// Builder for a [`Registry`].
pub struct RegistryBuilder {
    types: HashMap<String, TypeInfo>,
    walker_side: HashMap<(String, String), Ability>,
    target_side: HashMap<(String, String), Ability>,
}

impl Default for RegistryBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl RegistryBuilder {
    /// A builder with the base types already declared.
    pub fn new() -> Self {
        let builder = Self {
            types: HashMap::new(),
            walker_side: HashMap::new(),
            target_side: HashMap::new(),
        };
        builder
            .declare(NODE, ArchetypeKind::Node, None)
            .declare(EDGE, ArchetypeKind::Edge, None)
            .declare(WALKER, ArchetypeKind::Walker, None)
            .declare(ROOT, ArchetypeKind::Node, Some(NODE))
    }

    /// Declare an archetype by name.
    pub fn declare(mut self, name: &str, kind: ArchetypeKind, parent: Option<&str>) -> Self {
        let parent = parent
            .map(str::to_string)
            .filter(|p| p.as_str() != name)
            .or_else(|| (name != kind.base_type()).then(|| kind.base_type().to_string()));
        self.types.insert(
            name.to_string(),
            TypeInfo {
                name: name.to_string(),
                kind,
                parent,
            },
        );
        self
    }

    /// Declare a typed node archetype.
    pub fn node<T: Archetype>(self) -> Self {
        self.declare(T::NAME, ArchetypeKind::Node, T::PARENT)
    }

    /// Declare a typed edge archetype.
    pub fn edge<T: Archetype>(self) -> Self {
        self.declare(T::NAME, ArchetypeKind::Edge, T::PARENT)
    }

    /// Declare a typed walker archetype.
    pub fn walker<T: Archetype>(self) -> Self {
        self.declare(T::NAME, ArchetypeKind::Walker, T::PARENT)
    }

    /// Register a walker-side ability: runs when a `walker_type` walker is
    /// dispatched at a `target_type` anchor.
    pub fn on_visit<F>(mut self, walker_type: &str, target_type: &str, f: F) -> Self
    where
        F: Fn(&mut Step<'_>) -> Result<()> + Send + Sync + 'static,
    {
        self.walker_side
            .insert((walker_type.to_string(), target_type.to_string()), Arc::new(f));
        self
    }

    /// Register a node/edge-side ability: runs when a `walker_type` walker
    /// arrives at a `target_type` anchor.
    pub fn on_arrival<F>(mut self, target_type: &str, walker_type: &str, f: F) -> Self
    where
        F: Fn(&mut Step<'_>) -> Result<()> + Send + Sync + 'static,
    {
        self.target_side
            .insert((target_type.to_string(), walker_type.to_string()), Arc::new(f));
        self
    }

    pub fn build(self) -> Registry {
        Registry {
            types: self.types,
            walker_side: self.walker_side,
            target_side: self.target_side,
        }
    }
}
