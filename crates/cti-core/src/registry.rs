//! The in-memory entity/type registry: uniqueness, parent resolution and
//! access control over a batch of [`Entity`] records.

use indexmap::IndexMap;

use crate::entity::{CachedEntityRecord, Entity, InstanceEntity, TypeEntity};
use crate::error::{wrap, CtiError};

/// A store of CTI types and instances keyed by identifier.
///
/// Holds three maps, per the data model: `types`, `instances`, and a
/// combined `index` used for uniqueness and generic lookup. `Registry` does
/// no internal synchronisation — see the crate's concurrency notes.
#[derive(Debug, Clone, Default)]
pub struct Registry {
    types: IndexMap<String, TypeEntity>,
    instances: IndexMap<String, InstanceEntity>,
    index: IndexMap<String, Entity>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn types(&self) -> &IndexMap<String, TypeEntity> {
        &self.types
    }

    pub fn instances(&self) -> &IndexMap<String, InstanceEntity> {
        &self.instances
    }

    pub fn get(&self, cti: &str) -> Option<&Entity> {
        self.index.get(cti)
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Registers a single entity. Fails with `duplicate_entity` if the
    /// combined index already holds that identifier.
    #[tracing::instrument(skip(self, entity), fields(cti = entity.cti()))]
    pub fn register(&mut self, entity: Entity) -> Result<(), CtiError> {
        let cti = entity.cti().to_string();
        if self.index.contains_key(&cti) {
            return Err(CtiError::DuplicateEntity { cti });
        }
        match &entity {
            Entity::Type(t) => {
                self.types.insert(cti.clone(), t.clone());
            }
            Entity::Instance(i) => {
                self.instances.insert(cti.clone(), i.clone());
            }
        }
        self.index.insert(cti, entity);
        Ok(())
    }

    /// Second pass: walk each registered entity's identifier, strip the
    /// last `~`-segment and set the resulting prefix as its `parent`.
    ///
    /// Deriving from a `final` parent is rejected. A parent that is not (yet)
    /// present in this registry is not an error here — the back-reference is
    /// set from the identifier alone, and the registry resolves
    /// `parent_cti -> &Entity` lazily via [`Registry::parent_of`].
    #[tracing::instrument(skip(self))]
    pub fn resolve_parents(&mut self) -> Result<(), CtiError> {
        let ctis: Vec<String> = self.index.keys().cloned().collect();
        for cti in ctis {
            let Some(split_at) = cti.rfind('~') else {
                continue;
            };
            let parent_cti = cti[..split_at].to_string();
            if let Some(parent) = self.index.get(&parent_cti) {
                if parent.is_final() {
                    let context = format!("resolving parent of '{cti}'");
                    return Err(wrap(
                        &context,
                        CtiError::ParentFinal {
                            child: cti,
                            parent: parent_cti,
                            message: "parent type is marked final and cannot be derived from"
                                .to_string(),
                        },
                    ));
                }
            }
            self.set_parent(&cti, parent_cti);
        }
        Ok(())
    }

    fn set_parent(&mut self, cti: &str, parent_cti: String) {
        if let Some(t) = self.types.get_mut(cti) {
            t.header.parent = Some(parent_cti.clone());
        }
        if let Some(i) = self.instances.get_mut(cti) {
            i.header.parent = Some(parent_cti.clone());
        }
        if let Some(e) = self.index.get_mut(cti) {
            e.header_mut().parent = Some(parent_cti);
        }
    }

    /// Resolves an entity's parent back-reference against this registry.
    pub fn parent_of(&self, entity: &Entity) -> Option<&Entity> {
        entity.parent_cti().and_then(|p| self.get(p))
    }

    /// Walks from `entity` to the root, inclusive, yielding the entity
    /// itself first.
    pub fn ancestor_chain<'a>(&'a self, entity: &'a Entity) -> Vec<&'a Entity> {
        let mut chain = vec![entity];
        let mut current = entity;
        while let Some(parent) = self.parent_of(current) {
            chain.push(parent);
            current = parent;
        }
        chain
    }

    /// Folds another registry's entities into this one, re-running the
    /// duplicate check for every entity it carries.
    pub fn merge(&mut self, other: Registry) -> Result<(), CtiError> {
        for (_, entity) in other.index {
            self.register(entity)?;
        }
        Ok(())
    }

    /// Converts and registers a batch of on-disk cached-entity records, then
    /// resolves parents — the registry's half of the external bootstrap
    /// interface.
    pub fn load_cached_entities(&mut self, records: Vec<CachedEntityRecord>) -> Result<(), CtiError> {
        for record in records {
            let entity = record.into_entity()?;
            self.register(entity)?;
        }
        self.resolve_parents()
    }

    pub fn is_a(&self, cti: &str, type_cti: &str) -> bool {
        self.get(cti).map(|e| e.is_a(type_cti)).unwrap_or(false)
    }

    pub fn is_child_of(&self, cti: &str, type_cti: &str) -> bool {
        self.get(cti).map(|e| e.is_child_of(type_cti)).unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::{Access, EntityHeader};

    fn type_entity(cti: &str, is_final: bool) -> Entity {
        let mut header = EntityHeader::new(cti);
        header.is_final = is_final;
        header.access = Access::Public;
        Entity::Type(TypeEntity {
            header,
            schema: serde_json::json!({}),
            traits_schema: None,
            traits_annotations: IndexMap::new(),
            traits: None,
        })
    }

    #[test]
    fn test_register_rejects_duplicate() {
        let mut registry = Registry::new();
        registry.register(type_entity("cti.a.p.e.v1.0", false)).unwrap();
        let err = registry
            .register(type_entity("cti.a.p.e.v1.0", false))
            .unwrap_err();
        assert!(matches!(err, CtiError::DuplicateEntity { .. }));
    }

    #[test]
    fn test_resolve_parents_sets_parent_field() {
        let mut registry = Registry::new();
        registry
            .register(type_entity("cti.a.p.gr.namespace.v1.0", false))
            .unwrap();
        registry
            .register(type_entity(
                "cti.a.p.gr.namespace.v1.0~a.p.f.v1.0",
                false,
            ))
            .unwrap();
        registry.resolve_parents().unwrap();

        let child = registry.get("cti.a.p.gr.namespace.v1.0~a.p.f.v1.0").unwrap();
        assert_eq!(child.parent_cti(), Some("cti.a.p.gr.namespace.v1.0"));

        let root = registry.get("cti.a.p.gr.namespace.v1.0").unwrap();
        assert_eq!(root.parent_cti(), None);
    }

    #[test]
    fn test_resolve_parents_rejects_final_parent() {
        let mut registry = Registry::new();
        registry
            .register(type_entity("cti.a.p.gr.namespace.v1.0", true))
            .unwrap();
        registry
            .register(type_entity(
                "cti.a.p.gr.namespace.v1.0~a.p.f.v1.0",
                false,
            ))
            .unwrap();
        let err = registry.resolve_parents().unwrap_err();
        match err {
            CtiError::ParentFinal { message, .. } => {
                assert!(message.contains("resolving parent of"));
            }
            other => panic!("expected ParentFinal, got {other:?}"),
        }
    }

    #[test]
    fn test_resolve_parents_tolerates_missing_parent() {
        let mut registry = Registry::new();
        registry
            .register(type_entity(
                "cti.a.p.gr.namespace.v1.0~a.p.f.v1.0",
                false,
            ))
            .unwrap();
        assert!(registry.resolve_parents().is_ok());
        let child = registry.get("cti.a.p.gr.namespace.v1.0~a.p.f.v1.0").unwrap();
        assert_eq!(child.parent_cti(), Some("cti.a.p.gr.namespace.v1.0"));
        assert!(registry.parent_of(child).is_none());
    }

    #[test]
    fn test_merge_preserves_uniqueness() {
        let mut a = Registry::new();
        a.register(type_entity("cti.a.p.e.v1.0", false)).unwrap();
        let mut b = Registry::new();
        b.register(type_entity("cti.a.p.e.v1.0", false)).unwrap();
        let err = a.merge(b).unwrap_err();
        assert!(matches!(err, CtiError::DuplicateEntity { .. }));
    }

    #[test]
    fn test_ancestor_chain() {
        let mut registry = Registry::new();
        registry
            .register(type_entity("cti.a.p.gr.namespace.v1.0", false))
            .unwrap();
        registry
            .register(type_entity(
                "cti.a.p.gr.namespace.v1.0~a.p.f.v1.0",
                false,
            ))
            .unwrap();
        registry.resolve_parents().unwrap();
        let leaf = registry.get("cti.a.p.gr.namespace.v1.0~a.p.f.v1.0").unwrap();
        let chain = registry.ancestor_chain(leaf);
        assert_eq!(chain.len(), 2);
        assert_eq!(chain[0].cti(), "cti.a.p.gr.namespace.v1.0~a.p.f.v1.0");
        assert_eq!(chain[1].cti(), "cti.a.p.gr.namespace.v1.0");
    }
}
