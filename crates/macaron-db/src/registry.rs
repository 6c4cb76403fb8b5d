//! The model registry.
//!
//! Relationships name their targets, so a model may be registered before the
//! models it references. Such references wait in a pending queue keyed by the
//! missing model's name and are wired up when that model registers. A
//! [`Database`](crate::database::Database) refuses a registry that still has
//! pending references.
//!
//! Wiring a relation also generates its reverse accessor on the target, and
//! for many-to-many relations without an explicit link model, registers a
//! generated `<Owner><Target>Link` model.

use std::collections::HashMap;

use macaron_core::{MacaronError, MacaronResult};

use crate::fields::FieldKind;
use crate::model::{Link, ManyToOne, ModelDef, ReferentialAction, Relation, RelationKind};

#[derive(Debug, Clone)]
enum PendingLink {
    ManyToOne { owner: String, index: usize },
    ManyToMany { owner: String, index: usize },
}

impl PendingLink {
    fn owner(&self) -> &str {
        match self {
            Self::ManyToOne { owner, .. } | Self::ManyToMany { owner, .. } => owner,
        }
    }
}

/// Holds every model definition and resolves relationships between them.
///
/// # Examples
///
/// ```
/// use macaron_db::fields::FieldDef;
/// use macaron_db::model::{ManyToOne, ModelDef};
/// use macaron_db::registry::Registry;
///
/// let mut registry = Registry::new();
/// // Member references Team before Team exists.
/// registry
///     .register(
///         ModelDef::builder("Member")
///             .many_to_one(ManyToOne::new("team", "Team").related_name("members"))
///             .build()
///             .unwrap(),
///     )
///     .unwrap();
/// assert!(registry.check().is_err());
///
/// registry
///     .register(ModelDef::builder("Team").field(FieldDef::char("name")).build().unwrap())
///     .unwrap();
/// assert!(registry.check().is_ok());
/// assert!(registry.get("Team").unwrap().relation("members").is_some());
/// ```
#[derive(Debug, Default)]
pub struct Registry {
    models: HashMap<String, ModelDef>,
    order: Vec<String>,
    pending: HashMap<String, Vec<PendingLink>>,
}

impl Registry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a model definition and wires every relation whose target is
    /// known.
    pub fn register(&mut self, def: ModelDef) -> MacaronResult<()> {
        if self.models.contains_key(&def.name) {
            return Err(MacaronError::ImproperlyConfigured(format!(
                "Model '{}' is already registered",
                def.name
            )));
        }
        if let Some(other) = self.models.values().find(|m| m.table == def.table) {
            return Err(MacaronError::ImproperlyConfigured(format!(
                "Models '{}' and '{}' share table \"{}\"",
                other.name, def.name, def.table
            )));
        }

        let name = def.name.clone();
        let m2o = def.many_to_one.len();
        let m2m = def.many_to_many.len();
        tracing::debug!(model = %name, table = %def.table, "registering model");
        self.order.push(name.clone());
        self.models.insert(name.clone(), def);

        for index in 0..m2o {
            self.resolve(PendingLink::ManyToOne {
                owner: name.clone(),
                index,
            })?;
        }
        for index in 0..m2m {
            self.resolve(PendingLink::ManyToMany {
                owner: name.clone(),
                index,
            })?;
        }

        if let Some(waiting) = self.pending.remove(&name) {
            for link in waiting {
                self.resolve(link)?;
            }
        }
        Ok(())
    }

    /// Looks up a model by name.
    pub fn get(&self, name: &str) -> MacaronResult<&ModelDef> {
        self.models
            .get(name)
            .ok_or_else(|| MacaronError::ImproperlyConfigured(format!("Unknown model '{name}'")))
    }

    /// Returns `true` if a model with this name is registered.
    pub fn contains(&self, name: &str) -> bool {
        self.models.contains_key(name)
    }

    /// Registered models in registration order.
    pub fn models(&self) -> impl Iterator<Item = &ModelDef> {
        self.order.iter().filter_map(|name| self.models.get(name))
    }

    /// References still waiting for their target, as `(owner, missing)` pairs.
    pub fn unresolved(&self) -> Vec<(String, String)> {
        let mut pairs: Vec<(String, String)> = self
            .pending
            .iter()
            .flat_map(|(missing, links)| {
                links
                    .iter()
                    .map(move |l| (l.owner().to_string(), missing.clone()))
            })
            .collect();
        pairs.sort();
        pairs
    }

    /// Fails if any reference is still unresolved.
    pub fn check(&self) -> MacaronResult<()> {
        let unresolved = self.unresolved();
        if unresolved.is_empty() {
            return Ok(());
        }
        let names: Vec<String> = unresolved
            .iter()
            .map(|(owner, missing)| format!("{owner} -> {missing}"))
            .collect();
        Err(MacaronError::ImproperlyConfigured(format!(
            "Unresolved model references: {}",
            names.join(", ")
        )))
    }

    /// The link model behind `model`'s many-to-many relation `relation`.
    pub fn link_model(&self, model: &str, relation: &str) -> MacaronResult<&ModelDef> {
        let rel = self.get(model)?.relation(relation).ok_or_else(|| {
            MacaronError::ImproperlyConfigured(format!("{model} has no relation '{relation}'"))
        })?;
        let link = rel.link.as_ref().ok_or_else(|| {
            MacaronError::ImproperlyConfigured(format!(
                "{model}.{relation} is not a many-to-many relation"
            ))
        })?;
        self.get(&link.model)
    }

    fn defer(&mut self, missing: &str, link: PendingLink) {
        tracing::debug!(owner = link.owner(), missing, "deferring relation");
        self.pending
            .entry(missing.to_string())
            .or_default()
            .push(link);
    }

    fn resolve(&mut self, link: PendingLink) -> MacaronResult<()> {
        let missing = match &link {
            PendingLink::ManyToOne { owner, index } => {
                let target = &self.get(owner)?.many_to_one[*index].target;
                (!self.contains(target)).then(|| target.clone())
            }
            PendingLink::ManyToMany { owner, index } => {
                let rel = &self.get(owner)?.many_to_many[*index];
                std::iter::once(&rel.target)
                    .chain(rel.through.as_ref())
                    .find(|name| !self.contains(name))
                    .cloned()
            }
        };
        if let Some(missing) = missing {
            self.defer(&missing, link);
            return Ok(());
        }
        match link {
            PendingLink::ManyToOne { owner, index } => self.link_many_to_one(&owner, index),
            PendingLink::ManyToMany { owner, index } => self.link_many_to_many(&owner, index),
        }
    }

    fn model_mut(&mut self, name: &str) -> MacaronResult<&mut ModelDef> {
        self.models
            .get_mut(name)
            .ok_or_else(|| MacaronError::ImproperlyConfigured(format!("Unknown model '{name}'")))
    }

    fn link_many_to_one(&mut self, owner: &str, index: usize) -> MacaronResult<()> {
        let rel = self.get(owner)?.many_to_one[index].clone();
        let target = self.get(&rel.target)?;
        let ref_key = rel
            .ref_key
            .clone()
            .unwrap_or_else(|| target.pk().column.clone());
        let ref_field = target.field(&ref_key).ok_or_else(|| {
            MacaronError::ImproperlyConfigured(format!(
                "{owner}.{}: {} has no column '{ref_key}'",
                rel.name, rel.target
            ))
        })?;
        let key_kind = if ref_field.kind.is_integer() {
            FieldKind::Integer
        } else {
            ref_field.kind.clone()
        };
        let target_table = target.table.clone();
        let related_name = rel
            .related_name
            .clone()
            .unwrap_or_else(|| format!("{}_set", owner.to_lowercase()));

        let owner_def = self.model_mut(owner)?;
        if let Some(field) = owner_def.fields.iter_mut().find(|f| f.column == rel.column) {
            field.kind = key_kind;
        }
        let owner_table = owner_def.table.clone();
        owner_def.add_relation(Relation {
            name: rel.name.clone(),
            kind: RelationKind::ManyToOne,
            target: rel.target.clone(),
            target_table,
            local_column: rel.column.clone(),
            remote_column: ref_key.clone(),
            link: None,
            counterpart: related_name.clone(),
        })?;

        self.model_mut(&rel.target)?.add_relation(Relation {
            name: related_name,
            kind: RelationKind::OneToMany,
            target: owner.to_string(),
            target_table: owner_table,
            local_column: ref_key,
            remote_column: rel.column,
            link: None,
            counterpart: rel.name,
        })
    }

    fn link_many_to_many(&mut self, owner: &str, index: usize) -> MacaronResult<()> {
        let rel = self.get(owner)?.many_to_many[index].clone();
        let owner_def = self.get(owner)?;
        let owner_table = owner_def.table.clone();
        let owner_pk = owner_def.pk().column.clone();
        let target_def = self.get(&rel.target)?;
        let target_table = target_def.table.clone();
        let target_pk = target_def.pk().column.clone();

        let link_name = match &rel.through {
            Some(through) => through.clone(),
            None => {
                let link_name = format!("{owner}{}Link", rel.target);
                let link_def = self.generated_link(&link_name, owner, &owner_table, &rel.target, &target_table)?;
                self.register(link_def)?;
                link_name
            }
        };

        let link_def = self.get(&link_name)?;
        let mut keys = link_def.many_to_one.iter();
        let source = keys.by_ref().find(|m| m.target == owner).ok_or_else(|| {
            MacaronError::ImproperlyConfigured(format!(
                "Link model {link_name} has no relation to {owner}"
            ))
        })?;
        let destination = keys.find(|m| m.target == rel.target).ok_or_else(|| {
            MacaronError::ImproperlyConfigured(format!(
                "Link model {link_name} has no relation to {}",
                rel.target
            ))
        })?;
        let link = Link {
            model: link_name.clone(),
            table: link_def.table.clone(),
            source_column: source.column.clone(),
            target_column: destination.column.clone(),
        };

        let related_name = rel
            .related_name
            .clone()
            .unwrap_or_else(|| format!("{}_set", owner.to_lowercase()));

        self.model_mut(owner)?.add_relation(Relation {
            name: rel.name.clone(),
            kind: RelationKind::ManyToMany,
            target: rel.target.clone(),
            target_table,
            local_column: owner_pk.clone(),
            remote_column: target_pk.clone(),
            link: Some(link.clone()),
            counterpart: related_name.clone(),
        })?;

        self.model_mut(&rel.target)?.add_relation(Relation {
            name: related_name,
            kind: RelationKind::ManyToMany,
            target: owner.to_string(),
            target_table: owner_table,
            local_column: target_pk,
            remote_column: owner_pk,
            link: Some(Link {
                model: link.model,
                table: link.table,
                source_column: link.target_column,
                target_column: link.source_column,
            }),
            counterpart: rel.name,
        })
    }

    fn generated_link(
        &self,
        link_name: &str,
        owner: &str,
        owner_table: &str,
        target: &str,
        target_table: &str,
    ) -> MacaronResult<ModelDef> {
        let link_lower = link_name.to_lowercase();
        let (source, destination) = if owner == target {
            (format!("from_{owner_table}"), format!("to_{target_table}"))
        } else {
            (owner_table.to_string(), target_table.to_string())
        };
        let key = |name: &str, model: &str| {
            ManyToOne::new(name, model)
                .on_delete(ReferentialAction::Cascade)
                .on_update(ReferentialAction::Cascade)
                .related_name(format!("{link_lower}_{name}_set"))
        };
        ModelDef::builder(link_name)
            .many_to_one(key(&source, owner))
            .many_to_one(key(&destination, target))
            .build()
    }
}
