//! One-time transition from declarations to the frozen registry.
//!
//! Steps run in order, each on the output of the previous one: relation
//! targets are checked, mixins are inflated into concrete models, embedded
//! models are shadowed, related fields take the metadata of their targets,
//! the database schema is synchronized and finally models are frozen and the
//! compute triggers are built.

mod inflate;
mod schema;
mod triggers;

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use log::info;

use crate::connection::Database;
use crate::core::Result;
use crate::methods::MethodStack;
use crate::models::{Model, ModelDecl, ModelKind, Registry, RegistryBuilder};

pub(crate) fn run(builder: RegistryBuilder, db: Option<&dyn Database>) -> Result<Registry> {
    let mut chains: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for (name, decl) in &builder.models {
        if decl.kind != ModelKind::Mixin {
            chains.insert(name.clone(), builder.mixin_chain(name)?);
        }
    }
    let mut decls = builder.models;

    info!("Bootstrap: linking relations of {} models", decls.len());
    inflate::link_relations(&decls)?;

    info!("Bootstrap: inflating mixins");
    inflate::inflate_mixins(&mut decls, &chains)?;
    inflate::assign_relation_tables(&mut decls)?;
    inflate::check_reverse_fields(&decls)?;

    info!("Bootstrap: inflating embedded models");
    inflate::inflate_embeddings(&mut decls)?;

    info!("Bootstrap: synchronizing related fields");
    inflate::sync_related_fields(&mut decls)?;

    match db {
        Some(db) => {
            info!("Bootstrap: synchronizing database schema");
            schema::sync(&decls, db)?;
        }
        None => info!("Bootstrap: no database, skipping schema synchronization"),
    }

    info!("Bootstrap: freezing models");
    let models = freeze(decls, &chains);

    info!("Bootstrap: building compute triggers");
    triggers::check_compute_methods(&models)?;
    let triggers = triggers::build(&models)?;

    Ok(Registry::new(models, triggers))
}

fn freeze(
    decls: BTreeMap<String, ModelDecl>,
    chains: &BTreeMap<String, Vec<String>>,
) -> HashMap<String, Arc<Model>> {
    decls
        .into_values()
        .map(|decl| {
            let methods = decl
                .methods
                .into_iter()
                .map(|(name, method)| {
                    let stack = MethodStack::compose(&name, method.signature, method.layers);
                    (name, stack)
                })
                .collect();
            let mixins = chains.get(&decl.name).cloned().unwrap_or(decl.mixins);
            let model = Model {
                name: decl.name.clone(),
                kind: decl.kind,
                table: decl.table,
                fields: decl.fields,
                methods,
                mixins,
                order: decl.order,
                parent_field: decl.parent_field,
            };
            (decl.name, Arc::new(model))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::{BASE_MIXIN, COMMON_MIXIN};
    use crate::core::OrmError;
    use crate::models::FieldSpec;
    use crate::records::RecordCollection;

    #[test]
    fn test_mixin_layers_sit_below_own_layers() {
        let mut builder = RegistryBuilder::new();
        builder
            .declare_mixin("A")
            .unwrap()
            .method("x", |_rs: &RecordCollection, _: ()| Ok("A".to_string()))
            .unwrap();
        builder
            .declare_mixin("B")
            .unwrap()
            .method("x", |_rs: &RecordCollection, _: ()| Ok("B".to_string()))
            .unwrap();
        builder
            .declare_model("M", ModelKind::Regular)
            .unwrap()
            .mixins(&["A", "B"])
            .unwrap()
            .extend("x", |_rs: &RecordCollection, _: ()| Ok("M".to_string()))
            .unwrap();

        let registry = builder.bootstrap_offline().unwrap();
        let model = registry.model("M").unwrap();
        assert_eq!(model.method("x").unwrap().origins(), vec!["M", "B", "A"]);
        assert_eq!(model.mixins(), &[COMMON_MIXIN, BASE_MIXIN, "A", "B"]);
        assert_eq!(
            model.method("create").unwrap().origins(),
            vec![COMMON_MIXIN]
        );
    }

    #[test]
    fn test_mixin_fields_are_copied_unless_shadowed() {
        let mut builder = RegistryBuilder::new();
        builder
            .declare_mixin("Named")
            .unwrap()
            .fields([FieldSpec::char("Name").size(10), FieldSpec::text("Notes")])
            .unwrap();
        builder
            .declare_model("Partner", ModelKind::Regular)
            .unwrap()
            .fields([FieldSpec::char("Name").size(64)])
            .unwrap()
            .mixins(&["Named"])
            .unwrap();

        let registry = builder.bootstrap_offline().unwrap();
        let partner = registry.model("Partner").unwrap();
        assert_eq!(partner.field("Name").unwrap().size(), Some(64));
        assert_eq!(partner.field("Notes").unwrap().model(), "Partner");
        assert!(partner.fields().contains("CreateDate"));
        assert!(registry.model("Named").unwrap().is_mixin());
    }

    #[test]
    fn test_unknown_relation_target() {
        let mut builder = RegistryBuilder::new();
        builder
            .declare_model("User", ModelKind::Regular)
            .unwrap()
            .fields([FieldSpec::many2one("Company", "Company")])
            .unwrap();
        assert!(matches!(
            builder.bootstrap_offline(),
            Err(OrmError::UnknownRelationTarget { .. })
        ));
    }

    #[test]
    fn test_manual_models_only_get_common_mixin() {
        let mut builder = RegistryBuilder::new();
        builder.declare_model("Legacy", ModelKind::Manual).unwrap();
        let registry = builder.bootstrap_offline().unwrap();
        let legacy = registry.model("Legacy").unwrap();
        assert!(legacy.has_method("create"));
        assert!(!legacy.fields().contains("CreateDate"));
    }
}
