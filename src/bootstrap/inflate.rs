use std::collections::BTreeMap;

use log::debug;

use crate::core::{OrmError, Result};
use crate::methods::MethodDecl;
use crate::models::builder::check_signature;
use crate::models::{Field, FieldType, ID_FIELD, ModelDecl, ModelKind, RelationTable};

const MAX_RELATED_DEPTH: usize = 16;

/// Every relation must point to a declared, queryable model.
pub(super) fn link_relations(decls: &BTreeMap<String, ModelDecl>) -> Result<()> {
    for decl in decls.values() {
        for field in decl.fields.iter() {
            if !field.field_type().is_relation() {
                continue;
            }
            let target = field.target().unwrap_or_default();
            let known = decls.get(target).is_some_and(|t| t.kind != ModelKind::Mixin);
            if !known {
                return Err(OrmError::UnknownRelationTarget {
                    model: decl.name.clone(),
                    field: field.name().to_string(),
                    target: target.to_string(),
                });
            }
        }
    }
    Ok(())
}

/// Copy mixin fields into each concrete model and thread mixin layers
/// beneath the model's own layers, in chain order.
pub(super) fn inflate_mixins(
    decls: &mut BTreeMap<String, ModelDecl>,
    chains: &BTreeMap<String, Vec<String>>,
) -> Result<()> {
    for (name, chain) in chains {
        let mixins: Vec<ModelDecl> = chain
            .iter()
            .filter_map(|mixin| decls.get(mixin).cloned())
            .collect();
        let decl = decls
            .get_mut(name)
            .ok_or_else(|| OrmError::ModelNotFound(name.clone()))?;

        // The mixin closest to the model wins among mixins.
        for mixin in mixins.iter().rev() {
            for field in mixin.fields.iter() {
                if decl.fields.get(field.name()).is_some_and(|f| f.name() == field.name()) {
                    continue;
                }
                let mut field = (**field).clone();
                field.model = decl.name.clone();
                decl.fields.insert(field);
            }
        }

        let mut method_names: Vec<String> = mixins
            .iter()
            .flat_map(|m| m.methods.keys().cloned())
            .collect();
        method_names.extend(decl.methods.keys().cloned());
        method_names.sort();
        method_names.dedup();

        for method in method_names {
            let mut composed: Option<MethodDecl> = None;
            let sources = mixins
                .iter()
                .filter_map(|m| m.methods.get(&method))
                .chain(decl.methods.get(&method));
            for source in sources {
                match &mut composed {
                    None => composed = Some(source.clone()),
                    Some(stack) => {
                        check_signature(&decl.name, &method, &stack.signature, &source.signature)?;
                        stack.layers.extend(source.layers.iter().cloned());
                    }
                }
            }
            if let Some(stack) = composed {
                debug!(
                    "{}.{}: {} layer(s)",
                    decl.name,
                    method,
                    stack.layers.len()
                );
                decl.methods.insert(method, stack);
            }
        }
    }
    Ok(())
}

/// Default link table of a many2many field between `own` and `target`.
fn relation_table(own: &str, target: &str) -> RelationTable {
    let mut tables = [own, target];
    tables.sort_unstable();
    let table = format!("{}_{}_rel", tables[0], tables[1]);
    if own == target {
        return RelationTable {
            table,
            own_column: format!("{}_id1", own),
            target_column: format!("{}_id2", own),
        };
    }
    RelationTable {
        table,
        own_column: format!("{}_id", own),
        target_column: format!("{}_id", target),
    }
}

pub(super) fn assign_relation_tables(decls: &mut BTreeMap<String, ModelDecl>) -> Result<()> {
    let tables: BTreeMap<String, String> = decls
        .iter()
        .map(|(name, decl)| (name.clone(), decl.table.clone()))
        .collect();
    for decl in decls.values_mut() {
        if decl.kind == ModelKind::Mixin {
            continue;
        }
        let pending: Vec<(String, String)> = decl
            .fields
            .iter()
            .filter(|f| f.field_type() == FieldType::Many2Many && f.relation().is_none())
            .map(|f| (f.name().to_string(), f.target().unwrap_or_default().to_string()))
            .collect();
        for (field, target) in pending {
            let target_table = tables
                .get(&target)
                .ok_or_else(|| OrmError::ModelNotFound(target.clone()))?;
            let relation = relation_table(&decl.table, target_table);
            decl.fields.update(&field, |f| f.relation = Some(relation));
        }
    }
    Ok(())
}

/// Reverse relations must name a foreign key of the target pointing back.
pub(super) fn check_reverse_fields(decls: &BTreeMap<String, ModelDecl>) -> Result<()> {
    for decl in decls.values() {
        if decl.kind == ModelKind::Mixin {
            continue;
        }
        for field in decl.fields.iter() {
            if !field.field_type().is_reverse() {
                continue;
            }
            let target = decls
                .get(field.target().unwrap_or_default())
                .ok_or_else(|| OrmError::ModelNotFound(field.target().unwrap_or_default().to_string()))?;
            let reverse = field.reverse().unwrap_or_default();
            let valid = target.fields.get(reverse).is_some_and(|r| {
                r.field_type().is_fk() && r.target() == Some(decl.name.as_str())
            });
            if !valid {
                return Err(OrmError::InvalidDeclaration(format!(
                    "Reverse field '{}.{}' of '{}.{}' must be a foreign key to '{}'",
                    target.name,
                    reverse,
                    decl.name,
                    field.name(),
                    decl.name
                )));
            }
        }
    }
    Ok(())
}

/// Shadow the fields of embedded models with related fields.
pub(super) fn inflate_embeddings(decls: &mut BTreeMap<String, ModelDecl>) -> Result<()> {
    let names: Vec<String> = decls.keys().cloned().collect();
    for name in names {
        let embeds: Vec<(String, String)> = match decls.get(&name) {
            Some(decl) if decl.kind != ModelKind::Mixin => decl
                .fields
                .iter()
                .filter(|f| f.is_embed() && f.field_type().is_fk())
                .map(|f| (f.name().to_string(), f.target().unwrap_or_default().to_string()))
                .collect(),
            _ => continue,
        };
        for (embed, target) in embeds {
            let shadows: Vec<(String, FieldType)> = decls
                .get(&target)
                .ok_or_else(|| OrmError::ModelNotFound(target.clone()))?
                .fields
                .iter()
                .filter(|f| f.name() != ID_FIELD)
                .map(|f| (f.name().to_string(), f.field_type()))
                .collect();
            let decl = decls
                .get_mut(&name)
                .ok_or_else(|| OrmError::ModelNotFound(name.clone()))?;
            for (field_name, field_type) in shadows {
                if decl.fields.get(&field_name).is_some_and(|f| f.name() == field_name) {
                    continue;
                }
                let mut field = Field::new(&field_name, field_type);
                field.model = decl.name.clone();
                field.related = Some(format!("{}.{}", embed, field_name));
                decl.fields.insert(field);
            }
        }
    }
    Ok(())
}

/// Field at the end of `path` on `model`, with related fields along the way
/// already resolved to their own targets.
fn resolve_related(
    decls: &BTreeMap<String, ModelDecl>,
    model: &str,
    path: &str,
    depth: usize,
) -> Result<Field> {
    if depth > MAX_RELATED_DEPTH {
        return Err(OrmError::InvalidDeclaration(format!(
            "Related path '{}' on '{}' is too deep or cyclic",
            path, model
        )));
    }
    let (head, rest) = match path.split_once('.') {
        Some((head, rest)) => (head, Some(rest)),
        None => (path, None),
    };
    let decl = decls
        .get(model)
        .ok_or_else(|| OrmError::ModelNotFound(model.to_string()))?;
    let field = decl
        .fields
        .get(head)
        .ok_or_else(|| OrmError::FieldNotFound(head.to_string(), model.to_string()))?;

    // A related segment stands for the field at the end of its own path.
    let field = match field.related() {
        Some(inner) => resolve_related(decls, model, inner, depth + 1)?,
        None => (**field).clone(),
    };
    match rest {
        None => Ok(field),
        Some(rest) => {
            let target = field.target().ok_or_else(|| {
                OrmError::InvalidDeclaration(format!(
                    "Field '{}.{}' in related path '{}' is not a relation",
                    model, head, path
                ))
            })?;
            resolve_related(decls, target, rest, depth + 1)
        }
    }
}

/// Give every related field the metadata of the field it aliases.
pub(super) fn sync_related_fields(decls: &mut BTreeMap<String, ModelDecl>) -> Result<()> {
    let mut updates: Vec<(String, String, Field)> = Vec::new();
    for decl in decls.values() {
        if decl.kind == ModelKind::Mixin {
            continue;
        }
        for field in decl.fields.iter() {
            if let Some(path) = field.related() {
                let target = resolve_related(decls, &decl.name, path, 0)?;
                updates.push((decl.name.clone(), field.name().to_string(), target));
            }
        }
    }
    for (model, name, target) in updates {
        let Some(decl) = decls.get_mut(&model) else {
            continue;
        };
        decl.fields.update(&name, |field| {
            field.field_type = target.field_type;
            field.target = target.target.clone();
            field.reverse = target.reverse.clone();
            field.relation = target.relation.clone();
            field.selection = target.selection.clone();
            field.size = target.size;
            field.no_copy = true;
            if field.stored && field.depends.is_empty() {
                field.depends = field.related.iter().cloned().collect();
            }
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_relation_table_names() {
        let rel = relation_table("user", "tag");
        assert_eq!(rel.table, "tag_user_rel");
        assert_eq!(rel.own_column, "user_id");
        assert_eq!(rel.target_column, "tag_id");

        let own = relation_table("partner", "partner");
        assert_eq!(own.table, "partner_partner_rel");
        assert_eq!(own.own_column, "partner_id1");
        assert_eq!(own.target_column, "partner_id2");
    }
}
