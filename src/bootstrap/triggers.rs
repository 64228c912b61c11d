use std::collections::HashMap;
use std::sync::Arc;

use log::warn;

use crate::core::{FieldMap, OrmError, Result};
use crate::methods::Signature;
use crate::models::{ComputeTrigger, Model};

type Triggers = HashMap<(String, String), Vec<ComputeTrigger>>;

/// Compute methods must exist and take no argument and return a field map.
pub(super) fn check_compute_methods(models: &HashMap<String, Arc<Model>>) -> Result<()> {
    let expected = Signature::of::<(), FieldMap>();
    for model in models.values() {
        if model.is_mixin() {
            continue;
        }
        for field in model.fields().iter() {
            let Some(method) = field.compute() else {
                continue;
            };
            let found = model.method(method)?.signature();
            if *found != expected {
                return Err(OrmError::SignatureMismatch {
                    model: model.name().to_string(),
                    method: method.to_string(),
                    expected: expected.to_string(),
                    found: found.to_string(),
                });
            }
        }
    }
    Ok(())
}

fn add(triggers: &mut Triggers, key: (String, String), trigger: ComputeTrigger) {
    let entry = triggers.entry(key).or_default();
    if !entry.contains(&trigger) {
        entry.push(trigger);
    }
}

/// For every stored computed field and every dependency path `A.B.C`, map
/// each traversed `(model, field)` to the computed field, with the path
/// leading back from the computed model to the changed records.
pub(super) fn build(models: &HashMap<String, Arc<Model>>) -> Result<Triggers> {
    let mut triggers = Triggers::new();
    for model in models.values() {
        if model.is_mixin() {
            continue;
        }
        for field in model.fields().iter().filter(|f| f.is_stored_computed()) {
            if field.depends().is_empty() {
                warn!(
                    "Stored computed field {}.{} has no dependencies and is only computed on create",
                    model.name(),
                    field.name()
                );
            }
            for depend in field.depends() {
                let mut current = Arc::clone(model);
                let mut prefix: Vec<&str> = Vec::new();
                for segment in depend.split('.') {
                    let step = Arc::clone(current.field(segment)?);
                    let path = (!prefix.is_empty()).then(|| prefix.join("."));
                    add(
                        &mut triggers,
                        (current.name().to_string(), step.name().to_string()),
                        ComputeTrigger {
                            model: model.name().to_string(),
                            field: field.name().to_string(),
                            path,
                        },
                    );
                    prefix.push(segment);
                    let Some(target) = step.target() else {
                        break;
                    };
                    let next = models
                        .get(target)
                        .ok_or_else(|| OrmError::ModelNotFound(target.to_string()))?;
                    // Moving a record between parents changes both parents.
                    if let Some(reverse) = step.reverse() {
                        add(
                            &mut triggers,
                            (next.name().to_string(), reverse.to_string()),
                            ComputeTrigger {
                                model: model.name().to_string(),
                                field: field.name().to_string(),
                                path: Some(prefix.join(".")),
                            },
                        );
                    }
                    current = Arc::clone(next);
                }
            }
        }
    }
    Ok(triggers)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{FieldSpec, ModelKind, RegistryBuilder};
    use crate::records::RecordCollection;

    #[test]
    fn test_triggers_follow_dependency_paths() {
        let mut builder = RegistryBuilder::new();
        builder
            .declare_model("Order", ModelKind::Regular)
            .unwrap()
            .fields([
                FieldSpec::one2many("Lines", "Line", "Order"),
                FieldSpec::float("Total")
                    .compute("compute_total")
                    .stored()
                    .depends(&["Lines.Amount"]),
            ])
            .unwrap()
            .method("compute_total", |_rs: &RecordCollection, _: ()| Ok(FieldMap::new()))
            .unwrap();
        builder
            .declare_model("Line", ModelKind::Regular)
            .unwrap()
            .fields([FieldSpec::many2one("Order", "Order"), FieldSpec::float("Amount")])
            .unwrap();

        let registry = builder.bootstrap_offline().unwrap();
        let own = registry.triggers("Order", "Lines");
        assert_eq!(own.len(), 1);
        assert_eq!(own[0].path, None);

        let amount = registry.triggers("Line", "Amount");
        assert_eq!(amount[0].model, "Order");
        assert_eq!(amount[0].path.as_deref(), Some("Lines"));

        let moved = registry.triggers("Line", "Order");
        assert_eq!(moved[0].path.as_deref(), Some("Lines"));
    }

    #[test]
    fn test_compute_signature_is_checked() {
        let mut builder = RegistryBuilder::new();
        builder
            .declare_model("User", ModelKind::Regular)
            .unwrap()
            .fields([FieldSpec::integer("Age").compute("compute_age")])
            .unwrap()
            .method("compute_age", |_rs: &RecordCollection, _: ()| Ok(3i64))
            .unwrap();
        assert!(matches!(
            builder.bootstrap_offline(),
            Err(OrmError::SignatureMismatch { .. })
        ));
    }
}
