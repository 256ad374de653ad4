use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use kvdoc_types::names::{validate_bucket_name, validate_class_name, validate_field_name};
use kvdoc_types::unique_bucket_name;
use tracing::{debug, info};

use crate::class::ClassDefinition;
use crate::error::{SchemaError, SchemaResult};
use crate::property::{Property, Target};
use crate::schema::{ClassSchema, UniqueField};

/// Collects class definitions until every class is known, then links them.
///
/// Linking happens in [`build`](Self::build), so classes may reference each
/// other in any declaration order.
#[derive(Debug, Default)]
pub struct RegistryBuilder {
    definitions: Vec<ClassDefinition>,
}

/// An inverse collection to synthesize on `target` and its descendants.
struct InverseRequest {
    target: String,
    collection: String,
    source_class: String,
    source_field: String,
}

impl RegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a definition. Fails if a class of that name was already declared.
    pub fn declare(mut self, definition: ClassDefinition) -> SchemaResult<Self> {
        if self.definitions.iter().any(|d| d.name == definition.name) {
            return Err(SchemaError::DuplicateClass(definition.name));
        }
        self.definitions.push(definition);
        Ok(self)
    }

    /// Link every declared class into a [`SchemaRegistry`].
    pub fn build(self) -> SchemaResult<SchemaRegistry> {
        let definitions: HashMap<&str, &ClassDefinition> = self
            .definitions
            .iter()
            .map(|d| (d.name.as_str(), d))
            .collect();

        for def in &self.definitions {
            check_names(def)?;
        }

        let mut chains: HashMap<&str, Vec<&ClassDefinition>> = HashMap::new();
        for def in &self.definitions {
            chains.insert(def.name.as_str(), ancestry(def, &definitions)?);
        }

        let concrete: Vec<&ClassDefinition> =
            self.definitions.iter().filter(|d| !d.is_abstract()).collect();

        let mut schemas: BTreeMap<String, ClassSchema> = BTreeMap::new();
        let mut inverses = Vec::new();
        for def in &concrete {
            let chain = chains.get(def.name.as_str()).map_or(&[][..], Vec::as_slice);
            let (schema, requests) = link_class(def, chain, &definitions)?;
            inverses.extend(requests);
            schemas.insert(def.name.clone(), schema);
        }

        // concrete class -> itself followed by its concrete descendants
        let mut lineages: HashMap<String, Vec<String>> = HashMap::new();
        for def in &concrete {
            let descendants = concrete
                .iter()
                .filter(|other| other.name != def.name)
                .filter(|other| {
                    chains
                        .get(other.name.as_str())
                        .is_some_and(|chain| chain.iter().any(|a| a.name == def.name))
                })
                .map(|other| other.name.clone());
            let lineage = std::iter::once(def.name.clone()).chain(descendants).collect();
            lineages.insert(def.name.clone(), lineage);
        }

        for request in inverses {
            let targets = lineages.get(&request.target).cloned().unwrap_or_default();
            for class in targets {
                let Some(schema) = schemas.get_mut(&class) else {
                    continue;
                };
                if schema.fields.contains_key(&request.collection) {
                    return Err(SchemaError::CollectionConflict {
                        class,
                        collection: request.collection,
                        source_class: request.source_class,
                        source_field: request.source_field,
                    });
                }
                debug!(
                    class = %class,
                    collection = %request.collection,
                    source = %format!("{}.{}", request.source_class, request.source_field),
                    "synthesized inverse collection"
                );
                schema.fields.insert(
                    request.collection.clone(),
                    Property::inverse(&request.source_class, &request.source_field),
                );
                schema.order.push(request.collection.clone());
                schema.inverse_refs.push(request.collection.clone());
            }
        }

        let mut buckets: HashMap<String, String> = HashMap::new();
        for def in &concrete {
            for bucket in &def.buckets {
                match buckets.get(bucket) {
                    Some(existing) if existing != &def.name => {
                        return Err(SchemaError::DuplicateBucket {
                            bucket: bucket.clone(),
                            existing: existing.clone(),
                            class: def.name.clone(),
                        });
                    }
                    Some(_) => {}
                    None => {
                        buckets.insert(bucket.clone(), def.name.clone());
                    }
                }
            }
        }

        let order: Vec<String> = concrete.iter().map(|d| d.name.clone()).collect();
        let classes: HashMap<String, Arc<ClassSchema>> = schemas
            .into_iter()
            .map(|(name, schema)| (name, Arc::new(schema)))
            .collect();

        info!(
            classes = classes.len(),
            abstract_classes = self.definitions.len() - classes.len(),
            buckets = buckets.len(),
            "schema registry built"
        );

        Ok(SchemaRegistry {
            classes,
            order,
            buckets,
            lineages,
        })
    }
}

fn check_names(def: &ClassDefinition) -> SchemaResult<()> {
    validate_class_name(&def.name)?;
    for bucket in &def.buckets {
        validate_bucket_name(bucket)?;
    }
    let mut seen = HashSet::new();
    for (field, _) in &def.properties {
        validate_field_name(field)?;
        if !seen.insert(field.as_str()) {
            return Err(SchemaError::DuplicateField {
                class: def.name.clone(),
                field: field.clone(),
            });
        }
    }
    Ok(())
}

/// The inheritance chain of `def`, root first, ending with `def` itself.
fn ancestry<'a>(
    def: &'a ClassDefinition,
    definitions: &HashMap<&str, &'a ClassDefinition>,
) -> SchemaResult<Vec<&'a ClassDefinition>> {
    let mut chain = vec![def];
    let mut seen = HashSet::from([def.name.as_str()]);
    let mut current = def;
    while let Some(parent) = &current.parent {
        let Some(next) = definitions.get(parent.as_str()).copied() else {
            return Err(SchemaError::UnknownParent {
                class: current.name.clone(),
                parent: parent.clone(),
            });
        };
        if !seen.insert(next.name.as_str()) {
            return Err(SchemaError::InheritanceCycle(def.name.clone()));
        }
        chain.push(next);
        current = next;
    }
    chain.reverse();
    Ok(chain)
}

/// Merge the chain's fields into one schema and validate its references.
fn link_class(
    def: &ClassDefinition,
    chain: &[&ClassDefinition],
    definitions: &HashMap<&str, &ClassDefinition>,
) -> SchemaResult<(ClassSchema, Vec<InverseRequest>)> {
    let mut fields: BTreeMap<String, Property> = BTreeMap::new();
    // field -> the definition whose declaration won
    let mut origin: HashMap<String, &ClassDefinition> = HashMap::new();
    let mut order: Vec<String> = Vec::new();

    for &ancestor in chain {
        for (field, property) in &ancestor.properties {
            let mut property = property.clone();
            if let Some(relation) = property.relation_mut() {
                if relation.target == Target::SelfClass {
                    relation.target = Target::Class(def.name.clone());
                }
            }
            if fields.insert(field.clone(), property).is_none() {
                order.push(field.clone());
            }
            origin.insert(field.clone(), ancestor);
        }
    }

    let default_bucket = def.buckets.first().map_or("", String::as_str);
    let mut unique_fields = Vec::new();
    let mut forward_refs = Vec::new();
    let mut requests = Vec::new();

    for field in &order {
        let Some(property) = fields.get(field) else {
            continue;
        };
        if property.is_unique() {
            if property.is_reference() {
                return Err(SchemaError::UniqueReference {
                    class: def.name.clone(),
                    field: field.clone(),
                });
            }
            let owner_bucket = origin
                .get(field)
                .map_or(default_bucket, |o| unique_owner_bucket(chain, o, default_bucket));
            unique_fields.push(UniqueField {
                field: field.clone(),
                bucket: unique_bucket_name(owner_bucket, field),
            });
        }

        let Some(target) = property.reference_class() else {
            continue;
        };
        match definitions.get(target) {
            None => {
                return Err(invalid_reference(def, field, target, "unknown class"));
            }
            Some(target_def) if target_def.is_abstract() => {
                return Err(invalid_reference(def, field, target, "class has no bucket"));
            }
            Some(_) => {}
        }
        forward_refs.push(field.clone());

        let declared_here = origin
            .get(field)
            .is_some_and(|o| o.name == def.name || o.is_abstract());
        if let (Some(collection), true) = (property.collection(), declared_here) {
            requests.push(InverseRequest {
                target: target.to_string(),
                collection: collection.to_string(),
                source_class: def.name.clone(),
                source_field: field.clone(),
            });
        }
    }

    let schema = ClassSchema {
        name: def.name.clone(),
        buckets: def.buckets.clone(),
        parent: def.parent.clone(),
        fields,
        order,
        unique_fields,
        forward_refs,
        inverse_refs: Vec::new(),
    };
    Ok((schema, requests))
}

/// Default bucket of the class whose declaration of a unique field won.
/// Descendants share its index, so an inherited unique value stays unique
/// across the whole subtree. An abstract declaring class defers to the
/// first concrete class below it in `chain`.
fn unique_owner_bucket<'a>(
    chain: &[&'a ClassDefinition],
    origin: &ClassDefinition,
    fallback: &'a str,
) -> &'a str {
    let start = chain
        .iter()
        .position(|c| c.name == origin.name)
        .unwrap_or(0);
    chain[start..]
        .iter()
        .find_map(|c| c.buckets.first())
        .map_or(fallback, String::as_str)
}

fn invalid_reference(def: &ClassDefinition, field: &str, target: &str, reason: &str) -> SchemaError {
    SchemaError::InvalidReference {
        class: def.name.clone(),
        field: field.to_string(),
        target: target.to_string(),
        reason: reason.to_string(),
    }
}

/// Linked schemas of every concrete class, plus the bucket table.
///
/// Owned by a session; there is no process-global registry.
#[derive(Debug)]
pub struct SchemaRegistry {
    classes: HashMap<String, Arc<ClassSchema>>,
    order: Vec<String>,
    buckets: HashMap<String, String>,
    lineages: HashMap<String, Vec<String>>,
}

impl SchemaRegistry {
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::new()
    }

    /// Look up a concrete class.
    pub fn class(&self, name: &str) -> SchemaResult<&Arc<ClassSchema>> {
        self.classes
            .get(name)
            .ok_or_else(|| SchemaError::UnknownClass(name.to_string()))
    }

    pub fn get(&self, name: &str) -> Option<&Arc<ClassSchema>> {
        self.classes.get(name)
    }

    /// The class owning `bucket`.
    pub fn class_for_bucket(&self, bucket: &str) -> Option<&Arc<ClassSchema>> {
        self.buckets.get(bucket).and_then(|name| self.classes.get(name))
    }

    /// `name` followed by its concrete descendants, in declaration order.
    ///
    /// A stored reference names only a key, so a document referenced through
    /// a field targeting `name` may belong to any class of its lineage.
    pub fn lineage(&self, name: &str) -> Vec<&Arc<ClassSchema>> {
        self.lineages
            .get(name)
            .map(|names| names.iter().filter_map(|n| self.classes.get(n)).collect())
            .unwrap_or_default()
    }

    pub fn is_descendant_or_self(&self, class: &str, ancestor: &str) -> bool {
        self.lineages
            .get(ancestor)
            .is_some_and(|names| names.iter().any(|n| n == class))
    }

    /// Concrete classes in declaration order.
    pub fn classes(&self) -> impl Iterator<Item = &Arc<ClassSchema>> + '_ {
        self.order.iter().filter_map(|name| self.classes.get(name))
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }
}
