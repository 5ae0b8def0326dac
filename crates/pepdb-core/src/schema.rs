//! Registered validation schemas that projects may point at.

use crate::error::{PepDbError, Result};
use crate::models::{SchemaRecord, SchemaVersionUpdate};
use crate::registry_path::{validate_identifier, SchemaRef};
use crate::store::{now_timestamp, schemas, PepStore};
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::{debug, info};

/// Schema operations over one store.
#[derive(Clone, Copy)]
pub struct SchemaService<'a> {
    store: &'a PepStore,
}

impl<'a> SchemaService<'a> {
    pub(crate) fn new(store: &'a PepStore) -> Self {
        Self { store }
    }

    /// Register one schema version.
    pub fn create(
        &self,
        namespace: &str,
        name: &str,
        version: &str,
        schema: Value,
        description: &str,
    ) -> Result<SchemaRef> {
        validate_identifier("namespace", namespace)?;
        validate_identifier("name", name)?;
        validate_identifier("version", version)?;
        if version == crate::config::PepConfig::LATEST_SCHEMA_VERSION {
            return Err(PepDbError::Validation {
                field: "version".to_string(),
                message: "'latest' is reserved".to_string(),
            });
        }

        let record = SchemaRecord {
            namespace: namespace.to_string(),
            name: name.to_string(),
            version: version.to_string(),
            schema,
            description: description.to_string(),
            last_update_date: now_timestamp(),
        };
        self.store.write(|tx| schemas::insert_schema(tx, &record))?;

        let schema_ref = SchemaRef {
            namespace: record.namespace,
            name: record.name,
            version: record.version,
        };
        info!("Registered schema {}", schema_ref);
        Ok(schema_ref)
    }

    /// Fetch a schema; `latest` resolves to the highest version.
    pub fn get(&self, schema: &SchemaRef) -> Result<SchemaRecord> {
        self.store.read(|tx| {
            let id = schemas::resolve_schema_id(tx, schema)?;
            schemas::load_schema(tx, id)?.ok_or_else(|| PepDbError::SchemaNotFound {
                schema: schema.to_string(),
            })
        })
    }

    pub fn get_by_path(&self, path: &str) -> Result<SchemaRecord> {
        self.get(&SchemaRef::parse(path)?)
    }

    /// Registered versions of `namespace/name`, lowest first.
    pub fn versions(&self, namespace: &str, name: &str) -> Result<Vec<String>> {
        self.store
            .read(|tx| schemas::list_versions(tx, namespace, name))
    }

    /// Change the document or description of a registered version.
    pub fn update(&self, schema: &SchemaRef, update: SchemaVersionUpdate) -> Result<SchemaRecord> {
        if update.is_empty() {
            return self.get(schema);
        }
        let record = self.store.write(|tx| {
            let id = schemas::resolve_schema_id(tx, schema)?;
            let mut record = schemas::load_schema(tx, id)?.ok_or_else(|| {
                PepDbError::SchemaNotFound {
                    schema: schema.to_string(),
                }
            })?;
            if let Some(value) = update.schema {
                record.schema = value;
            }
            if let Some(description) = update.description {
                record.description = description;
            }
            record.last_update_date = now_timestamp();
            schemas::save_schema(tx, id, &record)?;
            Ok(record)
        })?;
        info!(
            "Updated schema {}/{}:{}",
            record.namespace, record.name, record.version
        );
        Ok(record)
    }

    /// Tags of one schema version.
    pub fn tags(&self, schema: &SchemaRef) -> Result<BTreeMap<String, Option<String>>> {
        self.store.read(|tx| {
            let id = schemas::resolve_schema_id(tx, schema)?;
            schemas::list_tags(tx, id)
        })
    }

    /// Attach tags to a schema version. Either every tag is added or, if
    /// one of them already exists, none is.
    pub fn add_tags(&self, schema: &SchemaRef, tags: &BTreeMap<String, Option<String>>) -> Result<()> {
        if let Some(empty) = tags.keys().find(|name| name.trim().is_empty()) {
            return Err(PepDbError::Validation {
                field: "tag".to_string(),
                message: format!("tag name '{empty}' must not be empty"),
            });
        }
        self.store.write(|tx| {
            let id = schemas::resolve_schema_id(tx, schema)?;
            for (name, value) in tags {
                if !schemas::insert_tag(tx, id, name, value.as_deref())? {
                    return Err(PepDbError::SchemaTagAlreadyExists {
                        schema: schema.to_string(),
                        tag: name.clone(),
                    });
                }
            }
            Ok(())
        })?;
        debug!("Tagged schema {} with {} tags", schema, tags.len());
        Ok(())
    }

    pub fn remove_tag(&self, schema: &SchemaRef, tag: &str) -> Result<()> {
        self.store.write(|tx| {
            let id = schemas::resolve_schema_id(tx, schema)?;
            if schemas::delete_tag(tx, id, tag)? {
                Ok(())
            } else {
                Err(PepDbError::SchemaTagNotFound {
                    schema: schema.to_string(),
                    tag: tag.to_string(),
                })
            }
        })
    }

    /// Remove a schema version. Projects that used it keep existing without
    /// a schema pointer.
    pub fn delete(&self, schema: &SchemaRef) -> Result<()> {
        let detached = self.store.write(|tx| {
            let id = schemas::resolve_schema_id(tx, schema)?;
            schemas::delete_schema(tx, id)
        })?;
        info!("Deleted schema {} ({} projects detached)", schema, detached);
        Ok(())
    }
}
