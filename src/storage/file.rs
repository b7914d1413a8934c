//! # File Repository
//!
//! One file per collection, `<directory>/<kind>s.<ext>`, holding every record
//! of the entity (soft-deleted ones included). Each mutation rewrites the whole
//! collection through a temporary file that is then renamed over the original.
//! A missing file reads as an empty collection.

use crate::domain::{Entity, ListParams};
use crate::errors::{KeystashError, Result};
use crate::storage::query;
use crate::storage::repository::{
    ensure_unique, merge_update, next_id_of, now, stamp_new, Repository,
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::instrument;

/// On-disk format of a collection file
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Encoding {
    #[default]
    Json,
    /// bincode
    Binary,
    Csv,
    Xml,
}

impl Encoding {
    pub fn as_str(&self) -> &'static str {
        match self {
            Encoding::Json => "json",
            Encoding::Binary => "binary",
            Encoding::Csv => "csv",
            Encoding::Xml => "xml",
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            Encoding::Json => "json",
            Encoding::Binary => "bin",
            Encoding::Csv => "csv",
            Encoding::Xml => "xml",
        }
    }

    pub fn encode<E: Entity>(&self, records: &[E]) -> Result<Vec<u8>> {
        let context = || format!("Failed to encode {} collection as {}", E::KIND, self.as_str());
        match self {
            Encoding::Json => serde_json::to_vec_pretty(records)
                .map_err(|e| KeystashError::serialization_with_source(context(), e)),
            Encoding::Binary => bincode::serialize(records)
                .map_err(|e| KeystashError::serialization_with_source(context(), e)),
            Encoding::Csv => {
                let mut writer = csv::Writer::from_writer(Vec::new());
                for record in records {
                    writer
                        .serialize(record)
                        .map_err(|e| KeystashError::serialization_with_source(context(), e))?;
                }
                writer.into_inner().map_err(|e| {
                    KeystashError::serialization_with_source(context(), e.into_error())
                })
            }
            Encoding::Xml => {
                let item = records
                    .iter()
                    .map(xml_item)
                    .collect::<serde_json::Result<Vec<_>>>()
                    .map_err(|e| KeystashError::serialization_with_source(context(), e))?;
                quick_xml::se::to_string(&XmlCollection { item })
                    .map(String::into_bytes)
                    .map_err(|e| KeystashError::serialization_with_source(context(), e))
            }
        }
    }

    pub fn decode<E: Entity>(&self, bytes: &[u8]) -> Result<Vec<E>> {
        let context = || format!("Failed to decode {} collection as {}", E::KIND, self.as_str());
        if bytes.is_empty() {
            return Ok(Vec::new());
        }
        match self {
            Encoding::Json => serde_json::from_slice(bytes)
                .map_err(|e| KeystashError::serialization_with_source(context(), e)),
            Encoding::Binary => bincode::deserialize(bytes)
                .map_err(|e| KeystashError::serialization_with_source(context(), e)),
            Encoding::Csv => csv::Reader::from_reader(bytes)
                .deserialize()
                .collect::<std::result::Result<Vec<E>, _>>()
                .map_err(|e| KeystashError::serialization_with_source(context(), e)),
            Encoding::Xml => {
                let text = std::str::from_utf8(bytes)
                    .map_err(|e| KeystashError::serialization_with_source(context(), e))?;
                quick_xml::de::from_str::<XmlCollection<E>>(text)
                    .map(|collection| collection.item)
                    .map_err(|e| KeystashError::serialization_with_source(context(), e))
            }
        }
    }
}

impl FromStr for Encoding {
    type Err = KeystashError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(Encoding::Json),
            "binary" | "bin" | "bincode" => Ok(Encoding::Binary),
            "csv" => Ok(Encoding::Csv),
            "xml" => Ok(Encoding::Xml),
            other => Err(KeystashError::not_implemented(format!("file encoding '{}'", other))),
        }
    }
}

impl std::fmt::Display for Encoding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Serialize, Deserialize)]
#[serde(rename = "collection")]
struct XmlCollection<E> {
    #[serde(default = "Vec::new")]
    item: Vec<E>,
}

/// Record fields for one `<item>` element. quick-xml writes `None` as an empty
/// element, which reads back as an empty string; an absent element reads back
/// as `None`, so unset fields are left out.
fn xml_item<E: Serialize>(record: &E) -> serde_json::Result<serde_json::Value> {
    let mut value = serde_json::to_value(record)?;
    if let serde_json::Value::Object(fields) = &mut value {
        fields.retain(|_, field| !field.is_null());
    }
    Ok(value)
}

/// Repository storing one entity type in a single collection file
pub struct FileRepository<E> {
    path: PathBuf,
    encoding: Encoding,
    // Serializes read-modify-write cycles on the collection file
    write_lock: Arc<Mutex<()>>,
    _entity: PhantomData<fn() -> E>,
}

impl<E> Clone for FileRepository<E> {
    fn clone(&self) -> Self {
        Self {
            path: self.path.clone(),
            encoding: self.encoding,
            write_lock: Arc::clone(&self.write_lock),
            _entity: PhantomData,
        }
    }
}

impl<E> std::fmt::Debug for FileRepository<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileRepository")
            .field("path", &self.path)
            .field("encoding", &self.encoding)
            .finish()
    }
}

impl<E: Entity> FileRepository<E> {
    /// Repository for `<directory>/<kind>s.<ext>`; creates the directory
    pub fn new(directory: impl AsRef<Path>, encoding: Encoding) -> Result<Self> {
        let directory = directory.as_ref();
        std::fs::create_dir_all(directory).map_err(|e| KeystashError::Io {
            source: e,
            context: format!("Failed to create directory {}", directory.display()),
        })?;

        let path = directory.join(format!("{}s.{}", E::KIND, encoding.extension()));
        Ok(Self { path, encoding, write_lock: Arc::new(Mutex::new(())), _entity: PhantomData })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn encoding(&self) -> Encoding {
        self.encoding
    }

    async fn read_all(&self) -> Result<Vec<E>> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) => self.encoding.decode(&bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(KeystashError::backend(E::KIND, "*", "read", e)),
        }
    }

    async fn write_all(&self, records: &[E], id: i64, action: &str) -> Result<()> {
        let bytes = self.encoding.encode(records)?;
        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        tokio::fs::write(&tmp, &bytes).await.map_err(|e| {
            tracing::error!(error = %e, path = %tmp.display(), "Failed to write collection file");
            KeystashError::backend(E::KIND, id, action, e)
        })?;
        tokio::fs::rename(&tmp, &self.path).await.map_err(|e| {
            tracing::error!(
                error = %e,
                path = %self.path.display(),
                "Failed to replace collection file"
            );
            KeystashError::backend(E::KIND, id, action, e)
        })?;
        Ok(())
    }
}

#[async_trait]
impl<E: Entity> Repository<E> for FileRepository<E> {
    fn backend(&self) -> &'static str {
        "file"
    }

    async fn next_id(&self) -> Result<i64> {
        next_id_of(&self.read_all().await?)
    }

    #[instrument(
        skip(self),
        fields(entity = E::KIND, path = %self.path.display()),
        name = "file_load"
    )]
    async fn load(&self) -> Result<Vec<E>> {
        self.read_all().await
    }

    #[instrument(skip(self, params), fields(entity = E::KIND), name = "file_get")]
    async fn get(&self, params: &ListParams) -> Result<Vec<E>> {
        query::apply(self.read_all().await?, params)
    }

    #[instrument(skip(self, params), fields(entity = E::KIND), name = "file_count")]
    async fn count(&self, params: &ListParams) -> Result<u64> {
        query::count(&self.read_all().await?, params)
    }

    #[instrument(
        skip(self, record),
        fields(entity = E::KIND, record_name = %record.name()),
        name = "file_create"
    )]
    async fn create(&self, mut record: E) -> Result<E> {
        let _guard = self.write_lock.lock().await;
        let mut records = self.read_all().await?;
        ensure_unique(&records, &record, true)?;
        stamp_new(&mut record, next_id_of(&records)?);
        records.push(record.clone());

        self.write_all(&records, record.id(), "create").await?;
        tracing::info!(entity = E::KIND, id = record.id(), "Created record in collection file");
        Ok(record)
    }

    #[instrument(
        skip(self, record),
        fields(entity = E::KIND, id = record.id()),
        name = "file_update"
    )]
    async fn update(&self, record: E) -> Result<E> {
        let _guard = self.write_lock.lock().await;
        let mut records = self.read_all().await?;
        let index = records
            .iter()
            .position(|r| r.id() == record.id() && !r.is_deleted())
            .ok_or_else(|| KeystashError::not_found(E::KIND, record.id()))?;
        let updated = merge_update(&records[index], record);
        ensure_unique(&records, &updated, false)?;
        records[index] = updated.clone();
        self.write_all(&records, updated.id(), "update").await?;
        Ok(updated)
    }

    #[instrument(skip(self), fields(entity = E::KIND), name = "file_delete")]
    async fn delete(&self, id: i64, force: bool) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let mut records = self.read_all().await?;
        let index = records
            .iter()
            .position(|r| r.id() == id && (force || !r.is_deleted()))
            .ok_or_else(|| KeystashError::not_found(E::KIND, id))?;

        if force {
            records.remove(index);
        } else {
            let stamp = now();
            records[index].set_deleted_at(Some(stamp));
            records[index].set_updated_at(stamp);
        }

        self.write_all(&records, id, "delete").await?;
        tracing::info!(entity = E::KIND, id, force, "Deleted record in collection file");
        Ok(())
    }
}
