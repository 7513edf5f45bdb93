//! Content records that completed downloads point at.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

use crate::db::{Collection, Database, Record, StoreError};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentFile {
  pub url: String,
  #[serde(default)]
  pub local_path: Option<PathBuf>,
}

/// A course content item and its downloadable files.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Content {
  pub id: String,
  #[serde(default)]
  pub files: Vec<ContentFile>,
}

impl Record for Content {
  const COLLECTION: Collection = Collection::Contents;
}

/// Owner of content records. Downloads only ever set a file's local path.
pub trait ContentModel: Send + Sync {
  fn set_local_path(&self, content_id: &str, file_index: usize, path: &Path)
    -> Result<(), StoreError>;
}

/// Content records kept in the `contents` collection.
#[derive(Clone)]
pub struct StoredContents {
  db: Arc<Database>,
}

impl StoredContents {
  pub fn new(db: Arc<Database>) -> Self {
    Self { db }
  }

  pub fn get(&self, id: &str) -> Result<Option<Content>, StoreError> {
    self.db.get(id)
  }

  pub fn put(&self, content: &Content) -> Result<(), StoreError> {
    self.db.put(&content.id, content)
  }
}

impl ContentModel for StoredContents {
  fn set_local_path(
    &self,
    content_id: &str,
    file_index: usize,
    path: &Path,
  ) -> Result<(), StoreError> {
    let mut content = self.get(content_id)?.ok_or_else(|| StoreError::NotFound {
      collection: Collection::Contents.as_str(),
      id: content_id.to_string(),
    })?;

    // Files may be listed lazily; grow the list rather than lose the path.
    if content.files.len() <= file_index {
      content.files.resize_with(file_index + 1, ContentFile::default);
    }
    content.files[file_index].local_path = Some(path.to_path_buf());

    debug!(content_id, file_index, path = %path.display(), "Stored local path in content");
    self.put(&content)
  }
}
