use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::db::RequestStore;
use crate::models::Document;
use crate::requests::catalog::SchemaCatalog;
use crate::requests::error::{RequestError, RequestResult};
use crate::requests::safety::{is_allowed_document, is_listable_document, is_safe_name, join_within};
use crate::requests::Category;
use crate::storage::DocumentStorage;

/// Configured document roots: one shared uploads directory plus one root per category.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentRoots {
    pub uploads: PathBuf,
    pub categories: Vec<(Category, PathBuf)>,
}

impl DocumentRoots {
    /// Default layout: every category root lives under `base` with its conventional name.
    pub fn under(uploads: impl Into<PathBuf>, base: impl AsRef<Path>) -> Self {
        let base = base.as_ref();
        Self {
            uploads: uploads.into(),
            categories: Category::ALL
                .into_iter()
                .map(|category| (category, base.join(category.default_dir_name())))
                .collect(),
        }
    }

    pub fn root_for(&self, category: Category) -> Option<&Path> {
        self.categories
            .iter()
            .find(|(c, _)| *c == category)
            .map(|(_, path)| path.as_path())
    }

    /// Every configured root in search order, duplicates removed.
    pub fn all(&self) -> Vec<&Path> {
        let mut out: Vec<&Path> = Vec::with_capacity(self.categories.len() + 1);
        let ordered = std::iter::once(self.uploads.as_path())
            .chain(self.categories.iter().map(|(_, path)| path.as_path()));
        for root in ordered {
            if !out.contains(&root) {
                out.push(root);
            }
        }
        out
    }
}

/// Appends `doc` unless an entry already matches its stored or display name.
pub(crate) fn push_unique(documents: &mut Vec<Document>, doc: Document) -> bool {
    let duplicate = documents
        .iter()
        .any(|existing| existing.matches(&doc.stored_name) || existing.matches(&doc.filename));
    if duplicate {
        return false;
    }
    documents.push(doc);
    true
}

pub struct DocumentLocator<'a> {
    store: &'a dyn RequestStore,
    files: &'a dyn DocumentStorage,
    roots: &'a DocumentRoots,
}

impl<'a> DocumentLocator<'a> {
    pub fn new(
        store: &'a dyn RequestStore,
        files: &'a dyn DocumentStorage,
        roots: &'a DocumentRoots,
    ) -> Self {
        Self {
            store,
            files,
            roots,
        }
    }

    /// Configured roots that exist on disk, uploads first.
    pub fn candidate_roots(&self) -> Vec<PathBuf> {
        self.roots
            .all()
            .into_iter()
            .filter(|root| self.files.is_dir(root))
            .map(Path::to_path_buf)
            .collect()
    }

    /// Documents attached to `protocol`. The side table, when present, replaces directory
    /// scanning entirely. Unusable protocols yield an empty list.
    pub fn list_documents(&self, protocol: &str) -> RequestResult<Vec<Document>> {
        if !is_safe_name(protocol) {
            return Ok(Vec::new());
        }

        if SchemaCatalog::new(self.store).has_side_documents()? {
            return self.list_side_documents(protocol);
        }

        Ok(self.scan_directories(protocol))
    }

    fn list_side_documents(&self, protocol: &str) -> RequestResult<Vec<Document>> {
        let mut documents = Vec::new();
        for row in self.store.side_documents(protocol)? {
            let stored = row.stored_name.as_deref().unwrap_or_default().trim();
            if !is_listable_document(stored) {
                continue;
            }
            let filename = row
                .filename
                .as_deref()
                .map(str::trim)
                .filter(|name| !name.is_empty())
                .unwrap_or(stored);
            push_unique(&mut documents, Document::new(filename, stored));
        }
        Ok(documents)
    }

    fn scan_directories(&self, protocol: &str) -> Vec<Document> {
        let mut documents = Vec::new();
        for root in self.candidate_roots() {
            let Ok(dir) = join_within(&root, &[protocol]) else {
                continue;
            };
            if !self.files.is_dir(&dir) {
                continue;
            }

            let names = match self.files.list_files(&dir) {
                Ok(names) => names,
                Err(err) => {
                    warn!(protocol, dir = %dir.display(), error = %err, "skipping unreadable document directory");
                    continue;
                }
            };

            for name in names {
                if is_listable_document(&name) {
                    push_unique(&mut documents, Document::new(name.clone(), name));
                }
            }
        }
        documents
    }

    /// Directory holding `<protocol>/<stored_name>` in the first root that has it.
    pub fn resolve_single(&self, protocol: &str, stored_name: &str) -> RequestResult<Option<PathBuf>> {
        if !is_safe_name(protocol) {
            return Err(RequestError::InvalidProtocol);
        }
        if !is_safe_name(stored_name) {
            return Err(RequestError::InvalidFilename);
        }
        if !is_allowed_document(stored_name) {
            debug!(protocol, stored_name, "extension outside the document allowlist");
            return Ok(None);
        }

        for root in self.candidate_roots() {
            let dir = join_within(&root, &[protocol])?;
            let file = join_within(&dir, &[stored_name])?;
            if self.files.is_file(&file) {
                return Ok(Some(dir));
            }
        }
        Ok(None)
    }

    /// First existing `<root>/<protocol>` directory across all roots.
    pub fn existing_protocol_dir(&self, protocol: &str) -> RequestResult<Option<PathBuf>> {
        if !is_safe_name(protocol) {
            return Err(RequestError::InvalidProtocol);
        }
        for root in self.candidate_roots() {
            let dir = join_within(&root, &[protocol])?;
            if self.files.is_dir(&dir) {
                return Ok(Some(dir));
            }
        }
        Ok(None)
    }

    /// Root new files for `table` are created under: its category root, else the uploads root.
    pub fn creation_root(&self, table: &str) -> &Path {
        Category::from_table(table)
            .and_then(|category| self.roots.root_for(category))
            .unwrap_or(self.roots.uploads.as_path())
    }
}
