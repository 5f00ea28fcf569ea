//! Aggregation of exam requests spread over per-category tables whose schemas drift over time,
//! plus resolution of the documents attached to each request.

pub mod aggregate;
pub mod catalog;
pub mod category;
pub mod cleanup;
pub mod columns;
pub mod error;
pub mod locator;
pub mod mutate;
pub mod normalize;
pub mod safety;
pub mod status;

pub use aggregate::{Aggregation, Attachment, RequestAggregator, Scope};
pub use catalog::SchemaCatalog;
pub use cleanup::{clear_category, ClearReport};
pub use category::Category;
pub use error::{RequestError, RequestResult};
pub use locator::{DocumentLocator, DocumentRoots};
pub use mutate::{RequestMutator, ResponseOutcome, UploadedFile};
pub use status::{status_slug, RequestStatus};

use crate::db::RequestStore;
use crate::storage::DocumentStorage;

/// Collaborators shared by every operation: the relational store, the filesystem and the
/// configured document roots.
#[derive(Clone, Copy)]
pub struct RequestContext<'a> {
    pub store: &'a dyn RequestStore,
    pub files: &'a dyn DocumentStorage,
    pub roots: &'a DocumentRoots,
}

impl<'a> RequestContext<'a> {
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

    pub fn aggregator(&'a self) -> RequestAggregator<'a> {
        RequestAggregator::new(self)
    }

    pub fn mutator(&'a self) -> RequestMutator<'a> {
        RequestMutator::new(self)
    }

    pub fn locator(&self) -> DocumentLocator<'a> {
        DocumentLocator::new(self.store, self.files, self.roots)
    }
}
