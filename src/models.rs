use diesel::prelude::*;
use serde::Serialize;

use crate::schema::*;

#[derive(Debug, Clone, PartialEq, Eq, Queryable, Selectable)]
#[diesel(table_name = request_documents)]
pub struct SideDocument {
    pub filename: Option<String>,
    pub stored_name: Option<String>,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = request_documents)]
pub struct NewSideDocument {
    pub protocol: String,
    pub filename: Option<String>,
    pub stored_name: String,
}

/// A document attached to one request. `stored_name` is either a file name under the
/// protocol directory, a side-table entry, or a blob sentinel such as `__evaluation_db__`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Document {
    pub filename: String,
    pub stored_name: String,
}

impl Document {
    pub fn new(filename: impl Into<String>, stored_name: impl Into<String>) -> Self {
        Self {
            filename: filename.into(),
            stored_name: stored_name.into(),
        }
    }

    /// Case-insensitive match against either the display or the stored name.
    pub fn matches(&self, name: &str) -> bool {
        let wanted = name.trim().to_lowercase();
        if wanted.is_empty() {
            return false;
        }
        self.stored_name.trim().to_lowercase() == wanted
            || self.filename.trim().to_lowercase() == wanted
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RequestDetails {
    pub phone: Option<String>,
    pub cpf: Option<String>,
    pub rg: Option<String>,
    pub company: Option<String>,
    pub location: Option<String>,
    pub employee: Option<String>,
    pub preferred_date: Option<String>,
    pub professional: Option<String>,

    pub cnpj: Option<String>,
    pub unit: Option<String>,
    pub cost_center: Option<String>,
    pub hr_code: Option<String>,
    pub birth_date: Option<String>,
    pub admission_date: Option<String>,
    pub job_function: Option<String>,
    pub department: Option<String>,

    pub justification_kind: Option<String>,
    pub justification_text: Option<String>,
    pub attachment_name: Option<String>,
    pub has_attachment_blob: bool,

    pub previous_unit: Option<String>,
    pub previous_department: Option<String>,
    pub previous_position: Option<String>,
    pub current_unit: Option<String>,
    pub current_department: Option<String>,
    pub current_position: Option<String>,
}

/// Uniform view of one row from any request table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RequestRecord {
    pub protocol: String,
    pub status: String,
    pub status_slug: String,
    pub exam_type: String,
    pub origin: String,
    pub owner_cpf: Option<String>,
    pub owner_login: Option<String>,
    pub consultant_response: Option<String>,
    pub documents: Vec<Document>,
    #[serde(flatten)]
    pub details: RequestDetails,
}
