use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde_json::Value;

use crate::db::{decode_bytea, RawRow};
use crate::models::{Document, RequestDetails, RequestRecord};
use crate::requests::catalog::TableShape;
use crate::requests::category::table_label;
use crate::requests::columns::resolve;
use crate::requests::error::RequestResult;
use crate::requests::locator::DocumentLocator;
use crate::requests::status::status_slug;

pub const BLOB_FILENAME_COLUMN: &str = "nome_arquivo";
pub const BLOB_PAYLOAD_COLUMN: &str = "arquivo";

const PHONE: &[&str] = &["telefone", "whatsapp", "celular"];
const CPF: &[&str] = &["cpf", "cpf_cliente"];
const LOCATION: &[&str] = &["local_agendar", "local", "endereco"];
const EMPLOYEE: &[&str] = &["funcionario", "colaborador"];
const PREFERRED_DATE: &[&str] = &["data_preferencia", "data", "data_agenda", "data_sugerida"];
const PROFESSIONAL: &[&str] = &["profissional", "medico", "consultor", "responsavel"];

/// A normalized record plus the key it is ordered by before the key is dropped.
#[derive(Debug, Clone)]
pub struct NormalizedRow {
    pub record: RequestRecord,
    pub sort_key: i64,
}

/// Display text of a stored value. NULL becomes `None`.
pub fn value_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(text) => Some(text.clone()),
        other => Some(other.to_string()),
    }
}

fn trimmed_text(value: Option<&Value>) -> String {
    value
        .and_then(value_text)
        .map(|text| text.trim().to_string())
        .unwrap_or_default()
}

/// True when a binary column carries at least one byte.
pub fn has_payload(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => false,
        Some(value @ Value::String(text)) => {
            decode_bytea(value).map_or(!text.is_empty(), |bytes| !bytes.is_empty())
        }
        Some(value) => decode_bytea(value).is_some_and(|bytes| !bytes.is_empty()),
    }
}

/// Seconds since the epoch for a date-only (`YYYY-MM-DD`) value, an ISO timestamp with or
/// without an offset, or a number already in seconds. Anything else yields `None`.
pub fn parse_timestamp(value: &Value) -> Option<i64> {
    match value {
        Value::Number(number) => number
            .as_i64()
            .or_else(|| number.as_f64().map(|secs| secs as i64)),
        Value::String(text) => {
            let text = text.trim();
            if text.is_empty() {
                return None;
            }
            if text.len() == 10 {
                let date = NaiveDate::parse_from_str(text, "%Y-%m-%d").ok()?;
                return Some(date.and_hms_opt(0, 0, 0)?.and_utc().timestamp());
            }
            if let Ok(parsed) = DateTime::parse_from_rfc3339(text) {
                return Some(parsed.timestamp());
            }
            ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M"]
                .iter()
                .find_map(|format| NaiveDateTime::parse_from_str(text, format).ok())
                .map(|parsed| parsed.and_utc().timestamp())
                .or_else(|| {
                    DateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S%.f%#z")
                        .ok()
                        .map(|parsed| parsed.timestamp())
                })
        }
        _ => None,
    }
}

/// Maps raw rows of any request table into [`RequestRecord`]s.
pub struct RowNormalizer<'a> {
    locator: &'a DocumentLocator<'a>,
}

impl<'a> RowNormalizer<'a> {
    pub fn new(locator: &'a DocumentLocator<'a>) -> Self {
        Self { locator }
    }

    pub fn normalize(&self, shape: &TableShape, row: &RawRow) -> RequestResult<NormalizedRow> {
        let resolved = &shape.resolved;
        let protocol = trimmed_text(row.get(resolved.protocol));
        let status = trimmed_text(resolved.status.and_then(|column| row.get(column)));

        let explicit_type = trimmed_text(resolved.exam_type.and_then(|column| row.get(column)));
        let exam_type = if explicit_type.is_empty() {
            table_label(&shape.name)
        } else {
            explicit_type
        };

        let field = |candidates: &[&str]| -> Option<String> {
            resolve(&shape.columns, candidates)
                .and_then(|column| row.get(column))
                .and_then(value_text)
        };

        let mut documents = if protocol.is_empty() {
            Vec::new()
        } else {
            self.locator.list_documents(&protocol)?
        };

        let attachment_name = field(&[BLOB_FILENAME_COLUMN]);
        let has_attachment_blob = shape.columns.contains(BLOB_PAYLOAD_COLUMN)
            && has_payload(row.get(BLOB_PAYLOAD_COLUMN));
        if let Some(sentinel) = shape.category.and_then(|c| c.blob_sentinel()) {
            let name = attachment_name.as_deref().map(str::trim).unwrap_or_default();
            if has_attachment_blob && !name.is_empty() {
                merge_blob_document(&mut documents, name, sentinel);
            }
        }

        let details = RequestDetails {
            phone: field(PHONE),
            cpf: field(CPF),
            rg: field(&["rg"]),
            company: field(&["empresa"]),
            location: field(LOCATION),
            employee: field(EMPLOYEE),
            preferred_date: field(PREFERRED_DATE),
            professional: field(PROFESSIONAL),
            cnpj: field(&["cnpj"]),
            unit: field(&["unidade"]),
            cost_center: field(&["centro_custo"]),
            hr_code: field(&["codigo_rh"]),
            birth_date: field(&["nascimento"]),
            admission_date: field(&["admissao"]),
            job_function: field(&["funcao"]),
            department: field(&["setor"]),
            justification_kind: field(&["forma_justificativa"]),
            justification_text: field(&["justificativa_texto"]),
            attachment_name,
            has_attachment_blob,
            previous_unit: field(&["unidade_anterior"]),
            previous_department: field(&["setor_anterior"]),
            previous_position: field(&["cargo_anterior"]),
            current_unit: field(&["unidade_atual"]),
            current_department: field(&["setor_atual"]),
            current_position: field(&["cargo_atual"]),
        };

        let sort_key = resolved
            .created_at
            .and_then(|column| row.get(column))
            .and_then(parse_timestamp)
            .unwrap_or(row.seq);

        let record = RequestRecord {
            status_slug: status_slug(&status),
            protocol,
            status,
            exam_type,
            origin: shape.name.clone(),
            owner_cpf: resolved
                .owner_cpf
                .and_then(|column| row.get(column))
                .and_then(value_text),
            owner_login: resolved
                .owner_login
                .and_then(|column| row.get(column))
                .and_then(value_text),
            consultant_response: resolved
                .consultant_response
                .and_then(|column| row.get(column))
                .and_then(value_text),
            documents,
            details,
        };

        Ok(NormalizedRow { record, sort_key })
    }
}

/// Puts the in-row attachment at the front unless a listed document already carries its name.
pub(crate) fn merge_blob_document(documents: &mut Vec<Document>, name: &str, sentinel: &str) {
    let present = documents
        .iter()
        .any(|doc| doc.matches(name) || doc.matches(sentinel));
    if !present {
        documents.insert(0, Document::new(name, sentinel));
    }
}
