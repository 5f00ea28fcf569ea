use std::collections::HashSet;

use crate::db::ColumnInfo;

/// Column set of one table as it exists right now, in declaration order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ColumnSet {
    names: Vec<String>,
    lookup: HashSet<String>,
}

impl ColumnSet {
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let names: Vec<String> = names.into_iter().map(Into::into).collect();
        let lookup = names.iter().cloned().collect();
        Self { names, lookup }
    }

    pub fn from_info(columns: Vec<ColumnInfo>) -> Self {
        Self::new(columns.into_iter().map(|c| c.name))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.lookup.contains(name)
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

/// First candidate present in `columns`, in priority order.
pub fn resolve<'a>(columns: &ColumnSet, candidates: &[&'a str]) -> Option<&'a str> {
    candidates.iter().copied().find(|c| columns.contains(c))
}

pub fn table_has_all(columns: &ColumnSet, required: &[&str]) -> bool {
    required.iter().all(|c| columns.contains(c))
}

/// Semantic fields whose physical column name varies between tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnRole {
    Protocol,
    Status,
    CreatedAt,
    OwnerCpf,
    OwnerLogin,
    ExamType,
    ConsultantResponse,
}

pub const CONSULTANT_RESPONSE_COLUMN: &str = "resposta_consultor";

impl ColumnRole {
    pub fn candidates(self) -> &'static [&'static str] {
        match self {
            ColumnRole::Protocol => &["protocolo", "protocol", "codigo", "id_protocolo"],
            ColumnRole::Status => &["status_final", "status", "situacao"],
            ColumnRole::CreatedAt => &[
                "criado_em",
                "created_at",
                "data_criacao",
                "data",
                "timestamp",
            ],
            ColumnRole::OwnerCpf => &["cpf", "cpf_cliente"],
            ColumnRole::OwnerLogin => &["user", "usuario", "login"],
            ColumnRole::ExamType => &["tipo_exame"],
            // newer field with a single canonical name
            ColumnRole::ConsultantResponse => &[CONSULTANT_RESPONSE_COLUMN],
        }
    }

    pub fn resolve(self, columns: &ColumnSet) -> Option<&'static str> {
        resolve(columns, self.candidates())
    }
}

/// Roles resolved for one table. Built only when the mandatory protocol column exists.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedColumns {
    pub protocol: &'static str,
    pub status: Option<&'static str>,
    pub created_at: Option<&'static str>,
    pub owner_cpf: Option<&'static str>,
    pub owner_login: Option<&'static str>,
    pub exam_type: Option<&'static str>,
    pub consultant_response: Option<&'static str>,
}

impl ResolvedColumns {
    pub fn resolve(columns: &ColumnSet) -> Option<Self> {
        Some(Self {
            protocol: ColumnRole::Protocol.resolve(columns)?,
            status: ColumnRole::Status.resolve(columns),
            created_at: ColumnRole::CreatedAt.resolve(columns),
            owner_cpf: ColumnRole::OwnerCpf.resolve(columns),
            owner_login: ColumnRole::OwnerLogin.resolve(columns),
            exam_type: ColumnRole::ExamType.resolve(columns),
            consultant_response: ColumnRole::ConsultantResponse.resolve(columns),
        })
    }
}
