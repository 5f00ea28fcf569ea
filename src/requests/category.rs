use crate::requests::catalog::REQUEST_TABLE_PREFIX;

/// One exam category, each backed by its own request table and document root.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Category {
    Admissional,
    Periodic,
    Dismissal,
    ReturnToWork,
    MedicalEvaluation,
    RiskChange,
}

const ADMISSIONAL_REQUIRED_COLUMNS: &[&str] = &[
    "protocolo",
    "cnpj",
    "unidade",
    "empresa",
    "centro_custo",
    "codigo_rh",
    "data_preferencia",
    "local_agendar",
    "funcionario",
    "rg",
    "cpf",
    "nascimento",
    "admissao",
    "funcao",
    "setor",
];

impl Category {
    pub const ALL: [Category; 6] = [
        Category::Admissional,
        Category::Periodic,
        Category::Dismissal,
        Category::ReturnToWork,
        Category::MedicalEvaluation,
        Category::RiskChange,
    ];

    pub fn table_name(self) -> &'static str {
        match self {
            Category::Admissional => "requests_admissional",
            Category::Periodic => "requests_periodic",
            Category::Dismissal => "requests_dismissal",
            Category::ReturnToWork => "requests_return_to_work",
            Category::MedicalEvaluation => "requests_medical_evaluation",
            Category::RiskChange => "requests_risk_change",
        }
    }

    pub fn from_table(table: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.table_name() == table)
    }

    /// URL token used by the attachment download route.
    pub fn slug(self) -> &'static str {
        match self {
            Category::Admissional => "admissional",
            Category::Periodic => "periodic",
            Category::Dismissal => "dismissal",
            Category::ReturnToWork => "return-to-work",
            Category::MedicalEvaluation => "medical-evaluation",
            Category::RiskChange => "risk-change",
        }
    }

    pub fn from_slug(slug: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.slug() == slug)
    }

    pub fn label(self) -> &'static str {
        match self {
            Category::Admissional => "Admissional",
            Category::Periodic => "Periódico",
            Category::Dismissal => "Demissional",
            Category::ReturnToWork => "Retorno ao Trabalho",
            Category::MedicalEvaluation => "Avaliação Médica",
            Category::RiskChange => "Mudança de Riscos",
        }
    }

    pub fn default_dir_name(self) -> &'static str {
        match self {
            Category::Admissional => "Documentos_Admissional",
            Category::Periodic => "Documentos_Periodico",
            Category::Dismissal => "Documentos_Demissional",
            Category::ReturnToWork => "Documentos_Retorno",
            Category::MedicalEvaluation => "Documentos_Avaliacao",
            Category::RiskChange => "Documentos_Mudanca",
        }
    }

    pub fn env_suffix(self) -> &'static str {
        match self {
            Category::Admissional => "ADMISSIONAL",
            Category::Periodic => "PERIODIC",
            Category::Dismissal => "DISMISSAL",
            Category::ReturnToWork => "RETURN_TO_WORK",
            Category::MedicalEvaluation => "MEDICAL_EVALUATION",
            Category::RiskChange => "RISK_CHANGE",
        }
    }

    /// Stored name of the virtual document backed by the row's own binary column.
    pub fn blob_sentinel(self) -> Option<&'static str> {
        match self {
            Category::MedicalEvaluation => Some("__evaluation_db__"),
            Category::ReturnToWork => Some("__return_db__"),
            _ => None,
        }
    }

    /// Columns a table must carry in full before its rows are shown at all.
    pub fn required_columns(self) -> &'static [&'static str] {
        match self {
            Category::Admissional => ADMISSIONAL_REQUIRED_COLUMNS,
            _ => &[],
        }
    }
}

/// Display label for a request table: the registered category label, or a humanized form of
/// the table name for categories that are not registered yet.
pub fn table_label(table: &str) -> String {
    match Category::from_table(table) {
        Some(category) => category.label().to_string(),
        None => humanize_table_name(table),
    }
}

pub fn humanize_table_name(table: &str) -> String {
    let stripped = table.strip_prefix(REQUEST_TABLE_PREFIX).unwrap_or(table);
    stripped
        .split('_')
        .filter(|word| !word.is_empty())
        .map(title_case)
        .collect::<Vec<_>>()
        .join(" ")
}

fn title_case(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first
            .to_uppercase()
            .chain(chars.flat_map(char::to_lowercase))
            .collect(),
        None => String::new(),
    }
}
