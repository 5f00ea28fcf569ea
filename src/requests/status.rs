use std::fmt;
use std::str::FromStr;

/// Closed set of workflow states accepted when writing. Reads pass stored text through as-is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestStatus {
    Open,
    InProgress,
    Finalized,
    Rejected,
}

impl RequestStatus {
    pub const ALL: [RequestStatus; 4] = [
        RequestStatus::Open,
        RequestStatus::InProgress,
        RequestStatus::Finalized,
        RequestStatus::Rejected,
    ];

    pub fn label(self) -> &'static str {
        match self {
            RequestStatus::Open => "Em Aberto",
            RequestStatus::InProgress => "Em Andamento",
            RequestStatus::Finalized => "Finalizado",
            RequestStatus::Rejected => "Não Aprovado",
        }
    }

    pub fn labels() -> Vec<&'static str> {
        Self::ALL.iter().map(|s| s.label()).collect()
    }
}

impl fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for RequestStatus {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let trimmed = value.trim();
        Self::ALL
            .into_iter()
            .find(|status| status.label() == trimmed)
            .ok_or_else(|| trimmed.to_string())
    }
}

fn fold_accent(ch: char) -> char {
    match ch {
        'á' | 'à' | 'â' | 'ã' | 'ä' => 'a',
        'Á' | 'À' | 'Â' | 'Ã' | 'Ä' => 'A',
        'é' | 'è' | 'ê' | 'ë' => 'e',
        'É' | 'È' | 'Ê' | 'Ë' => 'E',
        'í' | 'ì' | 'î' | 'ï' => 'i',
        'Í' | 'Ì' | 'Î' | 'Ï' => 'I',
        'ó' | 'ò' | 'ô' | 'õ' | 'ö' => 'o',
        'Ó' | 'Ò' | 'Ô' | 'Õ' | 'Ö' => 'O',
        'ú' | 'ù' | 'û' | 'ü' => 'u',
        'Ú' | 'Ù' | 'Û' | 'Ü' => 'U',
        'ç' => 'c',
        'Ç' => 'C',
        other => other,
    }
}

/// URL/CSS-safe token for a display status: lowercase, accents folded, spaces as hyphens.
pub fn status_slug(display: &str) -> String {
    display
        .trim()
        .to_lowercase()
        .chars()
        .map(fold_accent)
        .map(|ch| if ch == ' ' { '-' } else { ch })
        .collect()
}
