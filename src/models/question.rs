use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Sub-partition of a domain's question set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Section {
    A,
    B,
}

impl Section {
    pub const ALL: [Section; 2] = [Section::A, Section::B];

    pub fn as_str(&self) -> &'static str {
        match self {
            Section::A => "A",
            Section::B => "B",
        }
    }
}

impl fmt::Display for Section {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Section {
    type Err = crate::error::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "A" | "a" => Ok(Section::A),
            "B" | "b" => Ok(Section::B),
            other => Err(crate::error::Error::BadRequest(format!(
                "Unknown section '{}'",
                other
            ))),
        }
    }
}

/// Read-only directory entry for a domain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Domain {
    pub id: Uuid,
    pub name: String,
}

/// Read-only directory entry for a question. Only the fields the exam flow needs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Question {
    pub id: Uuid,
    pub domain_id: Uuid,
    pub section: Section,
    pub title: String,
    pub description: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn section_parses_and_displays() {
        assert_eq!("B".parse::<Section>().unwrap(), Section::B);
        assert_eq!(" a ".parse::<Section>().unwrap(), Section::A);
        assert!("C".parse::<Section>().is_err());
        assert_eq!(Section::A.to_string(), "A");
        assert_eq!(serde_json::to_value(Section::B).unwrap(), serde_json::json!("B"));
    }
}
