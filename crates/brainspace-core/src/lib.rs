//! Core domain model for the brain.space VC partner directory.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const CRATE_NAME: &str = "brainspace-core";

/// Hosted table holding one row per investor.
pub const PARTNERS_TABLE: &str = "vc_partners";

/// The six free-text justifications attached to an investor's classification flags.
///
/// Serializes every column, absent values as `null`, so an update built from this
/// struct overwrites all six columns rather than patching a subset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ReasoningFields {
    pub partner_reasoning: Option<String>,
    pub series_reasoning: Option<String>,
    pub neurotech_reasoning: Option<String>,
    pub exits_reasoning: Option<String>,
    pub location_reasoning: Option<String>,
    pub role_reasoning: Option<String>,
}

impl ReasoningFields {
    /// Empty strings collapse to `None`; the hosted table stores those as null.
    pub fn normalized(self) -> Self {
        fn keep(value: Option<String>) -> Option<String> {
            value.filter(|v| !v.is_empty())
        }
        Self {
            partner_reasoning: keep(self.partner_reasoning),
            series_reasoning: keep(self.series_reasoning),
            neurotech_reasoning: keep(self.neurotech_reasoning),
            exits_reasoning: keep(self.exits_reasoning),
            location_reasoning: keep(self.location_reasoning),
            role_reasoning: keep(self.role_reasoning),
        }
    }

    /// Values in `execute_sql` parameter order: partner, series, neurotech, exits,
    /// location, role.
    pub fn ordered(&self) -> [Option<&str>; 6] {
        [
            self.partner_reasoning.as_deref(),
            self.series_reasoning.as_deref(),
            self.neurotech_reasoning.as_deref(),
            self.exits_reasoning.as_deref(),
            self.location_reasoning.as_deref(),
            self.role_reasoning.as_deref(),
        ]
    }

    pub fn is_empty(&self) -> bool {
        self.ordered().iter().all(Option::is_none)
    }
}

/// One element of the Record Source file.
///
/// Only `name` is required. Classification flags and profile columns may be present
/// in the file but are not synchronized, so they are ignored here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceRecord {
    pub name: String,
    #[serde(default)]
    pub company: Option<String>,
    #[serde(default)]
    pub partner_reasoning: Option<String>,
    #[serde(default)]
    pub series_reasoning: Option<String>,
    #[serde(default)]
    pub neurotech_reasoning: Option<String>,
    #[serde(default)]
    pub exits_reasoning: Option<String>,
    #[serde(default)]
    pub location_reasoning: Option<String>,
    #[serde(default)]
    pub role_reasoning: Option<String>,
}

impl SourceRecord {
    pub fn reasoning(&self) -> ReasoningFields {
        ReasoningFields {
            partner_reasoning: self.partner_reasoning.clone(),
            series_reasoning: self.series_reasoning.clone(),
            neurotech_reasoning: self.neurotech_reasoning.clone(),
            exits_reasoning: self.exits_reasoning.clone(),
            location_reasoning: self.location_reasoning.clone(),
            role_reasoning: self.role_reasoning.clone(),
        }
        .normalized()
    }

    pub fn company_or_unknown(&self) -> &str {
        self.company.as_deref().unwrap_or("unknown company")
    }
}

/// A `vc_partners` row as returned by the hosted store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvestorRecord {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub company: String,
    #[serde(default)]
    pub job_title: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub role_current: Option<String>,
    #[serde(default)]
    pub is_partner: bool,
    #[serde(default)]
    pub leads_series_a_b: bool,
    #[serde(default)]
    pub has_neurotech_investment: bool,
    #[serde(default)]
    pub based_na_eu_israel: bool,
    #[serde(default)]
    pub has_notable_exits: bool,
    #[serde(default)]
    pub partner_reasoning: Option<String>,
    #[serde(default)]
    pub series_reasoning: Option<String>,
    #[serde(default)]
    pub neurotech_reasoning: Option<String>,
    #[serde(default)]
    pub exits_reasoning: Option<String>,
    #[serde(default)]
    pub location_reasoning: Option<String>,
    #[serde(default)]
    pub role_reasoning: Option<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

impl InvestorRecord {
    pub fn reasoning(&self) -> ReasoningFields {
        ReasoningFields {
            partner_reasoning: self.partner_reasoning.clone(),
            series_reasoning: self.series_reasoning.clone(),
            neurotech_reasoning: self.neurotech_reasoning.clone(),
            exits_reasoning: self.exits_reasoning.clone(),
            location_reasoning: self.location_reasoning.clone(),
            role_reasoning: self.role_reasoning.clone(),
        }
    }
}

/// Browse category; each non-`All` variant selects on one classification flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    #[default]
    All,
    Neurotech,
    Exits,
    Series,
}

impl Category {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::All => "all",
            Self::Neurotech => "neurotech",
            Self::Exits => "exits",
            Self::Series => "series",
        }
    }

    pub fn admits(self, record: &InvestorRecord) -> bool {
        match self {
            Self::All => true,
            Self::Neurotech => record.has_neurotech_investment,
            Self::Exits => record.has_notable_exits,
            Self::Series => record.leads_series_a_b,
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "all" => Ok(Self::All),
            "neurotech" => Ok(Self::Neurotech),
            "exits" => Ok(Self::Exits),
            "series" => Ok(Self::Series),
            other => Err(format!(
                "unknown category `{other}` (expected all, neurotech, exits or series)"
            )),
        }
    }
}

/// Search + category filter over an already-fetched partner list.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PartnerFilter {
    pub search: String,
    pub category: Category,
}

impl PartnerFilter {
    pub fn new(search: impl Into<String>, category: Category) -> Self {
        Self {
            search: search.into(),
            category,
        }
    }

    /// Case-insensitive substring match on name or company, then the category flag.
    pub fn matches(&self, record: &InvestorRecord) -> bool {
        let needle = self.search.to_lowercase();
        let matches_search = record.name.to_lowercase().contains(&needle)
            || record.company.to_lowercase().contains(&needle);
        matches_search && self.category.admits(record)
    }

    pub fn apply<'a>(&self, records: &'a [InvestorRecord]) -> Vec<&'a InvestorRecord> {
        records.iter().filter(|r| self.matches(r)).collect()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PartnerStats {
    pub total: usize,
    pub neurotech: usize,
    pub exits: usize,
    pub series: usize,
}

impl PartnerStats {
    pub fn from_records(records: &[InvestorRecord]) -> Self {
        records.iter().fold(
            Self {
                total: records.len(),
                ..Self::default()
            },
            |mut acc, r| {
                acc.neurotech += usize::from(r.has_neurotech_investment);
                acc.exits += usize::from(r.has_notable_exits);
                acc.series += usize::from(r.leads_series_a_b);
                acc
            },
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn partner(name: &str, company: &str) -> InvestorRecord {
        InvestorRecord {
            id: 1,
            name: name.to_string(),
            company: company.to_string(),
            job_title: None,
            url: None,
            role_current: None,
            is_partner: true,
            leads_series_a_b: false,
            has_neurotech_investment: false,
            based_na_eu_israel: true,
            has_notable_exits: false,
            partner_reasoning: None,
            series_reasoning: None,
            neurotech_reasoning: None,
            exits_reasoning: None,
            location_reasoning: None,
            role_reasoning: None,
            created_at: None,
        }
    }

    #[test]
    fn empty_reasoning_strings_become_null() {
        let record: SourceRecord = serde_json::from_value(serde_json::json!({
            "name": "Jane Doe",
            "series_reasoning": "Led 3 Series A rounds",
            "exits_reasoning": "",
            "is_partner": true
        }))
        .expect("source record");

        let reasoning = record.reasoning();
        assert_eq!(reasoning.series_reasoning.as_deref(), Some("Led 3 Series A rounds"));
        assert_eq!(reasoning.exits_reasoning, None);
        assert_eq!(reasoning.partner_reasoning, None);
        assert!(!reasoning.is_empty());
    }

    #[test]
    fn reasoning_serializes_every_column() {
        let value = serde_json::to_value(ReasoningFields::default()).expect("serialize");
        let object = value.as_object().expect("object");
        assert_eq!(object.len(), 6);
        assert!(object.values().all(serde_json::Value::is_null));
    }

    #[test]
    fn source_record_requires_name() {
        let err = serde_json::from_value::<SourceRecord>(serde_json::json!({"company": "Acme"}));
        assert!(err.is_err());
    }

    #[test]
    fn hosted_row_decodes_with_nullable_columns() {
        let row: InvestorRecord = serde_json::from_value(serde_json::json!({
            "id": 7,
            "name": "Jane Doe",
            "company": "Acme Ventures",
            "job_title": null,
            "url": "https://example.com",
            "is_partner": true,
            "leads_series_a_b": true,
            "has_neurotech_investment": false,
            "based_na_eu_israel": true,
            "has_notable_exits": false,
            "series_reasoning": "Led 3 Series A rounds",
            "created_at": "2025-01-09T18:22:04.123456+00:00"
        }))
        .expect("row");
        assert_eq!(row.id, 7);
        assert!(row.created_at.is_some());
        assert_eq!(row.reasoning().series_reasoning.as_deref(), Some("Led 3 Series A rounds"));
    }

    #[test]
    fn search_matches_name_or_company_case_insensitively() {
        let records = vec![
            partner("Jane Doe", "Acme Ventures"),
            partner("John Roe", "Neuro Capital"),
        ];
        let by_name = PartnerFilter::new("jane", Category::All);
        let by_company = PartnerFilter::new("NEURO", Category::All);

        assert_eq!(by_name.apply(&records).len(), 1);
        assert_eq!(by_company.apply(&records)[0].name, "John Roe");
        assert_eq!(PartnerFilter::default().apply(&records).len(), 2);
    }

    #[test]
    fn category_restricts_on_flag() {
        let mut neuro = partner("A B", "Brain Fund");
        neuro.has_neurotech_investment = true;
        let mut exits = partner("C D", "Exit Partners");
        exits.has_notable_exits = true;
        exits.leads_series_a_b = true;
        let records = vec![neuro, exits];

        assert_eq!(PartnerFilter::new("", Category::Neurotech).apply(&records).len(), 1);
        assert_eq!(PartnerFilter::new("", Category::Series).apply(&records)[0].name, "C D");
        assert!(PartnerFilter::new("brain", Category::Exits).apply(&records).is_empty());

        let stats = PartnerStats::from_records(&records);
        assert_eq!(
            stats,
            PartnerStats {
                total: 2,
                neurotech: 1,
                exits: 1,
                series: 1
            }
        );
    }

    #[test]
    fn category_parses_case_insensitively() {
        assert_eq!("Series".parse::<Category>(), Ok(Category::Series));
        assert!("stealth".parse::<Category>().is_err());
        assert_eq!(Category::Neurotech.to_string(), "neurotech");
    }
}
