//! Search criteria and Gmail query construction

use chrono::NaiveDate;

use crate::config::default_max_results;
use crate::error::{GmailError, Result};

/// Date format emitted for dates given as [`NaiveDate`]
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Date layouts accepted from callers; Gmail's `after:`/`before:` take both
const ACCEPTED_DATE_FORMATS: &[&str] = &[DATE_FORMAT, "%Y/%m/%d"];

/// Filter for a single extraction run
///
/// Every filter is optional; `max_results` is always at least 1. Dates are
/// kept as the caller wrote them and only checked for validity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchCriteria {
    pub label: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    max_results: u32,
}

impl Default for SearchCriteria {
    fn default() -> Self {
        Self {
            label: None,
            start_date: None,
            end_date: None,
            max_results: default_max_results(),
        }
    }
}

impl SearchCriteria {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn with_start_date(mut self, date: NaiveDate) -> Self {
        self.start_date = Some(date.format(DATE_FORMAT).to_string());
        self
    }

    pub fn with_end_date(mut self, date: NaiveDate) -> Self {
        self.end_date = Some(date.format(DATE_FORMAT).to_string());
        self
    }

    pub fn with_max_results(mut self, max_results: u32) -> Result<Self> {
        if max_results == 0 {
            return Err(GmailError::InvalidInput(
                "max_results must be a positive integer".to_string(),
            ));
        }
        self.max_results = max_results;
        Ok(self)
    }

    pub fn max_results(&self) -> u32 {
        self.max_results
    }

    /// Build criteria from loosely typed input (CLI flags, tool arguments)
    ///
    /// Empty strings count as absent. Dates must be valid `YYYY-MM-DD` or
    /// `YYYY/MM/DD` and are passed on trimmed but otherwise unchanged.
    pub fn from_parts(
        label: Option<&str>,
        start_date: Option<&str>,
        end_date: Option<&str>,
        max_results: Option<u32>,
    ) -> Result<Self> {
        let mut criteria = Self::new();
        if let Some(label) = label.filter(|l| !l.is_empty()) {
            criteria = criteria.with_label(label);
        }
        if let Some(date) = start_date.filter(|d| !d.is_empty()) {
            criteria.start_date = Some(check_date("start_date", date)?);
        }
        if let Some(date) = end_date.filter(|d| !d.is_empty()) {
            criteria.end_date = Some(check_date("end_date", date)?);
        }
        if let Some(max_results) = max_results {
            criteria = criteria.with_max_results(max_results)?;
        }
        Ok(criteria)
    }
}

fn check_date(field: &str, value: &str) -> Result<String> {
    let trimmed = value.trim();
    let valid = ACCEPTED_DATE_FORMATS
        .iter()
        .any(|format| NaiveDate::parse_from_str(trimmed, format).is_ok());
    if !valid {
        return Err(GmailError::InvalidInput(format!(
            "{} '{}' is not a YYYY-MM-DD date",
            field, value
        )));
    }
    Ok(trimmed.to_string())
}

/// Build the Gmail search expression for the given criteria
///
/// Terms appear in a fixed order: `label:`, `after:`, `before:`. The label is
/// passed through verbatim, without quoting. Returns `None` when no filter is
/// set, meaning an unfiltered listing.
pub fn build_query(criteria: &SearchCriteria) -> Option<String> {
    let mut terms = Vec::with_capacity(3);

    if let Some(label) = &criteria.label {
        terms.push(format!("label:{}", label));
    }
    if let Some(start) = &criteria.start_date {
        terms.push(format!("after:{}", start));
    }
    if let Some(end) = &criteria.end_date {
        terms.push(format!("before:{}", end));
    }

    if terms.is_empty() {
        None
    } else {
        Some(terms.join(" "))
    }
}
