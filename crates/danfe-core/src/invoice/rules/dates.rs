//! Date extraction for DANFE documents.

use chrono::{Datelike, NaiveDate};

use super::patterns::DATE_DMY;
use super::{ExtractionMatch, FieldExtractor};

/// Electronic invoices (NF-e) did not exist before this year.
pub const DEFAULT_MIN_YEAR: i32 = 2006;
pub const DEFAULT_MAX_YEAR: i32 = 2035;

/// Date field extractor.
///
/// Only `DD/MM/YYYY` tokens are considered. Calendar-invalid dates and years
/// outside the sanity window are skipped.
pub struct DateExtractor {
    min_year: i32,
    max_year: i32,
}

impl DateExtractor {
    pub fn new() -> Self {
        Self {
            min_year: DEFAULT_MIN_YEAR,
            max_year: DEFAULT_MAX_YEAR,
        }
    }

    /// Set the accepted year range (inclusive).
    pub fn with_year_window(mut self, min_year: i32, max_year: i32) -> Self {
        self.min_year = min_year;
        self.max_year = max_year;
        self
    }
}

impl Default for DateExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl FieldExtractor for DateExtractor {
    type Output = ExtractionMatch<NaiveDate>;

    fn extract(&self, text: &str) -> Option<Self::Output> {
        self.extract_all(text).into_iter().next()
    }

    fn extract_all(&self, text: &str) -> Vec<Self::Output> {
        let mut results = Vec::new();

        for caps in DATE_DMY.captures_iter(text) {
            let day: u32 = caps[1].parse().unwrap_or(0);
            let month: u32 = caps[2].parse().unwrap_or(0);
            let year: i32 = caps[3].parse().unwrap_or(0);

            let Some(date) = NaiveDate::from_ymd_opt(year, month, day) else {
                continue;
            };
            if date.year() < self.min_year || date.year() > self.max_year {
                continue;
            }

            let full_match = &caps[0];
            let start = caps.get(0).map(|m| m.start()).unwrap_or(0);
            results.push(
                ExtractionMatch::new(date, 0.9, full_match)
                    .with_position(start, start + full_match.len()),
            );
        }

        results
    }
}

/// First plausible issue date in `text`.
pub fn extract_issue_date(text: &str, min_year: i32, max_year: i32) -> Option<NaiveDate> {
    DateExtractor::new()
        .with_year_window(min_year, max_year)
        .extract(text)
        .map(|m| m.value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_date_dmy() {
        let extractor = DateExtractor::new();

        let result = extractor.extract("DATA DA EMISSÃO 15/01/2024");
        assert!(result.is_some());
        assert_eq!(result.unwrap().value, NaiveDate::from_ymd_opt(2024, 1, 15).unwrap());
    }

    #[test]
    fn test_skips_years_outside_window() {
        let text = "Fundada em 01/01/1998, emitida em 03/02/2023";
        assert_eq!(
            extract_issue_date(text, DEFAULT_MIN_YEAR, DEFAULT_MAX_YEAR),
            NaiveDate::from_ymd_opt(2023, 2, 3)
        );
    }

    #[test]
    fn test_skips_calendar_invalid() {
        let extractor = DateExtractor::new();
        assert!(extractor.extract("31/02/2024").is_none());
        assert!(extractor.extract("15/13/2024").is_none());
    }

    #[test]
    fn test_custom_window() {
        let extractor = DateExtractor::new().with_year_window(2020, 2021);
        let dates = extractor.extract_all("01/01/2019 01/06/2020 01/01/2022");
        assert_eq!(dates.len(), 1);
        assert_eq!(dates[0].value, NaiveDate::from_ymd_opt(2020, 6, 1).unwrap());
    }
}
