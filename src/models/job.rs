//! Job record model.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

/// Site identifier stamped on every record.
pub const SOURCE_ID: &str = "caterer.com";

/// A single job listing in output form.
///
/// `title` and `url` are always present; everything else is best-effort and
/// serialised as `null` when the listing did not carry it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRecord {
    pub source: String,
    pub title: String,
    pub company: Option<String>,
    pub location: Option<String>,
    pub salary: Option<String>,
    pub job_type: Option<String>,
    /// ISO-8601 when the posted date could be read, the raw text otherwise.
    pub date_posted: Option<String>,
    pub description: Option<String>,
    /// Absolute job URL, also the dedup key.
    pub url: String,
    pub job_id: Option<String>,
    pub keyword_search: Option<String>,
    pub location_search: Option<String>,
    pub extracted_at: Option<String>,
}

impl JobRecord {
    /// Create a record with only the mandatory fields set.
    pub fn new(title: String, url: String) -> Self {
        Self {
            source: SOURCE_ID.to_string(),
            title,
            company: None,
            location: None,
            salary: None,
            job_type: None,
            date_posted: None,
            description: None,
            url,
            job_id: None,
            keyword_search: None,
            location_search: None,
            extracted_at: None,
        }
    }

    /// Stamp the search that produced this record and the extraction time.
    pub fn with_provenance(mut self, keyword: &str, location: &str, at: DateTime<Utc>) -> Self {
        self.keyword_search = Some(keyword.to_string());
        self.location_search = Some(location.to_string());
        self.extracted_at = Some(at.to_rfc3339_opts(SecondsFormat::Millis, true));
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_new_record_has_source_and_null_fields() {
        let record = JobRecord::new("Chef".into(), "https://www.caterer.com/job/1".into());
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["source"], "caterer.com");
        assert_eq!(json["title"], "Chef");
        assert!(json["company"].is_null());
        assert!(json["extracted_at"].is_null());
    }

    #[test]
    fn test_with_provenance() {
        let at = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let record = JobRecord::new("Chef".into(), "https://www.caterer.com/job/1".into())
            .with_provenance("chef", "london", at);
        assert_eq!(record.keyword_search.as_deref(), Some("chef"));
        assert_eq!(record.location_search.as_deref(), Some("london"));
        assert_eq!(
            record.extracted_at.as_deref(),
            Some("2024-05-01T12:00:00.000Z")
        );
    }
}
