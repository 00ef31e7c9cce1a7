//! Raw state entry to [`JobRecord`] mapping.
//!
//! The site has renamed most fields at least once, so each output field reads
//! the first non-empty value from a list of known keys.

use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::trace;

use crate::models::{JobRecord, ListingState};
use crate::utils::dates;
use crate::utils::html::clean_snippet;
use crate::utils::url::{to_absolute, SITE_BASE};

const TITLE_KEYS: &[&str] = &["title", "jobTitle"];
const COMPANY_KEYS: &[&str] = &["companyName", "company", "recruiterName", "companyCard.name"];
const LOCATION_KEYS: &[&str] = &["location", "jobLocation", "locationLabel"];
const SALARY_KEYS: &[&str] = &["salary", "salaryDescription", "salaryLabel"];
const JOB_TYPE_KEYS: &[&str] = &["contractType", "employmentType", "workType"];
const DATE_KEYS: &[&str] = &["datePosted", "postedDate", "listingDate"];
const DESCRIPTION_KEYS: &[&str] = &["textSnippet", "description", "snippet"];
const ID_KEYS: &[&str] = &["id", "jobId"];

/// Look up a dotted path such as `companyCard.name`.
fn lookup<'a>(entry: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.').try_fold(entry, |node, key| node.get(key))
}

fn is_empty(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        _ => false,
    }
}

/// First present, non-empty value among `keys`.
fn first_value<'a>(entry: &'a Value, keys: &[&str]) -> Option<&'a Value> {
    keys.iter()
        .filter_map(|k| lookup(entry, k))
        .find(|v| !is_empty(v))
}

/// First non-empty value among `keys` rendered as text.
///
/// Numbers are accepted (ids are sometimes numeric); objects and arrays are not.
fn first_text(entry: &Value, keys: &[&str]) -> Option<String> {
    keys.iter()
        .filter_map(|k| lookup(entry, k))
        .find_map(|v| match v {
            Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        })
}

/// Shape one raw entry. `None` if the entry has no usable title or url.
///
/// `now` anchors relative posted dates.
pub fn shape_entry(entry: &Value, now: DateTime<Utc>) -> Option<JobRecord> {
    let title = first_text(entry, TITLE_KEYS)?;
    let url = entry
        .get("url")
        .and_then(Value::as_str)
        .and_then(|href| to_absolute(href, SITE_BASE))?;

    let mut record = JobRecord::new(title, url);
    record.company = first_text(entry, COMPANY_KEYS);
    record.location = first_text(entry, LOCATION_KEYS);
    record.salary = first_text(entry, SALARY_KEYS);
    record.job_type = first_text(entry, JOB_TYPE_KEYS);
    record.date_posted = first_value(entry, DATE_KEYS).and_then(|v| dates::normalize(v, now));
    record.description = first_text(entry, DESCRIPTION_KEYS)
        .map(|raw| clean_snippet(&raw))
        .filter(|s| !s.is_empty());
    record.job_id = first_text(entry, ID_KEYS);

    Some(record)
}

/// Shape every entry of a listing state, preserving source order.
pub fn shape_items(state: &ListingState, now: DateTime<Utc>) -> Vec<JobRecord> {
    let items = state.items();
    let records: Vec<JobRecord> = items.iter().filter_map(|e| shape_entry(e, now)).collect();

    if records.len() < items.len() {
        trace!(
            "Rejected {} of {} entries without title or url",
            items.len() - records.len(),
            items.len()
        );
    }

    records
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 15, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_shape_full_entry() {
        let entry = json!({
            "id": 101,
            "title": "  Head Chef ",
            "companyCard": {"name": "The Grand"},
            "jobLocation": "London",
            "salaryDescription": "£40,000",
            "employmentType": "Permanent",
            "datePosted": "2 hours ago",
            "textSnippet": "<p>Lead&nbsp;our   <b>kitchen</b> &amp; team</p>",
            "url": "/job/head-chef/the-grand-job101"
        });

        let record = shape_entry(&entry, now()).expect("record");
        assert_eq!(record.source, "caterer.com");
        assert_eq!(record.title, "Head Chef");
        assert_eq!(record.company.as_deref(), Some("The Grand"));
        assert_eq!(record.location.as_deref(), Some("London"));
        assert_eq!(record.salary.as_deref(), Some("£40,000"));
        assert_eq!(record.job_type.as_deref(), Some("Permanent"));
        assert_eq!(record.date_posted.as_deref(), Some("2024-06-15T10:00:00.000Z"));
        assert_eq!(record.description.as_deref(), Some("Lead our kitchen & team"));
        assert_eq!(record.url, "https://www.caterer.com/job/head-chef/the-grand-job101");
        assert_eq!(record.job_id.as_deref(), Some("101"));
        assert!(record.extracted_at.is_none());
    }

    #[test]
    fn test_first_non_empty_wins() {
        let entry = json!({
            "title": "",
            "jobTitle": "Sous Chef",
            "companyName": "   ",
            "company": "Acme Hotels",
            "recruiterName": "Ignored",
            "url": "/job/2"
        });
        let record = shape_entry(&entry, now()).expect("record");
        assert_eq!(record.title, "Sous Chef");
        assert_eq!(record.company.as_deref(), Some("Acme Hotels"));
        assert!(record.salary.is_none());
        assert!(record.date_posted.is_none());
    }

    #[test]
    fn test_unparseable_date_kept_verbatim() {
        let entry = json!({"title": "Porter", "url": "/job/3", "postedDate": "Recently"});
        let record = shape_entry(&entry, now()).expect("record");
        assert_eq!(record.date_posted.as_deref(), Some("Recently"));
    }

    #[test]
    fn test_rejects_missing_title_or_url() {
        assert!(shape_entry(&json!({"url": "/job/4"}), now()).is_none());
        assert!(shape_entry(&json!({"title": "Chef"}), now()).is_none());
        assert!(shape_entry(&json!({"title": "Chef", "url": ""}), now()).is_none());
        assert!(shape_entry(&json!({"title": "Chef", "url": "mailto:x@y.z"}), now()).is_none());
    }

    #[test]
    fn test_shaping_is_deterministic() {
        let entry = json!({"title": "KP", "url": "/job/5", "datePosted": "yesterday", "snippet": "a <i>b</i>"});
        assert_eq!(shape_entry(&entry, now()), shape_entry(&entry, now()));
    }

    #[test]
    fn test_shape_items_preserves_order() {
        let state = ListingState::new(json!({
            "searchResults": {
                "items": [
                    {"title": "One", "url": "/job/1"},
                    {"url": "/job/no-title"},
                    {"title": "Two", "url": "/job/2"},
                    {"title": "Three", "url": "/job/3"}
                ]
            }
        }));
        let titles: Vec<_> = shape_items(&state, now()).into_iter().map(|r| r.title).collect();
        assert_eq!(titles, vec!["One", "Two", "Three"]);
    }
}
