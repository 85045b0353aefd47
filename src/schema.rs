//! The schema registry: master column set and controlled vocabularies.
//!
//! Every tabular artifact in the pipeline is anchored here. The master case
//! table carries exactly [`CASE_SCHEMA`] as its header; the annotated table
//! appends [`FEATURE_COLS`]. Fetchers and the normalizer consult the
//! registry instead of hard-coding column names, so a schema change is a
//! one-file edit.

use once_cell::sync::Lazy;
use std::collections::HashMap;

/// Ordered column set of the master case table.
///
/// One row per documented censorship case. `case_id` is the primary key,
/// conventionally `{ISO2}-{YYYYMMDD}-{PLATFORM}`.
pub const CASE_SCHEMA: &[&str] = &[
    "case_id",
    "country",
    "iso2",
    "start_date",
    "end_date",
    "platform",
    "platform_domain",
    "platform_owner",
    "method_blocking",
    "scope",
    "status",
    "official_reason_text",
    "official_reason_category",
    "suspected_motives",
    "legal_basis",
    "event_context",
    "detected_by",
    "source",
    "evidence_urls",
    "asn_list",
    "regime_type_source",
    "regime_type_value",
    "notes",
    "last_updated",
];

/// Static platform-feature taxonomy columns attached by the annotation step.
///
/// These never appear in the master table; they exist only in the annotated
/// output, filled from the user-maintained platform profile.
pub const FEATURE_COLS: &[&str] = &[
    "features_anonymity",
    "features_recommendation",
    "features_encryption",
    "features_real_name_policy",
    "features_availability",
    "features_registration",
    "features_revenue_model",
    "features_fee_model",
];

/// Fields the external text-to-JSON conversion step must always produce.
/// A record missing any of these fails normalization with a schema
/// violation.
pub const REQUIRED_FIELDS: &[&str] = &["case_id", "country", "platform", "start_date"];

/// Default platform vocabulary used for keyword filters.
pub const PLATFORM_KEYWORDS: &str = "Twitter,Facebook,TikTok,YouTube,Telegram,Instagram,\
WhatsApp,Signal,Snapchat,Reddit,LinkedIn,Discord,VK,WeChat,Tumblr,Line,Medium,Viber,Threads";

/// Default ISO2 focus countries for the fetchers.
pub const FOCUS_COUNTRIES: &str =
    "IN,TR,RU,IR,SA,AE,EG,IQ,LB,ET,UG,SD,NG,KE,CN,PK,MM,TH,VN,SY,CU";

/// ISO2 → English country name, for matching country mentions in report
/// prose. Covers the focus countries; anything else falls back to the code.
static COUNTRY_NAMES: Lazy<HashMap<&'static str, &'static str>> = Lazy::new(|| {
    HashMap::from([
        ("IN", "India"),
        ("TR", "Turkey"),
        ("RU", "Russia"),
        ("IR", "Iran"),
        ("SA", "Saudi Arabia"),
        ("AE", "United Arab Emirates"),
        ("EG", "Egypt"),
        ("IQ", "Iraq"),
        ("LB", "Lebanon"),
        ("ET", "Ethiopia"),
        ("UG", "Uganda"),
        ("SD", "Sudan"),
        ("NG", "Nigeria"),
        ("KE", "Kenya"),
        ("CN", "China"),
        ("PK", "Pakistan"),
        ("MM", "Myanmar"),
        ("TH", "Thailand"),
        ("VN", "Vietnam"),
        ("SY", "Syria"),
        ("CU", "Cuba"),
    ])
});

/// Look up the English name for an ISO2 code, falling back to the code
/// itself when unknown.
pub fn country_name(iso2: &str) -> &str {
    let code = iso2.trim();
    COUNTRY_NAMES
        .get(code.to_ascii_uppercase().as_str())
        .copied()
        .unwrap_or(code)
}

/// Reverse lookup: English country name → ISO2 code (case-insensitive).
pub fn iso2_for_name(name: &str) -> Option<&'static str> {
    COUNTRY_NAMES
        .iter()
        .find(|(_, n)| n.eq_ignore_ascii_case(name.trim()))
        .map(|(code, _)| *code)
}

/// Column set of the annotated table: the master schema with the feature
/// taxonomy appended.
pub fn annotated_schema() -> Vec<&'static str> {
    CASE_SCHEMA.iter().chain(FEATURE_COLS.iter()).copied().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_case_id_is_first_and_last_updated_last() {
        assert_eq!(CASE_SCHEMA.first(), Some(&"case_id"));
        assert_eq!(CASE_SCHEMA.last(), Some(&"last_updated"));
    }

    #[test]
    fn test_feature_cols_disjoint_from_master() {
        for col in FEATURE_COLS {
            assert!(!CASE_SCHEMA.contains(col), "{col} leaked into the master schema");
        }
    }

    #[test]
    fn test_required_fields_are_registry_columns() {
        for field in REQUIRED_FIELDS {
            assert!(CASE_SCHEMA.contains(field));
        }
    }

    #[test]
    fn test_annotated_schema_order() {
        let cols = annotated_schema();
        assert_eq!(cols.len(), CASE_SCHEMA.len() + FEATURE_COLS.len());
        assert_eq!(cols[0], "case_id");
        assert_eq!(cols[CASE_SCHEMA.len()], "features_anonymity");
    }

    #[test]
    fn test_country_name_lookup() {
        assert_eq!(country_name("IN"), "India");
        assert_eq!(country_name("in"), "India");
        assert_eq!(country_name("ZZ"), "ZZ");
    }

    #[test]
    fn test_iso2_for_name() {
        assert_eq!(iso2_for_name("india"), Some("IN"));
        assert_eq!(iso2_for_name("United Arab Emirates"), Some("AE"));
        assert_eq!(iso2_for_name("Atlantis"), None);
    }
}
