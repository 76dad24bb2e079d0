//! Per-run diagnostics: which slot was filled from where.

use std::time::Duration;

use serde::Serialize;
use uuid::Uuid;

use pagekit_shared::ProviderName;

/// Where a slot's image came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum SlotSource {
    Stock { provider: ProviderName },
    Generative,
    Placeholder,
}

/// One filled slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportEntry {
    pub node_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub item: Option<usize>,
    pub source: SlotSource,
    pub url: String,
}

/// Summary of one [`Enricher::enrich`](crate::Enricher::enrich) run.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EnrichmentReport {
    pub run_id: Uuid,
    /// Filled slots in document order.
    pub entries: Vec<ReportEntry>,
    /// Provider searches, downloads, and generations actually issued.
    pub external_calls: usize,
    pub timed_out: bool,
    #[serde(rename = "elapsedMs", serialize_with = "as_millis")]
    pub elapsed: Duration,
}

impl EnrichmentReport {
    pub(crate) fn new() -> Self {
        Self {
            run_id: Uuid::now_v7(),
            entries: Vec::new(),
            external_calls: 0,
            timed_out: false,
            elapsed: Duration::ZERO,
        }
    }

    pub fn stock_count(&self) -> usize {
        self.count(|s| matches!(s, SlotSource::Stock { .. }))
    }

    pub fn generative_count(&self) -> usize {
        self.count(|s| matches!(s, SlotSource::Generative))
    }

    pub fn placeholder_count(&self) -> usize {
        self.count(|s| matches!(s, SlotSource::Placeholder))
    }

    fn count(&self, pred: impl Fn(&SlotSource) -> bool) -> usize {
        self.entries.iter().filter(|e| pred(&e.source)).count()
    }
}

fn as_millis<S: serde::Serializer>(elapsed: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_u64(elapsed.as_millis() as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_sources_and_counts() {
        let mut report = EnrichmentReport::new();
        report.entries = vec![
            ReportEntry {
                node_id: "hero-1".into(),
                item: None,
                source: SlotSource::Stock {
                    provider: ProviderName::Unsplash,
                },
                url: "https://images.unsplash.com/a".into(),
            },
            ReportEntry {
                node_id: "team-1".into(),
                item: Some(2),
                source: SlotSource::Placeholder,
                url: "https://ui-avatars.com/api/?name=Ana".into(),
            },
        ];
        report.elapsed = Duration::from_millis(1500);

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["entries"][0]["source"]["kind"], "stock");
        assert_eq!(json["entries"][0]["source"]["provider"], "unsplash");
        assert!(json["entries"][0].get("item").is_none());
        assert_eq!(json["entries"][1]["item"], 2);
        assert_eq!(json["elapsedMs"], 1500);
        assert_eq!(report.stock_count(), 1);
        assert_eq!(report.placeholder_count(), 1);
        assert_eq!(report.generative_count(), 0);
    }
}
