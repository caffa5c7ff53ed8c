use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// A watched ontology resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Ontology {
    pub id: i64,
    pub name: String,
    pub repo_resource_path: Option<String>,
    pub date_created: NaiveDateTime,
}

/// One Git provider delivery for an ontology. "Latest" means highest id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GitWebhook {
    pub id: i64,
    pub ontology_id: i64,
    pub date_created: NaiveDateTime,
    pub commit_id: Option<String>,
}

/// Webhook with the maximum id.
pub fn latest(webhooks: &[GitWebhook]) -> Option<&GitWebhook> {
    webhooks.iter().max_by_key(|w| w.id)
}

/// Webhook created strictly before `at` with the greatest `date_created`,
/// ties broken by the greater id.
pub fn latest_before(webhooks: &[GitWebhook], at: NaiveDateTime) -> Option<&GitWebhook> {
    webhooks
        .iter()
        .filter(|w| w.date_created < at)
        .max_by_key(|w| (w.date_created, w.id))
}

/// Webhook with the minimum id.
pub fn earliest(webhooks: &[GitWebhook]) -> Option<&GitWebhook> {
    webhooks.iter().min_by_key(|w| w.id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(h: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, 1)
            .unwrap()
            .and_hms_opt(h, 0, 0)
            .unwrap()
    }

    fn hook(id: i64, h: u32) -> GitWebhook {
        GitWebhook {
            id,
            ontology_id: 1,
            date_created: at(h),
            commit_id: None,
        }
    }

    #[test]
    fn latest_is_max_id_not_wall_clock() {
        // id 3 was recorded with an earlier clock than id 2
        let hooks = vec![hook(1, 8), hook(2, 12), hook(3, 10)];
        assert_eq!(latest(&hooks).unwrap().id, 3);
    }

    #[test]
    fn before_is_strict() {
        let hooks = vec![hook(1, 8), hook(2, 12)];
        assert_eq!(latest_before(&hooks, at(12)).unwrap().id, 1);
        assert!(latest_before(&hooks, at(8)).is_none());
        assert_eq!(earliest(&hooks).unwrap().id, 1);
    }
}
