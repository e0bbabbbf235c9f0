//! Which cached reads a successful write makes stale.
//!
//! The table is an exhaustive `match` over [`ResourceCategory`], so adding a
//! category without a rule does not compile. Rules purge only; the next read
//! misses and refetches.
//!
//! When in doubt a rule over-invalidates: a miss costs one extra fetch, a
//! stale hit shows the user wrong data.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::cache::CacheStore;
use crate::error::EngineError;

/// Version segment every cache key starts with
const KEY_VERSION: &str = "v1";

/// Cache key for a resource path: `/participants/42` -> `v1/participants/42`.
pub fn cache_key(endpoint: &str) -> String {
    format!("{}/{}", KEY_VERSION, endpoint.trim_matches('/'))
}

/// Logical domain category of a write.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ResourceCategory {
    Participant,
    Activity,
    Group,
    Finance,
    /// Carpool offers belong to one activity
    Carpool { activity_id: String },
    /// Attendance marks belong to one activity
    Attendance { activity_id: String },
}

impl fmt::Display for ResourceCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourceCategory::Participant => write!(f, "participant"),
            ResourceCategory::Activity => write!(f, "activity"),
            ResourceCategory::Group => write!(f, "group"),
            ResourceCategory::Finance => write!(f, "finance"),
            ResourceCategory::Carpool { activity_id } => write!(f, "carpool:{}", activity_id),
            ResourceCategory::Attendance { activity_id } => {
                write!(f, "attendance:{}", activity_id)
            }
        }
    }
}

impl FromStr for ResourceCategory {
    type Err = EngineError;

    /// Parses the `Display` form, e.g. `participant` or `carpool:17`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let unknown = || EngineError::UnknownCategory(s.to_string());
        let (name, scope) = match s.split_once(':') {
            Some((name, scope)) if !scope.is_empty() => (name, Some(scope.to_string())),
            Some(_) => return Err(unknown()),
            None => (s, None),
        };

        match (name.to_ascii_lowercase().as_str(), scope) {
            ("participant", None) => Ok(ResourceCategory::Participant),
            ("activity", None) => Ok(ResourceCategory::Activity),
            ("group", None) => Ok(ResourceCategory::Group),
            ("finance", None) => Ok(ResourceCategory::Finance),
            ("carpool", Some(activity_id)) => Ok(ResourceCategory::Carpool { activity_id }),
            ("attendance", Some(activity_id)) => Ok(ResourceCategory::Attendance { activity_id }),
            _ => Err(unknown()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyPattern {
    /// Every key starting with this string
    Prefix(String),
    /// Exactly this key
    Exact(String),
}

impl KeyPattern {
    fn prefix(path: &str) -> Self {
        KeyPattern::Prefix(cache_key(path))
    }

    fn exact(path: &str) -> Self {
        KeyPattern::Exact(cache_key(path))
    }

    pub fn matches(&self, key: &str) -> bool {
        match self {
            KeyPattern::Prefix(prefix) => key.starts_with(prefix.as_str()),
            KeyPattern::Exact(exact) => key == exact,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidationRule {
    pub trigger: ResourceCategory,
    pub patterns: Vec<KeyPattern>,
}

impl InvalidationRule {
    /// The rule for `category`.
    pub fn for_category(category: &ResourceCategory) -> Self {
        let patterns = match category {
            // Membership shows up in the participant, activity and group views
            ResourceCategory::Participant => vec![
                KeyPattern::prefix("participants"),
                KeyPattern::prefix("activities"),
                KeyPattern::prefix("groups"),
            ],
            ResourceCategory::Activity => vec![
                KeyPattern::prefix("activities"),
                KeyPattern::prefix("participants"),
                KeyPattern::prefix("carpools"),
                KeyPattern::prefix("reports/attendance"),
            ],
            ResourceCategory::Group => vec![
                KeyPattern::prefix("groups"),
                KeyPattern::prefix("participants"),
            ],
            ResourceCategory::Finance => vec![
                KeyPattern::prefix("finance"),
                KeyPattern::prefix("budgets"),
                KeyPattern::prefix("participants"),
            ],
            ResourceCategory::Carpool { activity_id } => vec![
                KeyPattern::prefix(&format!("carpools/activity/{}", activity_id)),
                KeyPattern::exact("carpools/my-offers"),
            ],
            ResourceCategory::Attendance { activity_id } => vec![
                KeyPattern::prefix(&format!("attendance/activity/{}", activity_id)),
                KeyPattern::prefix("reports/attendance"),
                KeyPattern::exact(&format!("activities/{}", activity_id)),
            ],
        };

        Self {
            trigger: category.clone(),
            patterns,
        }
    }

    /// Purge every matching cache key. Returns how many entries were removed.
    pub async fn apply(&self, cache: &CacheStore) -> usize {
        let mut removed = 0;
        for pattern in &self.patterns {
            removed += match pattern {
                KeyPattern::Prefix(prefix) => cache.delete_by_prefix(prefix).await,
                KeyPattern::Exact(key) => {
                    let present = cache.get_entry(key).await.is_some();
                    cache.delete(key).await;
                    usize::from(present)
                }
            };
        }
        debug!(category = %self.trigger, removed, "Applied invalidation rule");
        removed
    }
}

/// Purge the cache keys made stale by a successful write in `category`.
pub async fn invalidate(cache: &CacheStore, category: &ResourceCategory) -> usize {
    InvalidationRule::for_category(category).apply(cache).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;
    use serde_json::json;
    use std::sync::Arc;

    #[test]
    fn test_cache_key() {
        assert_eq!(cache_key("/participants"), "v1/participants");
        assert_eq!(cache_key("participants/42/"), "v1/participants/42");
    }

    #[test]
    fn test_category_parse_round_trip() {
        let categories = [
            ResourceCategory::Participant,
            ResourceCategory::Activity,
            ResourceCategory::Group,
            ResourceCategory::Finance,
            ResourceCategory::Carpool {
                activity_id: "17".to_string(),
            },
            ResourceCategory::Attendance {
                activity_id: "3".to_string(),
            },
        ];
        for category in categories {
            let parsed: ResourceCategory = category.to_string().parse().unwrap();
            assert_eq!(parsed, category);
        }
    }

    #[test]
    fn test_unknown_categories_are_rejected() {
        for input in ["widget", "carpool", "carpool:", "participant:4", ""] {
            assert!(
                matches!(
                    input.parse::<ResourceCategory>(),
                    Err(EngineError::UnknownCategory(_))
                ),
                "{:?} should not parse",
                input
            );
        }
    }

    #[test]
    fn test_every_category_has_patterns() {
        let categories = [
            ResourceCategory::Participant,
            ResourceCategory::Activity,
            ResourceCategory::Group,
            ResourceCategory::Finance,
            ResourceCategory::Carpool {
                activity_id: "1".to_string(),
            },
            ResourceCategory::Attendance {
                activity_id: "1".to_string(),
            },
        ];
        for category in &categories {
            assert!(!InvalidationRule::for_category(category).patterns.is_empty());
        }
    }

    #[test]
    fn test_participant_rule_covers_list_views() {
        let rule = InvalidationRule::for_category(&ResourceCategory::Participant);
        assert!(rule.patterns.iter().any(|p| p.matches("v1/participants")));
        assert!(rule.patterns.iter().any(|p| p.matches("v1/activities/5")));
        assert!(rule.patterns.iter().any(|p| p.matches("v1/groups")));
        assert!(!rule.patterns.iter().any(|p| p.matches("v1/finance")));
    }

    #[tokio::test]
    async fn test_carpool_rule_is_scoped_to_activity() {
        let cache = CacheStore::new(Arc::new(MemoryStore::new()));
        for key in [
            "v1/carpools/activity/9",
            "v1/carpools/activity/9/offers",
            "v1/carpools/activity/10",
            "v1/carpools/my-offers",
            "v1/participants",
        ] {
            cache.set(key, json!(key)).await;
        }

        let removed = invalidate(
            &cache,
            &ResourceCategory::Carpool {
                activity_id: "9".to_string(),
            },
        )
        .await;

        assert_eq!(removed, 3);
        let remaining: Vec<String> = cache.entries().await.into_iter().map(|e| e.key).collect();
        assert_eq!(remaining, vec!["v1/carpools/activity/10", "v1/participants"]);
    }
}
