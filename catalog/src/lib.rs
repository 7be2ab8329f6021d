//! Model Catalog: canonical registry of models, filtered by tier,
//! budget, and status for a given routing request.

use std::collections::HashMap;

use contracts::{Difficulty, ModelRegistryEntry, ModelStatus, TaskType, TierProfile};
use parking_lot::RwLock;

/// A baseline "reasonable call" used to decide whether a model's
/// pricing fits the remaining budget at all, independent of the
/// specific package's token estimate (that refinement happens in the
/// router/cost model once a task card is known).
const REASONABLE_CALL_INPUT_TOKENS: f64 = 1_000.0;
const REASONABLE_CALL_OUTPUT_TOKENS: f64 = 500.0;

pub fn cheapest_reasonable_cost(entry: &ModelRegistryEntry) -> f64 {
    (REASONABLE_CALL_INPUT_TOKENS / 1000.0) * entry.pricing.in_per_1k
        + (REASONABLE_CALL_OUTPUT_TOKENS / 1000.0) * entry.pricing.out_per_1k
}

/// Lets the engine consult tenant credentials without the catalog
/// needing to know how they're stored.
pub trait CredentialGate: Send + Sync {
    fn has_credentials(&self, model_id: &str) -> bool;
}

pub struct AllowAllCredentials;
impl CredentialGate for AllowAllCredentials {
    fn has_credentials(&self, _model_id: &str) -> bool {
        true
    }
}

pub struct ListEligibleFilter<'a> {
    pub tier_profile: TierProfile,
    pub task_type: TaskType,
    pub difficulty: Difficulty,
    pub budget_remaining_usd: f64,
    pub importance: Option<u8>,
    pub credentials: &'a dyn CredentialGate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterReason {
    StatusDisabled,
    ProbationButActiveAvailable,
    TierNotAllowed,
    ExceedsBudget,
    MissingCredentials,
}

impl FilterReason {
    pub fn code(self) -> &'static str {
        match self {
            FilterReason::StatusDisabled => "status_disabled",
            FilterReason::ProbationButActiveAvailable => "probation_active_available",
            FilterReason::TierNotAllowed => "tier_not_allowed",
            FilterReason::ExceedsBudget => "exceeds_budget",
            FilterReason::MissingCredentials => "missing_credentials",
        }
    }
}

#[derive(Debug, Clone)]
pub struct FilteredOutEntry {
    pub model_id: String,
    pub reason: FilterReason,
}

pub struct ListEligibleResult {
    pub eligible: Vec<ModelRegistryEntry>,
    pub filtered_out: Vec<FilteredOutEntry>,
}

#[derive(Default)]
pub struct ModelCatalog {
    entries: RwLock<HashMap<String, ModelRegistryEntry>>,
}

impl ModelCatalog {
    pub fn new(entries: Vec<ModelRegistryEntry>) -> Self {
        let map = entries.into_iter().map(|e| (e.id.clone(), e)).collect();
        Self {
            entries: RwLock::new(map),
        }
    }

    pub fn get(&self, model_id: &str) -> Option<ModelRegistryEntry> {
        self.entries.read().get(model_id).cloned()
    }

    pub fn set_model_status(&self, model_id: &str, status: ModelStatus) {
        if let Some(entry) = self.entries.write().get_mut(model_id) {
            entry.identity.status = status;
        }
    }

    /// Filters the catalog by tier/status/budget for a routing request.
    /// Probation entries are only eligible when no active candidate
    /// exists in the requested tier.
    pub fn list_eligible(&self, filter: &ListEligibleFilter<'_>) -> ListEligibleResult {
        let entries = self.entries.read();
        let mut filtered_out = Vec::new();
        let mut tier_matching: Vec<&ModelRegistryEntry> = Vec::new();

        for entry in entries.values() {
            if entry.identity.status == ModelStatus::Disabled {
                filtered_out.push(FilteredOutEntry {
                    model_id: entry.id.clone(),
                    reason: FilterReason::StatusDisabled,
                });
                continue;
            }
            if !entry.allowed_tiers.contains(&filter.tier_profile) {
                filtered_out.push(FilteredOutEntry {
                    model_id: entry.id.clone(),
                    reason: FilterReason::TierNotAllowed,
                });
                continue;
            }
            tier_matching.push(entry);
        }

        let has_active = tier_matching
            .iter()
            .any(|e| e.identity.status == ModelStatus::Active);

        let mut eligible = Vec::new();
        for entry in tier_matching {
            if entry.identity.status == ModelStatus::Probation && has_active {
                filtered_out.push(FilteredOutEntry {
                    model_id: entry.id.clone(),
                    reason: FilterReason::ProbationButActiveAvailable,
                });
                continue;
            }

            if !filter.credentials.has_credentials(&entry.id) {
                filtered_out.push(FilteredOutEntry {
                    model_id: entry.id.clone(),
                    reason: FilterReason::MissingCredentials,
                });
                continue;
            }

            if cheapest_reasonable_cost(entry) > filter.budget_remaining_usd {
                filtered_out.push(FilteredOutEntry {
                    model_id: entry.id.clone(),
                    reason: FilterReason::ExceedsBudget,
                });
                continue;
            }

            eligible.push(entry.clone());
        }

        ListEligibleResult {
            eligible,
            filtered_out,
        }
    }
}

/// Built-in fallback model list used when the catalog is empty or
/// unreachable; the caller is responsible for recording the
/// `PROCUREMENT_FALLBACK` ledger decision.
pub fn static_fallback_catalog() -> Vec<ModelRegistryEntry> {
    use contracts::{Currency, ModelIdentity, ModelTimestamps, Pricing};

    let now = "1970-01-01T00:00:00Z".to_string();
    let timestamps = ModelTimestamps {
        created_iso: now.clone(),
        updated_iso: now,
    };

    vec![
        ModelRegistryEntry {
            id: "fallback-cheap".to_string(),
            identity: ModelIdentity {
                provider: "fallback".to_string(),
                model_id: "fallback-cheap".to_string(),
                status: ModelStatus::Active,
            },
            pricing: Pricing {
                in_per_1k: 0.0005,
                out_per_1k: 0.0015,
                currency: Currency::Usd,
            },
            expertise: HashMap::new(),
            reliability: 0.7,
            allowed_tiers: vec![TierProfile::Cheap, TierProfile::Standard, TierProfile::Premium],
            governance: None,
            timestamps: timestamps.clone(),
        },
        ModelRegistryEntry {
            id: "fallback-standard".to_string(),
            identity: ModelIdentity {
                provider: "fallback".to_string(),
                model_id: "fallback-standard".to_string(),
                status: ModelStatus::Active,
            },
            pricing: Pricing {
                in_per_1k: 0.003,
                out_per_1k: 0.009,
                currency: Currency::Usd,
            },
            expertise: HashMap::new(),
            reliability: 0.8,
            allowed_tiers: vec![TierProfile::Standard, TierProfile::Premium],
            governance: None,
            timestamps: timestamps.clone(),
        },
        ModelRegistryEntry {
            id: "fallback-premium".to_string(),
            identity: ModelIdentity {
                provider: "fallback".to_string(),
                model_id: "fallback-premium".to_string(),
                status: ModelStatus::Active,
            },
            pricing: Pricing {
                in_per_1k: 0.015,
                out_per_1k: 0.045,
                currency: Currency::Usd,
            },
            expertise: HashMap::new(),
            reliability: 0.9,
            allowed_tiers: vec![TierProfile::Premium],
            governance: None,
            timestamps,
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(id: &str, status: ModelStatus, tiers: Vec<TierProfile>, in_per_1k: f64) -> ModelRegistryEntry {
        use contracts::{Currency, ModelIdentity, ModelTimestamps, Pricing};
        ModelRegistryEntry {
            id: id.to_string(),
            identity: ModelIdentity {
                provider: "p".to_string(),
                model_id: id.to_string(),
                status,
            },
            pricing: Pricing {
                in_per_1k,
                out_per_1k: in_per_1k * 3.0,
                currency: Currency::Usd,
            },
            expertise: HashMap::new(),
            reliability: 0.8,
            allowed_tiers: tiers,
            governance: None,
            timestamps: ModelTimestamps {
                created_iso: "2026-01-01T00:00:00Z".to_string(),
                updated_iso: "2026-01-01T00:00:00Z".to_string(),
            },
        }
    }

    #[test]
    fn probation_excluded_when_active_available_in_tier() {
        let catalog = ModelCatalog::new(vec![
            entry("active-1", ModelStatus::Active, vec![TierProfile::Standard], 0.001),
            entry("probation-1", ModelStatus::Probation, vec![TierProfile::Standard], 0.001),
        ]);
        let filter = ListEligibleFilter {
            tier_profile: TierProfile::Standard,
            task_type: TaskType::Writing,
            difficulty: Difficulty::Medium,
            budget_remaining_usd: 10.0,
            importance: None,
            credentials: &AllowAllCredentials,
        };
        let result = catalog.list_eligible(&filter);
        assert_eq!(result.eligible.len(), 1);
        assert_eq!(result.eligible[0].id, "active-1");
        assert!(result
            .filtered_out
            .iter()
            .any(|f| f.model_id == "probation-1" && f.reason == FilterReason::ProbationButActiveAvailable));
    }

    #[test]
    fn probation_included_when_no_active_in_tier() {
        let catalog = ModelCatalog::new(vec![entry(
            "probation-1",
            ModelStatus::Probation,
            vec![TierProfile::Standard],
            0.001,
        )]);
        let filter = ListEligibleFilter {
            tier_profile: TierProfile::Standard,
            task_type: TaskType::Writing,
            difficulty: Difficulty::Medium,
            budget_remaining_usd: 10.0,
            importance: None,
            credentials: &AllowAllCredentials,
        };
        let result = catalog.list_eligible(&filter);
        assert_eq!(result.eligible.len(), 1);
    }

    #[test]
    fn exceeds_budget_is_filtered_with_reason() {
        let catalog = ModelCatalog::new(vec![entry(
            "expensive",
            ModelStatus::Active,
            vec![TierProfile::Premium],
            100.0,
        )]);
        let filter = ListEligibleFilter {
            tier_profile: TierProfile::Premium,
            task_type: TaskType::Writing,
            difficulty: Difficulty::Medium,
            budget_remaining_usd: 0.001,
            importance: None,
            credentials: &AllowAllCredentials,
        };
        let result = catalog.list_eligible(&filter);
        assert!(result.eligible.is_empty());
        assert_eq!(result.filtered_out[0].reason, FilterReason::ExceedsBudget);
    }

    #[test]
    fn disabled_models_never_eligible() {
        let catalog = ModelCatalog::new(vec![entry(
            "dead",
            ModelStatus::Disabled,
            vec![TierProfile::Standard],
            0.001,
        )]);
        let filter = ListEligibleFilter {
            tier_profile: TierProfile::Standard,
            task_type: TaskType::Writing,
            difficulty: Difficulty::Medium,
            budget_remaining_usd: 10.0,
            importance: None,
            credentials: &AllowAllCredentials,
        };
        let result = catalog.list_eligible(&filter);
        assert!(result.eligible.is_empty());
        assert_eq!(result.filtered_out[0].reason, FilterReason::StatusDisabled);
    }
}
