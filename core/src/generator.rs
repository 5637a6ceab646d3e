//! Workload Generator: builds a synthetic population of WAITING requests.
//!
//! Per run:
//!   1. Validate reference data (enabled categories and service points).
//!   2. Delete every prior synthetic request and verify none remain.
//!   3. Draw N uniformly from the configured range (75..=150 by default).
//!   4. Draw each request's category from the fixed mix, its arrival time
//!      from the service window, and route it to a service point.
//!   5. Insert the population in batches, all-or-nothing.
//!
//! Generation never pre-simulates outcomes: every request is WAITING
//! with no call/complete timestamps.

use crate::{
    config::WorkloadConfig,
    error::{SimError, SimResult},
    model::{CategoryRoute, Provenance, RequestStatus, ServicePoint, ServiceRequest, TypeConfig},
    rng::ComponentRng,
    store::{ReferenceSource, RequestStore},
    types::{CategoryCode, ServicePointId},
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationReport {
    pub total: usize,
    pub deleted_prior: usize,
    pub sim_date: NaiveDate,
    pub by_category: BTreeMap<CategoryCode, usize>,
}

/// Delete all synthetic requests and verify the delete by re-querying.
pub fn purge_synthetic<S: RequestStore>(store: &S) -> SimResult<usize> {
    let deleted = store.delete_requests(Provenance::Synthetic)?;
    let remaining = store.count_requests(Provenance::Synthetic, None)?;
    if remaining > 0 {
        log::error!("purge left {remaining} synthetic requests behind");
        return Err(SimError::ResidualSynthetic { remaining });
    }
    Ok(deleted)
}

/// One bucket of the category draw.
enum Bucket {
    Fixed(CategoryCode),
    /// Cycles through categories outside the fixed mix.
    Remainder,
}

pub struct WorkloadGenerator {
    config: WorkloadConfig,
    rng: ComponentRng,
}

impl WorkloadGenerator {
    pub fn new(config: WorkloadConfig, rng: ComponentRng) -> Self {
        Self { config, rng }
    }

    pub fn sim_date(&self) -> NaiveDate {
        self.config
            .sim_date
            .unwrap_or_else(|| chrono::Local::now().date_naive())
    }

    /// Replace the synthetic population in `store`.
    pub fn generate<S: RequestStore + ReferenceSource>(
        &mut self,
        store: &S,
    ) -> SimResult<GenerationReport> {
        let types = store.queue_types()?;
        let service_points = store.service_points()?;
        let routing = store.routing()?;
        validate_reference_data(&types, &service_points)?;

        let deleted_prior = purge_synthetic(store)?;
        let sim_date = self.sim_date();
        let population = self.build_population(&types, &service_points, &routing, sim_date)?;
        store.insert_requests(&population, self.config.insert_batch_size)?;

        let mut by_category = BTreeMap::new();
        for r in &population {
            *by_category.entry(r.category.clone()).or_insert(0) += 1;
        }
        log::info!(
            "generated {} synthetic requests for {sim_date} (replaced {deleted_prior})",
            population.len()
        );
        Ok(GenerationReport {
            total: population.len(),
            deleted_prior,
            sim_date,
            by_category,
        })
    }

    /// Draw a population without touching any store.
    pub fn build_population(
        &mut self,
        types: &[TypeConfig],
        service_points: &[ServicePoint],
        routing: &[CategoryRoute],
        sim_date: NaiveDate,
    ) -> SimResult<Vec<ServiceRequest>> {
        validate_reference_data(types, service_points)?;
        let w = &self.config;
        let count = self
            .rng
            .range_inclusive(u64::from(w.min_requests), u64::from(w.max_requests))
            as usize;

        let enabled: Vec<&TypeConfig> = types.iter().filter(|t| t.enabled).collect();
        let (buckets, weights) = self.category_table(&enabled);
        let remainder: Vec<&str> = enabled
            .iter()
            .map(|t| t.code.as_str())
            .filter(|code| !w.category_mix.iter().any(|m| m.category == *code))
            .collect();
        let router = Router::new(service_points, routing);

        let mut population = Vec::with_capacity(count);
        let mut remainder_cursor = 0usize;
        for _ in 0..count {
            let category = match &buckets[self.rng.pick_weighted(&weights)] {
                Bucket::Fixed(code) => code.clone(),
                Bucket::Remainder => {
                    let code = remainder[remainder_cursor % remainder.len()];
                    remainder_cursor += 1;
                    code.to_string()
                }
            };

            let hour = self
                .rng
                .range_inclusive(u64::from(w.open_hour), u64::from(w.close_hour.saturating_sub(1)))
                as u32;
            let minute = self.rng.next_u64_below(60) as u32;
            let created_at = sim_date.and_hms_opt(hour, minute, 0).ok_or_else(|| {
                SimError::Validation(format!("arrival time {hour}:{minute:02} is not a valid time"))
            })?;

            population.push(ServiceRequest {
                id: format!("sim-{:016x}", self.rng.next_u64()),
                sequence: 0,
                service_point_id: router.route(&category),
                category,
                status: RequestStatus::Waiting,
                created_at,
                called_at: None,
                completed_at: None,
                skipped_at: None,
                provenance: Provenance::Synthetic,
            });
        }

        // Ticket numbers follow arrival order within each category.
        population.sort_by_key(|r| r.created_at);
        let mut next_seq: HashMap<String, u32> = HashMap::new();
        for r in population.iter_mut() {
            let seq = next_seq.entry(r.category.clone()).or_insert(0);
            *seq += 1;
            r.sequence = *seq;
        }
        Ok(population)
    }

    /// Buckets and weights for the category draw. Mix entries for
    /// disabled or unknown categories are dropped; the remainder bucket
    /// exists only when some enabled category is outside the mix.
    fn category_table(&self, enabled: &[&TypeConfig]) -> (Vec<Bucket>, Vec<f64>) {
        let mut buckets = Vec::new();
        let mut weights = Vec::new();
        for m in &self.config.category_mix {
            if m.share > 0.0 && enabled.iter().any(|t| t.code == m.category) {
                buckets.push(Bucket::Fixed(m.category.clone()));
                weights.push(m.share);
            }
        }
        let has_remainder = enabled
            .iter()
            .any(|t| !self.config.category_mix.iter().any(|m| m.category == t.code));
        if has_remainder {
            buckets.push(Bucket::Remainder);
            weights.push(self.config.remainder_share);
        }

        // Degenerate mix: spread uniformly over enabled categories.
        if weights.iter().all(|w| *w <= 0.0) {
            buckets = enabled.iter().map(|t| Bucket::Fixed(t.code.clone())).collect();
            weights = vec![1.0; buckets.len()];
        }
        (buckets, weights)
    }
}

fn validate_reference_data(types: &[TypeConfig], service_points: &[ServicePoint]) -> SimResult<()> {
    if !types.iter().any(|t| t.enabled) {
        return Err(SimError::Validation("no enabled queue categories configured".into()));
    }
    if !service_points.iter().any(|sp| sp.enabled) {
        return Err(SimError::Validation("no enabled service points configured".into()));
    }
    Ok(())
}

/// Category → service point resolution with first-enabled fallback.
struct Router<'a> {
    routes: HashMap<&'a str, &'a str>,
    enabled: Vec<&'a ServicePoint>,
}

impl<'a> Router<'a> {
    fn new(service_points: &'a [ServicePoint], routing: &'a [CategoryRoute]) -> Self {
        Self {
            routes: routing
                .iter()
                .map(|r| (r.category.as_str(), r.service_point_id.as_str()))
                .collect(),
            enabled: service_points.iter().filter(|sp| sp.enabled).collect(),
        }
    }

    fn route(&self, category: &str) -> Option<ServicePointId> {
        self.routes
            .get(category)
            .and_then(|id| self.enabled.iter().find(|sp| sp.id == *id))
            .or_else(|| self.enabled.first())
            .map(|sp| sp.id.clone())
    }
}
