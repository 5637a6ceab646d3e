use crate::{
    model::{category, CategoryRoute, ServicePoint, TypeConfig},
    policy::SchedulingPolicy,
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

// ── Workload generation ────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CategoryShare {
    pub category: String,
    pub share: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkloadConfig {
    /// Population size is drawn uniformly from `min_requests..=max_requests`.
    pub min_requests: u32,
    pub max_requests: u32,
    /// Fixed category mix; shares of disabled/unknown categories are dropped.
    pub category_mix: Vec<CategoryShare>,
    /// Share spread round-robin over enabled categories not in the mix.
    pub remainder_share: f64,
    /// Arrivals fall in `[open_hour:00, close_hour:00)`.
    pub open_hour: u32,
    pub close_hour: u32,
    pub insert_batch_size: usize,
    /// Calendar day for arrivals. `None` means today.
    #[serde(default)]
    pub sim_date: Option<NaiveDate>,
}

impl Default for WorkloadConfig {
    fn default() -> Self {
        Self {
            min_requests: 75,
            max_requests: 150,
            category_mix: vec![
                CategoryShare { category: category::GENERAL.into(), share: 0.50 },
                CategoryShare { category: category::ELDERLY.into(), share: 0.20 },
                CategoryShare { category: category::APPOINTMENT.into(), share: 0.15 },
                CategoryShare { category: category::URGENT.into(), share: 0.10 },
            ],
            remainder_share: 0.05,
            open_hour: 8,
            close_hour: 17,
            insert_batch_size: 25,
            sim_date: None,
        }
    }
}

// ── Progressive processing ─────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessingConfig {
    /// Extra 0..=jitter_max_minutes added to each base wait.
    pub jitter_max_minutes: u32,
    pub service_minutes_min: u32,
    pub service_minutes_max: u32,
    /// Priority points gained per waiting minute under MULTILEVEL_FEEDBACK.
    pub aging_per_minute: f64,
    /// Restrict selection to one service point's capability set.
    #[serde(default)]
    pub target_service_point: Option<String>,
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self {
            jitter_max_minutes: 5,
            service_minutes_min: 3,
            service_minutes_max: 12,
            aging_per_minute: crate::policy::DEFAULT_AGING_PER_MINUTE,
            target_service_point: None,
        }
    }
}

// ── Decision analysis ──────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// A service point with more WAITING requests than this is a bottleneck.
    pub bottleneck_threshold: usize,
    /// Minimum score gain before a switch is recommended.
    pub significance_margin: f64,
    pub high_confidence_gap: f64,
    pub medium_confidence_gap: f64,
    /// Urgent+elderly share above which PRIORITY is predicted to help.
    pub priority_share_threshold: f64,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            bottleneck_threshold: 20,
            significance_margin: 1.0,
            high_confidence_gap: 3.0,
            medium_confidence_gap: 1.5,
            priority_share_threshold: 0.30,
        }
    }
}

// ── Files under data/ ──────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
struct QueueTypesFile {
    queue_types: Vec<TypeConfig>,
}

#[derive(Debug, Clone, Deserialize)]
struct ServicePointsFile {
    service_points: Vec<ServicePoint>,
    #[serde(default)]
    routing: Vec<CategoryRoute>,
}

#[derive(Debug, Clone, Deserialize)]
struct SimulationFile {
    /// Absent: taken from the queue types, see `policy_from_queue_types`.
    #[serde(default)]
    default_policy: Option<SchedulingPolicy>,
    #[serde(default)]
    workload: WorkloadConfig,
    #[serde(default)]
    processing: ProcessingConfig,
    #[serde(default)]
    analysis: AnalysisConfig,
}

#[derive(Debug, Clone)]
pub struct SimConfig {
    pub queue_types: Vec<TypeConfig>,
    pub service_points: Vec<ServicePoint>,
    pub routing: Vec<CategoryRoute>,
    pub default_policy: SchedulingPolicy,
    pub workload: WorkloadConfig,
    pub processing: ProcessingConfig,
    pub analysis: AnalysisConfig,
}

impl SimConfig {
    /// Load from the data/ directory.
    /// In tests, use SimConfig::default_test().
    pub fn load(data_dir: &str) -> anyhow::Result<Self> {
        let types_path = format!("{data_dir}/queue_types.json");
        let types_content = std::fs::read_to_string(&types_path)
            .map_err(|e| anyhow::anyhow!("Cannot read {types_path}: {e}"))?;
        let types_file: QueueTypesFile = serde_json::from_str(&types_content)
            .map_err(|e| anyhow::anyhow!("Cannot parse {types_path}: {e}"))?;

        let sp_path = format!("{data_dir}/service_points.json");
        let sp_content = std::fs::read_to_string(&sp_path)
            .map_err(|e| anyhow::anyhow!("Cannot read {sp_path}: {e}"))?;
        let sp_file: ServicePointsFile = serde_json::from_str(&sp_content)
            .map_err(|e| anyhow::anyhow!("Cannot parse {sp_path}: {e}"))?;

        let sim_path = format!("{data_dir}/simulation.json");
        let sim_content = std::fs::read_to_string(&sim_path)
            .map_err(|e| anyhow::anyhow!("Cannot read {sim_path}: {e}"))?;
        let sim_file: SimulationFile = serde_json::from_str(&sim_content)
            .map_err(|e| anyhow::anyhow!("Cannot parse {sim_path}: {e}"))?;

        let default_policy = sim_file
            .default_policy
            .unwrap_or_else(|| Self::policy_from_queue_types(&types_file.queue_types));
        let config = Self {
            queue_types: types_file.queue_types,
            service_points: sp_file.service_points,
            routing: sp_file.routing,
            default_policy,
            workload: sim_file.workload,
            processing: sim_file.processing,
            analysis: sim_file.analysis,
        };
        config.check()?;
        Ok(config)
    }

    /// Initial policy suggested by reference data: the `default_policy` of
    /// the first enabled queue type that has one, else FIFO.
    pub fn policy_from_queue_types(queue_types: &[TypeConfig]) -> SchedulingPolicy {
        queue_types
            .iter()
            .filter(|t| t.enabled)
            .find_map(|t| t.default_policy)
            .unwrap_or(SchedulingPolicy::Fifo)
    }

    /// Reject tunables no run could use. Reference data emptiness is
    /// reported later, at generation time.
    pub fn check(&self) -> anyhow::Result<()> {
        let w = &self.workload;
        if w.min_requests == 0 || w.min_requests > w.max_requests {
            anyhow::bail!(
                "workload request range {}..={} is invalid",
                w.min_requests,
                w.max_requests
            );
        }
        if w.open_hour >= w.close_hour || w.close_hour > 24 {
            anyhow::bail!("service window {}:00-{}:00 is invalid", w.open_hour, w.close_hour);
        }
        if w.insert_batch_size == 0 {
            anyhow::bail!("insert_batch_size must be > 0");
        }
        let p = &self.processing;
        if p.service_minutes_min > p.service_minutes_max {
            anyhow::bail!(
                "service minutes range {}..={} is invalid",
                p.service_minutes_min,
                p.service_minutes_max
            );
        }
        Ok(())
    }

    /// Config with hardcoded defaults for use in unit tests.
    pub fn default_test() -> Self {
        let queue_type = |code: &str, name: &str, weight: u8| TypeConfig {
            code: code.into(),
            name: name.into(),
            priority_weight: Some(weight),
            default_policy: None,
            enabled: true,
        };
        let queue_types = vec![
            queue_type(category::URGENT, "Urgent", 10),
            queue_type(category::ELDERLY, "Elderly / Disabled", 8),
            queue_type(category::APPOINTMENT, "Appointment", 6),
            queue_type(category::GENERAL, "General", 4),
            queue_type("CONSULT", "Pharmacist Consult", 3),
        ];

        let all_codes: Vec<String> = queue_types.iter().map(|t| t.code.clone()).collect();
        let service_points = vec![
            ServicePoint {
                id: "sp-01".into(),
                name: "Dispensing Window 1".into(),
                capabilities: all_codes.clone(),
                enabled: true,
            },
            ServicePoint {
                id: "sp-02".into(),
                name: "Dispensing Window 2".into(),
                capabilities: vec![category::GENERAL.into(), category::APPOINTMENT.into()],
                enabled: true,
            },
            ServicePoint {
                id: "sp-03".into(),
                name: "Priority Counter".into(),
                capabilities: vec![category::URGENT.into(), category::ELDERLY.into()],
                enabled: true,
            },
        ];

        let routing = vec![
            CategoryRoute { category: category::URGENT.into(), service_point_id: "sp-03".into() },
            CategoryRoute { category: category::ELDERLY.into(), service_point_id: "sp-03".into() },
            CategoryRoute { category: category::GENERAL.into(), service_point_id: "sp-02".into() },
            CategoryRoute { category: category::APPOINTMENT.into(), service_point_id: "sp-02".into() },
        ];

        Self {
            queue_types,
            service_points,
            routing,
            default_policy: SchedulingPolicy::Fifo,
            workload: WorkloadConfig {
                sim_date: NaiveDate::from_ymd_opt(2026, 3, 2),
                ..WorkloadConfig::default()
            },
            processing: ProcessingConfig::default(),
            analysis: AnalysisConfig::default(),
        }
    }
}
