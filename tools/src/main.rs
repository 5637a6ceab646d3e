//! queue-bench: headless runner for the pharmacy queue policy benchmark.
//!
//! Usage:
//!   queue-bench --seed 12345 --policy FIFO --switch-30 PRIORITY --db run.db
//!   queue-bench --seed 12345 --follow-advice
//!   queue-bench --ipc-mode            (newline-delimited JSON on stdin/stdout)

use anyhow::Result;
use pharmq_core::{
    analyzer::Recommendation,
    config::SimConfig,
    controller::{PhaseMetric, PhaseReport, RunController, RunPhase},
    error::SimError,
    policy::SchedulingPolicy,
    store::SimStore,
};
use std::env;
use std::io::{self, BufRead, Write};

#[derive(serde::Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum IpcCommand {
    GetState,
    SelectPolicy {
        policy: SchedulingPolicy,
    },
    Prepare,
    Start,
    Continue {
        #[serde(default)]
        policy: Option<SchedulingPolicy>,
    },
    Cleanup,
    Quit,
}

#[derive(serde::Serialize)]
struct UiState<'a> {
    run_id: Option<&'a str>,
    phase: RunPhase,
    simulation_mode: bool,
    policy: SchedulingPolicy,
    total_requests: usize,
    processed_count: usize,
    completed_count: usize,
    metrics: &'a [PhaseMetric],
    recommendation: Option<&'a Recommendation>,
    error: Option<UiError>,
}

#[derive(serde::Serialize)]
struct UiError {
    kind: String,
    message: String,
}

impl From<&SimError> for UiError {
    fn from(e: &SimError) -> Self {
        Self {
            kind: format!("{:?}", e.kind()),
            message: e.to_string(),
        }
    }
}

fn main() -> Result<()> {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    let seed = parse_arg(&args, "--seed", 42u64);
    let ipc_mode = has_flag(&args, "--ipc-mode");
    let follow_advice = has_flag(&args, "--follow-advice");
    let keep = has_flag(&args, "--keep");
    let db = string_arg(&args, "--db").unwrap_or(":memory:");
    let data_dir = string_arg(&args, "--data-dir").unwrap_or("./data");
    let initial = policy_arg(&args, "--policy")?;
    let switch_30 = policy_arg(&args, "--switch-30")?;
    let switch_70 = policy_arg(&args, "--switch-70")?;

    let config = SimConfig::load(data_dir)?;
    let store = SimStore::open(db)?;
    store.migrate()?;
    store.seed_reference_data(&config)?;

    let mut controller = RunController::new(config, store, seed);
    if let Some(policy) = initial {
        controller.select_initial_policy(policy)?;
    }

    if ipc_mode {
        return run_ipc_loop(&mut controller);
    }

    println!("Pharmacy queue benchmark: queue-bench");
    println!("  seed:      {seed}");
    println!("  db:        {db}");
    println!("  data_dir:  {data_dir}");
    println!("  policy:    {}", controller.state().policy);
    println!();

    let report = controller.prepare()?;
    println!("Prepared {} synthetic requests for {}", report.total, report.sim_date);
    for (category, n) in &report.by_category {
        println!("  {category:<12} {n}");
    }
    println!();

    let phase_1 = controller.start()?;
    print_phase(&phase_1);
    let next = choose_policy(switch_30, follow_advice, phase_1.recommendation.as_ref());
    let phase_2 = controller.continue_to_next(next)?;
    print_phase(&phase_2);
    let next = choose_policy(switch_70, follow_advice, phase_2.recommendation.as_ref());
    let phase_3 = controller.continue_to_next(next)?;
    print_phase(&phase_3);

    let summary = controller.summary()?;
    println!("=== RUN SUMMARY ===");
    println!("  run_id:          {}", summary.run_id.as_deref().unwrap_or("-"));
    println!("  requests:        {}", summary.total_requests);
    println!("  processed:       {}", summary.processed_count);
    println!("  completed:       {}", summary.completed_count);
    println!("  avg turnaround:  {:.1} min", summary.avg_turnaround_minutes);
    println!("  best phase:      {}", summary.best_phase.as_deref().unwrap_or("-"));

    if !keep {
        controller.cleanup()?;
    }
    Ok(())
}

/// An explicit switch wins; otherwise follow a switch recommendation if asked.
fn choose_policy(
    explicit: Option<SchedulingPolicy>,
    follow_advice: bool,
    recommendation: Option<&Recommendation>,
) -> Option<SchedulingPolicy> {
    explicit.or_else(|| {
        recommendation
            .filter(|r| follow_advice && r.is_switch())
            .map(|r| r.recommended_policy)
    })
}

fn print_phase(report: &PhaseReport) {
    let m = &report.metric;
    println!(
        "{} [{}] processed {} | completed {} (+{}) | avg wait {:.1} min",
        m.phase,
        m.policy,
        report.outcome.processed_count,
        m.completed_count,
        m.throughput,
        m.avg_wait_minutes
    );
    if report.outcome.shortfall > 0 {
        println!("  pool ran dry: {} selections short", report.outcome.shortfall);
    }
    if let Some(rec) = &report.recommendation {
        println!(
            "  advice: {} ({:?}): {}",
            rec.recommended_policy, rec.confidence, rec.reason
        );
    }
    println!();
}

fn run_ipc_loop(controller: &mut RunController<SimStore>) -> Result<()> {
    let stdin = io::stdin();
    let mut stdout = io::stdout();
    let mut handle = stdin.lock();
    let mut buffer = String::new();

    loop {
        buffer.clear();
        let bytes_read = handle.read_line(&mut buffer)?;
        if bytes_read == 0 {
            break; // EOF
        }

        let cmd: IpcCommand = match serde_json::from_str(&buffer) {
            Ok(c) => c,
            Err(e) => {
                let err_json = serde_json::json!({ "error": e.to_string() });
                writeln!(stdout, "{}", err_json)?;
                stdout.flush()?;
                continue;
            }
        };

        // Controller errors are reported to the UI, never fatal to the loop.
        let result = match cmd {
            IpcCommand::Quit => break,
            IpcCommand::GetState => Ok(()),
            IpcCommand::SelectPolicy { policy } => controller.select_initial_policy(policy),
            IpcCommand::Prepare => controller.prepare().map(|_| ()),
            IpcCommand::Start => controller.start().map(|_| ()),
            IpcCommand::Continue { policy } => controller.continue_to_next(policy).map(|_| ()),
            IpcCommand::Cleanup => controller.cleanup().map(|_| ()),
        };
        let error = result.as_ref().err().map(UiError::from);
        if let Err(e) = &result {
            log::warn!("command failed: {e}");
        }

        let state = build_ui_state(controller, error);
        writeln!(stdout, "{}", serde_json::to_string(&state)?)?;
        stdout.flush()?;
    }
    Ok(())
}

fn build_ui_state(controller: &RunController<SimStore>, error: Option<UiError>) -> UiState<'_> {
    let s = controller.state();
    UiState {
        run_id: s.run_id.as_deref(),
        phase: s.phase,
        simulation_mode: s.phase.is_simulation_mode(),
        policy: s.policy,
        total_requests: s.total_requests,
        processed_count: s.processed_count,
        completed_count: s.completed_count,
        metrics: &s.metrics,
        recommendation: s.recommendation.as_ref(),
        error,
    }
}

fn parse_arg<T: std::str::FromStr + Copy>(args: &[String], flag: &str, default: T) -> T {
    args.windows(2)
        .find(|w| w[0] == flag)
        .and_then(|w| w[1].parse().ok())
        .unwrap_or(default)
}

fn string_arg<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
    args.windows(2)
        .find(|w| w[0] == flag)
        .map(|w| w[1].as_str())
}

fn has_flag(args: &[String], flag: &str) -> bool {
    args.iter().any(|a| a == flag)
}

fn policy_arg(args: &[String], flag: &str) -> Result<Option<SchedulingPolicy>> {
    string_arg(args, flag)
        .map(|s| {
            SchedulingPolicy::parse(s).ok_or_else(|| anyhow::anyhow!("{flag}: unknown policy '{s}'"))
        })
        .transpose()
}
