//! staffing-runner: headless runner for the staffing engine.
//!
//! Usage:
//!   staffing-runner --data-dir ./data --db pharmacies.db [--import records.json] [--json report.json]
//!   staffing-runner --data-dir ./data --bloky 126000 --trzby 2500000 --typ "B - shopping" --rx 0.5
//!                   [--pharmacy 25] [--productivity-z 0.4] [--variability-z 0.2]

use anyhow::{Context, Result};
use pharmstaff_core::{
    engine::{NetworkAssessment, StaffingEngine, StaffingPrediction, StaffingRequest},
    record::PharmacyRecord,
    sensitivity::Sensitivity,
    store::PharmacyStore,
};
use std::env;

#[derive(serde::Serialize)]
struct BatchReport<'a> {
    generated_at: String,
    model:        &'a str,
    data_dir:     &'a str,
    assessment:   &'a NetworkAssessment,
}

#[derive(serde::Serialize)]
struct ManualReport<'a> {
    generated_at: String,
    prediction:   &'a StaffingPrediction,
    sensitivity:  &'a Sensitivity,
}

fn main() -> Result<()> {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    let data_dir = str_arg(&args, "--data-dir").unwrap_or("./data");
    let json_out = str_arg(&args, "--json");

    let engine = StaffingEngine::load(data_dir)
        .with_context(|| format!("loading engine from {data_dir}"))?;

    if str_arg(&args, "--bloky").is_some() {
        run_manual(&engine, &args, json_out)
    } else {
        run_batch(&engine, &args, data_dir, json_out)
    }
}

fn run_manual(engine: &StaffingEngine, args: &[String], json_out: Option<&str>) -> Result<()> {
    let bloky = parse_arg(args, "--bloky", 0.0f64);
    let trzby = parse_arg(args, "--trzby", 0.0f64);
    let rx = parse_arg(args, "--rx", 0.0f64);
    let typ = str_arg(args, "--typ").unwrap_or("");
    let segment = engine.segments().resolve_label(typ);

    let mut request = StaffingRequest::new(bloky, trzby, segment, rx)
        .with_productivity_z(parse_arg(args, "--productivity-z", 0.0f64))
        .with_variability_z(parse_arg(args, "--variability-z", 0.0f64));
    if let Some(id) = str_arg(args, "--pharmacy").and_then(|v| v.parse().ok()) {
        request = request.with_pharmacy(id);
    }

    let prediction = engine.predict(&request)?;
    let sensitivity = engine.sensitivity(bloky, trzby, rx, segment)?;

    println!("=== RECOMMENDATION ===");
    println!("  segment:        {}", segment.map_or("fallback", |s| s.label()));
    println!("  NET FTE:        {:.2}", prediction.predicted_net);
    println!("  GROSS FTE:      {:.1}", prediction.display.total);
    println!(
        "    F / L / ZF:   {:.1} / {:.1} / {:.1}",
        prediction.display.roles.pharmacist,
        prediction.display.roles.assistant,
        prediction.display.roles.deputy
    );
    println!(
        "  range:          {:.1} to {:.1}",
        prediction.tolerance.min, prediction.tolerance.max
    );
    println!(
        "  factors:        {:?}{}",
        prediction.conversion.source,
        if prediction.factors_in_gross { "" } else { " (reported only)" }
    );
    println!();
    println!("=== SENSITIVITY (GROSS FTE) ===");
    println!("  base:           {:.2}", sensitivity.base_fte);
    println!("  bloky +10%:     {:+.2}", sensitivity.bloky_10pct);
    println!("  trzby +10%:     {:+.2}", sensitivity.trzby_10pct);
    println!("  Rx +10pp:       {:+.2}", sensitivity.rx_10pp);

    if let Some(path) = json_out {
        let report = ManualReport {
            generated_at: chrono::Utc::now().to_rfc3339(),
            prediction:   &prediction,
            sensitivity:  &sensitivity,
        };
        write_json(path, &report)?;
    }
    Ok(())
}

fn run_batch(
    engine: &StaffingEngine,
    args: &[String],
    data_dir: &str,
    json_out: Option<&str>,
) -> Result<()> {
    let db = str_arg(args, "--db").unwrap_or(":memory:");
    let mut store = if db == ":memory:" {
        PharmacyStore::in_memory()?
    } else {
        PharmacyStore::open(db)?
    };
    store.migrate()?;

    if let Some(path) = str_arg(args, "--import") {
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Cannot read {path}: {e}"))?;
        let records: Vec<PharmacyRecord> = serde_json::from_str(&content)?;
        for record in &records {
            store.insert_pharmacy(record)?;
        }
        log::info!("runner: imported {} records from {path}", records.len());
    }

    let records = store.all_pharmacies()?;
    if records.is_empty() {
        log::warn!("runner: no pharmacies in {db}");
    }
    let assessment = engine.assess_network(&records);
    print_summary(&assessment);

    if let Some(path) = json_out {
        let report = BatchReport {
            generated_at: chrono::Utc::now().to_rfc3339(),
            model:        engine.model_name(),
            data_dir,
            assessment:   &assessment,
        };
        write_json(path, &report)?;
    }
    Ok(())
}

fn print_summary(assessment: &NetworkAssessment) {
    let s = &assessment.summary;
    let t = &s.totals;
    println!("=== NETWORK SUMMARY ===");
    println!("  pharmacies:      {}", t.pharmacies);
    println!("  skipped:         {}", assessment.skipped.len());
    println!("  status:          {:?}", t.status);
    println!("  actual GROSS:    {:.1} FTE", t.total_actual);
    println!("  predicted GROSS: {:.1} FTE", t.total_predicted);
    println!("  total gap:       {:+.1} FTE ({:+.1} %)", t.total_gap, t.diff_pct);
    println!("  understaffed:    {}", t.understaffed);
    println!("  balanced:        {}", t.balanced);
    println!("  overstaffed:     {}", t.overstaffed);
    println!("  urgent:          {}", s.urgent);
    println!("  optimize:        {}", s.optimize);
    println!("  monitor:         {}", s.monitor);
    println!("  outliers:        {}", s.outliers);
    println!("  small:           {}", s.small_pharmacies);
    println!("  revenue at risk: {} EUR", t.revenue_at_risk);

    println!();
    println!("=== BY SEGMENT ===");
    for (label, seg) in &s.by_segment {
        println!(
            "  {label:<22} {:>4} pharmacies  {:>3}/{:>3}/{:>3}  gap {:+6.1} ({:+5.1} %)  {:<12}  risk {:>10} EUR",
            seg.pharmacies,
            seg.understaffed,
            seg.balanced,
            seg.overstaffed,
            seg.total_gap,
            seg.diff_pct,
            format!("{:?}", seg.status),
            seg.revenue_at_risk
        );
    }

    let mut urgent: Vec<&StaffingPrediction> = assessment
        .predictions
        .iter()
        .filter(|p| p.revenue_at_risk > 0)
        .collect();
    urgent.sort_by(|a, b| b.revenue_at_risk.cmp(&a.revenue_at_risk));
    if !urgent.is_empty() {
        println!();
        println!("=== TOP REVENUE AT RISK ===");
        for p in urgent.iter().take(10) {
            println!(
                "  #{:<5} gap {:+.1}  {:>10} EUR{}",
                p.pharmacy_id.unwrap_or_default(),
                p.fte_gap.unwrap_or_default(),
                p.revenue_at_risk,
                if p.is_small_pharmacy { "  (small)" } else { "" }
            );
        }
    }
}

fn write_json<T: serde::Serialize>(path: &str, value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    std::fs::write(path, json).with_context(|| format!("writing {path}"))?;
    println!();
    println!("report written to {path}");
    Ok(())
}

fn str_arg<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
    args.windows(2).find(|w| w[0] == flag).map(|w| w[1].as_str())
}

fn parse_arg<T: std::str::FromStr + Copy>(args: &[String], flag: &str, default: T) -> T {
    args.windows(2)
        .find(|w| w[0] == flag)
        .and_then(|w| w[1].parse().ok())
        .unwrap_or(default)
}
