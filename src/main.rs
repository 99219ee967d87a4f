use anyhow::{bail, Context, Result};
use rusqlite::Connection;
use std::collections::{BTreeSet, HashMap};
use std::env;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use ramp_transform::{
    record_run, setup_database, write_table, MagnitudeSpec, OutputKind, RampVector, RunRecord,
    Table, Taxonomy, TaxonomyIndex, TransformConfig, TransformContext, TransformMode,
    TransformRequest,
};

const USAGE: &str = "\
Usage:
  ramp-transform apply --taxonomy T.json --magnitudes M.json --input in.csv --output out.(csv|sqlite)
                       [--config C.json] [--ramp R.json] [--variables v1,v2] [--categories c1,c2]
                       [--regions r1,r2] [--strategy N] [--mode scale|reduce] [--id RUN_ID]
  ramp-transform plan  --taxonomy T.json --magnitudes M.json
                       [--config C.json] [--variables v1,v2] [--categories c1,c2] [--mode scale|reduce]";

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args: Vec<String> = env::args().collect();

    match args.get(1).map(String::as_str) {
        Some("apply") => run_apply(&parse_flags(&args[2..])?)?,
        Some("plan") => run_plan(&parse_flags(&args[2..])?)?,
        _ => {
            println!("{}", USAGE);
        }
    }

    Ok(())
}

// ============================================================================
// ARGUMENTS
// ============================================================================

fn parse_flags(args: &[String]) -> Result<HashMap<String, String>> {
    let mut flags = HashMap::new();
    let mut iter = args.iter();

    while let Some(arg) = iter.next() {
        let Some(name) = arg.strip_prefix("--") else {
            bail!("Unexpected argument '{}'\n\n{}", arg, USAGE);
        };
        let value = iter
            .next()
            .with_context(|| format!("Missing value for --{}", name))?;
        flags.insert(name.to_string(), value.clone());
    }

    Ok(flags)
}

fn required<'a>(flags: &'a HashMap<String, String>, name: &str) -> Result<&'a str> {
    flags
        .get(name)
        .map(String::as_str)
        .with_context(|| format!("Missing required flag --{}\n\n{}", name, USAGE))
}

fn list(flags: &HashMap<String, String>, name: &str) -> Option<BTreeSet<String>> {
    flags.get(name).map(|value| {
        value
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect()
    })
}

fn mode(flags: &HashMap<String, String>) -> Result<TransformMode> {
    match flags.get("mode") {
        None => Ok(TransformMode::Scale),
        Some(value) => TransformMode::parse(value)
            .with_context(|| format!("Unknown mode '{}' (expected scale or reduce)", value)),
    }
}

// ============================================================================
// SHARED SETUP
// ============================================================================

struct Session {
    config: TransformConfig,
    context: TransformContext,
    spec: MagnitudeSpec,
    mode: TransformMode,
    categories: Option<BTreeSet<String>>,
}

fn load_session(flags: &HashMap<String, String>) -> Result<Session> {
    let config = match flags.get("config") {
        Some(path) => TransformConfig::from_file(path)?,
        None => TransformConfig::default(),
    };

    println!("\n🌳 Loading taxonomy...");
    let taxonomy = Taxonomy::from_file(required(flags, "taxonomy")?)?;
    println!(
        "✓ {} leaves, {} groups, {} variables",
        taxonomy.leaf_count(),
        taxonomy.group_count(),
        taxonomy.variable_count()
    );

    let variables = list(flags, "variables")
        .unwrap_or_else(|| taxonomy.all_variables(config.namespace.as_deref()));

    let spec_path = required(flags, "magnitudes")?;
    let content = fs::read_to_string(spec_path)
        .with_context(|| format!("Failed to read magnitudes file: {}", spec_path))?;
    let spec: MagnitudeSpec =
        serde_json::from_str(&content).context("Failed to parse magnitudes JSON")?;
    println!("✓ {} magnitude keys over {} variables in scope", spec.len(), variables.len());

    let context = TransformContext::new(Arc::new(taxonomy), variables, &config.baseline_period)
        .with_fields(config.fields.clone());

    Ok(Session {
        config,
        context,
        spec,
        mode: mode(flags)?,
        categories: list(flags, "categories"),
    })
}

// ============================================================================
// COMMANDS
// ============================================================================

fn run_plan(flags: &HashMap<String, String>) -> Result<()> {
    let session = load_session(flags)?;

    let descriptors = session
        .context
        .plan(session.mode, &session.spec, session.categories.as_ref())?;

    println!("\n📋 Resolved plan ({})", session.mode.as_str());
    println!("{}", serde_json::to_string_pretty(&descriptors)?);
    println!("🔑 Fingerprint: {}", descriptors.fingerprint()?);

    Ok(())
}

fn run_apply(flags: &HashMap<String, String>) -> Result<()> {
    println!("🎚️  Ramp Transform - {}", ramp_transform::VERSION);
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    let session = load_session(flags)?;
    let fields = &session.config.fields;

    // 1. Load table
    let input = required(flags, "input")?;
    println!("\n📂 Loading table...");
    let table = Table::from_csv_path(
        input,
        &[fields.time_period.as_str()],
        &[fields.region.as_str(), fields.strategy_id.as_str()],
    )?;
    println!("✓ Loaded {} rows × {} columns", table.n_rows(), table.n_columns());

    // 2. Ramp vector: explicit file, else generated from config
    let n_periods = session.context.active_period_count(&table)?;
    let ramp = match flags.get("ramp") {
        Some(path) => {
            let content = fs::read_to_string(path)
                .with_context(|| format!("Failed to read ramp file: {}", path))?;
            serde_json::from_str::<RampVector>(&content).context("Failed to parse ramp JSON")?
        }
        None => RampVector::from_config(&session.config.ramp, n_periods),
    };
    println!("✓ Ramp over {} periods from baseline {}", ramp.len(), session.config.baseline_period);

    // 3. Transform
    let strategy_id = match flags.get("strategy") {
        Some(value) => Some(
            value
                .parse::<i64>()
                .with_context(|| format!("Invalid strategy id '{}'", value))?,
        ),
        None => None,
    };
    let request = TransformRequest {
        categories: session.categories.clone(),
        regions: list(flags, "regions"),
        strategy_id,
    };

    println!("\n🔁 Applying {}...", session.mode.as_str());
    let outcome = session
        .context
        .run(session.mode, &table, &session.spec, &ramp, &request)?;
    println!(
        "✓ {} variables, {} columns transformed",
        outcome.descriptors.len(),
        outcome.descriptors.cell_count()
    );

    // 4. Write output
    let output = Path::new(required(flags, "output")?);
    match session.config.output_kind(output) {
        OutputKind::Csv => {
            outcome.table.to_csv_path(output)?;
            println!("\n💾 Wrote {}", output.display());
        }
        OutputKind::Sqlite => {
            let table_name = &session.config.output.table_name;
            let mut conn = Connection::open(output)
                .with_context(|| format!("Failed to open database {}", output.display()))?;
            setup_database(&conn)?;

            let rows = write_table(&mut conn, table_name, &outcome.table)?;
            let run = RunRecord::new(
                flags.get("id").cloned(),
                session.mode.as_str(),
                &outcome.descriptors,
                rows,
                table_name,
            )?;
            record_run(&conn, &run)?;

            println!("\n💾 Wrote {} rows to {}:{}", rows, output.display(), table_name);
            println!("✓ Run {} recorded", run.run_id);
        }
    }

    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(values: &[&str]) -> Vec<String> {
        values.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_parse_flags() {
        let flags = parse_flags(&args(&["--mode", "reduce", "--regions", "chile, peru"])).unwrap();
        assert_eq!(mode(&flags).unwrap(), TransformMode::ReduceDemand);
        assert_eq!(
            list(&flags, "regions").unwrap(),
            BTreeSet::from(["chile".to_string(), "peru".to_string()])
        );
        assert!(required(&flags, "taxonomy").is_err());
    }

    #[test]
    fn test_parse_flags_rejects_bad_input() {
        assert!(parse_flags(&args(&["apply"])).is_err());
        assert!(parse_flags(&args(&["--mode"])).is_err());

        let flags = parse_flags(&args(&["--mode", "shrink"])).unwrap();
        assert!(mode(&flags).is_err());
    }
}
