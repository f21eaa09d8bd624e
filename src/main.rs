use std::process::ExitCode;

use tracing_subscriber::EnvFilter;

use omop_cohort::pipeline;
use omop_cohort::{BuildOptions, CohortError, CohortExpression, Dialect};

const USAGE: &str = "\
Usage: omop-cohort <command> [options]

Commands:
  compile   Compile a cohort definition to SQL on stdout
  check     Parse a cohort definition and report unrecognized fields

Options:
  --cohort <file>         Cohort definition JSON (required)
  --dialect <name>        duckdb | postgres | spark (default: duckdb)
  --cdm-schema <name>     Schema holding the CDM tables
  --vocab-schema <name>   Schema holding the vocabulary tables
  --config <file>         TOML build profile (overridden by flags)
";

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("omop_cohort=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    match run() {
        Ok(code) => code,
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::from(err.exit_code() as u8)
        }
    }
}

struct Args {
    command: String,
    cohort: Option<String>,
    dialect: Option<String>,
    cdm_schema: Option<String>,
    vocab_schema: Option<String>,
    config: Option<String>,
}

fn parse_args() -> Result<Args, String> {
    let mut raw = std::env::args().skip(1);
    let command = raw.next().ok_or("missing command")?;
    let mut args = Args {
        command,
        cohort: None,
        dialect: None,
        cdm_schema: None,
        vocab_schema: None,
        config: None,
    };
    while let Some(flag) = raw.next() {
        let mut value = || raw.next().ok_or(format!("{flag} requires a value"));
        match flag.as_str() {
            "--cohort" => args.cohort = Some(value()?),
            "--dialect" => args.dialect = Some(value()?),
            "--cdm-schema" => args.cdm_schema = Some(value()?),
            "--vocab-schema" => args.vocab_schema = Some(value()?),
            "--config" => args.config = Some(value()?),
            other => return Err(format!("unknown option {other}")),
        }
    }
    Ok(args)
}

fn run() -> Result<ExitCode, CohortError> {
    let args = match parse_args() {
        Ok(args) => args,
        Err(message) => {
            eprintln!("{message}\n\n{USAGE}");
            return Ok(ExitCode::from(64));
        }
    };

    let cohort_path = match &args.cohort {
        Some(path) => path.clone(),
        None => {
            eprintln!("--cohort is required\n\n{USAGE}");
            return Ok(ExitCode::from(64));
        }
    };
    let text = std::fs::read_to_string(&cohort_path).map_err(|err| CohortError::Parse {
        path: cohort_path.clone(),
        expected: format!("readable file: {err}"),
    })?;

    match args.command.as_str() {
        "compile" => {
            let expression = CohortExpression::from_json(&text)?;
            let mut options = load_options(args.config.as_deref())?;
            if let Some(name) = &args.dialect {
                options.dialect = Dialect::from_name(name).ok_or_else(|| {
                    CohortError::invalid(format!("unknown dialect {name}"))
                })?;
            }
            if args.cdm_schema.is_some() {
                options.cdm_schema = args.cdm_schema.clone();
            }
            if args.vocab_schema.is_some() {
                options.vocabulary_schema = args.vocab_schema.clone();
            }
            // A single self-contained statement is the useful CLI output.
            options.materialize_stages = false;
            options.materialize_codesets = false;
            let sql = pipeline::compile_cohort(&expression, &options)?;
            println!("{sql}");
            Ok(ExitCode::SUCCESS)
        }
        "check" => {
            let (expression, unknown) = CohortExpression::from_json_strict(&text)?;
            expression.validate()?;
            if unknown.is_empty() {
                println!("ok: {} concept sets, {} primary criteria",
                    expression.concept_sets.len(),
                    expression.primary_criteria.criteria_list.len());
            } else {
                println!("{} unrecognized field(s):", unknown.len());
                for field in &unknown {
                    println!("  {field}");
                }
            }
            Ok(ExitCode::SUCCESS)
        }
        other => {
            eprintln!("unknown command {other}\n\n{USAGE}");
            Ok(ExitCode::from(64))
        }
    }
}

fn load_options(config: Option<&str>) -> Result<BuildOptions, CohortError> {
    match config {
        None => Ok(BuildOptions::default()),
        Some(path) => {
            let text = std::fs::read_to_string(path).map_err(|err| CohortError::Parse {
                path: path.to_string(),
                expected: format!("readable file: {err}"),
            })?;
            toml::from_str(&text).map_err(|err| CohortError::Parse {
                path: path.to_string(),
                expected: err.to_string(),
            })
        }
    }
}
