use apiscout::discovery::ApiCandidate;
use apiscout::{DiscoverOptions, DiscoverResult, Discoverer, Status};

use super::list::{format_output, table::Table};
use crate::config::Config;
use crate::utils::errors::DEFAULT_EXIT_CODE;
use crate::{DiscoverArgs, ListingFormat};

const API_KEY_VAR: &str = "APISCOUT_API_KEY";

/// Summary fields of a result, one per row.
struct Summary<'a>(&'a DiscoverResult);

// JSON output is the full result
impl serde::Serialize for Summary<'_> {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.0.serialize(serializer)
    }
}

impl From<Summary<'_>> for Table {
    fn from(Summary(result): Summary<'_>) -> Self {
        let mut tab = Table::new();

        tab.set_header(vec!["FIELD", "VALUE"]);

        let opt = |value: Option<&str>| value.unwrap_or_default().to_string();

        tab.add_row(vec!["name".to_string(), opt(result.name.as_deref())]);
        tab.add_row(vec!["domain".to_string(), result.domain.clone()]);
        tab.add_row(vec!["source".to_string(), result.source.to_string()]);
        tab.add_row(vec!["status".to_string(), result.status.to_string()]);
        tab.add_row(vec![
            "failure_reason".to_string(),
            result.failure_reason.map(|r| r.to_string()).unwrap_or_default(),
        ]);
        tab.add_row(vec!["best_url".to_string(), opt(result.api.best_url.as_deref())]);

        if let Some(registry) = &result.registry {
            tab.add_row(vec!["registry".to_string(), registry.slug.clone()]);
        }

        tab.add_row(vec!["description".to_string(), opt(result.description.as_deref())]);

        tab
    }
}

fn candidate_row(candidate: &ApiCandidate) -> Vec<String> {
    let probe = candidate
        .probe()
        .map(|p| format!("{}:{}", p.status, p.path))
        .unwrap_or_default();

    let models = candidate
        .models()
        .map(|m| m.count.to_string())
        .unwrap_or_default();

    vec![
        candidate.url().to_string(),
        candidate.confidence().to_string(),
        candidate.label().to_string(),
        candidate.evidence().to_string(),
        probe,
        models,
    ]
}

struct Candidates<'a>(&'a [ApiCandidate]);

impl From<Candidates<'_>> for Table {
    fn from(Candidates(candidates): Candidates<'_>) -> Self {
        let mut tab = Table::new();

        tab.set_header(vec!["URL", "CONFIDENCE", "LABEL", "EVIDENCE", "PROBE", "MODELS"]);

        for candidate in candidates {
            tab.add_row(candidate_row(candidate));
        }

        tab
    }
}

fn print_tables(result: &DiscoverResult, print_header: bool) {
    let mut summary: Table = Summary(result).into();

    summary.print_header(print_header);

    print!("{}", summary);

    let mut candidates: Table = Candidates(&result.api.candidates).into();

    if candidates.is_empty() {
        return;
    }

    candidates.print_header(print_header);

    println!();
    print!("{}", candidates);
}

/// Options for one invocation: the configuration file, then the command
/// line, then the environment for the API key.
pub(crate) fn resolve_options(config: &Config, args: &DiscoverArgs, env_key: Option<String>) -> DiscoverOptions {
    let mut options = config.discover_options();

    if args.allow_http {
        options.policy.allow_insecure_scheme = true;
    }

    if let Some(key) = args.api_key.clone().or(env_key) {
        options.api_key = Some(key);
    }

    options
}

pub(crate) async fn discover_cmd(config: &Config, args: &DiscoverArgs) {
    let env_key = std::env::var(API_KEY_VAR).ok().filter(|k| !k.is_empty());

    let discoverer = Discoverer::new(resolve_options(config, args, env_key));

    let result = discoverer.discover(&args.url).await;

    for warning in &result.warnings {
        crate::warn!("{}", warning);
    }

    match args.format {
        ListingFormat::Json => format_output(Summary(&result), ListingFormat::Json),
        ListingFormat::Table => print_tables(&result, true),
        ListingFormat::HeaderlessTable => print_tables(&result, false),
    }

    if result.status == Status::Failed {
        if let Some(reason) = result.failure_reason {
            crate::error!("discovery failed: {}", reason.description());
        }

        std::process::exit(DEFAULT_EXIT_CODE);
    }
}
