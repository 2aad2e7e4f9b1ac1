use apiscout::registry::{self, KnownProvider};
use apiscout::FailureReason;
use strum::IntoEnumIterator;

use crate::{ListArgs, ListObject, ListingFormat};

pub(crate) mod table;

use table::Table;

#[derive(serde::Serialize)]
#[serde(transparent)]
struct Providers(Vec<&'static KnownProvider>);

impl From<Providers> for Table {
    fn from(value: Providers) -> Self {
        let mut tab = Table::new();

        tab.set_header(vec!["SLUG", "NAME", "COMPATIBILITY", "AUTH", "BASE_URL"]);

        for provider in value.0 {
            let base_url = match (provider.base_url(), provider.deployment_specific) {
                (Some(url), _) => url.to_string(),
                (None, true) => "(per deployment)".to_string(),
                (None, false) => String::new(),
            };

            tab.add_row(vec![
                provider.slug.to_string(),
                provider.name.to_string(),
                provider.compatibility.to_string(),
                provider.auth_type.to_string(),
                base_url,
            ]);
        }

        tab
    }
}

#[derive(serde::Serialize)]
struct Reason {
    reason: FailureReason,
    description: &'static str,
}

impl From<Vec<Reason>> for Table {
    fn from(value: Vec<Reason>) -> Self {
        let mut tab = Table::new();

        tab.set_header(vec!["REASON", "DESCRIPTION"]);

        for reason in value {
            tab.add_row(vec![reason.reason.to_string(), reason.description.to_string()]);
        }

        tab
    }
}

fn get_reasons() -> Vec<Reason> {
    FailureReason::iter()
        .map(|reason| Reason {
            reason,
            description: reason.description(),
        })
        .collect()
}

pub(crate) fn format_output<O: Into<Table> + serde::Serialize>(object: O, format: ListingFormat) {
    match format {
        ListingFormat::Json => match serde_json::to_string_pretty(&object) {
            Ok(output) => println!("{}", output),
            Err(err) => crate::die!("failed to serialize output: {}", err),
        },
        ListingFormat::Table => {
            let tab: Table = object.into();

            print!("{}", tab);
        }
        ListingFormat::HeaderlessTable => {
            let mut tab: Table = object.into();

            tab.print_header(false);

            print!("{}", tab);
        }
    }
}

pub(crate) fn list_cmd(args: &ListArgs) {
    match args.object {
        ListObject::Providers => {
            format_output(Providers(registry::all().iter().collect()), args.format)
        }
        ListObject::Reasons => format_output(get_reasons(), args.format),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_table_lists_every_entry() {
        let tab: Table = Providers(registry::all().iter().collect()).into();
        let rendered = tab.to_string();

        assert_eq!(rendered.lines().count(), registry::all().len() + 1);
        assert!(rendered.starts_with("SLUG"));
        assert!(rendered
            .lines()
            .any(|l| l.starts_with("openai") && l.ends_with("https://api.openai.com")));
        assert!(rendered
            .lines()
            .any(|l| l.starts_with("bedrock") && l.ends_with("(per deployment)")));
    }

    #[test]
    fn test_reasons_cover_the_taxonomy() {
        let reasons = get_reasons();

        assert_eq!(reasons.len(), FailureReason::iter().count());

        let json = serde_json::to_value(&reasons).unwrap();

        assert_eq!(json[0]["reason"], "INVALID_URL");
    }
}
