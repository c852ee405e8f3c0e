use anyhow::{Context, anyhow, bail};
use chrono::DateTime;
use clap::{Args, Parser, Subcommand};
use inquire::{Confirm, CustomType, Password, Select, Text};
use serde_json::{Map, Value};
use std::{collections::HashSet, str::FromStr, sync::Arc};
use tracing::debug;
use tracing_subscriber::EnvFilter;
use xweather_core::{
    Adapter, Client, Configuration, MemoryStore, ParamValue, QueryParams, Record, Resource,
    ResourceQuery,
};

/// `--verbose` turns on debug output for this tool and its library only.
pub const VERBOSE_FILTER: &str = "xweather=debug,xweather_core=debug";

/// `RUST_LOG` applies unless `--verbose` is given; the fallback is `warn`.
pub fn log_filter(verbose: bool) -> EnvFilter {
    if verbose {
        EnvFilter::new(VERBOSE_FILTER)
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    }
}

/// Top-level CLI struct.
#[derive(Debug, Parser)]
#[command(name = "xweather", version, about = "Xweather lightning CLI")]
pub struct Cli {
    /// Log debug output (including cache hits) to stderr.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Store client credentials and cache settings.
    Configure,

    /// Lightning strikes around one or more locations.
    Lightning(QueryArgs),

    /// Lightning flashes around one or more locations.
    Flash(QueryArgs),
}

#[derive(Debug, Args)]
pub struct QueryArgs {
    /// Location identifiers: "lat,lon", place name ("seattle,wa") or postal code.
    pub ids: Vec<String>,

    /// Coordinates as LAT,LON. May be repeated.
    #[arg(long, allow_hyphen_values = true)]
    pub coords: Vec<Coords>,

    /// Maximum number of records per location.
    #[arg(long)]
    pub limit: Option<u32>,

    /// Search radius, e.g. "25mi" or "50km".
    #[arg(long)]
    pub radius: Option<String>,

    /// Service-side filter, e.g. "cg" for cloud-to-ground.
    #[arg(long)]
    pub filter: Option<String>,

    /// Start of the time window: RFC 3339, or a relative value such as "-1hour".
    #[arg(long, allow_hyphen_values = true)]
    pub from: Option<String>,

    /// End of the time window, same formats as --from.
    #[arg(long, allow_hyphen_values = true)]
    pub to: Option<String>,

    /// Extra query parameter as KEY=VALUE. May be repeated.
    #[arg(long = "param", value_parser = parse_key_value)]
    pub params: Vec<(String, String)>,

    /// Skip the response cache for this run.
    #[arg(long)]
    pub no_cache: bool,

    #[arg(long, env = "XWEATHER_CLIENT_ID", hide_env_values = true)]
    pub client_id: Option<String>,

    #[arg(long, env = "XWEATHER_CLIENT_SECRET", hide_env_values = true)]
    pub client_secret: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Coords {
    pub lat: f64,
    pub lon: f64,
}

impl FromStr for Coords {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (lat, lon) =
            s.split_once(',').ok_or_else(|| anyhow!("expected LAT,LON, got '{s}'"))?;
        Ok(Coords {
            lat: lat.trim().parse().with_context(|| format!("invalid latitude '{lat}'"))?,
            lon: lon.trim().parse().with_context(|| format!("invalid longitude '{lon}'"))?,
        })
    }
}

fn parse_key_value(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((k, v)) if !k.is_empty() => Ok((k.to_string(), v.to_string())),
        _ => Err(format!("expected KEY=VALUE, got '{s}'")),
    }
}

/// RFC 3339 datetimes go out as unix timestamps; anything else is passed through.
fn time_param(value: &str) -> ParamValue {
    match DateTime::parse_from_rfc3339(value) {
        Ok(dt) => ParamValue::Integer(dt.timestamp()),
        Err(_) => ParamValue::from(value),
    }
}

impl QueryArgs {
    fn options(&self) -> QueryParams {
        let mut options = QueryParams::new();
        if let Some(limit) = self.limit {
            options.insert("limit".into(), limit.into());
        }
        if let Some(radius) = &self.radius {
            options.insert("radius".into(), radius.as_str().into());
        }
        if let Some(filter) = &self.filter {
            options.insert("filter".into(), filter.as_str().into());
        }
        if let Some(from) = &self.from {
            options.insert("from".into(), time_param(from));
        }
        if let Some(to) = &self.to {
            options.insert("to".into(), time_param(to));
        }
        for (k, v) in &self.params {
            options.insert(k.clone(), v.as_str().into());
        }
        options
    }

    fn configuration(&self, mut config: Configuration) -> Configuration {
        if let Some(id) = &self.client_id {
            config.client_id = Some(id.clone());
        }
        if let Some(secret) = &self.client_secret {
            config.client_secret = Some(secret.clone());
        }
        if self.no_cache {
            config.cache = false;
        }
        config
    }
}

impl Cli {
    pub async fn run(self) -> anyhow::Result<()> {
        match self.command {
            Command::Configure => configure_interactive(),
            Command::Lightning(args) => query(Resource::Lightning, args).await,
            Command::Flash(args) => query(Resource::LightningFlash, args).await,
        }
    }
}

fn configure_interactive() -> anyhow::Result<()> {
    let mut config = Configuration::load()?;

    let client_id = Text::new("Client ID:")
        .with_initial_value(config.client_id.as_deref().unwrap_or_default())
        .prompt()?;
    let client_secret = Password::new("Client secret (leave empty to keep current):")
        .without_confirmation()
        .prompt()?;
    let cache = Confirm::new("Cache responses?").with_default(config.cache).prompt()?;
    let cache_expires_in = CustomType::<u64>::new("Cache lifetime in seconds:")
        .with_default(config.cache_expires_in)
        .prompt()?;
    let adapter = Select::new("HTTP adapter:", Adapter::all().to_vec())
        .with_starting_cursor(Adapter::all().iter().position(|a| *a == config.adapter).unwrap_or(0))
        .prompt()?;

    config.client_id = Some(client_id.trim().to_string()).filter(|s| !s.is_empty());
    if !client_secret.is_empty() {
        config.client_secret = Some(client_secret);
    }
    config.cache = cache;
    config.cache_expires_in = cache_expires_in;
    config.adapter = adapter;

    let path = config.save()?;
    println!("Saved configuration to {}", path.display());
    Ok(())
}

/// One location to query, labelled the way it appears in the output.
#[derive(Debug, Clone, PartialEq)]
enum Target {
    Id(String),
    Coords(Coords),
}

impl Target {
    fn label(&self) -> String {
        match self {
            Target::Id(id) => id.clone(),
            Target::Coords(c) => format!("{},{}", c.lat, c.lon),
        }
    }
}

/// Ids first, then coordinates. Output is keyed by label, so a repeated label is an error.
fn targets(ids: &[String], coords: &[Coords]) -> anyhow::Result<Vec<Target>> {
    if ids.is_empty() && coords.is_empty() {
        bail!("Nothing to query: pass a location id or --coords LAT,LON.");
    }

    let all: Vec<Target> = ids
        .iter()
        .cloned()
        .map(Target::Id)
        .chain(coords.iter().copied().map(Target::Coords))
        .collect();

    let mut seen = HashSet::new();
    for target in &all {
        let label = target.label();
        if !seen.insert(label.clone()) {
            bail!("Location '{label}' given more than once.");
        }
    }
    Ok(all)
}

async fn query(resource: Resource, args: QueryArgs) -> anyhow::Result<()> {
    let targets = targets(&args.ids, &args.coords)?;

    let config = args.configuration(Configuration::load()?);
    if !config.has_credentials() {
        bail!(
            "No Xweather credentials configured.\n\
             Hint: run `xweather configure` or set XWEATHER_CLIENT_ID and XWEATHER_CLIENT_SECRET."
        );
    }

    let cache = config.cache;
    let mut builder = Client::builder(config);
    if cache {
        builder = builder.cache_store(Arc::new(MemoryStore::new()));
    }
    let client = builder.build();
    debug!(cache = client.cache_active(), "client ready");

    let q = ResourceQuery::new(&client, resource);
    let options = args.options();

    let mut results: Vec<(String, Vec<Record>)> = Vec::with_capacity(targets.len());
    for target in targets {
        let label = target.label();
        let records = match &target {
            Target::Id(id) => q.by_id(id, &options).await,
            Target::Coords(c) => q.by_coords(c.lat, c.lon, &options).await,
        }
        .with_context(|| format!("Query for '{label}' failed"))?;
        results.push((label, records));
    }

    println!("{}", serde_json::to_string_pretty(&render(results))?);
    Ok(())
}

/// One location prints as a bare array; several print as an object keyed by location.
/// Labels are unique, see [`targets`].
fn render(mut results: Vec<(String, Vec<Record>)>) -> Value {
    let to_array = |records: Vec<Record>| Value::Array(records.into_iter().map(Value::Object).collect());

    if results.len() == 1 {
        let (_, records) = results.remove(0);
        return to_array(records);
    }

    let mut out = Map::new();
    for (id, records) in results {
        out.insert(id, to_array(records));
    }
    Value::Object(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn coords_parse_with_negative_values() {
        let c: Coords = "37.7749,-122.4194".parse().expect("parse");
        assert_eq!(c, Coords { lat: 37.7749, lon: -122.4194 });
        assert!("37.7749".parse::<Coords>().is_err());
        assert!("north,-122".parse::<Coords>().is_err());
    }

    #[test]
    fn key_value_requires_equals() {
        assert_eq!(parse_key_value("sort=dt:-1"), Ok(("sort".into(), "dt:-1".into())));
        assert!(parse_key_value("sort").is_err());
        assert!(parse_key_value("=x").is_err());
    }

    #[test]
    fn rfc3339_times_become_timestamps() {
        assert_eq!(time_param("2024-06-01T00:00:00Z"), ParamValue::Integer(1_717_200_000));
        assert_eq!(time_param("-2hours"), ParamValue::from("-2hours"));
    }

    #[test]
    fn cli_parses_lightning_query() {
        let cli = Cli::try_parse_from([
            "xweather",
            "flash",
            "seattle,wa",
            "--coords",
            "37.7749,-122.4194",
            "--limit",
            "5",
            "--param",
            "sort=dt:-1",
            "--no-cache",
        ])
        .expect("parse");

        let Command::Flash(args) = cli.command else { panic!("expected flash command") };
        assert_eq!(args.ids, vec!["seattle,wa".to_string()]);
        assert_eq!(args.coords.len(), 1);

        let options = args.options();
        assert_eq!(options.get("limit"), Some(&ParamValue::Integer(5)));
        assert_eq!(options.get("sort"), Some(&ParamValue::from("dt:-1")));

        let config = args.configuration(Configuration { cache: true, ..Configuration::default() });
        assert!(!config.cache);
    }

    #[test]
    fn render_single_location_as_array() {
        let mut record = Record::new();
        record.insert("id".into(), Value::from("a1"));

        let single = render(vec![("x".into(), vec![record.clone()])]);
        assert!(single.is_array());

        let many = render(vec![("x".into(), vec![record]), ("y".into(), Vec::new())]);
        assert_eq!(many["y"], Value::Array(Vec::new()));
    }

    #[test]
    fn targets_keep_ids_before_coords() {
        let coords = [Coords { lat: 45.5, lon: -122.6 }];
        let all = targets(&["seattle,wa".into()], &coords).expect("targets");
        assert_eq!(all, vec![Target::Id("seattle,wa".into()), Target::Coords(coords[0])]);
        assert_eq!(all[1].label(), "45.5,-122.6");
    }

    #[test]
    fn targets_reject_repeated_locations() {
        let err = targets(&["seattle,wa".into(), "seattle,wa".into()], &[]).unwrap_err();
        assert!(err.to_string().contains("'seattle,wa' given more than once"));

        let c = Coords { lat: 45.5, lon: -122.6 };
        assert!(targets(&[], &[c, c]).is_err());

        // An id spelled like a coordinate pair collides with the same --coords value.
        let err = targets(&["45.5,-122.6".into()], &[c]).unwrap_err();
        assert!(err.to_string().contains("45.5,-122.6"));
    }

    #[test]
    fn targets_require_a_location() {
        let err = targets(&[], &[]).unwrap_err();
        assert!(err.to_string().contains("Nothing to query"));
    }

    #[test]
    fn verbose_filter_is_limited_to_this_crate() {
        let filter: EnvFilter = VERBOSE_FILTER.parse().expect("valid directives");
        let rendered = filter.to_string();
        assert!(rendered.contains("xweather=debug"));
        assert!(rendered.contains("xweather_core=debug"));
        assert!(!rendered.contains("hyper"));
        assert!(!rendered.contains("reqwest"));
    }
}
