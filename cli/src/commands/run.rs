use std::time::{Duration, Instant};

use anyhow::{Context, anyhow, bail};
use colored::*;
use netprobe_common::{Payload, RawParams};
use netprobe_core::Registry;
use serde_json::Value;

use crate::mprint;
use crate::terminal::{colors, format, print, spinner};

/// Merges `--params` with the `-p key=value` pairs, the pairs winning.
pub fn collect_params(pairs: &[String], json: Option<&str>) -> anyhow::Result<RawParams> {
    let mut raw: RawParams = match json {
        Some(text) => match serde_json::from_str(text).context("--params is not valid JSON")? {
            Value::Object(map) => map,
            _ => bail!("--params must be a JSON object"),
        },
        None => RawParams::new(),
    };

    for pair in pairs {
        let (key, value) = parse_pair(pair)?;
        raw.insert(key, value);
    }
    Ok(raw)
}

/// `key=value`, where the value is JSON when it parses and a string otherwise.
fn parse_pair(pair: &str) -> anyhow::Result<(String, Value)> {
    let (key, value) = pair
        .split_once('=')
        .ok_or_else(|| anyhow!("parameter '{pair}' is not in key=value form"))?;
    let key: &str = key.trim();
    if key.is_empty() {
        bail!("parameter '{pair}' has an empty key");
    }

    let value: Value = serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.to_string()));
    Ok((key.to_string(), value))
}

/// Dispatches `id` and prints the payload: pretty JSON on stdout, or a tree
/// through the terminal log when `tree` is set.
pub async fn run(registry: &Registry, id: &str, raw: RawParams, tree: bool, quiet: u8) -> anyhow::Result<()> {
    let name: String = registry
        .descriptor(id)
        .map(|descriptor| descriptor.name.clone())
        .unwrap_or_else(|| id.to_string());

    print::header(&format!("running {name}"), quiet);
    let spinner = (quiet == 0).then(|| spinner::start(format!("Running {}...", name.bold())));

    let start_time: Instant = Instant::now();
    let result = registry.dispatch(id, &raw).await;
    if let Some(spinner) = spinner {
        spinner.finish_and_clear();
    }

    let payload: Payload = result?;

    if tree {
        print_payload(&payload);
    } else {
        println!("{}", serde_json::to_string_pretty(&payload)?);
    }
    if quiet < 2 {
        print_summary(&payload, start_time.elapsed(), quiet);
    }
    Ok(())
}

fn print_payload(payload: &Payload) {
    let (scalars, nested) = format::split_payload(payload);
    let width: usize = scalars.iter().map(|(key, _)| key.len()).max().unwrap_or(0);
    for (key, value) in scalars {
        print::aligned_line(&key, width, value);
    }

    for (key, value) in nested {
        mprint!();
        print::print_status(&key.color(colors::PRIMARY).bold().to_string());
        for line in format::nested_lines(value) {
            print::print(&line);
        }
    }
}

fn print_summary(payload: &Payload, total_time: Duration, quiet: u8) {
    let simulated: bool = payload.get("simulated").and_then(Value::as_bool).unwrap_or(false);
    let total_time: ColoredString = format!("{:.2}s", total_time.as_secs_f64()).bold().yellow();
    let origin: ColoredString = if simulated {
        "simulated data".color(colors::WARN).bold()
    } else {
        "live data".green().bold()
    };
    let output: String = format!("Finished in {total_time} with {origin}");

    if quiet == 0 {
        print::fat_separator();
        print::centerln(&output);
    } else {
        mprint!();
        print::print(&output);
    }
}

// ╔════════════════════════════════════════════╗
// ║ ████████╗███████╗███████╗████████╗███████╗ ║
// ║ ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝██╔════╝ ║
// ║    ██║   █████╗  ███████╗   ██║   ███████╗ ║
// ║    ██║   ██╔══╝  ╚════██║   ██║   ╚════██║ ║
// ║    ██║   ███████╗███████║   ██║   ███████║ ║
// ║    ╚═╝   ╚══════╝╚══════╝   ╚═╝   ╚══════╝ ║
// ╚════════════════════════════════════════════╝

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn pair_values_are_json_when_possible() {
        assert_eq!(parse_pair("count=4").unwrap(), ("count".to_string(), json!(4)));
        assert_eq!(parse_pair("verbose=true").unwrap().1, json!(true));
        assert_eq!(parse_pair("host=example.com").unwrap().1, json!("example.com"));
        assert_eq!(parse_pair("filter=tcp port 80").unwrap().1, json!("tcp port 80"));
    }

    #[test]
    fn malformed_pairs_are_rejected() {
        assert!(parse_pair("count").is_err());
        assert!(parse_pair("=4").is_err());
    }

    #[test]
    fn pairs_override_json_object() {
        let raw = collect_params(&["count=2".to_string()], Some(r#"{"host": "1.1.1.1", "count": 9}"#)).unwrap();
        assert_eq!(raw["host"], json!("1.1.1.1"));
        assert_eq!(raw["count"], json!(2));
    }

    #[test]
    fn json_params_must_be_an_object() {
        assert!(collect_params(&[], Some("[1, 2]")).is_err());
    }
}
