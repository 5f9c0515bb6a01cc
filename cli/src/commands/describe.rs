use anyhow::anyhow;
use colored::*;
use netprobe_common::{ParameterSpec, PluginDescriptor};
use netprobe_core::Registry;

use crate::mprint;
use crate::terminal::{colors, format, print};

type Detail = (String, ColoredString);

pub fn describe(registry: &Registry, id: &str, json: bool, quiet: u8) -> anyhow::Result<()> {
    let descriptor = registry
        .descriptor(id)
        .ok_or_else(|| anyhow!("no plugin named '{id}'"))?;

    if json {
        println!("{}", serde_json::to_string_pretty(descriptor.as_ref())?);
        return Ok(());
    }

    print::header(&descriptor.name, quiet);
    print_summary(&descriptor);
    mprint!();
    for (idx, spec) in descriptor.parameters.iter().enumerate() {
        print::tree_head(idx, &spec.id);
        print::as_tree_one_level(parameter_details(spec));
        if idx + 1 != descriptor.parameters.len() {
            mprint!();
        }
    }
    Ok(())
}

fn print_summary(descriptor: &PluginDescriptor) {
    let width: usize = "Plugin".len();
    print::aligned_line("Plugin", width, descriptor.id.as_str().color(colors::ACCENT));
    print::aligned_line("About", width, descriptor.description.as_str());
}

fn parameter_details(spec: &ParameterSpec) -> Vec<Detail> {
    let mut details: Vec<Detail> = vec![
        ("Name".to_string(), spec.name.as_str().color(colors::TEXT_DEFAULT)),
        ("Type".to_string(), format::kind(spec).color(colors::PRIMARY)),
    ];

    if spec.required {
        details.push(("Needs".to_string(), "required".color(colors::WARN)));
    }
    if let Some(default) = &spec.default {
        details.push(("Default".to_string(), format::scalar(default)));
    }
    if let Some(bounds) = format::bounds(spec) {
        details.push(("Bounds".to_string(), bounds.color(colors::TEXT_DEFAULT)));
    }
    if !spec.options.is_empty() {
        let choices: Vec<String> = spec.options.iter().map(|option| format::plain(&option.value)).collect();
        details.push(("Options".to_string(), choices.join(", ").color(colors::TEXT_DEFAULT)));
    }
    if !spec.description.is_empty() {
        details.push(("About".to_string(), spec.description.as_str().normal()));
    }
    details
}
