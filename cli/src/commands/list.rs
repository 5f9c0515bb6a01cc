use colored::*;
use netprobe_core::Registry;

use crate::mprint;
use crate::terminal::{colors, print};

pub fn list(registry: &Registry) {
    let descriptors = registry.descriptors();
    for (idx, descriptor) in descriptors.iter().enumerate() {
        print::tree_head(idx, &descriptor.id);
        print::as_tree_one_level(vec![
            ("Name".to_string(), descriptor.name.as_str().color(colors::TEXT_DEFAULT)),
            ("About".to_string(), descriptor.description.as_str().color(colors::TEXT_DEFAULT)),
            ("Params".to_string(), descriptor.parameters.len().to_string().color(colors::ACCENT)),
        ]);
        if idx + 1 != descriptors.len() {
            mprint!();
        }
    }
}
