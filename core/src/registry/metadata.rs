use std::collections::BTreeMap;
use std::path::Path;

use netprobe_common::PluginDescriptor;
use tracing::debug;

use super::RegistryError;

pub fn parse_descriptor(text: &str, origin: &str) -> Result<PluginDescriptor, RegistryError> {
    serde_json::from_str(text).map_err(|source| RegistryError::Metadata {
        origin: origin.to_string(),
        source,
    })
}

/// Reads every `*.json` file in `dir`, keyed by plugin id.
pub fn load_dir(dir: &Path) -> Result<BTreeMap<String, PluginDescriptor>, RegistryError> {
    let io_error = |source| RegistryError::Io {
        origin: dir.display().to_string(),
        source,
    };

    let mut paths: Vec<_> = std::fs::read_dir(dir)
        .map_err(io_error)?
        .filter_map(Result::ok)
        .map(|entry| entry.path())
        .filter(|path| path.extension().is_some_and(|ext| ext == "json"))
        .collect();
    paths.sort();

    let mut descriptors: BTreeMap<String, PluginDescriptor> = BTreeMap::new();
    for path in paths {
        let origin: String = path.display().to_string();
        let text: String = std::fs::read_to_string(&path).map_err(|source| RegistryError::Io {
            origin: origin.clone(),
            source,
        })?;
        let descriptor: PluginDescriptor = parse_descriptor(&text, &origin)?;
        debug!(plugin = %descriptor.id, %origin, "loaded metadata override");

        if descriptors.contains_key(&descriptor.id) {
            return Err(RegistryError::Duplicate(descriptor.id));
        }
        descriptors.insert(descriptor.id.clone(), descriptor);
    }

    Ok(descriptors)
}

// ╔════════════════════════════════════════════╗
// ║ ████████╗███████╗███████╗████████╗███████╗ ║
// ║ ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝██╔════╝ ║
// ║    ██║   █████╗  ███████╗   ██║   ███████╗ ║
// ║    ██║   ██╔══╝  ╚════██║   ██║   ╚════██║ ║
// ║    ██║   ███████╗███████║   ██║   ███████║ ║
// ║    ╚═╝   ╚══════╝╚══════╝   ╚═╝   ╚══════╝ ║
// ╚════════════════════════════════════════════╝
