use std::path::Path;

use anyhow::{Context, Result};

use ladder_common::{Methodology, MethodologySpec, SignalCatalog};

/// Load and parse a methodology TOML file.
pub fn load_methodology_spec(path: &Path) -> Result<MethodologySpec> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read methodology file: {}", path.display()))?;
    let spec: MethodologySpec = toml::from_str(&content)
        .with_context(|| format!("Failed to parse methodology file: {}", path.display()))?;
    Ok(spec)
}

/// Load a methodology file and validate it against the pool's catalog.
/// All configuration violations are reported together.
pub fn load_methodology(path: &Path, catalog: &SignalCatalog) -> Result<Methodology> {
    let spec = load_methodology_spec(path)?;
    Methodology::load(spec, catalog)
        .with_context(|| format!("Invalid methodology: {}", path.display()))
}
