//! Config command: prints the effective configuration.

use anyhow::Result;

use crate::context::CliContext;

/// Execute the config command
pub fn execute(cx: &CliContext) -> Result<()> {
    print!("{}", cx.config.to_toml_string()?);
    Ok(())
}
