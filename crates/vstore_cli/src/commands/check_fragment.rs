//! Check-fragment command implementation.

use std::path::Path;
use vstore_core::ValueStore;
use vstore_schema::Fragment;

/// Runs the check-fragment command.
///
/// The fragment is declared into a scratch store, so every typed-set rule
/// is checked exactly as a live load would.
pub fn run(path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let fragment = Fragment::read(path)?;
    let scratch = ValueStore::new();
    fragment.declare_into(&scratch)?;

    println!("{}: ok", path.display());
    for schema in scratch.container_schemas() {
        println!(
            "  container {} ({:?}, {} template entries)",
            schema.id,
            schema.order,
            schema.template.len()
        );
    }
    println!("  {} values", fragment.values.len());
    Ok(())
}
