use std::fs;
use std::path::Path;

use chokepoint_core::exchange::{validate_import, ExportFile};
use chokepoint_core::store::StateFile;

use super::{CommandResult, EXIT_INVALID_EXPORT, EXIT_STATE_IO};

/// Validates the export before touching the state file; a rejected import
/// leaves the session unchanged.
pub fn run(state_path: &Path, export_path: &Path) -> CommandResult {
    let raw = match fs::read_to_string(export_path) {
        Ok(raw) => raw,
        Err(error) => {
            return CommandResult::failure(
                "import",
                "export_read",
                format!("failed to read `{}`: {error}", export_path.display()),
                EXIT_STATE_IO,
            )
        }
    };
    let export = match validate_import(&raw) {
        Ok(export) => export,
        Err(error) => {
            return CommandResult::failure(
                "import",
                "invalid_export",
                error.to_string(),
                EXIT_INVALID_EXPORT,
            )
        }
    };

    let file = StateFile::new(state_path);
    let mut state = match file.load() {
        Ok(state) => state,
        Err(error) => {
            return CommandResult::failure("import", "state_read", error.to_string(), EXIT_STATE_IO)
        }
    };

    let imported = match &export {
        ExportFile::SingleBottleneck(_) => 1,
        ExportFile::FullExport(full) => full.bottlenecks.len(),
    };
    export.merge_into(&mut state);
    if let Err(error) = file.save(&state) {
        return CommandResult::failure("import", "state_write", error.to_string(), EXIT_STATE_IO);
    }

    CommandResult::written(
        "import",
        format!(
            "imported {imported} bottleneck(s); session now holds {}",
            state.bottlenecks.len()
        ),
        state_path.display().to_string(),
    )
}
