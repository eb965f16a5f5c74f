use std::fs;
use std::path::{Path, PathBuf};

use chokepoint_core::exchange::{export_all, export_bottleneck, ExportFile};
use chokepoint_core::store::StateFile;
use chokepoint_core::BottleneckId;
use chrono::Utc;

use super::{CommandResult, EXIT_NOT_FOUND, EXIT_STATE_IO};

/// Exports one bottleneck when an id is given, otherwise the whole session.
pub fn run(state_path: &Path, bottleneck: Option<&str>, out: Option<&Path>) -> CommandResult {
    let state = match StateFile::new(state_path).load() {
        Ok(state) => state,
        Err(error) => {
            return CommandResult::failure("export", "state_read", error.to_string(), EXIT_STATE_IO)
        }
    };

    let export = match bottleneck {
        Some(id) => match export_bottleneck(&state, &BottleneckId(id.to_owned())) {
            Some(export) => export,
            None => {
                return CommandResult::failure(
                    "export",
                    "unknown_bottleneck",
                    format!("bottleneck `{id}` is not in `{}`", state_path.display()),
                    EXIT_NOT_FOUND,
                )
            }
        },
        None => export_all(&state),
    };

    let destination = out
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from(export.suggested_filename(Utc::now().date_naive())));
    let body = match serde_json::to_string_pretty(&export) {
        Ok(body) => body,
        Err(error) => {
            return CommandResult::failure("export", "serialization", error.to_string(), EXIT_STATE_IO)
        }
    };
    if let Err(error) = fs::write(&destination, body) {
        return CommandResult::failure(
            "export",
            "export_write",
            format!("failed to write `{}`: {error}", destination.display()),
            EXIT_STATE_IO,
        );
    }

    CommandResult::written("export", describe(&export), destination.display().to_string())
}

fn describe(export: &ExportFile) -> String {
    match export {
        ExportFile::SingleBottleneck(single) => {
            format!("exported improvement point `{}`", single.bottleneck.title)
        }
        ExportFile::FullExport(full) => {
            format!("exported analysis with {} bottleneck(s)", full.bottlenecks.len())
        }
    }
}
