//! Running the GDAL command line tools.

use std::borrow::Cow;
use std::process::Command;

use bridge_rust_sdk::providers::export::ExportError;
use tracing::debug;

/// The command line of `command` as it could be pasted into a shell.
///
/// Environment variables are left out, they may hold passwords.
pub(crate) fn display_command(command: &Command) -> String {
    std::iter::once(command.get_program())
        .chain(command.get_args())
        .map(|arg| shell_escape::escape(Cow::Owned(arg.to_string_lossy().into_owned())))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Run `command` to completion, turning a failure exit into [ExportError::Command].
pub(crate) fn run(command: &mut Command) -> Result<(), ExportError> {
    debug!(command = %display_command(command), "running");
    let output = command.output()?;
    if output.status.success() {
        return Ok(());
    }

    let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
    Err(ExportError::Command {
        program: command.get_program().to_string_lossy().into_owned(),
        stderr: if stderr.is_empty() {
            format!("exited with {}", output.status)
        } else {
            stderr
        },
    })
}
