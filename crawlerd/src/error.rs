//! Start-up fatal errors (§7 band 3): "missing object-storage credentials
//! when storage requested" and "unreadable result directory". These are
//! printed and exit the process with a distinct non-zero code before the
//! logger is initialized (§6: "a distinct non-zero [code] when
//! `--store-to-gcs` is requested without credentials").

use std::process::ExitCode;

/// Sysexits-style codes, matching the original's `os.EX_CONFIG` usage for
/// configuration errors.
pub const EX_CONFIG: u8 = 78;
pub const EX_IOERR: u8 = 74;

#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error("--store-to-gcs was set but no GCS credentials were provided (--gcs-credentials or GOOGLE_APPLICATION_CREDENTIALS)")]
    MissingGcsCredentials,
    #[error("--gcs-credentials path does not exist: {0}")]
    GcsCredentialsNotFound(std::path::PathBuf),
    #[error("could not create result directory {path}: {source}")]
    ResultDirUnavailable { path: std::path::PathBuf, source: std::io::Error },
}

impl StartupError {
    pub fn exit_code(&self) -> ExitCode {
        let code = match self {
            StartupError::MissingGcsCredentials | StartupError::GcsCredentialsNotFound(_) => EX_CONFIG,
            StartupError::ResultDirUnavailable { .. } => EX_IOERR,
        };
        ExitCode::from(code)
    }
}
