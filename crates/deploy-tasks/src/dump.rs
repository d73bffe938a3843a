//! Database dump
//!
//! Runs on the target host (reached through the `local_backup_database`
//! self-invocation). The dump tool authenticates through a throwaway option
//! file so the password never shows up in the process list, and its output is
//! gzipped straight into the backup directory.

use chrono::NaiveDate;
use deploy_core::{DatabaseSettings, Error, Result, ShellCommand};
use flate2::write::GzEncoder;
use flate2::Compression;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tempfile::NamedTempFile;
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::Command;
use tracing::{debug, error, info};

/// `<dir>/<YYYY-MM-DD>.sql.gz`
pub fn database_artifact(backup_dir: &Path, date: NaiveDate) -> PathBuf {
    backup_dir.join(format!("{}.sql.gz", date.format("%Y-%m-%d")))
}

/// Client option file holding the dump credentials.
///
/// Created owner-readable only and removed from disk when dropped, whichever
/// way the dump ends.
pub struct CredentialsFile {
    file: NamedTempFile,
}

impl CredentialsFile {
    pub fn create(user: &str, password: &str) -> Result<Self> {
        let mut file = tempfile::Builder::new()
            .prefix("perma-deploy-")
            .suffix(".cnf")
            .tempfile()?;
        write!(
            file,
            "[client]\nuser={}\npassword={}\n",
            option_value(user),
            option_value(password)
        )?;
        file.flush()?;
        debug!(path = %file.path().display(), "Wrote credentials file");
        Ok(Self { file })
    }

    pub fn path(&self) -> &Path {
        self.file.path()
    }
}

/// Double-quote an option file value so `#`, `;` and spaces survive
fn option_value(value: &str) -> String {
    let escaped = value.replace('\\', "\\\\").replace('"', "\\\"");
    format!("\"{}\"", escaped)
}

/// `<dump_bin> --defaults-extra-file=<file> -h<host> <name>`
pub fn dump_command(settings: &DatabaseSettings, credentials: &Path) -> ShellCommand {
    ShellCommand::new(settings.dump_bin.as_str())
        .arg(format!("--defaults-extra-file={}", credentials.display()))
        .arg(format!("-h{}", settings.host))
        .arg(settings.name.as_str())
}

/// Dump the database into `<backup_dir>/<date>.sql.gz`, replacing any dump
/// already written that day. Returns the artifact path.
pub async fn dump_database(
    settings: &DatabaseSettings,
    backup_dir: &Path,
    date: NaiveDate,
) -> Result<PathBuf> {
    let out_path = database_artifact(backup_dir, date);
    let credentials = CredentialsFile::create(&settings.user, &settings.password)?;
    let command = dump_command(settings, credentials.path());
    let line = command.to_shell();

    info!(database = %settings.name, host = %settings.host, out = %out_path.display(), "Dumping database");

    let mut out_file = File::create(&out_path).await?;
    // Compressed bytes collect in memory and are drained to disk per chunk
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());

    let mut child = Command::new(command.program())
        .args(command.os_args())
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|source| Error::Spawn {
            program: command.program().to_string(),
            source,
        })?;

    let mut stdout = child.stdout.take().ok_or_else(|| {
        Error::Io(std::io::Error::new(
            std::io::ErrorKind::Other,
            "dump output was not captured",
        ))
    })?;

    let mut buf = vec![0u8; 64 * 1024];
    let mut total = 0usize;
    loop {
        let n = stdout.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        encoder.write_all(&buf[..n])?;
        let compressed = std::mem::take(encoder.get_mut());
        out_file.write_all(&compressed).await?;
        total += n;
    }

    let status = child.wait().await?;
    out_file.write_all(&encoder.finish()?).await?;
    out_file.flush().await?;

    if !status.success() {
        error!(command = %line, code = ?status.code(), "Database dump failed");
        return Err(Error::command_failed(line, status.code()));
    }

    info!(bytes = total, out = %out_path.display(), "Database dump complete");
    Ok(out_path)
}
