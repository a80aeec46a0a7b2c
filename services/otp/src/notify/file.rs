use std::path::PathBuf;

use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use crate::notify::DeliveryError;

/// Appends codes to a local text file, one line per delivery.
pub struct FileNotifier {
    path: PathBuf,
    // Serializes appends so concurrent deliveries never interleave lines.
    write_lock: Mutex<()>,
}

impl FileNotifier {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub async fn send(&self, recipient: &str, code: &str) -> Result<(), DeliveryError> {
        let line = format_line(chrono::Local::now().naive_local(), recipient, code);

        let _guard = self.write_lock.lock().await;
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }
}

fn format_line(at: chrono::NaiveDateTime, recipient: &str, code: &str) -> String {
    format!(
        "{} - {recipient} - OTP: {code}\n",
        at.format("%Y-%m-%d %H:%M:%S")
    )
}
