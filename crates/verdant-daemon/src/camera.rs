use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use chrono::Local;
use tokio::process::Command;
use tracing::{debug, info};
use verdant_core::config::CameraConfig;
use verdant_hooks::{HookContext, HookError, HookHandler};

/// Takes a photo with an external capture command for every event it is
/// registered on. The event label becomes the file name prefix.
pub struct CameraHook {
    command: String,
    args: Vec<String>,
    directory: PathBuf,
    timeout: Duration,
}

impl CameraHook {
    pub fn new(config: &CameraConfig) -> Self {
        Self {
            command: config.command.clone(),
            args: config.args.clone(),
            directory: PathBuf::from(&config.image_directory),
            timeout: Duration::from_secs(config.timeout_secs),
        }
    }

    /// `<dir>/<label>_<YYYYmmdd_HHMMSS>.jpg`, stamped with local time.
    pub fn image_path(&self, label: &str) -> PathBuf {
        image_path(&self.directory, label, &Local::now().format("%Y%m%d_%H%M%S").to_string())
    }

    /// Run the capture command writing to `path`. Killed on timeout.
    pub async fn capture(&self, path: &Path) -> Result<(), HookError> {
        tokio::fs::create_dir_all(&self.directory).await?;

        let mut command = Command::new(&self.command);
        command
            .args(&self.args)
            .arg("-o")
            .arg(path)
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        debug!(command = %self.command, path = %path.display(), "capturing image");

        let output = match tokio::time::timeout(self.timeout, command.output()).await {
            Ok(result) => result?,
            Err(_) => {
                return Err(HookError::Timeout {
                    ms: self.timeout.as_millis() as u64,
                })
            }
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(HookError::ExecutionFailed(format!(
                "{} exited with {}: {}",
                self.command,
                output.status,
                stderr.trim()
            )));
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl HookHandler for CameraHook {
    async fn handle(&self, ctx: &HookContext) -> verdant_hooks::Result<()> {
        let path = self.image_path(&ctx.label);
        self.capture(&path).await?;
        info!(path = %path.display(), label = %ctx.label, "image captured");
        Ok(())
    }
}

fn image_path(directory: &Path, label: &str, stamp: &str) -> PathBuf {
    directory.join(format!("{label}_{stamp}.jpg"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use verdant_hooks::HookEvent;

    fn hook(dir: &Path, command: &str, args: &[&str], timeout_secs: u64) -> CameraHook {
        CameraHook::new(&CameraConfig {
            enabled: true,
            command: command.to_string(),
            args: args.iter().map(|s| s.to_string()).collect(),
            image_directory: dir.display().to_string(),
            timeout_secs,
        })
    }

    #[test]
    fn file_name_is_label_and_timestamp() {
        let path = image_path(Path::new("images"), "before_watering", "20261016_070000");
        assert_eq!(path, PathBuf::from("images/before_watering_20261016_070000.jpg"));
    }

    #[tokio::test]
    async fn successful_command_passes_output_path_last() {
        let dir = tempfile::tempdir().unwrap();
        let images = dir.path().join("images");
        // sh -c '...' sh -o <path>: $1 is "-o", $2 the path.
        let camera = hook(&images, "sh", &["-c", "touch \"$2\"", "sh"], 5);

        camera
            .handle(&HookContext::new(HookEvent::Startup))
            .await
            .unwrap();

        let names: Vec<String> = std::fs::read_dir(&images)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names.len(), 1);
        assert!(names[0].starts_with("startup_") && names[0].ends_with(".jpg"));
    }

    #[tokio::test]
    async fn failing_command_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let camera = hook(dir.path(), "sh", &["-c", "echo no camera >&2; exit 3", "sh"], 5);

        let err = camera
            .handle(&HookContext::new(HookEvent::PeriodicCapture))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("no camera"));
    }

    #[tokio::test]
    async fn missing_binary_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let camera = hook(dir.path(), "/nonexistent/rpicam-jpeg", &[], 5);
        assert!(camera
            .handle(&HookContext::new(HookEvent::PeriodicCapture))
            .await
            .is_err());
    }
}
