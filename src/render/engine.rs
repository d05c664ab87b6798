//! Raster rendering via an external headless browser.
//!
//! The engine owns the rendering contract, not the pixels: it hands the
//! resolved HTML document and viewport to a headless Chromium screenshot
//! run, bounded by a timeout, and maps every failure mode onto the core
//! taxonomy (`RenderTimeout` / `RenderEngine`).
//!
//! Stateless per call: no browser session survives a render, and the temp
//! directory holding the input document and output frame is dropped on
//! every exit path.

use std::fs;
use std::path::PathBuf;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::time::{Duration, Instant};

use image::DynamicImage;

use crate::error::CoreError;

/// Engine binaries probed on PATH, in preference order.
const ENGINE_CANDIDATES: &[&str] = &[
    "chromium",
    "chromium-browser",
    "google-chrome",
    "google-chrome-stable",
    "chrome",
];

/// Poll interval while waiting on the engine process.
const WAIT_POLL: Duration = Duration::from_millis(50);

/// Turns a resolved HTML document into a raster frame.
pub trait RenderEngine: Send + Sync {
    fn render(&self, html: &str, width: u32, height: u32) -> Result<DynamicImage, CoreError>;
}

// =============================================================================
// Chromium engine
// =============================================================================

/// Headless Chromium/Chrome screenshot engine.
#[derive(Debug)]
pub struct ChromiumEngine {
    program: PathBuf,
    timeout: Duration,
}

impl ChromiumEngine {
    /// Locate the engine binary: explicit override first, then PATH probe.
    pub fn detect(engine_override: Option<&str>, timeout: Duration) -> Result<Self, CoreError> {
        if let Some(name) = engine_override {
            let program = which::which(name).map_err(|e| {
                CoreError::RenderEngine(format!("configured engine `{name}` not found: {e}"))
            })?;
            return Ok(Self { program, timeout });
        }

        for candidate in ENGINE_CANDIDATES {
            if let Ok(program) = which::which(candidate) {
                return Ok(Self { program, timeout });
            }
        }

        Err(CoreError::RenderEngine(format!(
            "no rendering engine found on PATH (tried {})",
            ENGINE_CANDIDATES.join(", ")
        )))
    }
}

impl RenderEngine for ChromiumEngine {
    fn render(&self, html: &str, width: u32, height: u32) -> Result<DynamicImage, CoreError> {
        // Temp dir owns the input document and the output frame; dropping it
        // releases both whether the render succeeds, fails, or times out.
        let dir = tempfile::tempdir()
            .map_err(|e| CoreError::RenderEngine(format!("tempdir: {e}")))?;
        let page = dir.path().join("page.html");
        let shot = dir.path().join("frame.png");

        fs::write(&page, html).map_err(|e| CoreError::RenderEngine(format!("write page: {e}")))?;

        let mut child = Command::new(&self.program)
            .arg("--headless")
            .arg("--disable-gpu")
            .arg("--hide-scrollbars")
            .arg("--force-device-scale-factor=1")
            .arg(format!("--window-size={width},{height}"))
            .arg(format!("--screenshot={}", shot.display()))
            .arg(format!("file://{}", page.display()))
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| {
                CoreError::RenderEngine(format!("spawn {}: {e}", self.program.display()))
            })?;

        let status = wait_with_timeout(&mut child, self.timeout)?;
        if !status.success() {
            let stderr = read_stderr(&mut child);
            return Err(CoreError::RenderEngine(format!(
                "engine exited with {status}: {stderr}"
            )));
        }

        let bytes = fs::read(&shot)
            .map_err(|e| CoreError::RenderEngine(format!("engine produced no frame: {e}")))?;
        image::load_from_memory(&bytes)
            .map_err(|e| CoreError::RenderEngine(format!("engine frame unreadable: {e}")))
    }
}

/// Wait for the child to exit, killing it when the deadline passes.
fn wait_with_timeout(child: &mut Child, timeout: Duration) -> Result<ExitStatus, CoreError> {
    let deadline = Instant::now() + timeout;
    loop {
        match child.try_wait() {
            Ok(Some(status)) => return Ok(status),
            Ok(None) => {
                if Instant::now() >= deadline {
                    let _ = child.kill();
                    let _ = child.wait();
                    return Err(CoreError::RenderTimeout(timeout));
                }
                std::thread::sleep(WAIT_POLL);
            }
            Err(e) => return Err(CoreError::RenderEngine(format!("wait: {e}"))),
        }
    }
}

fn read_stderr(child: &mut Child) -> String {
    use std::io::Read;
    let mut buf = String::new();
    if let Some(mut stderr) = child.stderr.take() {
        let _ = stderr.read_to_string(&mut buf);
    }
    let trimmed = buf.trim();
    if trimmed.is_empty() {
        "(no stderr)".to_string()
    } else {
        // First line is enough for the caller; the rest is browser noise.
        trimmed.lines().next().unwrap_or(trimmed).to_string()
    }
}

// =============================================================================
// Missing engine
// =============================================================================

/// Placeholder engine used when detection failed at startup. HTML preview
/// and polling keep working; only PNG rendering errors out.
pub struct MissingEngine {
    reason: String,
}

impl MissingEngine {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

impl RenderEngine for MissingEngine {
    fn render(&self, _html: &str, _width: u32, _height: u32) -> Result<DynamicImage, CoreError> {
        Err(CoreError::RenderEngine(self.reason.clone()))
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wait_with_timeout_kills_slow_process() {
        let mut child = Command::new("sleep")
            .arg("30")
            .stdout(Stdio::null())
            .spawn()
            .unwrap();

        let started = Instant::now();
        let err = wait_with_timeout(&mut child, Duration::from_millis(150)).unwrap_err();
        assert!(matches!(err, CoreError::RenderTimeout(_)));
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn test_wait_with_timeout_returns_fast_exit() {
        let mut child = Command::new("true").spawn().unwrap();
        let status = wait_with_timeout(&mut child, Duration::from_secs(5)).unwrap();
        assert!(status.success());
    }

    #[test]
    fn test_missing_engine_errors_on_render() {
        let engine = MissingEngine::new("no browser installed");
        let err = engine.render("<html></html>", 800, 480).unwrap_err();
        assert!(matches!(err, CoreError::RenderEngine(msg) if msg.contains("no browser")));
    }

    #[test]
    fn test_detect_unknown_override_fails() {
        let err =
            ChromiumEngine::detect(Some("definitely-not-a-browser-9000"), Duration::from_secs(1))
                .unwrap_err();
        assert!(matches!(err, CoreError::RenderEngine(_)));
    }
}
