//! GPU Health Probe (spec §4.7): point-in-time device readings consumed by
//! the Admission Controller (pre-accept) and the Scheduler (pre-chunk).
//!
//! Two implementations: [`SysfsGpuProbe`] reads `nvidia-smi`-style counters
//! when available and falls back to [`Reading::Unknown`] rather than
//! failing, per spec's explicit "if the probe itself fails, treat as
//! unknown" rule; [`StubGpuProbe`] is an injectable in-memory probe for
//! tests and GPU-less operator environments.

use async_trait::async_trait;
use std::process::Stdio;
use std::sync::Mutex;
use tokio::process::Command;
use tracing::warn;

/// A single point-in-time reading. `Unknown` means the probe could not
/// determine device state — never an error the caller must propagate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Reading {
    Known {
        memory_used_bytes: u64,
        memory_total_bytes: u64,
        temperature_c: f32,
        process_count: u32,
    },
    Unknown,
}

impl Reading {
    pub fn memory_fraction(&self) -> Option<f32> {
        match self {
            Reading::Known {
                memory_used_bytes,
                memory_total_bytes,
                ..
            } if *memory_total_bytes > 0 => {
                Some(*memory_used_bytes as f32 / *memory_total_bytes as f32)
            }
            _ => None,
        }
    }

    pub fn temperature_c(&self) -> Option<f32> {
        match self {
            Reading::Known { temperature_c, .. } => Some(*temperature_c),
            Reading::Unknown => None,
        }
    }
}

#[async_trait]
pub trait GpuProbe: Send + Sync {
    async fn probe(&self) -> Reading;
}

/// Shells out to `nvidia-smi --query-gpu=... --format=csv,noheader,nounits`.
/// If the binary is missing or its output can't be parsed, returns
/// `Reading::Unknown` — never an `Err`, matching §4.7.
pub struct SysfsGpuProbe {
    nvidia_smi_path: String,
}

impl SysfsGpuProbe {
    pub fn new() -> Self {
        Self {
            nvidia_smi_path: "nvidia-smi".to_string(),
        }
    }

    pub fn with_binary(path: impl Into<String>) -> Self {
        Self {
            nvidia_smi_path: path.into(),
        }
    }
}

impl Default for SysfsGpuProbe {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl GpuProbe for SysfsGpuProbe {
    async fn probe(&self) -> Reading {
        let output = Command::new(&self.nvidia_smi_path)
            .args([
                "--query-gpu=memory.used,memory.total,temperature.gpu,count",
                "--format=csv,noheader,nounits",
            ])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .output()
            .await;

        let output = match output {
            Ok(o) if o.status.success() => o,
            Ok(o) => {
                warn!(status = ?o.status, "nvidia-smi exited non-zero, gpu reading unknown");
                return Reading::Unknown;
            }
            Err(err) => {
                warn!(error = %err, "nvidia-smi unavailable, gpu reading unknown");
                return Reading::Unknown;
            }
        };

        let stdout = String::from_utf8_lossy(&output.stdout);
        let first_line = match stdout.lines().next() {
            Some(line) => line,
            None => return Reading::Unknown,
        };

        parse_nvidia_smi_line(first_line).unwrap_or(Reading::Unknown)
    }
}

fn parse_nvidia_smi_line(line: &str) -> Option<Reading> {
    let fields: Vec<&str> = line.split(',').map(str::trim).collect();
    if fields.len() < 4 {
        return None;
    }
    let memory_used_mib: u64 = fields[0].parse().ok()?;
    let memory_total_mib: u64 = fields[1].parse().ok()?;
    let temperature_c: f32 = fields[2].parse().ok()?;
    let process_count: u32 = fields[3].parse().unwrap_or(0);

    Some(Reading::Known {
        memory_used_bytes: memory_used_mib * 1024 * 1024,
        memory_total_bytes: memory_total_mib * 1024 * 1024,
        temperature_c,
        process_count,
    })
}

/// Injectable probe for tests and GPU-less environments; returns whatever
/// reading was last set via [`StubGpuProbe::set`].
pub struct StubGpuProbe {
    reading: Mutex<Reading>,
}

impl StubGpuProbe {
    pub fn new(reading: Reading) -> Self {
        Self {
            reading: Mutex::new(reading),
        }
    }

    pub fn healthy() -> Self {
        Self::new(Reading::Known {
            memory_used_bytes: 1024 * 1024 * 1024,
            memory_total_bytes: 16 * 1024 * 1024 * 1024,
            temperature_c: 45.0,
            process_count: 1,
        })
    }

    pub fn set(&self, reading: Reading) {
        *self.reading.lock().unwrap() = reading;
    }
}

#[async_trait]
impl GpuProbe for StubGpuProbe {
    async fn probe(&self) -> Reading {
        *self.reading.lock().unwrap()
    }
}
