use std::sync::Mutex;
use std::time::{Duration, Instant};

/// One finished batch stage.
#[derive(Debug, Clone, PartialEq)]
pub struct StageTiming {
    pub stage: String,
    /// Time since the previous stage ended, or since the monitor started.
    pub elapsed: Duration,
    /// Resident memory of this process when the stage ended.
    pub memory_mb: Option<u64>,
}

#[derive(Debug)]
struct Timeline {
    last_mark: Instant,
    stages: Vec<StageTiming>,
}

/// Records how long each batch stage took and, with the `cli` feature,
/// the process memory at each stage boundary.
pub struct SystemMonitor {
    enabled: bool,
    started: Instant,
    timeline: Mutex<Timeline>,
    #[cfg(feature = "cli")]
    memory: Option<MemorySampler>,
}

impl SystemMonitor {
    pub fn new(enabled: bool) -> Self {
        let now = Instant::now();
        Self {
            enabled,
            started: now,
            timeline: Mutex::new(Timeline {
                last_mark: now,
                stages: Vec::new(),
            }),
            #[cfg(feature = "cli")]
            memory: if enabled { MemorySampler::for_current_process() } else { None },
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn sample_memory_mb(&self) -> Option<u64> {
        #[cfg(feature = "cli")]
        {
            self.memory.as_ref().and_then(MemorySampler::resident_mb)
        }
        #[cfg(not(feature = "cli"))]
        {
            None
        }
    }

    /// Closes the current stage. Returns `None` when monitoring is off.
    pub fn record_stage(&self, stage: &str) -> Option<StageTiming> {
        if !self.enabled {
            return None;
        }
        let memory_mb = self.sample_memory_mb();
        let mut timeline = self.timeline.lock().ok()?;
        let now = Instant::now();
        let timing = StageTiming {
            stage: stage.to_string(),
            elapsed: now.duration_since(timeline.last_mark),
            memory_mb,
        };
        timeline.last_mark = now;
        timeline.stages.push(timing.clone());
        Some(timing)
    }

    pub fn stages(&self) -> Vec<StageTiming> {
        self.timeline
            .lock()
            .map(|t| t.stages.clone())
            .unwrap_or_default()
    }

    pub fn peak_memory_mb(&self) -> Option<u64> {
        self.stages().iter().filter_map(|s| s.memory_mb).max()
    }

    pub fn log_stage(&self, stage: &str) {
        if let Some(timing) = self.record_stage(stage) {
            match timing.memory_mb {
                Some(mb) => tracing::info!("📊 {} took {:?}, memory {}MB", stage, timing.elapsed, mb),
                None => tracing::info!("📊 {} took {:?}", stage, timing.elapsed),
            }
        }
    }

    pub fn log_final_stats(&self) {
        if !self.enabled {
            return;
        }
        let total = self.started.elapsed();
        let breakdown: Vec<String> = self
            .stages()
            .iter()
            .map(|s| {
                let share = if total.is_zero() {
                    0.0
                } else {
                    100.0 * s.elapsed.as_secs_f64() / total.as_secs_f64()
                };
                format!("{} {:?} ({:.0}%)", s.stage, s.elapsed, share)
            })
            .collect();
        tracing::info!("📊 Total {:?}: {}", total, breakdown.join(", "));
        if let Some(peak) = self.peak_memory_mb() {
            tracing::info!("📊 Peak memory at a stage boundary: {}MB", peak);
        }
    }
}

impl Default for SystemMonitor {
    fn default() -> Self {
        Self::new(false)
    }
}

#[cfg(feature = "cli")]
struct MemorySampler {
    system: Mutex<sysinfo::System>,
    pid: sysinfo::Pid,
}

#[cfg(feature = "cli")]
impl MemorySampler {
    fn for_current_process() -> Option<Self> {
        match sysinfo::get_current_pid() {
            Ok(pid) => Some(Self {
                system: Mutex::new(sysinfo::System::new()),
                pid,
            }),
            Err(e) => {
                tracing::warn!("Memory sampling unavailable: {}", e);
                None
            }
        }
    }

    fn resident_mb(&self) -> Option<u64> {
        let mut system = self.system.lock().ok()?;
        system.refresh_processes(sysinfo::ProcessesToUpdate::Some(&[self.pid]), false);
        system.process(self.pid).map(|p| p.memory() / 1024 / 1024)
    }
}
