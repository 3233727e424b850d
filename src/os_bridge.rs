//! OS collaborator seam: process discovery, liveness, and foreground focus.
//!
//! Every call here may block. Callers run them through `spawn_blocking` and
//! never from inside a session loop.

use std::sync::Mutex;

use anyhow::{anyhow, Result};
use sysinfo::{Pid, ProcessRefreshKind, ProcessesToUpdate, System};

use crate::models::IdentityHints;

/// A live process that matched a registration's identity hints.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessMatch {
    pub process_id: u32,
    pub alive: bool,
}

pub trait ProcessProbe: Send + Sync {
    /// Find a live process matching `hints`. `Ok(None)` means nothing matched.
    fn query_process(&self, hints: &IdentityHints) -> Result<Option<ProcessMatch>>;

    /// Whether `process_id` still refers to a running process.
    fn is_alive(&self, process_id: u32) -> Result<bool>;
}

pub trait ForegroundProbe: Send + Sync {
    /// Process id owning the foreground window. `Ok(None)` when nothing holds
    /// focus (desktop, lock screen, transient window-manager surfaces).
    fn foreground_process(&self) -> Result<Option<u32>>;
}

/// Process probe backed by a `sysinfo` process table scan.
pub struct SysinfoProcessProbe {
    system: Mutex<System>,
    own_pid: u32,
}

impl SysinfoProcessProbe {
    pub fn new() -> Self {
        log::info!("SysinfoProcessProbe created, own_pid={}", std::process::id());
        Self {
            system: Mutex::new(System::new()),
            own_pid: std::process::id(),
        }
    }
}

impl Default for SysinfoProcessProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessProbe for SysinfoProcessProbe {
    fn query_process(&self, hints: &IdentityHints) -> Result<Option<ProcessMatch>> {
        if hints.process_name.is_none() && hints.executable_path.is_none() {
            return Err(anyhow!("identity hints carry neither a process name nor a path"));
        }

        let mut system = match self.system.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        // Names and exe paths are only populated with the full refresh kind
        system.refresh_processes_specifics(ProcessesToUpdate::All, ProcessRefreshKind::everything());

        // Lowest pid wins so repeated probes pick the same instance
        let found = system
            .processes()
            .iter()
            .filter(|(pid, _)| pid.as_u32() != self.own_pid)
            .filter(|(_, process)| matches_hints(process, hints))
            .map(|(pid, _)| pid.as_u32())
            .min();

        Ok(found.map(|process_id| ProcessMatch {
            process_id,
            alive: true,
        }))
    }

    fn is_alive(&self, process_id: u32) -> Result<bool> {
        let mut system = match self.system.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        let pid = Pid::from_u32(process_id);
        system.refresh_processes_specifics(
            ProcessesToUpdate::Some(&[pid]),
            ProcessRefreshKind::new(),
        );
        Ok(system.process(pid).is_some())
    }
}

fn matches_hints(process: &sysinfo::Process, hints: &IdentityHints) -> bool {
    if let Some(expected) = hints.process_name.as_deref() {
        let name = process.name().to_string_lossy();
        let stem = name.strip_suffix(".exe").unwrap_or(&name);
        if !stem.eq_ignore_ascii_case(expected) && !name.eq_ignore_ascii_case(expected) {
            return false;
        }
    }

    if let Some(expected) = hints.executable_path.as_deref() {
        match process.exe() {
            Some(exe) if exe.to_string_lossy() == expected => {}
            _ => return false,
        }
    }

    true
}

/// Foreground probe for platforms without a native focus query.
///
/// Always errors, which drives every subscriber into the degraded path.
pub struct UnsupportedForegroundProbe;

impl ForegroundProbe for UnsupportedForegroundProbe {
    fn foreground_process(&self) -> Result<Option<u32>> {
        Err(anyhow!(
            "foreground window query is not available on this platform"
        ))
    }
}
