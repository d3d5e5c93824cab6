//! Real-time scheduling helpers (Linux SCHED_FIFO / affinity / mlockall; mlockall elsewhere on unix).

use crate::cli::RtLock;

#[derive(Debug, Clone, Copy)]
pub struct RtOptions {
    pub prio: Option<i32>,
    pub lock: RtLock,
    pub cpu: Option<usize>,
}

#[cfg(unix)]
fn last_os_error(what: &str) -> eyre::Report {
    eyre::eyre!("{what} failed: {}", std::io::Error::last_os_error())
}

#[cfg(unix)]
fn lock_memory(lock: RtLock) -> eyre::Result<()> {
    let flags = match lock {
        RtLock::None => return Ok(()),
        RtLock::Current => libc::MCL_CURRENT,
        RtLock::All => libc::MCL_CURRENT | libc::MCL_FUTURE,
    };
    // SAFETY: mlockall only takes flags and touches no Rust-managed memory.
    let rc = unsafe { libc::mlockall(flags) };
    if rc == 0 {
        return Ok(());
    }
    let err = last_os_error("mlockall");
    if matches!(lock, RtLock::All) {
        // fall back to resident pages only
        // SAFETY: as above.
        if unsafe { libc::mlockall(libc::MCL_CURRENT) } == 0 {
            tracing::warn!(error = %err, "mlockall(current|future) refused, locked current pages only");
            return Ok(());
        }
    }
    Err(err.wrap_err("hint: needs CAP_IPC_LOCK (or root) and a sufficient 'ulimit -l'"))
}

#[cfg(target_os = "linux")]
fn fifo_priority(prio: Option<i32>) -> eyre::Result<i32> {
    // SAFETY: plain queries of the scheduler limits.
    let (min, max) = unsafe {
        (
            libc::sched_get_priority_min(libc::SCHED_FIFO),
            libc::sched_get_priority_max(libc::SCHED_FIFO),
        )
    };
    let (min, max) = if min < 0 || max < 0 { (1, 99) } else { (min, max) };
    let param = libc::sched_param {
        sched_priority: prio.unwrap_or(max).clamp(min, max),
    };
    // SAFETY: `param` outlives the call; pid 0 is the calling process.
    let rc = unsafe { libc::sched_setscheduler(0, libc::SCHED_FIFO, &param) };
    if rc == 0 {
        Ok(param.sched_priority)
    } else {
        Err(last_os_error("sched_setscheduler(SCHED_FIFO)")
            .wrap_err("hint: needs CAP_SYS_NICE or root"))
    }
}

#[cfg(target_os = "linux")]
fn pin_cpu(cpu: usize) -> eyre::Result<()> {
    let bits = std::mem::size_of::<libc::cpu_set_t>() * 8;
    if cpu >= bits {
        eyre::bail!("CPU {cpu} exceeds cpu_set_t capacity {bits}");
    }
    // SAFETY: cpu_set_t is plain data; the CPU_* helpers stay in bounds (checked above).
    unsafe {
        let mut allowed: libc::cpu_set_t = std::mem::zeroed();
        if libc::sched_getaffinity(0, std::mem::size_of::<libc::cpu_set_t>(), &mut allowed) != 0 {
            return Err(last_os_error("sched_getaffinity"));
        }
        if !libc::CPU_ISSET(cpu, &allowed) {
            eyre::bail!("CPU {cpu} not permitted by current affinity mask");
        }
        let mut wanted: libc::cpu_set_t = std::mem::zeroed();
        libc::CPU_ZERO(&mut wanted);
        libc::CPU_SET(cpu, &mut wanted);
        if libc::sched_setaffinity(0, std::mem::size_of::<libc::cpu_set_t>(), &wanted) != 0 {
            return Err(last_os_error("sched_setaffinity"));
        }
    }
    Ok(())
}

/// Apply real-time settings once per process. Every step is best effort:
/// failures are logged and the control loop runs without them.
pub fn setup_rt_once(opts: RtOptions) {
    use std::sync::OnceLock;
    static RT_ONCE: OnceLock<()> = OnceLock::new();

    RT_ONCE.get_or_init(|| {
        #[cfg(unix)]
        match lock_memory(opts.lock) {
            Ok(()) => tracing::info!(lock = ?opts.lock, "rt: memory lock"),
            Err(e) => tracing::warn!(error = %format!("{e:#}"), "rt: mlockall failed"),
        }

        #[cfg(target_os = "linux")]
        {
            match fifo_priority(opts.prio) {
                Ok(prio) => tracing::info!(prio, "rt: SCHED_FIFO"),
                Err(e) => tracing::warn!(error = %format!("{e:#}"), "rt: SCHED_FIFO not applied"),
            }
            let cpu = opts.cpu.unwrap_or(0);
            match pin_cpu(cpu) {
                Ok(()) => tracing::info!(cpu, "rt: affinity"),
                Err(e) => tracing::warn!(error = %e, "rt: affinity not applied"),
            }
        }

        #[cfg(not(target_os = "linux"))]
        tracing::warn!(
            prio = ?opts.prio,
            cpu = ?opts.cpu,
            "rt: SCHED_FIFO and affinity are Linux only; only mlockall applied"
        );
    });
}
