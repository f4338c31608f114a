//! Platform input backend selection.

use rcs_core::InputExecutor;

/// The input executor for the platform this agent was built for.
#[cfg(windows)]
pub fn input_executor() -> anyhow::Result<Box<dyn InputExecutor>> {
    Ok(Box::new(rcs_platform_win::executor()?))
}

/// The input executor for the platform this agent was built for.
#[cfg(target_os = "linux")]
pub fn input_executor() -> anyhow::Result<Box<dyn InputExecutor>> {
    Ok(Box::new(rcs_platform_linux::executor()?))
}

#[cfg(not(any(windows, target_os = "linux")))]
pub fn input_executor() -> anyhow::Result<Box<dyn InputExecutor>> {
    anyhow::bail!("no input backend for this platform")
}
