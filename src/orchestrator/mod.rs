//! Application-level orchestration utilities.
//!
//! Post-sweep processing such as auto-save and exports lives here so the CLI output modes
//! share one code path.

mod post_process;

pub(crate) use post_process::process_sweep_completion;
