//! Process-wide coordinator.
//!
//! Prefer passing an `Arc<Coordinator>` explicitly. Where code cannot be
//! handed one, the coordinator installed here is shared by the whole process.
//! Replacement is atomic and the last write wins. Callers that already loaded
//! the previous coordinator keep using it, and envelopes it issued stay valid.

use crate::db::coordinator::{Coordinator, CoordinatorBuilder};
use crate::error::{DbError, DbResult};
use arc_swap::ArcSwapOption;
use std::sync::Arc;
use tracing::info;

static GLOBAL: ArcSwapOption<Coordinator> = ArcSwapOption::const_empty();

/// The installed coordinator.
pub fn global() -> DbResult<Arc<Coordinator>> {
    try_global().ok_or_else(|| {
        DbError::configuration("Global coordinator is not initialized; call set_global or configure_global first")
    })
}

/// The installed coordinator, if any.
pub fn try_global() -> Option<Arc<Coordinator>> {
    GLOBAL.load_full()
}

/// Install `coordinator`, returning the one it replaces.
pub fn set_global(coordinator: Arc<Coordinator>) -> Option<Arc<Coordinator>> {
    let previous = GLOBAL.swap(Some(coordinator));
    info!(replaced = previous.is_some(), "Global coordinator installed");
    previous
}

/// Build a coordinator with `configure` and install it.
///
/// Nothing is installed if the build fails.
pub fn configure_global<F>(configure: F) -> DbResult<Arc<Coordinator>>
where
    F: FnOnce(CoordinatorBuilder) -> CoordinatorBuilder,
{
    let coordinator = Arc::new(configure(Coordinator::builder()).build()?);
    set_global(Arc::clone(&coordinator));
    Ok(coordinator)
}

/// Remove the installed coordinator, returning it.
pub fn clear_global() -> Option<Arc<Coordinator>> {
    GLOBAL.swap(None)
}
