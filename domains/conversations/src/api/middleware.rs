//! Conversations domain state

use std::sync::Arc;
use tokio::sync::watch;

use pharmydash_common::{Error, Result};

use crate::domain::view::DashboardView;

/// Application state for the dashboard routes
#[derive(Clone)]
pub struct DashboardState {
    pub views: watch::Receiver<Arc<DashboardView>>,
}

impl DashboardState {
    pub fn new(views: watch::Receiver<Arc<DashboardView>>) -> Self {
        Self { views }
    }

    /// Latest published view, or `Unavailable` until the first load completes.
    pub fn loaded_view(&self) -> Result<Arc<DashboardView>> {
        let view = self.views.borrow().clone();
        if view.revision == 0 {
            return Err(Error::Unavailable(
                "Conversations have not been loaded yet".to_string(),
            ));
        }
        Ok(view)
    }
}
