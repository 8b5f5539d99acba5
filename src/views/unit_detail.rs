use chrono::Utc;
use tokio::{sync::watch, task::JoinHandle};
use tokio_util::sync::CancellationToken;

use super::{publish_load, ViewState};
use crate::{
    snapshot::{SnapshotLoader, UnitDetail},
    store::StoreClient,
};

/// One unit's details and timeline, loaded once.
pub struct UnitDetailView {
    unit_code: String,
    state: watch::Receiver<ViewState<UnitDetail>>,
    alive: CancellationToken,
    load: Option<JoinHandle<()>>,
}

impl UnitDetailView {
    pub fn mount(client: &StoreClient, unit_code: impl Into<String>) -> Self {
        let unit_code = unit_code.into();
        let alive = CancellationToken::new();
        let (state_tx, state) = watch::channel(ViewState::Loading);

        let loader = SnapshotLoader::new(client.clone());
        let load = tokio::spawn({
            let alive = alive.clone();
            let unit_code = unit_code.clone();
            async move {
                let result = tokio::select! {
                    _ = alive.cancelled() => return,
                    result = loader.unit_detail(&unit_code, Utc::now()) => result,
                };
                publish_load(&state_tx, &alive, "saree data", result);
            }
        });

        Self {
            unit_code,
            state,
            alive,
            load: Some(load),
        }
    }

    pub fn unit_code(&self) -> &str {
        &self.unit_code
    }

    pub fn state(&self) -> ViewState<UnitDetail> {
        self.state.borrow().clone()
    }

    pub fn watch_state(&self) -> watch::Receiver<ViewState<UnitDetail>> {
        self.state.clone()
    }

    pub async fn unmount(mut self) {
        self.alive.cancel();
        if let Some(load) = self.load.take() {
            if let Err(err) = load.await {
                log::error!("Unit detail load for {} failed: {err}", self.unit_code);
            }
        }
    }
}

impl Drop for UnitDetailView {
    fn drop(&mut self) {
        self.alive.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        derived::StageState,
        store::{StoreWriter, Table},
        test_support::{signed_in_backend, unit_row, wait_until},
    };

    #[tokio::test]
    async fn loads_existing_unit() {
        let (db, client) = signed_in_backend().await;
        db.insert(Table::Units, unit_row("u-1", "S-1", "FWH"))
            .await
            .unwrap();

        let view = UnitDetailView::mount(&client, "S-1");
        let mut state = view.watch_state();
        let loaded = wait_until(&mut state, |s| !s.is_loading()).await;

        let detail = loaded.ready().expect("detail loaded");
        assert_eq!(detail.unit.id, "u-1");
        assert!(detail.movements.is_empty());
        assert_eq!(detail.timeline[2].state, StageState::Current);
        assert_eq!(detail.timeline[0].state, StageState::Completed);
        view.unmount().await;
    }

    #[tokio::test]
    async fn missing_unit_fails_with_generic_message() {
        let (_db, client) = signed_in_backend().await;
        let view = UnitDetailView::mount(&client, "S-404");
        let mut state = view.watch_state();
        let failed = wait_until(&mut state, |s| !s.is_loading()).await;

        assert_eq!(failed.error(), Some("Failed to load saree data"));
        assert_eq!(view.unit_code(), "S-404");
        view.unmount().await;
    }
}
