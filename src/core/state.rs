use crate::controllers::token::TokenController;
use crate::core::config::LeaseSettings;
use crate::store::Store;

#[derive(Clone, Debug)]
pub(crate) struct AppState<S: Store> {
    pub(crate) controller: TokenController<S>,
}

impl<S: Store> AppState<S> {
    pub(crate) fn new(store: S, settings: LeaseSettings) -> Self {
        Self {
            controller: TokenController::new(store, settings),
        }
    }
}
